use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Name under which a backend is registered for a run (`ssc`, `fod`, `sc-sast`, ...).
///
/// The same name doubles as the function prefix for backend-specific expression
/// functions, so it is restricted to identifier-like characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendName(pub String);

impl BackendName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the name can be used both as a lookup key and as a function prefix.
    pub fn validate(&self) -> Result<(), CoreError> {
        let valid = !self.0.is_empty()
            && self
                .0
                .chars()
                .next()
                .map(|c| c.is_ascii_alphabetic())
                .unwrap_or(false)
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(CoreError::Invalid(format!(
                "backend name '{}' must start with a letter and contain only letters, digits, '-' or '_'",
                self.0
            )))
        }
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BackendName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Product family a backend belongs to; drives auth scheme, response unwrapping,
/// bulk support and product-specific expression functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductKind {
    Ssc,
    Fod,
    ScSast,
    ScDast,
    Aviator,
    Generic,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Ssc => "ssc",
            ProductKind::Fod => "fod",
            ProductKind::ScSast => "sc-sast",
            ProductKind::ScDast => "sc-dast",
            ProductKind::Aviator => "aviator",
            ProductKind::Generic => "generic",
        }
    }

    /// Authorization scheme used when a backend doesn't configure one explicitly.
    pub fn default_auth_scheme(&self) -> &'static str {
        match self {
            ProductKind::Ssc | ProductKind::ScSast | ProductKind::ScDast => "FortifyToken",
            ProductKind::Fod | ProductKind::Aviator | ProductKind::Generic => "Bearer",
        }
    }

    /// Envelope field holding the payload of a successful response, if any.
    pub fn default_unwrap_field(&self) -> Option<&'static str> {
        match self {
            ProductKind::Ssc | ProductKind::ScSast => Some("data"),
            ProductKind::Fod | ProductKind::ScDast => Some("items"),
            ProductKind::Aviator | ProductKind::Generic => None,
        }
    }

    /// Only the SSC REST API exposes a bulk endpoint.
    pub fn default_bulk_support(&self) -> bool {
        matches!(self, ProductKind::Ssc)
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssc" => Ok(ProductKind::Ssc),
            "fod" => Ok(ProductKind::Fod),
            "sc-sast" => Ok(ProductKind::ScSast),
            "sc-dast" => Ok(ProductKind::ScDast),
            "aviator" => Ok(ProductKind::Aviator),
            "generic" => Ok(ProductKind::Generic),
            other => Err(CoreError::Invalid(format!("unknown product: {}", other))),
        }
    }
}

/// Action-result indicator attached to emitted records (`SUCCESS`, `FAILED`, `AUDITED`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultIndicator(pub String);

impl ResultIndicator {
    pub const SUCCESS: &'static str = "SUCCESS";
    pub const FAILED: &'static str = "FAILED";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn success() -> Self {
        Self(Self::SUCCESS.to_string())
    }

    pub fn failed() -> Self {
        Self(Self::FAILED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_failure(&self) -> bool {
        self.0 == Self::FAILED
    }
}

impl fmt::Display for ResultIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
