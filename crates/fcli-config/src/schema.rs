use crate::error::{ConfigError, ConfigResult};
use fcli_core::{BackendName, ProductKind};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_SUB_ACTION_DEPTH: usize = 16;
pub const DEFAULT_BULK_PATH: &str = "/api/v1/bulk";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 60_000;

/// Process-wide configuration, loaded once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Directory searched when an action is referenced by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions_dir: Option<PathBuf>,
    /// Treat per-item request failures as an overall failure
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_max_depth")]
    pub max_sub_action_depth: usize,
    /// Backends by name; the name is also the prefix of its expression functions
    #[serde(default)]
    pub backends: IndexMap<String, BackendConfig>,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_SUB_ACTION_DEPTH
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            actions_dir: None,
            strict: false,
            max_sub_action_depth: DEFAULT_MAX_SUB_ACTION_DEPTH,
            backends: IndexMap::new(),
        }
    }
}

impl RunnerConfig {
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_sub_action_depth == 0 {
            return Err(ConfigError::Validation(
                "max_sub_action_depth must be at least 1".to_string(),
            ));
        }
        for (name, backend) in &self.backends {
            BackendName::new(name.as_str())
                .validate()
                .map_err(|e| ConfigError::invalid_backend(name, e.to_string()))?;
            backend.validate(name)?;
        }
        Ok(())
    }
}

/// Connection details for one product backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Product family; derived from the backend name when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductKind>,
    pub base_url: String,
    /// UI base URL used for deep links; derived from `base_url` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_url: Option<String>,
    #[serde(default, deserialize_with = "opt_lenient_string", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_scheme: Option<String>,
    #[serde(default, deserialize_with = "lenient_headers", skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    /// Override the product's bulk support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_path: Option<String>,
    /// Envelope field unwrapped from successful responses; empty string disables unwrapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unwrap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_true() -> bool {
    true
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            product: None,
            base_url: base_url.into(),
            browser_url: None,
            token: None,
            auth_scheme: None,
            headers: IndexMap::new(),
            bulk: None,
            bulk_path: None,
            unwrap: None,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            verify_tls: true,
        }
    }

    pub fn with_product(mut self, product: ProductKind) -> Self {
        self.product = Some(product);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_bulk(mut self, bulk: bool) -> Self {
        self.bulk = Some(bulk);
        self
    }

    pub fn with_unwrap(mut self, field: impl Into<String>) -> Self {
        self.unwrap = Some(field.into());
        self
    }

    /// Product family for a backend registered under `name`.
    pub fn product_for(&self, name: &str) -> ProductKind {
        self.product
            .or_else(|| ProductKind::from_str(name).ok())
            .unwrap_or(ProductKind::Generic)
    }

    pub fn auth_scheme_for(&self, product: ProductKind) -> String {
        self.auth_scheme
            .clone()
            .unwrap_or_else(|| product.default_auth_scheme().to_string())
    }

    pub fn supports_bulk(&self, product: ProductKind) -> bool {
        self.bulk.unwrap_or_else(|| product.default_bulk_support())
    }

    pub fn bulk_path(&self) -> &str {
        self.bulk_path.as_deref().unwrap_or(DEFAULT_BULK_PATH)
    }

    pub fn unwrap_field(&self, product: ProductKind) -> Option<String> {
        match &self.unwrap {
            Some(field) if field.is_empty() => None,
            Some(field) => Some(field.clone()),
            None => product.default_unwrap_field().map(str::to_string),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS))
    }

    pub fn validate(&self, name: &str) -> ConfigResult<()> {
        check_http_url(name, "base_url", &self.base_url)?;
        if let Some(browser_url) = &self.browser_url {
            check_http_url(name, "browser_url", browser_url)?;
        }
        if let Some(path) = &self.bulk_path {
            if !path.starts_with('/') {
                return Err(ConfigError::invalid_backend(
                    name,
                    format!("bulk_path '{}' must start with '/'", path),
                ));
            }
        }
        if matches!(self.auth_scheme.as_deref(), Some(s) if s.trim().is_empty()) {
            return Err(ConfigError::invalid_backend(name, "auth_scheme must not be blank"));
        }
        Ok(())
    }
}

fn check_http_url(backend: &str, field: &str, value: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(value).map_err(|e| {
        ConfigError::invalid_backend(backend, format!("{} '{}' is not a valid URL: {}", field, value, e))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::invalid_backend(
            backend,
            format!("{} must use http or https, not '{}'", field, other),
        )),
    }
}

// Environment resolution turns numeric-looking text into numbers; string fields take them back.
fn scalar_to_string(value: JsonValue) -> Result<String, String> {
    match value {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a string, found {}", other)),
    }
}

fn opt_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => scalar_to_string(value).map(Some).map_err(serde::de::Error::custom),
    }
}

fn lenient_headers<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    IndexMap::<String, JsonValue>::deserialize(deserializer)?
        .into_iter()
        .map(|(k, v)| scalar_to_string(v).map(|v| (k, v)))
        .collect::<Result<_, _>>()
        .map_err(serde::de::Error::custom)
}
