//! Environment variable resolution with whitelist and default value support

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::env;
use thiserror::Error;

static VAR_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").expect("static regex"));

/// Errors that can occur during environment variable resolution
#[derive(Debug, Error)]
pub enum EnvResolverError {
    #[error("Environment variable '{0}' not found and no default provided")]
    VarNotFound(String),
    #[error("Environment variable '{0}' is not in whitelist. Allowed prefixes: {1:?}")]
    VarNotWhitelisted(String, Vec<String>),
    #[error("Recursive variable reference detected in '{0}'")]
    RecursiveReference(String),
}

/// Environment variable resolver with whitelist support
#[derive(Debug, Clone)]
pub struct EnvResolver {
    /// Allowed prefixes for environment variables; empty means no restrictions
    allowed_prefixes: Vec<String>,
    /// Maximum nesting depth of the resolved document
    max_depth: usize,
}

impl Default for EnvResolver {
    fn default() -> Self {
        Self {
            allowed_prefixes: ["FCLI_", "SSC_", "FOD_", "SC_", "AVIATOR_"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_depth: 10,
        }
    }
}

impl EnvResolver {
    /// Create a new resolver with specified allowed prefixes
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self {
            allowed_prefixes,
            max_depth: 10,
        }
    }

    /// Resolve `${VAR}` and `${VAR:default}` references in a JSON value.
    pub fn resolve(&self, value: &JsonValue) -> Result<JsonValue, EnvResolverError> {
        self.resolve_recursive(value, 0)
    }

    fn resolve_recursive(
        &self,
        value: &JsonValue,
        depth: usize,
    ) -> Result<JsonValue, EnvResolverError> {
        if depth > self.max_depth {
            return Err(EnvResolverError::RecursiveReference(
                "Maximum recursion depth exceeded".to_string(),
            ));
        }

        match value {
            JsonValue::String(s) => self.resolve_string(s),
            JsonValue::Object(obj) => {
                let mut resolved = serde_json::Map::new();
                for (key, val) in obj {
                    resolved.insert(key.clone(), self.resolve_recursive(val, depth + 1)?);
                }
                Ok(JsonValue::Object(resolved))
            }
            JsonValue::Array(arr) => arr
                .iter()
                .map(|item| self.resolve_recursive(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, input: &str) -> Result<JsonValue, EnvResolverError> {
        if !input.contains("${") {
            return Ok(JsonValue::String(input.to_string()));
        }

        // Values may themselves contain references; resolve until stable.
        let mut visited = HashSet::new();
        let mut result = input.to_string();
        let mut rounds = 0;
        while VAR_REF.is_match(&result) {
            if rounds > self.max_depth || !visited.insert(result.clone()) {
                return Err(EnvResolverError::RecursiveReference(input.to_string()));
            }
            rounds += 1;

            let mut next = String::with_capacity(result.len());
            let mut last = 0;
            for caps in VAR_REF.captures_iter(&result) {
                let (Some(full), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                self.validate_var_name(name.as_str())?;
                let value = match env::var(name.as_str()) {
                    Ok(value) => value,
                    Err(_) => match caps.get(2) {
                        Some(default) => default.as_str().to_string(),
                        None => return Err(EnvResolverError::VarNotFound(name.as_str().to_string())),
                    },
                };
                next.push_str(&result[last..full.start()]);
                next.push_str(&value);
                last = full.end();
            }
            next.push_str(&result[last..]);
            result = next;
        }

        Ok(infer_scalar(result))
    }

    /// Validate variable name against whitelist
    fn validate_var_name(&self, var_name: &str) -> Result<(), EnvResolverError> {
        if self.allowed_prefixes.is_empty()
            || self.allowed_prefixes.iter().any(|p| var_name.starts_with(p))
        {
            return Ok(());
        }
        Err(EnvResolverError::VarNotWhitelisted(
            var_name.to_string(),
            self.allowed_prefixes.clone(),
        ))
    }
}

/// Resolved text that looks like a boolean or integer becomes one, so that
/// `${FCLI_STRICT:false}` can feed a boolean field.
fn infer_scalar(text: String) -> JsonValue {
    if let Ok(b) = text.parse::<bool>() {
        JsonValue::Bool(b)
    } else if let Ok(i) = text.parse::<i64>() {
        JsonValue::Number(i.into())
    } else {
        JsonValue::String(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::env;

    #[test]
    fn test_basic_variable_resolution() {
        env::set_var("FCLI_TEST_BASIC", "test_value");
        let result = EnvResolver::default().resolve(&json!("${FCLI_TEST_BASIC}")).unwrap();
        assert_eq!(result, json!("test_value"));
        env::remove_var("FCLI_TEST_BASIC");
    }

    #[test]
    fn test_default_value() {
        env::remove_var("FCLI_NONEXISTENT");
        let result = EnvResolver::default()
            .resolve(&json!("${FCLI_NONEXISTENT:https://ssc.local}"))
            .unwrap();
        assert_eq!(result, json!("https://ssc.local"));
    }

    #[test]
    fn test_missing_variable_error() {
        env::remove_var("FCLI_MISSING");
        let result = EnvResolver::default().resolve(&json!("${FCLI_MISSING}"));
        assert!(matches!(result, Err(EnvResolverError::VarNotFound(_))));
    }

    #[test]
    fn test_whitelist_validation() {
        let resolver = EnvResolver::new(vec!["ALLOWED_".to_string()]);
        let result = resolver.resolve(&json!("${FORBIDDEN_VAR}"));
        assert!(matches!(result, Err(EnvResolverError::VarNotWhitelisted(_, _))));
        env::set_var("ALLOWED_X", "1");
        assert_eq!(resolver.resolve(&json!("${ALLOWED_X}")).unwrap(), json!(1));
        env::remove_var("ALLOWED_X");
    }

    #[test]
    fn test_nested_object_resolution() {
        env::set_var("SSC_TEST_HOST", "ssc.example.com");
        env::set_var("SSC_TEST_TOKEN", "abc-123");
        let input = json!({
            "backends": {
                "ssc": {
                    "base_url": "https://${SSC_TEST_HOST}/ssc",
                    "token": "${SSC_TEST_TOKEN}",
                    "read_timeout_ms": "${SSC_TEST_TIMEOUT:30000}",
                    "bulk": "${SSC_TEST_BULK:true}"
                }
            }
        });
        let result = EnvResolver::default().resolve(&input).unwrap();
        assert_eq!(
            result,
            json!({
                "backends": {
                    "ssc": {
                        "base_url": "https://ssc.example.com/ssc",
                        "token": "abc-123",
                        "read_timeout_ms": 30000,
                        "bulk": true
                    }
                }
            })
        );
        env::remove_var("SSC_TEST_HOST");
        env::remove_var("SSC_TEST_TOKEN");
    }

    #[test]
    fn test_self_reference_is_rejected() {
        env::set_var("FCLI_TEST_LOOP", "${FCLI_TEST_LOOP}");
        let result = EnvResolver::default().resolve(&json!("${FCLI_TEST_LOOP}"));
        assert!(matches!(result, Err(EnvResolverError::RecursiveReference(_))));
        env::remove_var("FCLI_TEST_LOOP");
    }
}
