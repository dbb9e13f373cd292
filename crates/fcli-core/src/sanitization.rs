//! Utilities for masking credentials in request logs and error messages

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

/// Fields that should be masked in logs
const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "access_token",
    "refresh_token",
    "authorization",
    "client_secret",
    "secret",
    "api_key",
    "apikey",
    "credential",
    "credentials",
    "private_key",
];

/// Additional substrings to check (case-insensitive)
const SENSITIVE_PATTERNS: &[&str] = &["_key", "_token", "_secret", "_password", "token"];

const SANITIZED_PLACEHOLDER: &str = "***REDACTED***";

static QUERY_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([?&](?:token|access_token|api_key|apikey|password|secret)=)[^&#]*")
        .expect("static query pattern")
});

/// Check if a field name indicates sensitive data
pub fn is_sensitive_field(field_name: &str) -> bool {
    // Header names use dashes where JSON fields use underscores.
    let field_lower = field_name.to_lowercase().replace('-', "_");

    if SENSITIVE_FIELDS.iter().any(|&sensitive| field_lower == sensitive) {
        return true;
    }

    SENSITIVE_PATTERNS
        .iter()
        .any(|&pattern| field_lower.contains(pattern))
}

/// Replace values of sensitive fields with a placeholder, recursing into objects and arrays.
pub fn sanitize_json_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let sanitized: Map<String, JsonValue> = map
                .iter()
                .map(|(key, val)| {
                    let sanitized_val = if is_sensitive_field(key) {
                        match val {
                            JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) => {
                                JsonValue::String(SANITIZED_PLACEHOLDER.to_string())
                            }
                            other => sanitize_json_value(other),
                        }
                    } else {
                        sanitize_json_value(val)
                    };
                    (key.clone(), sanitized_val)
                })
                .collect();
            JsonValue::Object(sanitized)
        }
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(sanitize_json_value).collect()),
        other => other.clone(),
    }
}

/// Mask a header value if the header carries credentials.
///
/// The auth scheme is kept so logs still show which kind of credential was sent.
pub fn sanitize_header_value(name: &str, value: &str) -> String {
    if !is_sensitive_field(name) {
        return value.to_string();
    }
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{} {}", scheme, SANITIZED_PLACEHOLDER),
        None => SANITIZED_PLACEHOLDER.to_string(),
    }
}

/// Mask credential-like query parameters in a URL.
pub fn sanitize_url(url: &str) -> String {
    QUERY_SECRET
        .replace_all(url, format!("${{1}}{}", SANITIZED_PLACEHOLDER).as_str())
        .into_owned()
}

/// Create a sanitized display string for debugging
pub fn create_debug_string(prefix: &str, json: &JsonValue) -> String {
    format!("{}: {}", prefix, sanitize_json_value(json))
}
