//! URL building utilities for backend requests

use crate::error::{ConnectorError, ConnectorResult};
use url::Url;

/// Joins backend base URLs with the relative URIs used in action documents.
pub struct UrlBuilder;

impl UrlBuilder {
    /// Append a relative URI to the base URL, keeping the base path.
    ///
    /// Examples:
    /// - `join("https://ssc.example.com/ssc", "/api/v1/projects")` -> `https://ssc.example.com/ssc/api/v1/projects`
    /// - `join("https://ssc.example.com/ssc/", "api/v1/projects")` -> `https://ssc.example.com/ssc/api/v1/projects`
    /// - `join("https://api.example.com", "/releases?limit=1")` -> `https://api.example.com/releases?limit=1`
    ///
    /// Absolute URIs are rejected so that credentials for one backend never reach another host.
    pub fn join(base_url: &str, uri: &str) -> ConnectorResult<Url> {
        if Self::is_absolute(uri) {
            return Err(ConnectorError::InvalidConfig(format!(
                "Request URI '{}' must be relative to the backend URL",
                uri
            )));
        }
        let base = base_url.trim_end_matches('/');
        let joined = if uri.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, uri.trim_start_matches('/'))
        };
        Url::parse(&joined).map_err(|e| {
            ConnectorError::InvalidConfig(format!(
                "Failed to join URL '{}' with '{}': {}",
                base_url, uri, e
            ))
        })
    }

    /// Join base URL with URI and append query parameters in the given order
    pub fn join_with_query(
        base_url: &str,
        uri: &str,
        query: &[(String, String)],
    ) -> ConnectorResult<Url> {
        let mut url = Self::join(base_url, uri)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    pub fn is_absolute(uri: &str) -> bool {
        uri.starts_with("//") || Url::parse(uri).is_ok()
    }
}
