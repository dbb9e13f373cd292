use serde::Serialize;
use serde_json::Value as JsonValue;

/// A fully evaluated request, ready to be sent to one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    /// URI relative to the backend base URL, possibly with its own query string
    pub uri: String,
    /// Additional query parameters, appended in order
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

impl PreparedRequest {
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            uri: uri.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }
}

/// A request that reached the backend but did not succeed. Recoverable: it is
/// attributed to the continuation of that one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestFailure {
    /// HTTP status, if the backend answered
    pub status: Option<u16>,
    pub message: String,
    pub body: JsonValue,
}

impl RequestFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>, body: JsonValue) -> Self {
        Self {
            status,
            message: message.into(),
            body,
        }
    }

    /// Failure for an error status, taking the message from the body when the
    /// product provides one.
    pub fn from_status(status: u16, reason: Option<&str>, body: JsonValue) -> Self {
        let message = body
            .get("message")
            .and_then(JsonValue::as_str)
            .or_else(|| body.get("error").and_then(JsonValue::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| match reason {
                Some(reason) => format!("HTTP {} {}", status, reason),
                None => format!("HTTP {}", status),
            });
        Self::new(Some(status), message, body)
    }

    pub fn to_value(&self) -> JsonValue {
        serde_json::json!({
            "status": self.status,
            "message": self.message,
            "body": self.body,
        })
    }
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

/// Result of one request: the raw response body, or a recoverable failure.
pub type RequestOutcome = Result<JsonValue, RequestFailure>;

/// Parse a response body: empty text is null, non-JSON text is kept as a string.
pub fn parse_body(text: &str) -> JsonValue {
    if text.trim().is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_str(text).unwrap_or_else(|_| JsonValue::String(text.to_string()))
    }
}
