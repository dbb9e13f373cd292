//! Bulk request coalescing for backends exposing a bulk endpoint.
//!
//! Request: `{"requests": [{"uri", "httpVerb", "postData"?}]}`.
//! Response: `{"data": [{"request": {..}, "responses": [{"body": {..}}]}]}` where entry
//! `i` answers request `i`.

use super::request::{RequestFailure, RequestOutcome};
use serde_json::{json, Value as JsonValue};
use url::Url;

/// Accumulates the entries of one bulk request.
#[derive(Debug, Default)]
pub struct BulkRequestBuilder {
    entries: Vec<JsonValue>,
}

impl BulkRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, method: &str, url: &Url, body: Option<&JsonValue>) -> &mut Self {
        let mut entry = json!({
            "uri": url.as_str(),
            "httpVerb": method,
        });
        if let (Some(body), Some(map)) = (body, entry.as_object_mut()) {
            map.insert("postData".to_string(), body.clone());
        }
        self.entries.push(entry);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> JsonValue {
        json!({ "requests": self.entries })
    }
}

/// Split a bulk response into one outcome per request, in request order.
pub fn parse_bulk_response(response: &JsonValue, expected: usize) -> Vec<RequestOutcome> {
    let entries = response
        .get("data")
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    (0..expected)
        .map(|idx| {
            let body = entries
                .get(idx)
                .and_then(|entry| entry.get("responses"))
                .and_then(|responses| responses.get(0))
                .and_then(|first| first.get("body"));
            match body {
                Some(body) => entry_outcome(body),
                None => Err(RequestFailure::new(
                    None,
                    format!("No response for bulk request entry {}", idx),
                    JsonValue::Null,
                )),
            }
        })
        .collect()
}

fn entry_outcome(body: &JsonValue) -> RequestOutcome {
    match body.get("responseCode").and_then(JsonValue::as_u64) {
        Some(code) if code >= 400 => Err(RequestFailure::from_status(code as u16, None, body.clone())),
        _ => Ok(body.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_entries() {
        let mut builder = BulkRequestBuilder::new();
        let url = Url::parse("https://ssc.example.com/ssc/api/v1/projectVersions/1").unwrap();
        builder.request("GET", &url, None);
        builder.request("POST", &url, Some(&json!({"a": 1})));
        assert_eq!(builder.len(), 2);
        assert_eq!(
            builder.build(),
            json!({"requests": [
                {"uri": "https://ssc.example.com/ssc/api/v1/projectVersions/1", "httpVerb": "GET"},
                {"uri": "https://ssc.example.com/ssc/api/v1/projectVersions/1", "httpVerb": "POST", "postData": {"a": 1}}
            ]})
        );
    }

    #[test]
    fn per_entry_failures_are_isolated() {
        let response = json!({"data": [
            {"request": {}, "responses": [{"body": {"data": {"id": 1}, "responseCode": 200}}]},
            {"request": {}, "responses": [{"body": {"message": "Not found", "responseCode": 404}}]}
        ]});
        let outcomes = parse_bulk_response(&response, 3);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].as_ref().unwrap()["data"]["id"], json!(1));
        let failure = outcomes[1].as_ref().unwrap_err();
        assert_eq!(failure.status, Some(404));
        assert_eq!(failure.message, "Not found");
        assert_eq!(outcomes[2].as_ref().unwrap_err().status, None);
    }
}
