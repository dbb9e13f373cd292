use crate::error::ConnectorResult;
use crate::http::{PreparedRequest, RequestOutcome};
use async_trait::async_trait;
use fcli_core::ProductKind;
use fcli_expr::FunctionDef;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Backend adapter owning an authenticated transport.
///
/// `Ok(Err(failure))` from `execute` is a recoverable per-request failure;
/// `Err(_)` is a transport failure.
#[async_trait]
pub trait RequestHelper: Send + Sync + fmt::Debug {
    /// Backend name this helper is registered under
    fn name(&self) -> &str;

    fn product(&self) -> ProductKind;

    /// Whether several requests can be coalesced into one bulk round-trip
    fn supports_bulk(&self) -> bool {
        false
    }

    /// Convert a raw successful response body into the value bound for action steps.
    fn transform_input(&self, body: JsonValue) -> JsonValue {
        body
    }

    async fn execute(&self, request: &PreparedRequest) -> ConnectorResult<RequestOutcome>;

    /// Execute all requests in one round-trip. Outcomes are returned in request order.
    async fn execute_bulk(&self, requests: &[PreparedRequest]) -> ConnectorResult<Vec<RequestOutcome>> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(self.execute(request).await?);
        }
        Ok(outcomes)
    }

    /// Whether `first_page`/`next_page` can page through list responses
    fn supports_paging(&self) -> bool {
        false
    }

    /// The request for the first page of a paged request.
    fn first_page(&self, request: &PreparedRequest) -> PreparedRequest {
        request.clone()
    }

    /// The request for the page after `response`, or `None` on the last page.
    fn next_page(&self, _request: &PreparedRequest, _response: &JsonValue) -> Option<PreparedRequest> {
        None
    }

    /// Backend-specific expression functions
    fn functions(&self) -> Vec<FunctionDef> {
        Vec::new()
    }
}

/// Request helpers available to a run, by backend name.
#[derive(Debug, Clone, Default)]
pub struct RequestHelpers {
    helpers: IndexMap<String, Arc<dyn RequestHelper>>,
}

impl RequestHelpers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, helper: Arc<dyn RequestHelper>) {
        tracing::debug!(backend = helper.name(), product = %helper.product(), "registered request helper");
        self.helpers.insert(helper.name().to_string(), helper);
    }

    pub fn with(mut self, helper: Arc<dyn RequestHelper>) -> Self {
        self.register(helper);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RequestHelper>> {
        self.helpers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RequestHelper>> {
        self.helpers.values()
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    /// Expression functions of all registered backends.
    pub fn functions(&self) -> Vec<FunctionDef> {
        self.helpers.values().flat_map(|h| h.functions()).collect()
    }
}
