use super::bulk::{parse_bulk_response, BulkRequestBuilder};
use super::client::{build_client, send_with_timeout};
use super::paging::PageScheme;
use super::request::{parse_body, PreparedRequest, RequestFailure, RequestOutcome};
use super::url_builder::UrlBuilder;
use crate::error::{ConnectorError, ConnectorResult};
use crate::helper::RequestHelper;
use crate::product::{product_functions, ProductUrls};
use async_trait::async_trait;
use fcli_config::BackendConfig;
use fcli_core::{create_debug_string, sanitize_header_value, sanitize_url, ProductKind};
use fcli_expr::FunctionDef;
use indexmap::IndexMap;
use reqwest::{Client, Method};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::time::{Duration, Instant};
use url::Url;

/// [`RequestHelper`] speaking JSON over HTTP to one configured backend.
#[derive(Debug, Clone)]
pub struct HttpRequestHelper {
    name: String,
    product: ProductKind,
    urls: ProductUrls,
    authorization: Option<String>,
    headers: IndexMap<String, String>,
    bulk: bool,
    bulk_path: String,
    unwrap: Option<String>,
    paging: Option<PageScheme>,
    read_timeout: Duration,
    client: Client,
}

impl HttpRequestHelper {
    pub fn from_config(name: &str, config: &BackendConfig) -> ConnectorResult<Self> {
        config
            .validate(name)
            .map_err(|e| ConnectorError::InvalidConfig(e.to_string()))?;
        let product = config.product_for(name);
        let authorization = config
            .token
            .as_ref()
            .map(|token| format!("{} {}", config.auth_scheme_for(product), token));
        Ok(Self {
            name: name.to_string(),
            product,
            urls: ProductUrls::new(product, &config.base_url, config.browser_url.as_deref()),
            authorization,
            headers: config.headers.clone(),
            bulk: config.supports_bulk(product),
            bulk_path: config.bulk_path().to_string(),
            unwrap: config.unwrap_field(product),
            paging: PageScheme::for_product(product),
            read_timeout: config.read_timeout(),
            client: build_client(config)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn browser_url(&self) -> &str {
        &self.urls.browser_url
    }

    fn request_url(&self, request: &PreparedRequest) -> ConnectorResult<Url> {
        UrlBuilder::join_with_query(&self.urls.base_url, &request.uri, &request.query)
    }

    fn method(name: &str) -> ConnectorResult<Method> {
        Method::from_str(name)
            .map_err(|_| ConnectorError::InvalidConfig(format!("Invalid HTTP method: {}", name)))
    }

    fn build(&self, method: Method, url: Url, body: Option<&JsonValue>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(authorization) = &self.authorization {
            builder = builder.header("Authorization", authorization);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    /// Extra headers sent with every request, credentials masked.
    fn header_summary(&self) -> String {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(self.authorization.as_deref().map(|a| ("Authorization", a)))
            .map(|(k, v)| format!("{}: {}", k, sanitize_header_value(k, v)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl RequestHelper for HttpRequestHelper {
    fn name(&self) -> &str {
        &self.name
    }

    fn product(&self) -> ProductKind {
        self.product
    }

    fn supports_bulk(&self) -> bool {
        self.bulk
    }

    fn transform_input(&self, body: JsonValue) -> JsonValue {
        match (&self.unwrap, body) {
            (Some(field), JsonValue::Object(mut map)) if map.contains_key(field) => {
                map.remove(field).unwrap_or(JsonValue::Null)
            }
            (_, body) => body,
        }
    }

    async fn execute(&self, request: &PreparedRequest) -> ConnectorResult<RequestOutcome> {
        let method = Self::method(&request.method)?;
        let url = self.request_url(request)?;
        let start = Instant::now();
        tracing::debug!(
            backend = %self.name,
            method = %method,
            url = %sanitize_url(url.as_str()),
            headers = %self.header_summary(),
            "sending request"
        );

        let builder = self.build(method.clone(), url.clone(), request.body.as_ref());
        let (status, text) = send_with_timeout(builder, self.read_timeout).await?;
        let body = parse_body(&text);

        tracing::debug!(
            backend = %self.name,
            method = %method,
            url = %sanitize_url(url.as_str()),
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            body = %create_debug_string("response", &body),
            "received response"
        );

        if status.is_success() {
            Ok(Ok(body))
        } else {
            Ok(Err(RequestFailure::from_status(
                status.as_u16(),
                status.canonical_reason(),
                body,
            )))
        }
    }

    async fn execute_bulk(&self, requests: &[PreparedRequest]) -> ConnectorResult<Vec<RequestOutcome>> {
        if !self.bulk {
            return Err(ConnectorError::InvalidConfig(format!(
                "Backend '{}' does not support bulk requests",
                self.name
            )));
        }
        let mut builder = BulkRequestBuilder::new();
        for request in requests {
            let method = Self::method(&request.method)?;
            let url = self.request_url(request)?;
            builder.request(method.as_str(), &url, request.body.as_ref());
        }
        let count = builder.len();
        let bulk_url = UrlBuilder::join(&self.urls.base_url, &self.bulk_path)?;
        let start = Instant::now();
        tracing::debug!(backend = %self.name, count, url = %bulk_url, "sending bulk request");

        let http = self.build(Method::POST, bulk_url, Some(&builder.build()));
        let (status, text) = send_with_timeout(http, self.read_timeout).await?;
        let body = parse_body(&text);
        if !status.is_success() {
            let failure = RequestFailure::from_status(status.as_u16(), status.canonical_reason(), body);
            return Err(ConnectorError::Bulk(failure.to_string()));
        }

        let outcomes = parse_bulk_response(&body, count);
        tracing::debug!(
            backend = %self.name,
            count,
            failed = outcomes.iter().filter(|o| o.is_err()).count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "bulk request completed"
        );
        Ok(outcomes)
    }

    fn supports_paging(&self) -> bool {
        self.paging.is_some()
    }

    fn first_page(&self, request: &PreparedRequest) -> PreparedRequest {
        match &self.paging {
            Some(scheme) => scheme.first_page(request),
            None => request.clone(),
        }
    }

    fn next_page(&self, request: &PreparedRequest, response: &JsonValue) -> Option<PreparedRequest> {
        self.paging.as_ref()?.next_page(request, response)
    }

    fn functions(&self) -> Vec<FunctionDef> {
        product_functions(&self.name, self.product, &self.urls)
    }
}
