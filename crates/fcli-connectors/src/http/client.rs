//! reqwest client construction and timeout handling

use crate::error::{ConnectorError, ConnectorResult};
use fcli_config::BackendConfig;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::time::timeout;

/// Build the client shared by all requests to one backend.
pub fn build_client(config: &BackendConfig) -> ConnectorResult<Client> {
    let connect = config.connect_timeout();
    if connect.is_zero() {
        return Err(ConnectorError::InvalidConfig(
            "Connect timeout must be greater than 0".to_string(),
        ));
    }
    if !config.verify_tls {
        tracing::warn!(base_url = %config.base_url, "TLS certificate verification disabled");
    }
    let client = Client::builder()
        .connect_timeout(connect)
        .danger_accept_invalid_certs(!config.verify_tls)
        .build()?;
    Ok(client)
}

/// Send a request and read its body, bounding the whole exchange by `read_timeout`
/// and classifying transport errors.
pub async fn send_with_timeout(
    builder: RequestBuilder,
    read_timeout: Duration,
) -> ConnectorResult<(StatusCode, String)> {
    let exchange = async {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok::<_, reqwest::Error>((status, text))
    };
    match timeout(read_timeout, exchange).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(classify(err, read_timeout)),
        Err(_) => Err(timed_out(read_timeout)),
    }
}

fn timed_out(read_timeout: Duration) -> ConnectorError {
    ConnectorError::Timeout(format!(
        "Request timed out after {}ms",
        read_timeout.as_millis()
    ))
}

fn classify(err: reqwest::Error, read_timeout: Duration) -> ConnectorError {
    if err.is_timeout() {
        timed_out(read_timeout)
    } else if err.is_connect() {
        ConnectorError::Connection(format!("Connection failed: {}", err))
    } else {
        ConnectorError::Http(err)
    }
}
