use fcli_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Bulk request failed: {0}")]
    Bulk(String),
}

impl From<ConnectorError> for CoreError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Serialization(e) => CoreError::Serde(e.to_string()),
            ConnectorError::InvalidConfig(msg) => CoreError::Invalid(msg),
            other => CoreError::Other(other.to_string()),
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
