use crate::env_resolver::EnvResolverError;
use fcli_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Environment resolution error: {0}")]
    Env(#[from] EnvResolverError),

    #[error("Invalid backend '{name}': {message}")]
    InvalidBackend { name: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

impl ConfigError {
    pub fn invalid_backend(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidBackend {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => CoreError::Io(e.to_string()),
            ConfigError::Yaml(e) => CoreError::Serde(e.to_string()),
            ConfigError::Json(e) => CoreError::Serde(e.to_string()),
            other => CoreError::Invalid(other.to_string()),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
