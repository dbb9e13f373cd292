//! Error types for the CLI

use fcli_runtime::ActionError;
use thiserror::Error;

/// Exit code for fatal errors.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code after SIGINT.
pub const EXIT_INTERRUPTED: i32 = 130;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] fcli_config::ConfigError),

    #[error("{0}")]
    Action(#[from] ActionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("General error: {0}")]
    General(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Action(err) if err.is_interrupted() => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_runs_exit_130() {
        assert_eq!(CliError::from(ActionError::Interrupted).exit_code(), 130);
        let step = ActionError::step(2, "fetch", ActionError::Interrupted);
        assert_eq!(CliError::from(step).exit_code(), 130);
        assert_eq!(CliError::InvalidArgument("x".into()).exit_code(), 1);
        assert_eq!(CliError::from(ActionError::Thrown("no".into())).exit_code(), 1);
    }
}
