use fcli_connectors::ConnectorError;
use fcli_core::CoreError;
use fcli_expr::ExprError;
use thiserror::Error;

pub type ActionResult<T> = Result<T, ActionError>;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Invalid action document '{document}': {message}")]
    Document { document: String, message: String },

    #[error("Evaluation of '{expression}' failed: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: ExprError,
    },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Transport error: {0}")]
    Transport(#[source] ConnectorError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Thrown(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("steps[{index}] ({name}): {source}")]
    Step {
        index: usize,
        name: String,
        #[source]
        source: Box<ActionError>,
    },
}

impl ActionError {
    pub fn document(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Document {
            document: document.into(),
            message: message.into(),
        }
    }

    pub fn evaluation(expression: impl Into<String>, source: ExprError) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            source,
        }
    }

    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn step(index: usize, name: impl Into<String>, source: ActionError) -> Self {
        Self::Step {
            index,
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// The error underneath any step location wrappers.
    pub fn root_cause(&self) -> &ActionError {
        match self {
            ActionError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.root_cause(), ActionError::Transport(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.root_cause(), ActionError::Interrupted)
    }
}

impl From<ConnectorError> for ActionError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::InvalidConfig(msg) => ActionError::Configuration(msg),
            other => ActionError::Transport(other),
        }
    }
}

impl From<ActionError> for CoreError {
    fn from(err: ActionError) -> Self {
        match err.root_cause() {
            ActionError::Document { .. } | ActionError::Configuration(_) => {
                CoreError::Invalid(err.to_string())
            }
            _ => CoreError::Other(err.to_string()),
        }
    }
}
