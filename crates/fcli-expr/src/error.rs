use thiserror::Error;

pub type ExprResult<T> = Result<T, ExprError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error in '{text}' at offset {offset}: {message}")]
    Syntax {
        text: String,
        offset: usize,
        message: String,
    },

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("undefined function '{0}'")]
    UndefinedFunction(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("cannot convert {found} to {expected}")]
    TypeCoercion { expected: String, found: String },

    #[error("{name}: {message}")]
    Function { name: String, message: String },

    #[error("function '{0}' is already registered")]
    DuplicateFunction(String),
}

impl ExprError {
    pub fn syntax(text: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            text: text.into(),
            offset,
            message: message.into(),
        }
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}
