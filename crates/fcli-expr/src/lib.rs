//! Template and expression language used by action documents.
//!
//! Templates mix literal text with `${ expr }` fragments. They are parsed once when a
//! document is loaded and evaluated many times against different variable scopes.

pub mod ast;
pub mod coerce;
pub mod error;
pub mod eval;
pub mod functions;
pub mod lexer;
mod methods;
pub mod parser;
pub mod template;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use coerce::{as_bool, coerce, render, type_name, unescape, ExpectedType};
pub use error::{ExprError, ExprResult};
pub use eval::{Evaluator, Variables, WithBinding};
pub use functions::{builtin_functions, FunctionCategory, FunctionDef, FunctionRegistry};
pub use parser::parse_expression;
pub use template::{Segment, Template, ValueTemplate};
