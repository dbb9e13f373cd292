//! Action execution engine: document model, validation, step processing,
//! request dispatch and output.

pub mod context;
mod dispatcher;
pub mod error;
pub mod loader;
pub mod model;
pub mod output;
pub mod processor;
pub mod progress;
pub mod runner;
mod schema;
pub mod scope;
pub mod validation;

pub use context::{CheckOutcome, RuntimeContext};
pub use error::{ActionError, ActionResult};
pub use loader::{load_file, parse_str, resolve_reference};
pub use model::{
    ActionConfig, ActionDocument, CheckCondition, EmbedRequest, Expansion, ForEachStep, LogLevel,
    PageProgress, ParamType, Parameter, RecordsForEach, RequestStep, Step, StepKind, VariablePath,
};
pub use output::{CollectingSink, OutputPipeline, OutputRecord, OutputSink};
pub use processor::{run_steps, Flow};
pub use progress::{ProgressReporter, TracingProgress};
pub use runner::{
    bind_parameters, build_helpers, build_registry, ActionRunner, RunSummary, EXIT_CHECKS_FAILED,
    EXIT_STRICT_FAILURES,
};
pub use scope::VariableScope;
pub use validation::{validate, ValidationReport};
