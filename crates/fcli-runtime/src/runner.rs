use crate::context::{CheckOutcome, RunShared, RunState, RuntimeContext};
use crate::error::{ActionError, ActionResult};
use crate::loader;
use crate::model::{ActionDocument, ParamType};
use crate::output::{CollectingSink, OutputPipeline, OutputSink};
use crate::processor::{run_steps, Flow};
use crate::progress::{ProgressReporter, TracingProgress};
use crate::scope::{VariableScope, PARAMS};
use crate::validation::{self, ValidationReport};
use fcli_config::{RunnerConfig, DEFAULT_MAX_SUB_ACTION_DEPTH};
use fcli_connectors::{HttpRequestHelper, RequestHelpers};
use fcli_expr::{coerce, Evaluator, FunctionRegistry};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Exit code when at least one `check` step failed.
pub const EXIT_CHECKS_FAILED: i32 = 100;
/// Exit code for per-item request failures in strict mode.
pub const EXIT_STRICT_FAILURES: i32 = 2;

/// What a completed run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub action: String,
    pub records: usize,
    pub failed_items: usize,
    pub checks: Vec<CheckOutcome>,
    /// Code of an `exit` step, if one ran
    pub exit: Option<i32>,
    pub strict: bool,
}

impl RunSummary {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self.exit {
            code
        } else if self.failed_checks().next().is_some() {
            EXIT_CHECKS_FAILED
        } else if self.strict && self.failed_items > 0 {
            EXIT_STRICT_FAILURES
        } else {
            0
        }
    }
}

/// Request helpers for the given backends, built from the process configuration.
/// Backends without configuration are skipped.
pub fn build_helpers(config: &RunnerConfig, backends: &[&str]) -> ActionResult<RequestHelpers> {
    let mut helpers = RequestHelpers::new();
    for name in backends {
        match config.backend(name) {
            Some(backend) => helpers.register(Arc::new(HttpRequestHelper::from_config(name, backend)?)),
            None => tracing::debug!(backend = %name, "backend not configured"),
        }
    }
    Ok(helpers)
}

/// Function registry for a run: the built-in functions plus the accessors of every helper.
pub fn build_registry(helpers: &RequestHelpers) -> ActionResult<FunctionRegistry> {
    let mut registry =
        FunctionRegistry::builtin().map_err(|e| ActionError::configuration(e.to_string()))?;
    registry
        .register_all(helpers.functions())
        .map_err(|e| ActionError::configuration(e.to_string()))?;
    Ok(registry)
}

/// Resolve provided values against the declared parameters.
///
/// Strings given for array parameters are split on commas, strings given for
/// object parameters are parsed as JSON. Defaults may refer to parameters
/// declared before them.
pub fn bind_parameters(
    document: &ActionDocument,
    mut provided: Map<String, Value>,
    evaluator: &Evaluator,
) -> ActionResult<Map<String, Value>> {
    if let Some(unknown) = provided.keys().find(|k| document.parameter(k).is_none()) {
        return Err(ActionError::configuration(format!(
            "unknown parameter '{}' for action '{}'",
            unknown, document.name
        )));
    }

    let mut params = Map::new();
    for parameter in &document.parameters {
        let value = match provided.remove(&parameter.name) {
            Some(value) => Some(value),
            None => match &parameter.default_value {
                Some(default) => {
                    let mut vars = Map::new();
                    vars.insert(PARAMS.to_string(), Value::Object(params.clone()));
                    let value = evaluator
                        .evaluate_value(default, &vars)
                        .map_err(|e| ActionError::evaluation(format!("parameters.{}.defaultValue", parameter.name), e))?;
                    Some(value)
                }
                None => None,
            },
        };

        let value = match value {
            Some(Value::Null) | None if parameter.required => {
                return Err(ActionError::configuration(format!(
                    "missing required parameter '{}' for action '{}'",
                    parameter.name, document.name
                )))
            }
            Some(Value::Null) | None => Value::Null,
            Some(value) => convert(parameter.kind, value).map_err(|e| {
                ActionError::configuration(format!("invalid value for parameter '{}': {}", parameter.name, e))
            })?,
        };
        params.insert(parameter.name.clone(), value);
    }
    Ok(params)
}

fn convert(kind: ParamType, value: Value) -> Result<Value, String> {
    let value = match (kind, value) {
        (ParamType::Array, Value::String(text)) => Value::Array(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        (ParamType::Object, Value::String(text)) => {
            serde_json::from_str(&text).map_err(|e| format!("not a JSON object: {}", e))?
        }
        (_, value) => value,
    };
    coerce(value, kind.expected()).map_err(|e| e.to_string())
}

/// Runs action documents against a fixed set of request helpers.
#[derive(Debug, Clone)]
pub struct ActionRunner {
    helpers: RequestHelpers,
    registry: Arc<FunctionRegistry>,
    progress: Arc<dyn ProgressReporter>,
    sink: Arc<dyn OutputSink>,
    strict: bool,
    max_depth: usize,
    actions_dir: Option<PathBuf>,
}

impl ActionRunner {
    pub fn new(helpers: RequestHelpers) -> ActionResult<Self> {
        let registry = build_registry(&helpers)?;
        Ok(Self {
            helpers,
            registry: Arc::new(registry),
            progress: Arc::new(TracingProgress),
            sink: Arc::new(CollectingSink::new()),
            strict: false,
            max_depth: DEFAULT_MAX_SUB_ACTION_DEPTH,
            actions_dir: None,
        })
    }

    /// Runner for the given backends of a configuration, honouring its
    /// strictness, nesting limit and actions directory.
    pub fn from_config(config: &RunnerConfig, backends: &[&str]) -> ActionResult<Self> {
        let runner = Self::new(build_helpers(config, backends)?)?
            .with_strict(config.strict)
            .with_max_depth(config.max_sub_action_depth);
        Ok(match &config.actions_dir {
            Some(dir) => runner.with_actions_dir(dir.clone()),
            None => runner,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_actions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.actions_dir = Some(dir.into());
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn helpers(&self) -> &RequestHelpers {
        &self.helpers
    }

    /// Load an action given as a file path or a name inside the actions directory.
    pub fn load(&self, reference: &str) -> ActionResult<ActionDocument> {
        let path = loader::resolve_reference(reference, None, self.actions_dir.as_deref())?;
        loader::load_file(path)
    }

    pub fn validate(&self, document: &ActionDocument) -> ValidationReport {
        validation::validate(document, &self.registry, &self.helpers)
    }

    /// Validate and run a document to completion.
    pub async fn run(&self, document: &ActionDocument, params: Map<String, Value>) -> ActionResult<RunSummary> {
        self.validate(document).into_result()?;
        let evaluator = Evaluator::new(Arc::clone(&self.registry));
        let params = bind_parameters(document, params, &evaluator)?;
        let strict = self.strict || document.config.strict;

        let shared = Arc::new(RunShared {
            helpers: self.helpers.clone(),
            evaluator,
            progress: Arc::clone(&self.progress),
            pipeline: OutputPipeline::new(Arc::clone(&self.sink)),
            state: Mutex::new(RunState::default()),
            max_depth: self.max_depth,
            actions_dir: self.actions_dir.clone(),
        });
        let ctx = RuntimeContext::new(Arc::clone(&shared), Arc::new(document.clone()));
        let mut scope = VariableScope::with_params(params);

        let start = Instant::now();
        tracing::info!(action = %document.name, steps = document.steps.len(), strict, "starting action");
        let result = run_steps(&ctx, &document.steps, &mut scope).await;
        let finished = shared.pipeline.finish();

        let flow = match result {
            Ok(flow) => flow,
            Err(err) => {
                tracing::error!(action = %document.name, error = %err, "action failed");
                return Err(err);
            }
        };
        finished?;

        let state = ctx.state();
        let summary = RunSummary {
            action: document.name.clone(),
            records: state.records,
            failed_items: state.failed_items,
            checks: state.checks.clone(),
            exit: match flow {
                Flow::Exit(code) => Some(code),
                Flow::Continue => None,
            },
            strict,
        };
        tracing::info!(
            action = %document.name,
            records = summary.records,
            failed_items = summary.failed_items,
            duration_ms = start.elapsed().as_millis() as u64,
            "action completed"
        );
        Ok(summary)
    }

    /// Like [`ActionRunner::run`], abandoning the run (and any in-flight request)
    /// as soon as `interrupt` completes.
    pub async fn run_until<F>(
        &self,
        document: &ActionDocument,
        params: Map<String, Value>,
        interrupt: F,
    ) -> ActionResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = interrupt => {
                tracing::warn!(action = %document.name, "interrupted");
                Err(ActionError::Interrupted)
            }
            result = self.run(document, params) => result,
        }
    }
}
