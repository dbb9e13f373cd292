use crate::error::{ActionError, ActionResult};
use crate::model::ActionDocument;
use crate::output::OutputPipeline;
use crate::progress::ProgressReporter;
use fcli_connectors::{RequestHelper, RequestHelpers};
use fcli_core::ResultIndicator;
use fcli_expr::{ExpectedType, Evaluator, Template, ValueTemplate, Variables};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of one `check` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RunState {
    pub records: usize,
    pub failed_items: usize,
    pub checks: Vec<CheckOutcome>,
}

/// Run-wide collaborators, shared by a document and all sub-actions it invokes.
#[derive(Debug)]
pub(crate) struct RunShared {
    pub helpers: RequestHelpers,
    pub evaluator: Evaluator,
    pub progress: Arc<dyn ProgressReporter>,
    pub pipeline: OutputPipeline,
    pub state: Mutex<RunState>,
    pub max_depth: usize,
    pub actions_dir: Option<PathBuf>,
}

/// Per-run context passed by reference to every step.
///
/// The variable scope is not part of the context; it is handed to the step
/// processor separately so that loop bodies can work on child scopes.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    shared: Arc<RunShared>,
    document: Arc<ActionDocument>,
    depth: usize,
}

impl RuntimeContext {
    pub(crate) fn new(shared: Arc<RunShared>, document: Arc<ActionDocument>) -> Self {
        Self {
            shared,
            document,
            depth: 0,
        }
    }

    /// Context for a sub-action: same helpers, evaluator and output, its own document.
    pub fn child(&self, document: ActionDocument) -> ActionResult<Self> {
        let depth = self.depth + 1;
        if depth > self.shared.max_depth {
            return Err(ActionError::configuration(format!(
                "sub-action '{}' exceeds the maximum nesting depth of {}",
                document.name, self.shared.max_depth
            )));
        }
        Ok(Self {
            shared: Arc::clone(&self.shared),
            document: Arc::new(document),
            depth,
        })
    }

    pub fn document(&self) -> &ActionDocument {
        &self.document
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.document.base_dir()
    }

    pub fn actions_dir(&self) -> Option<&Path> {
        self.shared.actions_dir.as_deref()
    }

    pub fn helpers(&self) -> &RequestHelpers {
        &self.shared.helpers
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.shared.evaluator
    }

    pub fn progress(&self) -> &dyn ProgressReporter {
        self.shared.progress.as_ref()
    }

    /// The helper registered for `backend`.
    pub fn request_helper(&self, backend: &str) -> ActionResult<&Arc<dyn RequestHelper>> {
        self.shared.helpers.get(backend).ok_or_else(|| {
            ActionError::configuration(format!(
                "backend '{}' is not configured for this action",
                backend
            ))
        })
    }

    /// Backend a request goes to when it names none.
    pub fn default_target(&self) -> Option<&str> {
        match &self.document.config.default_target {
            Some(target) => Some(target),
            None if self.shared.helpers.len() == 1 => self.shared.helpers.names().next(),
            None => None,
        }
    }

    pub fn eval(&self, template: &Template, vars: &dyn Variables, expected: ExpectedType) -> ActionResult<Value> {
        self.evaluator()
            .evaluate(template, vars, expected)
            .map_err(|e| ActionError::evaluation(template.source(), e))
    }

    pub fn eval_bool(&self, template: &Template, vars: &dyn Variables) -> ActionResult<bool> {
        self.evaluator()
            .evaluate_bool(template, vars)
            .map_err(|e| ActionError::evaluation(template.source(), e))
    }

    pub fn render(&self, template: &Template, vars: &dyn Variables) -> ActionResult<String> {
        self.evaluator()
            .render_text(template, vars)
            .map_err(|e| ActionError::evaluation(template.source(), e))
    }

    pub fn eval_value(&self, template: &ValueTemplate, vars: &dyn Variables) -> ActionResult<Value> {
        self.evaluator()
            .evaluate_value(template, vars)
            .map_err(|e| ActionError::evaluation(describe(template), e))
    }

    pub fn eval_record(&self, template: &ValueTemplate, vars: &dyn Variables) -> ActionResult<Value> {
        self.evaluator()
            .evaluate_record(template, vars)
            .map_err(|e| ActionError::evaluation(describe(template), e))
    }

    /// Forward a record to the output pipeline under one of this document's outputs.
    pub fn emit(
        &self,
        scope: &dyn Variables,
        output: &str,
        record: Value,
        result: Option<ResultIndicator>,
    ) -> ActionResult<()> {
        self.shared.pipeline.emit(
            self.evaluator(),
            &self.document.outputs,
            scope,
            output,
            record,
            result,
        )?;
        self.state().records += 1;
        Ok(())
    }

    pub fn record_failed_item(&self) {
        self.state().failed_items += 1;
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        self.state().checks.push(CheckOutcome {
            name: name.to_string(),
            passed,
        });
    }

    pub(crate) fn state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn describe(template: &ValueTemplate) -> String {
    match template {
        ValueTemplate::Text(t) => t.source().to_string(),
        ValueTemplate::Array(_) => "[...]".to_string(),
        ValueTemplate::Object(_) => "{...}".to_string(),
        _ => "<literal>".to_string(),
    }
}
