//! Step processor: walks a step list in document order.

use crate::context::RuntimeContext;
use crate::dispatcher::dispatch;
use crate::error::{ActionError, ActionResult};
use crate::loader;
use crate::model::{CheckCondition, ForEachStep, LogLevel, Step, StepKind, VariablePath};
use crate::runner::bind_parameters;
use crate::scope::VariableScope;
use crate::validation;
use fcli_core::ResultIndicator;
use fcli_expr::{coerce, ExpectedType, ExprError, Template, ValueTemplate, Variables, WithBinding};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Variable `check` steps record their status under.
pub const CHECK_STATUS: &str = "check_status";

/// How a step list finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// An `exit` step ran; the whole run stops with this code.
    Exit(i32),
}

/// Run `steps` against `scope`. Failures are wrapped with the failing step's
/// position unless that step is marked `continue_on_error`.
pub fn run_steps<'a>(
    ctx: &'a RuntimeContext,
    steps: &'a [Step],
    scope: &'a mut VariableScope,
) -> BoxFuture<'a, ActionResult<Flow>> {
    async move {
        for (index, step) in steps.iter().enumerate() {
            match run_step(ctx, step, scope).await {
                Ok(Flow::Continue) => {}
                Ok(flow) => return Ok(flow),
                Err(err) if step.continue_on_error => {
                    tracing::warn!(step = index, name = step.label(), error = %err, "step failed, continuing");
                    ctx.progress().warn(&format!("{} failed: {}", step.label(), err));
                }
                Err(err) => return Err(ActionError::step(index, step.label(), err)),
            }
        }
        Ok(Flow::Continue)
    }
    .boxed()
}

async fn run_step(ctx: &RuntimeContext, step: &Step, scope: &mut VariableScope) -> ActionResult<Flow> {
    if let Some(condition) = &step.condition {
        if !ctx.eval_bool(condition, &*scope)? {
            tracing::debug!(name = step.label(), "step skipped");
            return Ok(Flow::Continue);
        }
    }
    tracing::debug!(name = step.label(), kind = step.kind.type_name(), depth = ctx.depth(), "running step");

    match &step.kind {
        StepKind::Request(request) => dispatch(ctx, step, request, scope).await,
        StepKind::SetVariable { name, value } => {
            let value = ctx.eval_value(value, &*scope)?;
            scope.set(name, value)?;
            Ok(Flow::Continue)
        }
        StepKind::RemoveVariable { name } => {
            scope.remove(name)?;
            Ok(Flow::Continue)
        }
        StepKind::Conditional {
            condition,
            steps,
            otherwise,
        } => {
            if ctx.eval_bool(condition, &*scope)? {
                run_steps(ctx, steps, scope).await
            } else {
                run_steps(ctx, otherwise, scope).await
            }
        }
        StepKind::ForEach(for_each) => run_for_each(ctx, for_each, scope).await,
        StepKind::WriteOutput {
            output,
            record,
            result,
        } => {
            let record = ctx.eval_record(record, &*scope)?;
            let result = match result {
                Some(template) => Some(ResultIndicator::new(ctx.render(template, &*scope)?)),
                None => None,
            };
            ctx.emit(&*scope, output, record, result)?;
            Ok(Flow::Continue)
        }
        StepKind::InvokeSubAction { action, parameters } => {
            invoke_sub_action(ctx, action, parameters, scope).await
        }
        StepKind::Log { level, message } => {
            let message = ctx.render(message, &*scope)?;
            match level {
                LogLevel::Progress => ctx.progress().progress(&message),
                LogLevel::Warn => ctx.progress().warn(&message),
                LogLevel::Info => tracing::info!(action = %ctx.document().name, "{}", message),
                LogLevel::Debug => tracing::debug!(action = %ctx.document().name, "{}", message),
            }
            Ok(Flow::Continue)
        }
        StepKind::Check {
            display_name,
            condition,
        } => {
            let passed = match condition {
                CheckCondition::PassIf(t) => ctx.eval_bool(t, &*scope)?,
                CheckCondition::FailIf(t) => !ctx.eval_bool(t, &*scope)?,
            };
            let name = display_name.as_deref().unwrap_or_else(|| step.label());
            let status = if passed { "PASS" } else { "FAIL" };
            scope.set(&VariablePath::property(CHECK_STATUS, name), Value::String(status.to_string()))?;
            ctx.record_check(name, passed);
            ctx.progress().progress(&format!("{}: {}", status, name));
            Ok(Flow::Continue)
        }
        StepKind::Throw { message } => Err(ActionError::Thrown(ctx.render(message, &*scope)?)),
        StepKind::Exit { code } => {
            let value = ctx.eval(code, &*scope, ExpectedType::Integer)?;
            let exit_code = value
                .as_i64()
                .and_then(|c| i32::try_from(c).ok())
                .ok_or_else(|| {
                    ActionError::evaluation(
                        code.source(),
                        ExprError::evaluation(format!("exit code {} is out of range", value)),
                    )
                })?;
            tracing::debug!(code = exit_code, "exit step");
            Ok(Flow::Exit(exit_code))
        }
    }
}

async fn run_for_each(ctx: &RuntimeContext, for_each: &ForEachStep, scope: &mut VariableScope) -> ActionResult<Flow> {
    let items = ctx.eval_value(&for_each.items, &*scope)?;
    let items = match coerce(items, ExpectedType::Array).map_err(|e| ActionError::evaluation("items", e))? {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    tracing::debug!(count = items.len(), item = %for_each.item_var, "iterating");

    for item in items {
        if let Some(break_if) = &for_each.break_if {
            let vars = WithBinding::new(&*scope, &for_each.item_var, &item);
            if ctx.eval_bool(break_if, &vars)? {
                break;
            }
        }
        let mut child = scope.child();
        child.bind(&for_each.item_var, item)?;
        let flow = run_steps(ctx, &for_each.steps, &mut child).await?;
        if let Some(accumulate) = &for_each.accumulate {
            match child.get(accumulate) {
                Some(value) => scope.bind(accumulate, value.clone())?,
                None => {
                    scope.remove(accumulate)?;
                }
            }
        }
        if let Flow::Exit(_) = flow {
            return Ok(flow);
        }
    }
    Ok(Flow::Continue)
}

async fn invoke_sub_action(
    ctx: &RuntimeContext,
    action: &Template,
    parameters: &IndexMap<String, ValueTemplate>,
    scope: &mut VariableScope,
) -> ActionResult<Flow> {
    let reference = ctx.render(action, &*scope)?;
    let path = loader::resolve_reference(&reference, ctx.base_dir(), ctx.actions_dir())?;
    let document = loader::load_file(&path)?;

    let mut provided = Map::new();
    for (name, template) in parameters {
        provided.insert(name.clone(), ctx.eval_value(template, &*scope)?);
    }

    validation::validate(&document, ctx.evaluator().registry(), ctx.helpers()).into_result()?;
    let child_ctx = ctx.child(document)?;
    let params = bind_parameters(child_ctx.document(), provided, ctx.evaluator())?;
    tracing::debug!(action = %child_ctx.document().name, depth = child_ctx.depth(), "invoking sub-action");

    let mut child_scope = VariableScope::with_params(params);
    run_steps(&child_ctx, &child_ctx.document().steps, &mut child_scope).await
}
