//! Request dispatch: evaluates request descriptors, sends them singly, in bulk,
//! one after another or page by page, and hands every outcome to the step's
//! continuation.

use crate::context::RuntimeContext;
use crate::error::{ActionError, ActionResult};
use crate::model::{RecordsForEach, RequestStep, Step};
use crate::processor::{run_steps, Flow};
use crate::scope::VariableScope;
use fcli_connectors::{PreparedRequest, RequestFailure, RequestHelper, RequestOutcome};
use fcli_core::ResultIndicator;
use fcli_expr::{coerce, render, type_name, ExpectedType, Template, Variables, WithBinding};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Execute one `request` step against `scope`.
pub(crate) async fn dispatch(
    ctx: &RuntimeContext,
    step: &Step,
    request: &RequestStep,
    scope: &mut VariableScope,
) -> ActionResult<Flow> {
    let target = request
        .target
        .as_deref()
        .or_else(|| ctx.default_target())
        .ok_or_else(|| ActionError::configuration("request step has no target and the action has no default_target"))?;
    let helper = Arc::clone(ctx.request_helper(target)?);

    match &request.expansion {
        None if request.paged => {
            let prepared = prepare(ctx, request, &*scope)?;
            dispatch_paged(ctx, step, request, helper.as_ref(), prepared, scope).await
        }
        None => {
            let prepared = prepare(ctx, request, &*scope)?;
            let outcome = send_single(helper.as_ref(), &prepared, step.continue_on_error).await?;
            complete_single(ctx, step, request, helper.as_ref(), outcome, scope).await
        }
        Some(expansion) => {
            let items = ctx.eval_value(&expansion.items, &*scope)?;
            let items = match coerce(items, ExpectedType::Array)
                .map_err(|e| ActionError::evaluation("for_each.items", e))?
            {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            let prepared = items
                .iter()
                .map(|item| prepare(ctx, request, &WithBinding::new(&*scope, &expansion.item_var, item)))
                .collect::<ActionResult<Vec<_>>>()?;

            let start = Instant::now();
            let outcomes = send_all(helper.as_ref(), &prepared, step.continue_on_error).await?;
            tracing::debug!(
                target_backend = helper.name(),
                count = prepared.len(),
                failed = outcomes.iter().filter(|o| o.is_err()).count(),
                duration_ms = start.elapsed().as_millis() as u64,
                "expanded request completed"
            );
            complete_expanded(ctx, request, &expansion.item_var, helper.as_ref(), items, outcomes, scope).await
        }
    }
}

/// Load pages one after another. Each page runs the continuations before the next
/// one is requested; a failed page ends the paging.
async fn dispatch_paged(
    ctx: &RuntimeContext,
    step: &Step,
    request: &RequestStep,
    helper: &dyn RequestHelper,
    prepared: PreparedRequest,
    scope: &mut VariableScope,
) -> ActionResult<Flow> {
    if !helper.supports_paging() {
        return Err(ActionError::configuration(format!(
            "backend '{}' does not support paged requests",
            helper.name()
        )));
    }
    let progress = &request.page_progress;
    let mut page_request = helper.first_page(&prepared);
    for page in 1u64.. {
        log_page(ctx, progress.pre_load.as_ref(), &*scope)?;
        let outcome = send_single(helper, &page_request, step.continue_on_error).await?;
        let loaded = outcome.is_ok();
        let next = match &outcome {
            Ok(raw) => helper.next_page(&page_request, raw),
            Err(_) => None,
        };
        tracing::debug!(target_backend = helper.name(), page, loaded, last = next.is_none(), "page loaded");
        if loaded {
            log_page(ctx, progress.post_load.as_ref(), &*scope)?;
        }

        let flow = complete_single(ctx, step, request, helper, outcome, scope).await?;
        if loaded {
            log_page(ctx, progress.post_process.as_ref(), &*scope)?;
        }
        match (flow, next) {
            (Flow::Exit(code), _) => return Ok(Flow::Exit(code)),
            (Flow::Continue, Some(next)) => page_request = next,
            (Flow::Continue, None) => break,
        }
    }
    Ok(Flow::Continue)
}

fn log_page(ctx: &RuntimeContext, template: Option<&Template>, vars: &dyn Variables) -> ActionResult<()> {
    if let Some(template) = template {
        ctx.progress().progress(&ctx.render(template, vars)?);
    }
    Ok(())
}

/// Evaluate uri, query and body against the scope as it is right now.
fn prepare(ctx: &RuntimeContext, request: &RequestStep, vars: &dyn Variables) -> ActionResult<PreparedRequest> {
    let uri = render(&ctx.eval(&request.uri, vars, ExpectedType::String)?);
    let mut prepared = PreparedRequest::new(&request.method, uri);
    for (key, template) in &request.query {
        let value = ctx.eval(template, vars, ExpectedType::Any)?;
        if !value.is_null() {
            prepared = prepared.with_query(key, render(&value));
        }
    }
    if let Some(body) = &request.body {
        prepared = prepared.with_body(ctx.eval_value(body, vars)?);
    }
    Ok(prepared)
}

fn transport_failure(err: &ActionError) -> RequestFailure {
    RequestFailure::new(None, err.to_string(), Value::Null)
}

async fn send_single(
    helper: &dyn RequestHelper,
    request: &PreparedRequest,
    continue_on_error: bool,
) -> ActionResult<RequestOutcome> {
    match helper.execute(request).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let err = ActionError::from(err);
            if continue_on_error && err.is_transport() {
                tracing::warn!(target_backend = helper.name(), uri = %request.uri, error = %err, "transport failure tolerated");
                Ok(Err(transport_failure(&err)))
            } else {
                Err(err)
            }
        }
    }
}

/// One outcome per request, in request order.
async fn send_all(
    helper: &dyn RequestHelper,
    requests: &[PreparedRequest],
    continue_on_error: bool,
) -> ActionResult<Vec<RequestOutcome>> {
    match requests.len() {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![send_single(helper, &requests[0], continue_on_error).await?]),
        _ => {}
    }

    if helper.supports_bulk() {
        tracing::debug!(target_backend = helper.name(), count = requests.len(), "coalescing requests into bulk request");
        return match helper.execute_bulk(requests).await {
            Ok(outcomes) => Ok(outcomes),
            Err(err) => {
                let err = ActionError::from(err);
                if continue_on_error && err.is_transport() {
                    tracing::warn!(target_backend = helper.name(), error = %err, "bulk transport failure tolerated");
                    Ok(requests.iter().map(|_| Err(transport_failure(&err))).collect())
                } else {
                    Err(err)
                }
            }
        };
    }

    let mut outcomes = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        match helper.execute(request).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                let err = ActionError::from(err);
                if !(continue_on_error && err.is_transport()) {
                    return Err(err);
                }
                // the failed request and everything not yet sent
                tracing::warn!(
                    target_backend = helper.name(),
                    failed = requests.len() - index,
                    error = %err,
                    "transport failure tolerated"
                );
                let failure = transport_failure(&err);
                outcomes.extend(requests[index..].iter().map(|_| Err(failure.clone())));
                break;
            }
        }
    }
    Ok(outcomes)
}

fn bind_success(
    scope: &mut VariableScope,
    bind: Option<&str>,
    raw: Value,
    value: Value,
) -> ActionResult<()> {
    if let Some(bind) = bind {
        scope.bind(bind, value)?;
        scope.bind(&format!("{}_raw", bind), raw)?;
    }
    Ok(())
}

fn bind_failure(scope: &mut VariableScope, bind: Option<&str>, failure: &RequestFailure) -> ActionResult<()> {
    if let Some(bind) = bind {
        scope.bind(&format!("{}_error", bind), failure.to_value())?;
    }
    Ok(())
}

async fn complete_single(
    ctx: &RuntimeContext,
    step: &Step,
    request: &RequestStep,
    helper: &dyn RequestHelper,
    outcome: RequestOutcome,
    scope: &mut VariableScope,
) -> ActionResult<Flow> {
    let bind = request.bind.as_deref();
    match outcome {
        Ok(raw) => {
            let value = helper.transform_input(raw.clone());
            bind_success(scope, bind, raw, value.clone())?;
            if let Some(output) = &request.output {
                ctx.emit(scope, output, value.clone(), Some(ResultIndicator::success()))?;
            }
            let flow = run_steps(ctx, &request.on_success, scope).await?;
            match (&flow, &request.records) {
                (Flow::Continue, Some(records)) => process_records(ctx, step, request, records, value, scope).await,
                _ => Ok(flow),
            }
        }
        Err(failure) => {
            bind_failure(scope, bind, &failure)?;
            if let Some(output) = &request.output {
                let record = json!({"item": Value::Null, "error": failure.to_value()});
                ctx.emit(scope, output, record, Some(ResultIndicator::failed()))?;
            }
            if !request.on_fail.is_empty() {
                return run_steps(ctx, &request.on_fail, scope).await;
            }
            if request.output.is_some() || step.continue_on_error {
                ctx.record_failed_item();
                ctx.progress().warn(&format!("{}: {}", step.label(), failure));
                return Ok(Flow::Continue);
            }
            Err(ActionError::request(failure.to_string()))
        }
    }
}

async fn complete_expanded(
    ctx: &RuntimeContext,
    request: &RequestStep,
    item_var: &str,
    helper: &dyn RequestHelper,
    items: Vec<Value>,
    outcomes: Vec<RequestOutcome>,
    scope: &mut VariableScope,
) -> ActionResult<Flow> {
    let bind = request.bind.as_deref();
    let mut results = Vec::with_capacity(items.len());

    for (item, outcome) in items.into_iter().zip(outcomes) {
        let mut child = scope.child();
        child.bind(item_var, item.clone())?;
        let flow = match outcome {
            Ok(raw) => {
                let value = helper.transform_input(raw.clone());
                results.push(value.clone());
                bind_success(&mut child, bind, raw, value.clone())?;
                if let Some(output) = &request.output {
                    ctx.emit(&child, output, value, Some(ResultIndicator::success()))?;
                }
                run_steps(ctx, &request.on_success, &mut child).await?
            }
            Err(failure) => {
                results.push(Value::Null);
                bind_failure(&mut child, bind, &failure)?;
                if let Some(output) = &request.output {
                    let record = json!({"item": item, "error": failure.to_value()});
                    ctx.emit(&child, output, record, Some(ResultIndicator::failed()))?;
                }
                if request.on_fail.is_empty() {
                    ctx.record_failed_item();
                    ctx.progress().warn(&format!("request for {} failed: {}", render(&item), failure));
                    Flow::Continue
                } else {
                    run_steps(ctx, &request.on_fail, &mut child).await?
                }
            }
        };
        if let Flow::Exit(_) = flow {
            return Ok(flow);
        }
    }

    if let Some(bind) = bind {
        scope.bind(bind, Value::Array(results))?;
    }
    Ok(Flow::Continue)
}

/// Walk the records of an array response: count them, embed sub-request data and
/// run the record steps for each selected record in its own scope.
async fn process_records(
    ctx: &RuntimeContext,
    step: &Step,
    request: &RequestStep,
    records: &RecordsForEach,
    value: Value,
    scope: &mut VariableScope,
) -> ActionResult<Flow> {
    let mut items = match value {
        Value::Array(items) => items,
        Value::Null => return Ok(Flow::Continue),
        other => {
            return Err(ActionError::request(format!(
                "records of '{}' can only be processed for an array response, found {}",
                step.label(),
                type_name(&other)
            )))
        }
    };

    let total_var = records.total_count_var();
    let total = scope.get(&total_var).and_then(Value::as_u64).unwrap_or(0) + items.len() as u64;
    scope.bind(&total_var, Value::from(total))?;

    if !records.embed.is_empty() {
        embed_records(ctx, step, request, records, &mut items, scope).await?;
    }

    for record in items {
        if stop_records(ctx, records, &record, &*scope)? {
            break;
        }
        if !select_record(ctx, records, &record, &*scope)? {
            continue;
        }
        let mut child = scope.child();
        child.bind(&records.record_var, record)?;
        if let Flow::Exit(code) = run_steps(ctx, &records.steps, &mut child).await? {
            return Ok(Flow::Exit(code));
        }
    }
    Ok(Flow::Continue)
}

fn stop_records(ctx: &RuntimeContext, records: &RecordsForEach, record: &Value, scope: &dyn Variables) -> ActionResult<bool> {
    match &records.break_if {
        Some(break_if) => ctx.eval_bool(break_if, &WithBinding::new(scope, &records.record_var, record)),
        None => Ok(false),
    }
}

fn select_record(ctx: &RuntimeContext, records: &RecordsForEach, record: &Value, scope: &dyn Variables) -> ActionResult<bool> {
    match &records.condition {
        Some(condition) => ctx.eval_bool(condition, &WithBinding::new(scope, &records.record_var, record)),
        None => Ok(true),
    }
}

/// Send the embedded requests of all selected records together, one batch per
/// backend, and store each processed response on its record under the embed key.
async fn embed_records(
    ctx: &RuntimeContext,
    step: &Step,
    request: &RequestStep,
    records: &RecordsForEach,
    items: &mut [Value],
    scope: &VariableScope,
) -> ActionResult<()> {
    let mut batches: IndexMap<String, Vec<(usize, &str, PreparedRequest)>> = IndexMap::new();
    for (index, record) in items.iter().enumerate() {
        if stop_records(ctx, records, record, scope)? {
            break;
        }
        if !select_record(ctx, records, record, scope)? {
            continue;
        }
        if !record.is_object() {
            return Err(ActionError::request(format!(
                "cannot embed data into {} record '{}'",
                type_name(record),
                records.record_var
            )));
        }
        let vars = WithBinding::new(scope, &records.record_var, record);
        for (key, embed) in &records.embed {
            if let Some(condition) = &embed.condition {
                if !ctx.eval_bool(condition, &vars)? {
                    continue;
                }
            }
            let target = embed
                .request
                .target
                .as_deref()
                .or(request.target.as_deref())
                .or_else(|| ctx.default_target())
                .ok_or_else(|| ActionError::configuration(format!("embedded request '{}' has no target", key)))?;
            let prepared = prepare(ctx, &embed.request, &vars)?;
            batches.entry(target.to_string()).or_default().push((index, key.as_str(), prepared));
        }
    }

    for (target, batch) in batches {
        let helper = Arc::clone(ctx.request_helper(&target)?);
        let (slots, requests): (Vec<_>, Vec<_>) = batch.into_iter().map(|(i, k, r)| ((i, k), r)).unzip();
        tracing::debug!(target_backend = %target, count = requests.len(), "embedding record data");
        let outcomes = send_all(helper.as_ref(), &requests, step.continue_on_error).await?;

        for ((index, key), outcome) in slots.into_iter().zip(outcomes) {
            let Some(Value::Object(record)) = items.get_mut(index) else {
                continue;
            };
            match outcome {
                Ok(raw) => {
                    record.insert(key.to_string(), helper.transform_input(raw));
                }
                Err(failure) if step.continue_on_error => {
                    ctx.record_failed_item();
                    ctx.progress().warn(&format!("{} ({}): {}", step.label(), key, failure));
                    record.insert(key.to_string(), Value::Null);
                    record.insert(format!("{}_error", key), failure.to_value());
                }
                Err(failure) => {
                    return Err(ActionError::request(format!("embedded request '{}': {}", key, failure)));
                }
            }
        }
    }
    Ok(())
}
