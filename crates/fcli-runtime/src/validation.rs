//! Load-time checks over a parsed document.
//!
//! Everything that can be decided statically is checked here so that a broken
//! action fails before its first request: parameter references, variable roots,
//! function names, backend targets and output names. Variables bound inside
//! conditional branches count as bound afterwards; anything else is left to
//! evaluation time.

use crate::error::{ActionError, ActionResult};
use crate::model::{ActionDocument, CheckCondition, RecordsForEach, Step, StepKind};
use crate::output::RECORD;
use crate::processor::CHECK_STATUS;
use crate::scope::PARAMS;
use fcli_connectors::{RequestHelper, RequestHelpers};
use fcli_expr::{Expr, FunctionRegistry, Template, ValueTemplate};
use std::collections::HashSet;
use std::sync::Arc;

/// Problems found in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub document: String,
    /// Errors in the document itself
    pub issues: Vec<String>,
    /// Backends the document needs that are not registered
    pub configuration: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty() && self.configuration.is_empty()
    }

    /// Document issues take precedence over configuration issues.
    pub fn into_result(self) -> ActionResult<()> {
        if !self.issues.is_empty() {
            return Err(ActionError::document(self.document, self.issues.join("; ")));
        }
        if !self.configuration.is_empty() {
            return Err(ActionError::configuration(self.configuration.join("; ")));
        }
        Ok(())
    }
}

pub fn validate(
    document: &ActionDocument,
    registry: &FunctionRegistry,
    helpers: &RequestHelpers,
) -> ValidationReport {
    let mut validator = Validator {
        document,
        registry,
        helpers,
        declared: document.parameters.iter().map(|p| p.name.as_str()).collect(),
        ever_bound: HashSet::new(),
        report: ValidationReport {
            document: document.name.clone(),
            ..Default::default()
        },
    };

    let mut seen = HashSet::new();
    for parameter in &document.parameters {
        if !seen.insert(parameter.name.as_str()) {
            validator.issue("parameters", format!("duplicate parameter '{}'", parameter.name));
        }
    }
    for (i, parameter) in document.parameters.iter().enumerate() {
        if let Some(default) = &parameter.default_value {
            // defaults may refer to other parameters only
            let bound = HashSet::from([PARAMS.to_string()]);
            validator.check_value(&format!("parameters[{}].defaultValue", i), default, &bound);
        }
    }

    let mut bound = HashSet::from([PARAMS.to_string()]);
    validator.check_steps("steps", &document.steps, &mut bound);

    let mut output_vars = validator.ever_bound.clone();
    output_vars.insert(PARAMS.to_string());
    output_vars.insert(RECORD.to_string());
    for (name, projection) in &document.outputs {
        validator.check_value(&format!("outputs.{}", name), projection, &output_vars);
    }
    validator.report
}

struct Validator<'a> {
    document: &'a ActionDocument,
    registry: &'a FunctionRegistry,
    helpers: &'a RequestHelpers,
    declared: HashSet<&'a str>,
    ever_bound: HashSet<String>,
    report: ValidationReport,
}

impl<'a> Validator<'a> {
    fn issue(&mut self, at: &str, message: impl std::fmt::Display) {
        self.report.issues.push(format!("{}: {}", at, message));
    }

    fn bind(&mut self, at: &str, name: &str, bound: &mut HashSet<String>) {
        if name == PARAMS || self.registry.is_prefix(name) {
            self.issue(at, format!("'{}' is reserved and cannot be assigned", name));
        }
        self.ever_bound.insert(name.to_string());
        bound.insert(name.to_string());
    }

    fn check_steps(&mut self, at: &str, steps: &[Step], bound: &mut HashSet<String>) {
        for (i, step) in steps.iter().enumerate() {
            self.check_step(&format!("{}[{}]", at, i), step, bound);
        }
    }

    fn check_step(&mut self, at: &str, step: &Step, bound: &mut HashSet<String>) {
        if let Some(condition) = &step.condition {
            self.check_template(&format!("{}.if", at), condition, bound);
        }
        match &step.kind {
            StepKind::Request(request) => {
                let helper = self.check_target(at, request.target.as_deref());
                if let Some(h) = helper.filter(|h| request.paged && !h.supports_paging()) {
                    self.report
                        .configuration
                        .push(format!("{}: backend '{}' does not support paged requests", at, h.name()));
                }
                if let Some(output) = &request.output {
                    self.check_output(at, output);
                }

                let mut request_vars = bound.clone();
                if let Some(expansion) = &request.expansion {
                    self.check_value(&format!("{}.for_each.items", at), &expansion.items, bound);
                    self.bind(&format!("{}.for_each.as", at), &expansion.item_var, &mut request_vars);
                }
                self.check_template(&format!("{}.uri", at), &request.uri, &request_vars);
                for (key, template) in &request.query {
                    self.check_template(&format!("{}.query.{}", at, key), template, &request_vars);
                }
                if let Some(body) = &request.body {
                    self.check_value(&format!("{}.body", at), body, &request_vars);
                }

                // pages are announced before their response is bound
                for (name, template) in [
                    ("page_pre_load", &request.page_progress.pre_load),
                    ("page_post_load", &request.page_progress.post_load),
                ] {
                    if let Some(template) = template {
                        self.check_template(&format!("{}.log_progress.{}", at, name), template, &request_vars);
                    }
                }

                if let Some(bind) = &request.bind {
                    for name in [bind.clone(), format!("{}_raw", bind), format!("{}_error", bind)] {
                        self.bind(&format!("{}.bind", at), &name, &mut request_vars);
                    }
                }
                let mut on_success = request_vars.clone();
                self.check_steps(&format!("{}.on_success", at), &request.on_success, &mut on_success);
                let mut on_fail = request_vars.clone();
                self.check_steps(&format!("{}.on_fail", at), &request.on_fail, &mut on_fail);
                if let Some(records) = &request.records {
                    let target = request.target.as_deref();
                    self.check_records(&format!("{}.records", at), records, target, &on_success);
                    self.bind(&format!("{}.records.as", at), &records.total_count_var(), &mut on_success);
                }
                if let Some(template) = &request.page_progress.post_process {
                    self.check_template(&format!("{}.log_progress.page_post_process", at), template, &on_success);
                }

                if let Some(bind) = &request.bind {
                    for name in [bind.clone(), format!("{}_raw", bind), format!("{}_error", bind)] {
                        bound.insert(name);
                    }
                }
                if request.expansion.is_none() {
                    // continuations of a single request run in the enclosing scope
                    bound.extend(on_success);
                    bound.extend(on_fail);
                }
            }
            StepKind::SetVariable { name, value } => {
                self.check_value(&format!("{}.value", at), value, bound);
                self.bind(&format!("{}.name", at), &name.root, bound);
            }
            StepKind::RemoveVariable { name } => {
                if name == PARAMS {
                    self.issue(&format!("{}.name", at), format!("'{}' cannot be removed", PARAMS));
                }
            }
            StepKind::Conditional {
                condition,
                steps,
                otherwise,
            } => {
                self.check_template(&format!("{}.condition", at), condition, bound);
                let mut then_vars = bound.clone();
                self.check_steps(&format!("{}.steps", at), steps, &mut then_vars);
                let mut else_vars = bound.clone();
                self.check_steps(&format!("{}.else", at), otherwise, &mut else_vars);
                bound.extend(then_vars);
                bound.extend(else_vars);
            }
            StepKind::ForEach(for_each) => {
                self.check_value(&format!("{}.items", at), &for_each.items, bound);
                let mut body = bound.clone();
                self.bind(&format!("{}.as", at), &for_each.item_var, &mut body);
                if let Some(break_if) = &for_each.break_if {
                    self.check_template(&format!("{}.break_if", at), break_if, &body);
                }
                self.check_steps(&format!("{}.steps", at), &for_each.steps, &mut body);
                if let Some(accumulate) = &for_each.accumulate {
                    self.bind(&format!("{}.accumulate", at), accumulate, bound);
                }
            }
            StepKind::WriteOutput {
                output,
                record,
                result,
            } => {
                self.check_output(at, output);
                self.check_value(&format!("{}.record", at), record, bound);
                if let Some(result) = result {
                    self.check_template(&format!("{}.result", at), result, bound);
                }
            }
            StepKind::InvokeSubAction { action, parameters } => {
                self.check_template(&format!("{}.action", at), action, bound);
                for (name, value) in parameters {
                    self.check_value(&format!("{}.parameters.{}", at, name), value, bound);
                }
            }
            StepKind::Log { message, .. } => self.check_template(&format!("{}.message", at), message, bound),
            StepKind::Check { condition, .. } => {
                let (field, template) = match condition {
                    CheckCondition::PassIf(t) => ("pass_if", t),
                    CheckCondition::FailIf(t) => ("fail_if", t),
                };
                self.check_template(&format!("{}.{}", at, field), template, bound);
                self.ever_bound.insert(CHECK_STATUS.to_string());
                bound.insert(CHECK_STATUS.to_string());
            }
            StepKind::Throw { message } => self.check_template(&format!("{}.message", at), message, bound),
            StepKind::Exit { code } => self.check_template(&format!("{}.code", at), code, bound),
        }
    }

    /// Reports an unusable target; returns the helper the request would go to.
    fn check_target(&mut self, at: &str, target: Option<&str>) -> Option<&'a Arc<dyn RequestHelper>> {
        let (helpers, document) = (self.helpers, self.document);
        match target.or(document.config.default_target.as_deref()) {
            Some(target) => {
                let helper = helpers.get(target);
                if helper.is_none() {
                    self.report.configuration.push(format!(
                        "{}: backend '{}' is not configured for this action",
                        at, target
                    ));
                }
                helper
            }
            None if helpers.len() == 1 => helpers.iter().next(),
            None => {
                self.issue(at, "request has no target and the action has no default_target");
                None
            }
        }
    }

    /// Embedded requests go to the parent request's target unless they name their own.
    fn check_records(
        &mut self,
        at: &str,
        records: &RecordsForEach,
        parent_target: Option<&str>,
        bound: &HashSet<String>,
    ) {
        let mut record_vars = bound.clone();
        self.bind(&format!("{}.as", at), &records.record_var, &mut record_vars);
        if let Some(condition) = &records.condition {
            self.check_template(&format!("{}.if", at), condition, &record_vars);
        }
        if let Some(break_if) = &records.break_if {
            self.check_template(&format!("{}.break_if", at), break_if, &record_vars);
        }
        for (key, embed) in &records.embed {
            let at = format!("{}.embed.{}", at, key);
            self.check_target(&at, embed.request.target.as_deref().or(parent_target));
            if let Some(condition) = &embed.condition {
                self.check_template(&format!("{}.if", at), condition, &record_vars);
            }
            self.check_template(&format!("{}.uri", at), &embed.request.uri, &record_vars);
            for (name, template) in &embed.request.query {
                self.check_template(&format!("{}.query.{}", at, name), template, &record_vars);
            }
            if let Some(body) = &embed.request.body {
                self.check_value(&format!("{}.body", at), body, &record_vars);
            }
        }
        self.check_steps(&format!("{}.steps", at), &records.steps, &mut record_vars);
    }

    fn check_output(&mut self, at: &str, output: &str) {
        if !self.document.outputs.contains_key(output) {
            self.issue(&format!("{}.output", at), format!("output '{}' is not declared", output));
        }
    }

    fn check_template(&mut self, at: &str, template: &Template, bound: &HashSet<String>) {
        let exprs: Vec<&Expr> = template.expressions().collect();
        self.check_exprs(at, &exprs, bound);
    }

    fn check_value(&mut self, at: &str, value: &ValueTemplate, bound: &HashSet<String>) {
        let mut exprs = Vec::new();
        value.expressions(&mut exprs);
        self.check_exprs(at, &exprs, bound);
    }

    fn check_exprs(&mut self, at: &str, exprs: &[&Expr], bound: &HashSet<String>) {
        for expr in exprs {
            let mut problems = Vec::new();
            let is_prefix = |name: &str| self.registry.is_prefix(name);
            expr.walk_references(&is_prefix, &mut |e| match e {
                Expr::Call { target: None, name, .. } => {
                    if self.registry.get("", name).is_none() {
                        problems.push(format!("unknown function '{}'", name));
                    }
                }
                Expr::Call { name, .. } => {
                    if let Some(prefix) = e.call_prefix().filter(|p| is_prefix(p)) {
                        if self.registry.get(prefix, name).is_none() {
                            problems.push(format!("unknown function '{}.{}'", prefix, name));
                        }
                    }
                }
                Expr::Member { target, name, .. } => {
                    if matches!(target.as_ref(), Expr::Var(root) if root == PARAMS)
                        && !self.declared.contains(name.as_str())
                    {
                        problems.push(format!("parameter '{}' is not declared", name));
                    }
                }
                Expr::Var(name) => {
                    if !bound.contains(name) {
                        problems.push(format!("variable '{}' is not defined here", name));
                    }
                }
                _ => {}
            });
            for problem in problems {
                self.issue(at, problem);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_str;
    use fcli_config::BackendConfig;
    use fcli_connectors::HttpRequestHelper;
    use fcli_core::ProductKind;

    fn registry() -> FunctionRegistry {
        FunctionRegistry::builtin().unwrap()
    }

    fn report(yaml: &str) -> ValidationReport {
        let document = parse_str(yaml, None).unwrap();
        validate(&document, &registry(), &RequestHelpers::new())
    }

    #[test]
    fn accepts_well_formed_documents() {
        let report = report(
            r#"
name: ok
parameters:
  - name: names
    type: array
steps:
  - type: for_each
    items: ${params.names}
    as: n
    accumulate: joined
    steps:
      - type: set_variable
        name: joined..
        value: ${txt.join('-', [n, env('HOME')])}
  - type: conditional
    condition: ${joined.size() > 0}
    steps:
      - type: set_variable
        name: summary
        value: ${joined}
  - type: write_output
    output: main
    record: ${summary ?? joined}
outputs:
  main: ${record}
"#,
        );
        assert!(report.is_valid(), "{:?}", report);
    }

    #[test]
    fn collects_every_problem() {
        let report = report(
            r#"
name: broken
parameters:
  - name: release
steps:
  - type: log
    message: ${params.relase} ${missing} ${txt.nope('x')} ${frobnicate()}
  - type: set_variable
    name: txt
    value: 1
  - type: write_output
    output: undeclared
    record: {}
"#,
        );
        assert!(!report.is_valid());
        let all = report.issues.join("\n");
        assert!(all.contains("parameter 'relase' is not declared"), "{}", all);
        assert!(all.contains("variable 'missing' is not defined"), "{}", all);
        assert!(all.contains("unknown function 'txt.nope'"), "{}", all);
        assert!(all.contains("unknown function 'frobnicate'"), "{}", all);
        assert!(all.contains("'txt' is reserved"), "{}", all);
        assert!(all.contains("output 'undeclared' is not declared"), "{}", all);
        assert!(matches!(report.into_result(), Err(ActionError::Document { .. })));
    }

    #[test]
    fn loop_variables_do_not_leak() {
        let report = report(
            r#"
name: scoped
steps:
  - type: for_each
    items: [1, 2]
    as: n
    steps:
      - type: set_variable
        name: inner
        value: ${n}
  - type: log
    message: ${inner}
"#,
        );
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("'inner'"));
    }

    #[test]
    fn function_prefixes_are_not_variable_references() {
        let report = report(
            r#"
name: prefixes
steps:
  - type: log
    message: ${txt.join(',', [txt.repeat('a', 2)])}
  - type: log
    message: ${txt.nope('x')} ${txt}
"#,
        );
        assert_eq!(report.issues.len(), 2, "{:?}", report.issues);
        assert!(report.issues[0].contains("unknown function 'txt.nope'"));
        assert!(report.issues[1].contains("variable 'txt' is not defined here"));
    }

    #[test]
    fn record_variables_stay_inside_records() {
        let report = report(
            r#"
name: records
steps:
  - type: request
    name: pvs
    target: ssc
    uri: /api/v1/projectVersions
    log_progress:
      page_pre_load: Loading after ${pvs_raw.count}
      page_post_process: Loaded ${totalPvCount}
    records:
      as: pv
      break_if: ${pv.id > 10}
      embed:
        artifacts:
          uri: /api/v1/projectVersions/${pv.id}/artifacts
      steps:
        - type: set_variable
          name: last
          value: ${pv.artifacts}
  - type: log
    message: ${totalPvCount} ${last}
"#,
        );
        assert_eq!(report.issues.len(), 2, "{:?}", report.issues);
        assert!(report.issues[0].contains("log_progress.page_pre_load"));
        assert!(report.issues[0].contains("'pvs_raw'"));
        assert!(report.issues[1].contains("'last'"));
        assert_eq!(
            report.configuration,
            vec![
                "steps[0]: backend 'ssc' is not configured for this action".to_string(),
                "steps[0].records.embed.artifacts: backend 'ssc' is not configured for this action".to_string(),
            ]
        );
    }

    #[test]
    fn paging_needs_a_backend_that_pages() {
        let config = BackendConfig::new("https://tracker.example.com").with_product(ProductKind::Generic);
        let helpers = RequestHelpers::new()
            .with(Arc::new(HttpRequestHelper::from_config("tracker", &config).unwrap()));
        let document = parse_str("name: p\nsteps:\n  - type: request\n    uri: /issues\n    paged: true\n", None).unwrap();

        let report = validate(&document, &registry(), &helpers);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(
            report.configuration,
            vec!["steps[0]: backend 'tracker' does not support paged requests".to_string()]
        );
    }

    #[test]
    fn unregistered_targets_are_configuration_errors() {
        let report = report(
            r#"
name: needs-fod
steps:
  - type: request
    target: fod
    uri: /api/v3/releases
"#,
        );
        assert!(report.issues.is_empty());
        assert_eq!(report.configuration.len(), 1);
        assert!(matches!(report.into_result(), Err(ActionError::Configuration(_))));
    }
}
