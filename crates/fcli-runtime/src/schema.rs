//! On-disk shape of action documents and its conversion into the model.
//!
//! Steps are decoded in two phases: the common keys (`type`, `name`, `if`,
//! `continue_on_error`) are taken off first, then the remaining keys are decoded
//! into the struct for that step type. Unknown keys are rejected at every level.

use crate::error::{ActionError, ActionResult};
use crate::model::{
    ActionConfig, ActionDocument, CheckCondition, EmbedRequest, Expansion, ForEachStep, LogLevel,
    PageProgress, ParamType, Parameter, RecordsForEach, RequestStep, Step, StepKind, VariablePath,
};
use fcli_expr::{type_name, Template, ValueTemplate};
use indexmap::IndexMap;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Scalar accepted where a template is expected; YAML authors write `if: true`
/// or `code: 2` without quoting.
#[derive(Debug, Clone)]
struct Text(String);

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Text(s)),
            Value::Bool(b) => Ok(Text(b.to_string())),
            Value::Number(n) => Ok(Text(n.to_string())),
            other => Err(D::Error::custom(format!(
                "expected a string, found {}",
                type_name(&other)
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    config: RawConfig,
    #[serde(default)]
    parameters: Vec<RawParameter>,
    #[serde(default)]
    steps: Vec<Value>,
    #[serde(default)]
    outputs: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    default_target: Option<String>,
    #[serde(default)]
    strict: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParameter {
    name: String,
    #[serde(rename = "type", default)]
    kind: ParamType,
    #[serde(default = "default_true")]
    required: bool,
    #[serde(rename = "defaultValue", default)]
    default_value: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    method: Option<String>,
    uri: Text,
    #[serde(default)]
    query: IndexMap<String, Text>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    for_each: Option<RawExpansion>,
    #[serde(default)]
    bind: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    paged: bool,
    #[serde(default)]
    log_progress: Option<RawPageProgress>,
    #[serde(default)]
    on_success: Vec<Value>,
    #[serde(default)]
    on_fail: Vec<Value>,
    #[serde(default)]
    records: Option<RawRecords>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPageProgress {
    #[serde(default)]
    page_pre_load: Option<Text>,
    #[serde(default)]
    page_post_load: Option<Text>,
    #[serde(default)]
    page_post_process: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecords {
    #[serde(rename = "as")]
    record_var: String,
    #[serde(rename = "if", default)]
    condition: Option<Text>,
    #[serde(default)]
    break_if: Option<Text>,
    #[serde(default)]
    embed: IndexMap<String, RawEmbed>,
    #[serde(default)]
    steps: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEmbed {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    method: Option<String>,
    uri: Text,
    #[serde(default)]
    query: IndexMap<String, Text>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(rename = "if", default)]
    condition: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExpansion {
    items: Value,
    #[serde(rename = "as")]
    item_var: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSetVariable {
    name: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRemoveVariable {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConditional {
    condition: Text,
    #[serde(default)]
    steps: Vec<Value>,
    #[serde(rename = "else", default)]
    otherwise: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawForEach {
    items: Value,
    #[serde(rename = "as")]
    item_var: String,
    #[serde(default)]
    accumulate: Option<String>,
    #[serde(default)]
    break_if: Option<Text>,
    #[serde(default)]
    steps: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWriteOutput {
    output: String,
    record: Value,
    #[serde(default)]
    result: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInvokeSubAction {
    action: Text,
    #[serde(default)]
    parameters: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLog {
    #[serde(default)]
    level: LogLevel,
    message: Text,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCheck {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    pass_if: Option<Text>,
    #[serde(default)]
    fail_if: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThrow {
    message: Text,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExit {
    #[serde(default)]
    code: Option<Text>,
}

/// Convert a decoded document tree into an [`ActionDocument`], parsing every template.
pub(crate) fn compile(value: Value, origin: Option<PathBuf>) -> ActionResult<ActionDocument> {
    let fallback = origin
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<inline>".to_string());
    let value = if value.is_null() {
        Value::Object(Map::new())
    } else {
        value
    };
    let raw: RawDocument =
        serde_json::from_value(value).map_err(|e| ActionError::document(&fallback, e.to_string()))?;

    let compiler = Compiler {
        document: raw.name.clone(),
    };
    if raw.name.trim().is_empty() {
        return Err(compiler.error("name", "must not be empty"));
    }

    let parameters = raw
        .parameters
        .into_iter()
        .enumerate()
        .map(|(i, p)| compiler.parameter(&format!("parameters[{}]", i), p))
        .collect::<ActionResult<Vec<_>>>()?;
    let steps = compiler.steps("steps", raw.steps)?;
    let outputs = raw
        .outputs
        .iter()
        .map(|(name, v)| Ok((name.clone(), compiler.value(&format!("outputs.{}", name), v)?)))
        .collect::<ActionResult<IndexMap<_, _>>>()?;

    Ok(ActionDocument {
        name: raw.name,
        description: raw.description,
        author: raw.author,
        config: ActionConfig {
            default_target: raw.config.default_target,
            strict: raw.config.strict,
        },
        parameters,
        steps,
        outputs,
        origin,
    })
}

struct Compiler {
    document: String,
}

impl Compiler {
    fn error(&self, at: &str, message: impl std::fmt::Display) -> ActionError {
        ActionError::document(&self.document, format!("{}: {}", at, message))
    }

    fn template(&self, at: &str, text: &str) -> ActionResult<Template> {
        Template::parse(text).map_err(|e| self.error(at, e))
    }

    fn value(&self, at: &str, value: &Value) -> ActionResult<ValueTemplate> {
        ValueTemplate::parse(value).map_err(|e| self.error(at, e))
    }

    fn decode<T: DeserializeOwned>(&self, at: &str, fields: Map<String, Value>) -> ActionResult<T> {
        serde_json::from_value(Value::Object(fields)).map_err(|e| self.error(at, e))
    }

    fn identifier(&self, at: &str, name: &str) -> ActionResult<String> {
        if crate::model::is_identifier(name) {
            Ok(name.to_string())
        } else {
            Err(self.error(at, format!("'{}' is not a valid variable name", name)))
        }
    }

    fn parameter(&self, at: &str, raw: RawParameter) -> ActionResult<Parameter> {
        let name = self.identifier(&format!("{}.name", at), &raw.name)?;
        let default_value = raw
            .default_value
            .as_ref()
            .map(|v| self.value(&format!("{}.defaultValue", at), v))
            .transpose()?;
        Ok(Parameter {
            name,
            kind: raw.kind,
            required: raw.required,
            default_value,
            description: raw.description,
        })
    }

    fn steps(&self, at: &str, raw: Vec<Value>) -> ActionResult<Vec<Step>> {
        raw.into_iter()
            .enumerate()
            .map(|(i, step)| self.step(&format!("{}[{}]", at, i), step))
            .collect()
    }

    fn step(&self, at: &str, raw: Value) -> ActionResult<Step> {
        let mut fields = match raw {
            Value::Object(map) => map,
            other => {
                return Err(self.error(at, format!("expected a step object, found {}", type_name(&other))))
            }
        };
        let step_type = match fields.remove("type") {
            Some(Value::String(t)) => t,
            Some(other) => {
                return Err(self.error(&format!("{}.type", at), format!("expected a string, found {}", type_name(&other))))
            }
            None => return Err(self.error(at, "missing field `type`")),
        };
        // set_variable and remove_variable use `name` for the variable, not as a label.
        let raw_name = if matches!(step_type.as_str(), "set_variable" | "remove_variable") {
            fields.get("name").cloned()
        } else {
            fields.remove("name")
        };
        let name = match raw_name {
            None | Some(Value::Null) => None,
            Some(Value::String(n)) => Some(n),
            Some(other) => {
                return Err(self.error(&format!("{}.name", at), format!("expected a string, found {}", type_name(&other))))
            }
        };
        let condition = match fields.remove("if") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(self.template(&format!("{}.if", at), &s)?),
            Some(Value::Bool(b)) => Some(Template::literal(b.to_string())),
            Some(other) => {
                return Err(self.error(&format!("{}.if", at), format!("expected a string, found {}", type_name(&other))))
            }
        };
        let continue_on_error = match fields.remove("continue_on_error") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(self.error(
                    &format!("{}.continue_on_error", at),
                    format!("expected a boolean, found {}", type_name(&other)),
                ))
            }
        };

        let kind = self.step_kind(at, &step_type, name.as_deref(), fields)?;
        Ok(Step {
            name,
            condition,
            continue_on_error,
            kind,
        })
    }

    fn step_kind(
        &self,
        at: &str,
        step_type: &str,
        name: Option<&str>,
        fields: Map<String, Value>,
    ) -> ActionResult<StepKind> {
        let kind = match step_type {
            "request" => {
                let raw: RawRequest = self.decode(at, fields)?;
                StepKind::Request(self.request(at, name, raw)?)
            }
            "set_variable" => {
                let raw: RawSetVariable = self.decode(at, fields)?;
                StepKind::SetVariable {
                    name: VariablePath::parse(&raw.name).map_err(|e| self.error(&format!("{}.name", at), e))?,
                    value: self.value(&format!("{}.value", at), &raw.value)?,
                }
            }
            "remove_variable" => {
                let raw: RawRemoveVariable = self.decode(at, fields)?;
                StepKind::RemoveVariable {
                    name: self.identifier(&format!("{}.name", at), &raw.name)?,
                }
            }
            "conditional" => {
                let raw: RawConditional = self.decode(at, fields)?;
                StepKind::Conditional {
                    condition: self.template(&format!("{}.condition", at), &raw.condition.0)?,
                    steps: self.steps(&format!("{}.steps", at), raw.steps)?,
                    otherwise: self.steps(&format!("{}.else", at), raw.otherwise)?,
                }
            }
            "for_each" => {
                let raw: RawForEach = self.decode(at, fields)?;
                StepKind::ForEach(ForEachStep {
                    items: self.value(&format!("{}.items", at), &raw.items)?,
                    item_var: self.identifier(&format!("{}.as", at), &raw.item_var)?,
                    accumulate: raw
                        .accumulate
                        .map(|a| self.identifier(&format!("{}.accumulate", at), &a))
                        .transpose()?,
                    break_if: raw
                        .break_if
                        .map(|t| self.template(&format!("{}.break_if", at), &t.0))
                        .transpose()?,
                    steps: self.steps(&format!("{}.steps", at), raw.steps)?,
                })
            }
            "write_output" => {
                let raw: RawWriteOutput = self.decode(at, fields)?;
                StepKind::WriteOutput {
                    output: raw.output,
                    record: self.value(&format!("{}.record", at), &raw.record)?,
                    result: raw
                        .result
                        .map(|t| self.template(&format!("{}.result", at), &t.0))
                        .transpose()?,
                }
            }
            "invoke_sub_action" => {
                let raw: RawInvokeSubAction = self.decode(at, fields)?;
                let parameters = raw
                    .parameters
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.value(&format!("{}.parameters.{}", at, k), v)?)))
                    .collect::<ActionResult<IndexMap<_, _>>>()?;
                StepKind::InvokeSubAction {
                    action: self.template(&format!("{}.action", at), &raw.action.0)?,
                    parameters,
                }
            }
            "log" => {
                let raw: RawLog = self.decode(at, fields)?;
                StepKind::Log {
                    level: raw.level,
                    message: self.template(&format!("{}.message", at), &raw.message.0)?,
                }
            }
            "check" => {
                let raw: RawCheck = self.decode(at, fields)?;
                let condition = match (raw.pass_if, raw.fail_if) {
                    (Some(t), None) => CheckCondition::PassIf(self.template(&format!("{}.pass_if", at), &t.0)?),
                    (None, Some(t)) => CheckCondition::FailIf(self.template(&format!("{}.fail_if", at), &t.0)?),
                    _ => return Err(self.error(at, "exactly one of `pass_if` and `fail_if` is required")),
                };
                StepKind::Check {
                    display_name: raw.display_name,
                    condition,
                }
            }
            "throw" => {
                let raw: RawThrow = self.decode(at, fields)?;
                StepKind::Throw {
                    message: self.template(&format!("{}.message", at), &raw.message.0)?,
                }
            }
            "exit" => {
                let raw: RawExit = self.decode(at, fields)?;
                let code = raw.code.map(|t| t.0).unwrap_or_else(|| "0".to_string());
                StepKind::Exit {
                    code: self.template(&format!("{}.code", at), &code)?,
                }
            }
            other => {
                return Err(self.error(&format!("{}.type", at), format!("unknown step type '{}'", other)))
            }
        };
        Ok(kind)
    }

    fn request(&self, at: &str, name: Option<&str>, raw: RawRequest) -> ActionResult<RequestStep> {
        let expansion = match raw.for_each {
            Some(e) => Some(Expansion {
                items: self.value(&format!("{}.for_each.items", at), &e.items)?,
                item_var: self.identifier(&format!("{}.for_each.as", at), &e.item_var)?,
            }),
            None => None,
        };
        let page_progress = match raw.log_progress {
            Some(p) => PageProgress {
                pre_load: self.optional_template(&format!("{}.log_progress.page_pre_load", at), p.page_pre_load)?,
                post_load: self.optional_template(&format!("{}.log_progress.page_post_load", at), p.page_post_load)?,
                post_process: self.optional_template(
                    &format!("{}.log_progress.page_post_process", at),
                    p.page_post_process,
                )?,
            },
            None => PageProgress::default(),
        };
        // page progress only makes sense for paged requests
        let paged = raw.paged || !page_progress.is_empty();
        if expansion.is_some() && (paged || raw.records.is_some()) {
            return Err(self.error(at, "`for_each` cannot be combined with `paged` or `records`"));
        }
        let records = raw
            .records
            .map(|r| self.records(&format!("{}.records", at), r))
            .transpose()?;
        let bind = match raw.bind.as_deref().or(name) {
            Some(bind) if raw.bind.is_some() => Some(self.identifier(&format!("{}.bind", at), bind)?),
            // step names are labels first; only identifier-like names bind
            Some(bind) if crate::model::is_identifier(bind) => Some(bind.to_string()),
            _ => None,
        };
        Ok(RequestStep {
            target: raw.target,
            method: Self::method(raw.method),
            uri: self.template(&format!("{}.uri", at), &raw.uri.0)?,
            query: self.query(at, &raw.query)?,
            body: raw
                .body
                .as_ref()
                .map(|b| self.value(&format!("{}.body", at), b))
                .transpose()?,
            expansion,
            bind,
            output: raw.output,
            paged,
            page_progress,
            on_success: self.steps(&format!("{}.on_success", at), raw.on_success)?,
            on_fail: self.steps(&format!("{}.on_fail", at), raw.on_fail)?,
            records,
        })
    }

    fn records(&self, at: &str, raw: RawRecords) -> ActionResult<RecordsForEach> {
        let embed = raw
            .embed
            .into_iter()
            .map(|(key, e)| {
                let at = format!("{}.embed.{}", at, key);
                let key = self.identifier(&at, &key)?;
                Ok((key, self.embed(&at, e)?))
            })
            .collect::<ActionResult<IndexMap<_, _>>>()?;
        Ok(RecordsForEach {
            record_var: self.identifier(&format!("{}.as", at), &raw.record_var)?,
            condition: self.optional_template(&format!("{}.if", at), raw.condition)?,
            break_if: self.optional_template(&format!("{}.break_if", at), raw.break_if)?,
            embed,
            steps: self.steps(&format!("{}.steps", at), raw.steps)?,
        })
    }

    fn embed(&self, at: &str, raw: RawEmbed) -> ActionResult<EmbedRequest> {
        Ok(EmbedRequest {
            condition: self.optional_template(&format!("{}.if", at), raw.condition)?,
            request: RequestStep {
                target: raw.target,
                method: Self::method(raw.method),
                uri: self.template(&format!("{}.uri", at), &raw.uri.0)?,
                query: self.query(at, &raw.query)?,
                body: raw
                    .body
                    .as_ref()
                    .map(|b| self.value(&format!("{}.body", at), b))
                    .transpose()?,
                expansion: None,
                bind: None,
                output: None,
                paged: false,
                page_progress: PageProgress::default(),
                on_success: Vec::new(),
                on_fail: Vec::new(),
                records: None,
            },
        })
    }

    fn method(raw: Option<String>) -> String {
        raw.unwrap_or_else(|| "GET".to_string()).to_uppercase()
    }

    fn query(&self, at: &str, raw: &IndexMap<String, Text>) -> ActionResult<IndexMap<String, Template>> {
        raw.iter()
            .map(|(k, v)| Ok((k.clone(), self.template(&format!("{}.query.{}", at, k), &v.0)?)))
            .collect()
    }

    fn optional_template(&self, at: &str, raw: Option<Text>) -> ActionResult<Option<Template>> {
        raw.map(|t| self.template(at, &t.0)).transpose()
    }
}
