use super::{bool_arg, string_arg, FunctionCategory, FunctionDef};
use crate::error::ExprError;
use serde_json::Value;

const PREFIX: &str = "workflow";

pub(super) fn functions() -> Vec<FunctionDef> {
    let cat = FunctionCategory::Workflow;
    vec![
        FunctionDef::new(
            PREFIX,
            "check",
            cat,
            "Fail evaluation with the given message if the condition is true; otherwise true",
            2,
            Some(2),
            |args| {
                if bool_arg("workflow.check", args, 0)? {
                    return Err(ExprError::evaluation(string_arg("workflow.check", args, 1)?));
                }
                Ok(Value::Bool(true))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "skipReasonIf",
            cat,
            "The given reason if the condition is true, otherwise null",
            2,
            Some(2),
            |args| {
                if bool_arg("workflow.skipReasonIf", args, 0)? {
                    Ok(Value::String(string_arg("workflow.skipReasonIf", args, 1)?))
                } else {
                    Ok(Value::Null)
                }
            },
        ),
        FunctionDef::new(
            PREFIX,
            "skipBlankEnvReason",
            cat,
            "'<NAME> not set' if the environment variable is blank or missing, otherwise null",
            1,
            Some(1),
            |args| {
                let name = string_arg("workflow.skipBlankEnvReason", args, 0)?;
                let set = std::env::var(&name)
                    .map(|v| !v.trim().is_empty())
                    .unwrap_or(false);
                if set {
                    Ok(Value::Null)
                } else {
                    Ok(Value::String(format!("{} not set", name)))
                }
            },
        ),
    ]
}
