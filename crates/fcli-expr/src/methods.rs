//! Methods callable on values: `issues.size()`, `name.toUpperCase()`, ...

use crate::coerce::{coerce, render, type_name, ExpectedType};
use crate::error::{ExprError, ExprResult};
use regex::Regex;
use serde_json::Value;

pub(crate) fn call_method(target: &Value, name: &str, args: &[Value]) -> ExprResult<Value> {
    let arity = |min: usize, max: usize| -> ExprResult<()> {
        if args.len() < min || args.len() > max {
            Err(ExprError::function(
                name,
                format!("expected {}..={} arguments, got {}", min, max, args.len()),
            ))
        } else {
            Ok(())
        }
    };

    match name {
        "size" | "length" => {
            arity(0, 0)?;
            let size = match target {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(s) => s.chars().count(),
                other => return Err(unsupported(name, other)),
            };
            Ok(Value::from(size))
        }
        "isEmpty" => {
            arity(0, 0)?;
            let empty = match target {
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                Value::String(s) => s.is_empty(),
                other => return Err(unsupported(name, other)),
            };
            Ok(Value::Bool(empty))
        }
        "contains" => {
            arity(1, 1)?;
            let found = match target {
                Value::Array(items) => items.iter().any(|item| crate::eval::values_equal(item, &args[0])),
                Value::Object(map) => map.contains_key(&render(&args[0])),
                Value::String(s) => s.contains(&string_arg(name, &args[0])?),
                other => return Err(unsupported(name, other)),
            };
            Ok(Value::Bool(found))
        }
        "keys" => {
            arity(0, 0)?;
            match target {
                Value::Object(map) => Ok(Value::Array(
                    map.keys().map(|k| Value::String(k.clone())).collect(),
                )),
                other => Err(unsupported(name, other)),
            }
        }
        "values" => {
            arity(0, 0)?;
            match target {
                Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
                other => Err(unsupported(name, other)),
            }
        }
        _ => {
            let text = match target {
                Value::String(s) => s,
                other => return Err(unsupported(name, other)),
            };
            string_method(text, name, args, &arity)
        }
    }
}

fn string_method(
    text: &str,
    name: &str,
    args: &[Value],
    arity: &dyn Fn(usize, usize) -> ExprResult<()>,
) -> ExprResult<Value> {
    let result = match name {
        "startsWith" => {
            arity(1, 1)?;
            Value::Bool(text.starts_with(&string_arg(name, &args[0])?))
        }
        "endsWith" => {
            arity(1, 1)?;
            Value::Bool(text.ends_with(&string_arg(name, &args[0])?))
        }
        "toUpperCase" => {
            arity(0, 0)?;
            Value::String(text.to_uppercase())
        }
        "toLowerCase" => {
            arity(0, 0)?;
            Value::String(text.to_lowercase())
        }
        "trim" => {
            arity(0, 0)?;
            Value::String(text.trim().to_string())
        }
        "replace" => {
            arity(2, 2)?;
            let from = string_arg(name, &args[0])?;
            let to = string_arg(name, &args[1])?;
            Value::String(text.replace(&from, &to))
        }
        "split" => {
            arity(1, 1)?;
            let separator = string_arg(name, &args[0])?;
            Value::Array(
                text.split(separator.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            )
        }
        "substring" => {
            arity(1, 2)?;
            let chars: Vec<char> = text.chars().collect();
            let start = index_arg(name, &args[0])?.min(chars.len());
            let end = match args.get(1) {
                Some(end) => index_arg(name, end)?.min(chars.len()),
                None => chars.len(),
            };
            if start > end {
                return Err(ExprError::function(
                    name,
                    format!("start {} is after end {}", start, end),
                ));
            }
            Value::String(chars[start..end].iter().collect())
        }
        "matches" => {
            arity(1, 1)?;
            let pattern = string_arg(name, &args[0])?;
            let regex = Regex::new(&format!("^(?:{})$", pattern))
                .map_err(|e| ExprError::function(name, format!("invalid regex: {}", e)))?;
            Value::Bool(regex.is_match(text))
        }
        other => {
            return Err(ExprError::evaluation(format!(
                "unknown method '{}' on string",
                other
            )))
        }
    };
    Ok(result)
}

fn unsupported(name: &str, target: &Value) -> ExprError {
    ExprError::evaluation(format!(
        "method '{}' is not supported on {}",
        name,
        type_name(target)
    ))
}

fn string_arg(name: &str, value: &Value) -> ExprResult<String> {
    match coerce(value.clone(), ExpectedType::String) {
        Ok(Value::String(s)) => Ok(s),
        Ok(other) => Ok(render(&other)),
        Err(e) => Err(ExprError::function(name, e.to_string())),
    }
}

fn index_arg(name: &str, value: &Value) -> ExprResult<usize> {
    match coerce(value.clone(), ExpectedType::Integer) {
        Ok(Value::Number(n)) => n
            .as_i64()
            .filter(|i| *i >= 0)
            .map(|i| i as usize)
            .ok_or_else(|| ExprError::function(name, "index must not be negative")),
        Ok(_) => Err(ExprError::function(name, "expected integer index")),
        Err(e) => Err(ExprError::function(name, e.to_string())),
    }
}
