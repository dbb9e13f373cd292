//! Conversion rules between JSON values and the types a caller expects.
//!
//! | expected  | accepted                                                   |
//! |-----------|------------------------------------------------------------|
//! | `Any`     | anything, unchanged                                        |
//! | `String`  | string; number/bool rendered; array/object as compact JSON |
//! | `Bool`    | bool; null as false; "true"/"false" (any case)             |
//! | `Number`  | number; numeric string                                     |
//! | `Integer` | integral number; integer string                            |
//! | `Array`   | array; null as empty array                                 |
//! | `Object`  | object                                                     |

use crate::error::{ExprError, ExprResult};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedType {
    Any,
    String,
    Bool,
    Number,
    Integer,
    Array,
    Object,
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpectedType::Any => "any",
            ExpectedType::String => "string",
            ExpectedType::Bool => "boolean",
            ExpectedType::Number => "number",
            ExpectedType::Integer => "integer",
            ExpectedType::Array => "array",
            ExpectedType::Object => "object",
        };
        f.write_str(name)
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(expected: ExpectedType, value: &Value) -> ExprError {
    let found = match value {
        Value::String(s) => format!("string '{}'", s),
        other => type_name(other).to_string(),
    };
    ExprError::TypeCoercion {
        expected: expected.to_string(),
        found,
    }
}

pub fn coerce(value: Value, expected: ExpectedType) -> ExprResult<Value> {
    match expected {
        ExpectedType::Any => Ok(value),
        ExpectedType::String => match value {
            Value::Null => Err(mismatch(expected, &value)),
            Value::String(_) => Ok(value),
            other => Ok(Value::String(render(&other))),
        },
        ExpectedType::Bool => match &value {
            Value::Null => Ok(Value::Bool(false)),
            Value::Bool(_) => Ok(value),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(mismatch(expected, &value)),
        },
        ExpectedType::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => parse_number(s.trim()).ok_or_else(|| mismatch(expected, &value)),
            _ => Err(mismatch(expected, &value)),
        },
        ExpectedType::Integer => match &value {
            Value::Number(n) => integral(n)
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| mismatch(expected, &value)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Value::Number(i.into()))
                .map_err(|_| mismatch(expected, &value)),
            _ => Err(mismatch(expected, &value)),
        },
        ExpectedType::Array => match value {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(_) => Ok(value),
            other => Err(mismatch(expected, &other)),
        },
        ExpectedType::Object => match value {
            Value::Object(_) => Ok(value),
            other => Err(mismatch(expected, &other)),
        },
    }
}

/// Boolean view of a value using the `Bool` coercion rules.
pub fn as_bool(value: &Value) -> ExprResult<bool> {
    match coerce(value.clone(), ExpectedType::Bool)? {
        Value::Bool(b) => Ok(b),
        other => Err(mismatch(ExpectedType::Bool, &other)),
    }
}

fn integral(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

pub(crate) fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Text form used when a value is interpolated into a template.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Translate backslash escape sequences (`\n`, `\t`, `\r`, `\\`) into control characters.
pub fn unescape(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
