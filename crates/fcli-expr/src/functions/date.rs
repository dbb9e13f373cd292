use super::{opt_string_arg, string_arg, FunctionCategory, FunctionDef};
use crate::error::{ExprError, ExprResult};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const PREFIX: &str = "date";
const DEFAULT_PATTERN: &str = "yyyy-MM-dd HH:mm:ss";

pub(super) fn functions() -> Vec<FunctionDef> {
    let cat = FunctionCategory::Date;
    vec![
        FunctionDef::new(
            PREFIX,
            "currentDateTime",
            cat,
            "Current local date/time, formatted as 'yyyy-MM-dd HH:mm:ss' unless a pattern is given",
            0,
            Some(1),
            |args| {
                let pattern = opt_string_arg("date.currentDateTime", args, 0)?
                    .unwrap_or_else(|| DEFAULT_PATTERN.to_string());
                Ok(Value::String(format_with(&Local::now(), &pattern)))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "now",
            cat,
            "Current date/time in RFC 3339 format (UTC)",
            0,
            Some(0),
            |_| Ok(Value::String(Utc::now().to_rfc3339())),
        ),
        FunctionDef::new(
            PREFIX,
            "formatDateTime",
            cat,
            "Format the given (or current) date/time in the local time zone using a yyyy-MM-dd style pattern",
            1,
            Some(2),
            |args| {
                let pattern = string_arg("date.formatDateTime", args, 0)?;
                let input = opt_string_arg("date.formatDateTime", args, 1)?;
                let local = match input {
                    Some(text) => parse_date_time("date.formatDateTime", &text)?.with_timezone(&Local),
                    None => Local::now(),
                };
                Ok(Value::String(format_with(&local, &pattern)))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "formatDateTimeAsUTC",
            cat,
            "Format the given (or current) date/time in UTC using a yyyy-MM-dd style pattern",
            1,
            Some(2),
            |args| {
                let pattern = string_arg("date.formatDateTimeAsUTC", args, 0)?;
                let input = opt_string_arg("date.formatDateTimeAsUTC", args, 1)?;
                let utc = match input {
                    Some(text) => parse_date_time("date.formatDateTimeAsUTC", &text)?.with_timezone(&Utc),
                    None => Utc::now(),
                };
                Ok(Value::String(format_with(&utc, &pattern)))
            },
        ),
    ]
}

/// Parse the date/time formats returned by the supported products. Values without
/// an offset are taken as local time.
fn parse_date_time(fname: &str, text: &str) -> ExprResult<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local.fixed_offset());
            }
        }
    }
    Err(ExprError::function(
        fname,
        format!("cannot parse date/time '{}'", text),
    ))
}

fn format_with<Tz: TimeZone>(dt: &DateTime<Tz>, pattern: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format(&to_strftime(pattern)).to_string()
}

/// Translate a `yyyy-MM-dd'T'HH:mm:ss` style pattern into strftime syntax.
/// Patterns that already contain '%' are used as-is.
pub(crate) fn to_strftime(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // quoted literal; '' is a single quote
            let mut j = i + 1;
            if chars.get(j) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            while j < chars.len() && chars[j] != '\'' {
                out.push(chars[j]);
                j += 1;
            }
            i = j + 1;
            continue;
        }
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let spec = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            ('S', 1..=3) => "%3f",
            ('S', _) => "%6f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('X', _) | ('Z', _) => "%:z",
            ('z', _) => "%Z",
            _ => {
                for _ in 0..run {
                    out.push(c);
                }
                i += run;
                continue;
            }
        };
        out.push_str(spec);
        i += run;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> ExprResult<Value> {
        let registry = FunctionRegistry::builtin().unwrap();
        registry.get(PREFIX, name).unwrap().call(args)
    }

    #[test]
    fn pattern_translation() {
        assert_eq!(to_strftime("yyyy-MM-dd HH:mm:ss"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(to_strftime("yyyy-MM-dd'T'HH:mm"), "%Y-%m-%dT%H:%M");
        assert_eq!(to_strftime("%Y"), "%Y");
        assert_eq!(to_strftime("dd.MM.yy"), "%d.%m.%y");
    }

    #[test]
    fn formats_given_date_as_utc() {
        assert_eq!(
            call(
                "formatDateTimeAsUTC",
                &[json!("yyyy-MM-dd HH:mm"), json!("2024-03-01T10:15:00.000+0100")]
            )
            .unwrap(),
            json!("2024-03-01 09:15")
        );
        assert_eq!(
            call("formatDateTimeAsUTC", &[json!("yyyy"), json!("2023-12-31T23:30:00Z")]).unwrap(),
            json!("2023")
        );
        assert!(call("formatDateTimeAsUTC", &[json!("yyyy"), json!("yesterday")]).is_err());
    }

    #[test]
    fn current_date_time_has_default_shape() {
        let value = call("currentDateTime", &[]).unwrap();
        let text = value.as_str().unwrap();
        assert_eq!(text.len(), "2024-01-01 00:00:00".len());
        assert!(call("now", &[]).unwrap().as_str().unwrap().contains('T'));
    }
}
