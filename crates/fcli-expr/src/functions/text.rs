use super::{int_arg, opt_string_arg, string_arg, FunctionCategory, FunctionDef};
use crate::coerce::{render, unescape};
use crate::error::{ExprError, ExprResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const PREFIX: &str = "txt";

pub(super) fn functions() -> Vec<FunctionDef> {
    let cat = FunctionCategory::Text;
    vec![
        FunctionDef::new(
            PREFIX,
            "join",
            cat,
            "Join elements with the given delimiter; '\\n' and '\\t' in the delimiter are unescaped",
            1,
            None,
            |args| {
                let delimiter = unescape(&string_arg("txt.join", args, 0)?);
                let parts: Vec<String> = flatten(&args[1..]).iter().map(render).collect();
                Ok(Value::String(parts.join(&delimiter)))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "joinOrNull",
            cat,
            "Join elements with the given delimiter, or null if any element is null",
            1,
            None,
            |args| {
                let delimiter = unescape(&string_arg("txt.joinOrNull", args, 0)?);
                let parts = flatten(&args[1..]);
                if parts.is_empty() || parts.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                let parts: Vec<String> = parts.iter().map(render).collect();
                Ok(Value::String(parts.join(&delimiter)))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "repeat",
            cat,
            "Repeat text the given number of times; counts <= 0 give an empty string",
            2,
            Some(2),
            |args| {
                let text = string_arg("txt.repeat", args, 0)?;
                let count = int_arg("txt.repeat", args, 1)?;
                Ok(Value::String(text.repeat(count.max(0) as usize)))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "regexQuote",
            cat,
            "Escape all regex meta characters in the input",
            1,
            Some(1),
            |args| Ok(Value::String(regex::escape(&string_arg("txt.regexQuote", args, 0)?))),
        ),
        FunctionDef::new(
            PREFIX,
            "replaceAllFromRegExMap",
            cat,
            "Apply every (regex -> replacement) entry of the mapping object to the input",
            2,
            Some(2),
            |args| {
                let mut text = string_arg("txt.replaceAllFromRegExMap", args, 0)?;
                let mapping = match args.get(1) {
                    Some(Value::Object(map)) => map,
                    _ => {
                        return Err(ExprError::function(
                            "txt.replaceAllFromRegExMap",
                            "replacements must be an object",
                        ))
                    }
                };
                for (pattern, replacement) in mapping {
                    let regex = Regex::new(pattern).map_err(|e| {
                        ExprError::function(
                            "txt.replaceAllFromRegExMap",
                            format!("invalid regex '{}': {}", pattern, e),
                        )
                    })?;
                    text = regex.replace_all(&text, render(replacement).as_str()).into_owned();
                }
                Ok(Value::String(text))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "numberedList",
            cat,
            "Numbered list of the input elements, one per line",
            1,
            Some(1),
            |args| {
                let items = flatten(args);
                let mut list = String::new();
                for (idx, item) in items.iter().enumerate() {
                    list.push_str(&format!("{}. {}\n", idx + 1, render(item)));
                }
                Ok(Value::String(list))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "htmlToText",
            cat,
            "Plain text extracted from HTML, keeping line structure; null for null input",
            1,
            Some(1),
            |args| match opt_string_arg("txt.htmlToText", args, 0)? {
                Some(html) => Ok(Value::String(html_to_text(&html))),
                None => Ok(Value::Null),
            },
        ),
        FunctionDef::new(
            PREFIX,
            "htmlToSingleLineText",
            cat,
            "Plain text extracted from HTML on a single line; null for null input",
            1,
            Some(1),
            |args| match opt_string_arg("txt.htmlToSingleLineText", args, 0)? {
                Some(html) => Ok(Value::String(html_to_single_line(&html))),
                None => Ok(Value::Null),
            },
        ),
        FunctionDef::new(
            PREFIX,
            "unescape",
            cat,
            "Convert \\n, \\t, \\r and \\\\ escape sequences into the characters they denote",
            1,
            Some(1),
            |args| Ok(Value::String(unescape(&string_arg("txt.unescape", args, 0)?))),
        ),
        FunctionDef::new(
            PREFIX,
            "abbreviate",
            cat,
            "Shorten text to at most maxWidth characters, ending in '...'",
            2,
            Some(2),
            |args| {
                let text = string_arg("txt.abbreviate", args, 0)?;
                let max = int_arg("txt.abbreviate", args, 1)?;
                if max < 4 {
                    return Err(ExprError::function("txt.abbreviate", "maxWidth must be at least 4"));
                }
                Ok(Value::String(abbreviate(&text, max as usize)))
            },
        ),
    ]
}

/// Arguments with arrays expanded into their elements.
fn flatten(args: &[Value]) -> Vec<Value> {
    let mut items = Vec::new();
    for arg in args {
        match arg {
            Value::Array(values) => items.extend(values.iter().cloned()),
            other => items.push(other.clone()),
        }
    }
    items
}

fn abbreviate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max - 3).collect();
    format!("{}...", head)
}

static SCRIPT_OR_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("static regex"));
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|pre|ul|ol|table)\s*>").expect("static regex")
});
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li[^>]*>").expect("static regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(x?[0-9a-fA-F]+);").expect("static regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

pub(super) fn html_to_text(html: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(html, "");
    let text = LIST_ITEM.replace_all(&text, "- ");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

pub(super) fn html_to_single_line(html: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(html, "");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let code = &caps[1];
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        parsed
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
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
    fn join_unescapes_delimiter() {
        assert_eq!(
            call("join", &[json!(r"\n"), json!(["a", 1, null])]).unwrap(),
            json!("a\n1\n")
        );
        assert_eq!(call("join", &[json!("-"), json!("a"), json!("b")]).unwrap(), json!("a-b"));
        assert_eq!(call("join", &[json!(",")]).unwrap(), json!(""));
    }

    #[test]
    fn join_or_null() {
        assert_eq!(call("joinOrNull", &[json!(":"), json!("a"), json!("b")]).unwrap(), json!("a:b"));
        assert_eq!(call("joinOrNull", &[json!(":"), json!("a"), json!(null)]).unwrap(), json!(null));
    }

    #[test]
    fn regex_helpers() {
        assert_eq!(call("regexQuote", &[json!("a.b*")]).unwrap(), json!(r"a\.b\*"));
        assert_eq!(
            call(
                "replaceAllFromRegExMap",
                &[json!("foo-123"), json!({"[0-9]+": "N", "^foo": "bar"})]
            )
            .unwrap(),
            json!("bar-N")
        );
        assert!(call("replaceAllFromRegExMap", &[json!("x"), json!("y")]).is_err());
    }

    #[test]
    fn lists_and_repeat() {
        assert_eq!(call("numberedList", &[json!(["a", "b"])]).unwrap(), json!("1. a\n2. b\n"));
        assert_eq!(call("repeat", &[json!("="), json!(3)]).unwrap(), json!("==="));
        assert_eq!(call("repeat", &[json!("="), json!(-1)]).unwrap(), json!(""));
        assert_eq!(call("abbreviate", &[json!("abcdefgh"), json!(6)]).unwrap(), json!("abc..."));
        assert_eq!(call("abbreviate", &[json!("abc"), json!(6)]).unwrap(), json!("abc"));
    }

    #[test]
    fn html_conversion() {
        let html = "<p>Hello&nbsp;<b>world</b></p><ul><li>one</li><li>two &amp; three</li></ul>";
        assert_eq!(
            call("htmlToText", &[json!(html)]).unwrap(),
            json!("Hello world\n- one\n- two & three")
        );
        assert_eq!(
            call("htmlToSingleLineText", &[json!("<p>a</p>\n<p>b &#65;</p>")]).unwrap(),
            json!("a b A")
        );
        assert_eq!(call("htmlToText", &[json!(null)]).unwrap(), json!(null));
    }
}
