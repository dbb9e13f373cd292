use super::{opt_string_arg, string_arg, FunctionCategory, FunctionDef};
use crate::error::ExprError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};

const PREFIX: &str = "util";

// Regex rather than a URL parser: scan results may contain URLs that are not strictly valid.
static URI_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<serverUrl>(?:(?P<protocol>[A-Za-z]+):)?(/{0,3})(?P<host>[0-9.\-A-Za-z]+)(?::(?P<port>\d+))?)(?P<path>/(?P<relativePath>[^?#]*))?(?:\?(?P<query>[^#]*))?(?:#(?P<fragment>.*))?$",
    )
    .expect("static regex")
});

pub(super) fn functions() -> Vec<FunctionDef> {
    let cat = FunctionCategory::Utility;
    vec![
        FunctionDef::new(
            "",
            "env",
            cat,
            "Value of the given environment variable, or null if not set",
            1,
            Some(1),
            |args| {
                let name = string_arg("env", args, 0)?;
                Ok(std::env::var(name).map(Value::String).unwrap_or(Value::Null))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "uriPart",
            cat,
            "Part of a URI: serverUrl, protocol, host, port, path, relativePath, query or fragment",
            2,
            Some(2),
            |args| {
                let uri = match opt_string_arg("util.uriPart", args, 0)? {
                    Some(uri) if !uri.trim().is_empty() => uri,
                    _ => return Ok(Value::Null),
                };
                let part = string_arg("util.uriPart", args, 1)?;
                Ok(URI_PARTS
                    .captures(&uri)
                    .and_then(|caps| caps.name(&part).map(|m| Value::String(m.as_str().to_string())))
                    .unwrap_or(Value::Null))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "properties",
            cat,
            "Array of {key, value} entries for the properties of an object",
            1,
            Some(1),
            |args| match args.first() {
                Some(Value::Object(map)) => Ok(Value::Array(
                    map.iter()
                        .map(|(k, v)| json!({"key": k, "value": v}))
                        .collect(),
                )),
                Some(Value::Null) => Ok(Value::Array(Vec::new())),
                _ => Err(ExprError::function("util.properties", "argument must be an object")),
            },
        ),
        FunctionDef::new(
            PREFIX,
            "resolveAgainstCurrentWorkDir",
            cat,
            "Absolute, normalized form of a path relative to the current working directory",
            1,
            Some(1),
            |args| {
                let path = string_arg("util.resolveAgainstCurrentWorkDir", args, 0)?;
                let cwd = std::env::current_dir().map_err(|e| {
                    ExprError::function("util.resolveAgainstCurrentWorkDir", e.to_string())
                })?;
                Ok(Value::String(
                    normalize(&cwd.join(path)).to_string_lossy().into_owned(),
                ))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "toJson",
            cat,
            "Compact JSON text of a value",
            1,
            Some(1),
            |args| Ok(Value::String(args[0].to_string())),
        ),
        FunctionDef::new(
            PREFIX,
            "parseJson",
            cat,
            "Parse JSON text into a value",
            1,
            Some(1),
            |args| {
                let text = string_arg("util.parseJson", args, 0)?;
                serde_json::from_str(&text)
                    .map_err(|e| ExprError::function("util.parseJson", e.to_string()))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "coalesce",
            cat,
            "First argument that is not null",
            1,
            None,
            |args| Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        ),
    ]
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::functions::FunctionRegistry;
    use serde_json::{json, Value};

    fn call(prefix: &str, name: &str, args: &[Value]) -> Value {
        let registry = FunctionRegistry::builtin().unwrap();
        registry.get(prefix, name).unwrap().call(args).unwrap()
    }

    #[test]
    fn uri_parts() {
        let uri = json!("https://ssc.example.com:8443/ssc/api/v1?q=1#top");
        assert_eq!(call("util", "uriPart", &[uri.clone(), json!("host")]), json!("ssc.example.com"));
        assert_eq!(call("util", "uriPart", &[uri.clone(), json!("port")]), json!("8443"));
        assert_eq!(
            call("util", "uriPart", &[uri.clone(), json!("serverUrl")]),
            json!("https://ssc.example.com:8443")
        );
        assert_eq!(
            call("util", "uriPart", &[uri.clone(), json!("relativePath")]),
            json!("ssc/api/v1")
        );
        assert_eq!(call("util", "uriPart", &[uri.clone(), json!("query")]), json!("q=1"));
        assert_eq!(call("util", "uriPart", &[uri, json!("bogus")]), json!(null));
        assert_eq!(call("util", "uriPart", &[json!(""), json!("host")]), json!(null));
    }

    #[test]
    fn properties_of_object() {
        assert_eq!(
            call("util", "properties", &[json!({"a": 1, "b": [2]})]),
            json!([{"key": "a", "value": 1}, {"key": "b", "value": [2]}])
        );
    }

    #[test]
    fn env_lookup() {
        std::env::set_var("FCLI_EXPR_TEST_ENV", "value");
        assert_eq!(call("", "env", &[json!("FCLI_EXPR_TEST_ENV")]), json!("value"));
        std::env::remove_var("FCLI_EXPR_TEST_ENV");
        assert_eq!(call("", "env", &[json!("FCLI_EXPR_TEST_ENV")]), json!(null));
    }

    #[test]
    fn json_helpers() {
        assert_eq!(call("util", "toJson", &[json!({"a": [1]})]), json!(r#"{"a":[1]}"#));
        assert_eq!(call("util", "parseJson", &[json!("[1,2]")]), json!([1, 2]));
        assert_eq!(call("util", "coalesce", &[json!(null), json!(2), json!(3)]), json!(2));
    }

    #[test]
    fn resolves_relative_paths() {
        let resolved = call("util", "resolveAgainstCurrentWorkDir", &[json!("a/../b")]);
        let expected = std::env::current_dir().unwrap().join("b");
        assert_eq!(resolved, json!(expected.to_string_lossy()));
    }
}
