//! Product-specific expression functions, registered per backend.

use fcli_core::ProductKind;
use fcli_expr::{render, ExprError, ExprResult, FunctionCategory, FunctionDef};
use serde_json::Value;
use std::sync::Arc;

/// Base and UI URLs of one backend, without trailing slashes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUrls {
    pub base_url: String,
    pub browser_url: String,
}

impl ProductUrls {
    pub fn new(product: ProductKind, base_url: &str, browser_url: Option<&str>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let browser_url = match browser_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => derive_browser_url(product, &base_url),
        };
        Self {
            base_url,
            browser_url,
        }
    }

    fn browser_link(&self, path: &str) -> String {
        if path.is_empty() {
            self.browser_url.clone()
        } else {
            format!("{}/{}", self.browser_url, path.trim_start_matches('/'))
        }
    }
}

/// FoD API hosts are `api.<region>`; the UI lives on `<region>`.
fn derive_browser_url(product: ProductKind, base_url: &str) -> String {
    match product {
        ProductKind::Fod => base_url.replacen("://api.", "://", 1),
        _ => base_url.to_string(),
    }
}

/// Function prefix for a backend name; identifiers cannot contain '-'.
pub fn function_prefix(backend: &str) -> String {
    backend.replace('-', "_")
}

/// Functions exposed under the backend's prefix: `baseUrl()`, `browserUrl(path?)` and the
/// product's deep links.
pub fn product_functions(backend: &str, product: ProductKind, urls: &ProductUrls) -> Vec<FunctionDef> {
    let prefix = function_prefix(backend);
    let urls = Arc::new(urls.clone());
    let mut defs = Vec::new();

    let u = urls.clone();
    defs.push(def(&prefix, "baseUrl", "Base URL of the backend", 0, Some(0), move |_| {
        Ok(Value::String(u.base_url.clone()))
    }));
    let u = urls.clone();
    defs.push(def(
        &prefix,
        "browserUrl",
        "Browser URL of the backend, optionally with a path appended",
        0,
        Some(1),
        move |args| {
            let path = args.first().map(render).unwrap_or_default();
            Ok(Value::String(u.browser_link(&path)))
        },
    ));

    match product {
        ProductKind::Ssc => {
            let u = urls.clone();
            let fname = format!("{}.issueBrowserUrl", prefix);
            defs.push(def(
                &prefix,
                "issueBrowserUrl",
                "Browser URL of an issue, optionally within a filter set",
                1,
                Some(2),
                move |args| {
                    let issue = &args[0];
                    let mut link = u.browser_link(&format!(
                        "html/ssc/version/{}/fix/{}/?engineType={}&issue={}",
                        field(&fname, issue, "projectVersionId")?,
                        field(&fname, issue, "id")?,
                        field(&fname, issue, "engineType")?,
                        field(&fname, issue, "issueInstanceId")?,
                    ));
                    if let Some(guid) = filter_set_guid(args.get(1)) {
                        link.push_str(&format!("&filterSet={}", guid));
                    }
                    Ok(Value::String(link))
                },
            ));
            let u = urls.clone();
            let fname = format!("{}.appversionBrowserUrl", prefix);
            defs.push(def(
                &prefix,
                "appversionBrowserUrl",
                "Browser URL of an application version, optionally within a filter set",
                1,
                Some(2),
                move |args| {
                    let mut link = u.browser_link(&format!(
                        "html/ssc/version/{}/audit",
                        field(&fname, &args[0], "id")?
                    ));
                    if let Some(guid) = filter_set_guid(args.get(1)) {
                        link.push_str(&format!("?filterSet={}", guid));
                    }
                    Ok(Value::String(link))
                },
            ));
        }
        ProductKind::Fod => {
            for (name, description, segment, id_field) in [
                ("issueBrowserUrl", "Browser URL of an issue", "Issues", "vulnId"),
                ("releaseBrowserUrl", "Browser URL of a release", "Releases", "releaseId"),
                ("appBrowserUrl", "Browser URL of an application", "Applications", "applicationId"),
            ] {
                let u = urls.clone();
                let fname = format!("{}.{}", prefix, name);
                defs.push(def(&prefix, name, description, 1, Some(1), move |args| {
                    let id = field(&fname, &args[0], id_field)?;
                    Ok(Value::String(u.browser_link(&format!("redirect/{}/{}", segment, id))))
                }));
            }
        }
        _ => {}
    }
    defs
}

fn def<F>(
    prefix: &str,
    name: &str,
    description: &str,
    min_args: usize,
    max_args: Option<usize>,
    func: F,
) -> FunctionDef
where
    F: Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
{
    FunctionDef::new(prefix, name, FunctionCategory::Product, description, min_args, max_args, func)
}

fn field(fname: &str, object: &Value, name: &str) -> ExprResult<String> {
    match object.get(name) {
        Some(value) if !value.is_null() => Ok(render(value)),
        _ => Err(ExprError::function(fname, format!("argument has no '{}' property", name))),
    }
}

fn filter_set_guid(arg: Option<&Value>) -> Option<String> {
    match arg? {
        Value::Null => None,
        Value::String(guid) => Some(guid.clone()),
        other => other.get("guid").map(render),
    }
}
