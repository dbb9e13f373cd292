//! Function registry.
//!
//! Functions are addressed by `(prefix, name)` and invoked as `prefix.name(args)`;
//! functions with an empty prefix are called bare, e.g. `env('HOME')`. The registry is
//! assembled explicitly at startup and rejects duplicate keys.

mod date;
mod fortify;
mod text;
mod util;
mod workflow;

use crate::coerce::{coerce, ExpectedType};
use crate::error::{ExprError, ExprResult};
use crate::eval::qualified_name;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionCategory {
    Text,
    Date,
    Workflow,
    Product,
    Utility,
}

impl fmt::Display for FunctionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCategory::Text => "text",
            FunctionCategory::Date => "date",
            FunctionCategory::Workflow => "workflow",
            FunctionCategory::Product => "product",
            FunctionCategory::Utility => "utility",
        };
        f.write_str(name)
    }
}

pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> ExprResult<Value> + Send + Sync>;

#[derive(Clone)]
pub struct FunctionDef {
    pub prefix: String,
    pub name: String,
    pub category: FunctionCategory,
    pub description: String,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    func: FunctionImpl,
}

impl FunctionDef {
    pub fn new<F>(
        prefix: impl Into<String>,
        name: impl Into<String>,
        category: FunctionCategory,
        description: impl Into<String>,
        min_args: usize,
        max_args: Option<usize>,
        func: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            name: name.into(),
            category,
            description: description.into(),
            min_args,
            max_args,
            func: Arc::new(func),
        }
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(&self.prefix, &self.name)
    }

    pub fn call(&self, args: &[Value]) -> ExprResult<Value> {
        let too_many = self.max_args.map(|max| args.len() > max).unwrap_or(false);
        if args.len() < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => format!("{}", max),
                Some(max) => format!("{} to {}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(ExprError::function(
                self.qualified_name(),
                format!("expected {} arguments, got {}", expected, args.len()),
            ));
        }
        (self.func)(args)
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<(String, String), FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding all built-in functions.
    pub fn builtin() -> ExprResult<Self> {
        let mut registry = Self::new();
        registry.register_all(builtin_functions())?;
        Ok(registry)
    }

    pub fn register(&mut self, def: FunctionDef) -> ExprResult<()> {
        let key = (def.prefix.clone(), def.name.clone());
        if self.functions.contains_key(&key) {
            return Err(ExprError::DuplicateFunction(def.qualified_name()));
        }
        tracing::trace!(function = %def.qualified_name(), "registered function");
        self.functions.insert(key, def);
        Ok(())
    }

    pub fn register_all(&mut self, defs: impl IntoIterator<Item = FunctionDef>) -> ExprResult<()> {
        for def in defs {
            self.register(def)?;
        }
        Ok(())
    }

    pub fn get(&self, prefix: &str, name: &str) -> Option<&FunctionDef> {
        self.functions
            .get(&(prefix.to_string(), name.to_string()))
    }

    /// Whether `name` is used as a (non-empty) function prefix. Such names are
    /// reserved and cannot be used as variable names.
    pub fn is_prefix(&self, name: &str) -> bool {
        !name.is_empty() && self.functions.keys().any(|(prefix, _)| prefix == name)
    }

    pub fn prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = Vec::new();
        for (prefix, _) in self.functions.keys() {
            if !prefix.is_empty() && !prefixes.contains(&prefix.as_str()) {
                prefixes.push(prefix);
            }
        }
        prefixes
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Definitions of all built-in functions, in registration order.
pub fn builtin_functions() -> Vec<FunctionDef> {
    let mut defs = Vec::new();
    defs.extend(text::functions());
    defs.extend(date::functions());
    defs.extend(workflow::functions());
    defs.extend(util::functions());
    defs.extend(fortify::functions());
    defs
}

// Argument helpers shared by the function modules.

pub(crate) fn string_arg(fname: &str, args: &[Value], idx: usize) -> ExprResult<String> {
    let value = args.get(idx).cloned().unwrap_or(Value::Null);
    match coerce(value, ExpectedType::String) {
        Ok(Value::String(s)) => Ok(s),
        Ok(other) => Ok(other.to_string()),
        Err(e) => Err(ExprError::function(
            fname,
            format!("argument {}: {}", idx + 1, e),
        )),
    }
}

pub(crate) fn opt_string_arg(fname: &str, args: &[Value], idx: usize) -> ExprResult<Option<String>> {
    match args.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => string_arg(fname, args, idx).map(Some),
    }
}

pub(crate) fn int_arg(fname: &str, args: &[Value], idx: usize) -> ExprResult<i64> {
    let value = args.get(idx).cloned().unwrap_or(Value::Null);
    match coerce(value, ExpectedType::Integer) {
        Ok(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ExprError::function(fname, "integer out of range")),
        Ok(_) => Err(ExprError::function(fname, "expected integer")),
        Err(e) => Err(ExprError::function(
            fname,
            format!("argument {}: {}", idx + 1, e),
        )),
    }
}

pub(crate) fn bool_arg(fname: &str, args: &[Value], idx: usize) -> ExprResult<bool> {
    let value = args.get(idx).cloned().unwrap_or(Value::Null);
    crate::coerce::as_bool(&value).map_err(|e| {
        ExprError::function(fname, format!("argument {}: {}", idx + 1, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn builtin_function_names_are_unique() {
        let defs = builtin_functions();
        let mut seen = HashSet::new();
        for def in &defs {
            assert!(
                seen.insert((def.prefix.clone(), def.name.clone())),
                "duplicate function {}",
                def.qualified_name()
            );
        }
        assert_eq!(FunctionRegistry::builtin().unwrap().len(), defs.len());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = FunctionRegistry::builtin().unwrap();
        let dup = FunctionDef::new("txt", "join", FunctionCategory::Text, "dup", 0, None, |_| {
            Ok(Value::Null)
        });
        assert_eq!(
            registry.register(dup),
            Err(ExprError::DuplicateFunction("txt.join".into()))
        );
    }

    #[test]
    fn every_category_is_populated() {
        let registry = FunctionRegistry::builtin().unwrap();
        for category in [
            FunctionCategory::Text,
            FunctionCategory::Date,
            FunctionCategory::Workflow,
            FunctionCategory::Product,
            FunctionCategory::Utility,
        ] {
            assert!(
                registry.iter().any(|f| f.category == category),
                "no function in category {}",
                category
            );
        }
    }

    #[test]
    fn prefixes_are_reserved_names() {
        let registry = FunctionRegistry::builtin().unwrap();
        assert!(registry.is_prefix("txt"));
        assert!(registry.is_prefix("date"));
        assert!(!registry.is_prefix(""));
        assert!(!registry.is_prefix("rel"));
        assert!(registry.prefixes().contains(&"fortify"));
    }

    #[test]
    fn arity_is_checked() {
        let registry = FunctionRegistry::builtin().unwrap();
        let repeat = registry.get("txt", "repeat").unwrap();
        assert!(matches!(
            repeat.call(&[json!("x")]),
            Err(ExprError::Function { .. })
        ));
        assert_eq!(repeat.call(&[json!("ab"), json!(2)]).unwrap(), json!("abab"));
    }
}
