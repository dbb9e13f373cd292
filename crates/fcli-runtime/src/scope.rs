use crate::error::{ActionError, ActionResult};
use crate::model::VariablePath;
use fcli_expr::{type_name, Variables};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Name under which resolved action parameters are bound.
pub const PARAMS: &str = "params";

/// Variables of one run. Child scopes for loop bodies and continuations are cheap
/// copies: values are shared until written.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    vars: IndexMap<String, Arc<Value>>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: Map<String, Value>) -> Self {
        let mut scope = Self::new();
        scope.vars.insert(PARAMS.to_string(), Arc::new(Value::Object(params)));
        scope
    }

    /// Scope for a nested block. Writes to the child are not visible here.
    pub fn child(&self) -> Self {
        self.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Bind a whole variable.
    pub fn bind(&mut self, name: &str, value: Value) -> ActionResult<()> {
        self.set(&VariablePath::variable(name), value)
    }

    pub fn set(&mut self, path: &VariablePath, value: Value) -> ActionResult<()> {
        if path.root == PARAMS {
            return Err(ActionError::configuration(format!(
                "'{}' is read-only and cannot be assigned",
                PARAMS
            )));
        }
        if path.segments.is_empty() && !path.append {
            self.vars.insert(path.root.clone(), Arc::new(value));
            return Ok(());
        }

        let slot = self
            .vars
            .entry(path.root.clone())
            .or_insert_with(|| Arc::new(Value::Null));
        let mut target = Arc::make_mut(slot);
        for segment in &path.segments {
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            target = match target {
                Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
                other => {
                    return Err(ActionError::configuration(format!(
                        "cannot set '{}' on {} while assigning '{}'",
                        segment,
                        type_name(other),
                        path
                    )))
                }
            };
        }

        if !path.append {
            *target = value;
            return Ok(());
        }
        match target {
            Value::Null => *target = Value::Array(vec![value]),
            Value::Array(items) => items.push(value),
            other => {
                return Err(ActionError::configuration(format!(
                    "cannot append to {} while assigning '{}'",
                    type_name(other),
                    path
                )))
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> ActionResult<Option<Value>> {
        if name == PARAMS {
            return Err(ActionError::configuration(format!(
                "'{}' is read-only and cannot be removed",
                PARAMS
            )));
        }
        Ok(self
            .vars
            .shift_remove(name)
            .map(|v| Arc::try_unwrap(v).unwrap_or_else(|shared| (*shared).clone())))
    }
}

impl Variables for VariableScope {
    fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(Arc::as_ref)
    }
}
