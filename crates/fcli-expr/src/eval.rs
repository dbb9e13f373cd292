use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::coerce::{as_bool, coerce, render, type_name, unescape, ExpectedType};
use crate::error::{ExprError, ExprResult};
use crate::functions::FunctionRegistry;
use crate::methods::call_method;
use crate::template::{Segment, Template, ValueTemplate};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

/// Read access to the variables an expression may reference.
pub trait Variables {
    fn get(&self, name: &str) -> Option<&Value>;
}

impl Variables for Map<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        Map::get(self, name)
    }
}

impl<S: BuildHasher> Variables for HashMap<String, Value, S> {
    fn get(&self, name: &str) -> Option<&Value> {
        HashMap::get(self, name)
    }
}

impl Variables for IndexMap<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        IndexMap::get(self, name)
    }
}

/// One extra binding layered over another set of variables.
pub struct WithBinding<'a> {
    base: &'a dyn Variables,
    name: &'a str,
    value: &'a Value,
}

impl<'a> WithBinding<'a> {
    pub fn new(base: &'a dyn Variables, name: &'a str, value: &'a Value) -> Self {
        Self { base, name, value }
    }
}

impl Variables for WithBinding<'_> {
    fn get(&self, name: &str) -> Option<&Value> {
        if name == self.name {
            Some(self.value)
        } else {
            self.base.get(name)
        }
    }
}

/// Evaluates parsed templates against a set of variables, resolving function calls
/// through the registry it was built with.
#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: Arc<FunctionRegistry>,
}

impl Evaluator {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Evaluate a template and coerce the result.
    ///
    /// A template made of a single `${...}` yields the raw value; literal text is
    /// returned unchanged.
    pub fn evaluate(
        &self,
        template: &Template,
        vars: &dyn Variables,
        expected: ExpectedType,
    ) -> ExprResult<Value> {
        let value = self.evaluate_template(template, vars, false)?;
        coerce(value, expected)
    }

    pub fn evaluate_bool(&self, template: &Template, vars: &dyn Variables) -> ExprResult<bool> {
        let value = self.evaluate_template(template, vars, false)?;
        as_bool(&value)
    }

    /// Evaluate a template for display: escape sequences in its literal text
    /// become control characters.
    pub fn render_text(&self, template: &Template, vars: &dyn Variables) -> ExprResult<String> {
        let value = self.evaluate_template(template, vars, true)?;
        Ok(render(&value))
    }

    pub fn evaluate_value(&self, template: &ValueTemplate, vars: &dyn Variables) -> ExprResult<Value> {
        self.evaluate_structure(template, vars, false)
    }

    /// Like [`Evaluator::evaluate_value`], with string leaves rendered for display.
    pub fn evaluate_record(&self, template: &ValueTemplate, vars: &dyn Variables) -> ExprResult<Value> {
        self.evaluate_structure(template, vars, true)
    }

    fn evaluate_structure(
        &self,
        template: &ValueTemplate,
        vars: &dyn Variables,
        unescape_literals: bool,
    ) -> ExprResult<Value> {
        Ok(match template {
            ValueTemplate::Null => Value::Null,
            ValueTemplate::Bool(b) => Value::Bool(*b),
            ValueTemplate::Number(n) => Value::Number(n.clone()),
            ValueTemplate::Text(t) => self.evaluate_template(t, vars, unescape_literals)?,
            ValueTemplate::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.evaluate_structure(item, vars, unescape_literals))
                    .collect::<ExprResult<Vec<_>>>()?,
            ),
            ValueTemplate::Object(entries) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    map.insert(key.clone(), self.evaluate_structure(item, vars, unescape_literals)?);
                }
                Value::Object(map)
            }
        })
    }

    fn evaluate_template(
        &self,
        template: &Template,
        vars: &dyn Variables,
        unescape_literals: bool,
    ) -> ExprResult<Value> {
        if let Some(expr) = template.single_expression() {
            return self.eval_expr(expr, vars);
        }
        let mut text = String::new();
        for segment in template.segments() {
            match segment {
                Segment::Text(literal) if unescape_literals => text.push_str(&unescape(literal)),
                Segment::Text(literal) => text.push_str(literal),
                Segment::Expr { expr, .. } => text.push_str(&render(&self.eval_expr(expr, vars)?)),
            }
        }
        Ok(Value::String(text))
    }

    pub fn eval_expr(&self, expr: &Expr, vars: &dyn Variables) -> ExprResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval_expr(item, vars))
                    .collect::<ExprResult<Vec<_>>>()?,
            )),
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    map.insert(key.clone(), self.eval_expr(item, vars)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Var(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::UndefinedVariable(name.clone())),
            Expr::Member { target, name, safe } => {
                let value = self.eval_expr(target, vars)?;
                member(value, name, *safe)
            }
            Expr::Index { target, index } => {
                let value = self.eval_expr(target, vars)?;
                let index = self.eval_expr(index, vars)?;
                element(value, &index)
            }
            Expr::Call {
                target,
                name,
                args,
                safe,
            } => self.call(target.as_deref(), name, args, *safe, vars),
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(operand, vars)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!as_bool(&value)?)),
                    UnaryOp::Neg => match value {
                        Value::Number(n) => match n.as_i64().and_then(i64::checked_neg) {
                            Some(i) => Ok(Value::from(i)),
                            None => float(-n.as_f64().unwrap_or_default()),
                        },
                        other => Err(ExprError::evaluation(format!(
                            "cannot negate {}",
                            type_name(&other)
                        ))),
                    },
                }
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    if !as_bool(&self.eval_expr(left, vars)?)? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(as_bool(&self.eval_expr(right, vars)?)?))
                }
                BinaryOp::Or => {
                    if as_bool(&self.eval_expr(left, vars)?)? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(as_bool(&self.eval_expr(right, vars)?)?))
                }
                BinaryOp::Coalesce => match self.eval_expr(left, vars)? {
                    Value::Null => self.eval_expr(right, vars),
                    value => Ok(value),
                },
                op => {
                    let l = self.eval_expr(left, vars)?;
                    let r = self.eval_expr(right, vars)?;
                    binary(*op, l, r)
                }
            },
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if as_bool(&self.eval_expr(condition, vars)?)? {
                    self.eval_expr(then, vars)
                } else {
                    self.eval_expr(otherwise, vars)
                }
            }
        }
    }

    fn call(
        &self,
        target: Option<&Expr>,
        name: &str,
        args: &[Expr],
        safe: bool,
        vars: &dyn Variables,
    ) -> ExprResult<Value> {
        let prefix = match target {
            None => Some(""),
            Some(Expr::Var(p)) if self.registry.is_prefix(p) => Some(p.as_str()),
            Some(_) => None,
        };

        if let Some(prefix) = prefix {
            let function = self.registry.get(prefix, name).ok_or_else(|| {
                ExprError::UndefinedFunction(qualified_name(prefix, name))
            })?;
            let values = self.eval_args(args, vars)?;
            return function.call(&values);
        }

        // a method call on a value
        let receiver = match target {
            Some(expr) => self.eval_expr(expr, vars)?,
            None => Value::Null,
        };
        if receiver.is_null() {
            if safe {
                return Ok(Value::Null);
            }
            return Err(ExprError::evaluation(format!(
                "cannot call method '{}' on null",
                name
            )));
        }
        let values = self.eval_args(args, vars)?;
        call_method(&receiver, name, &values)
    }

    fn eval_args(&self, args: &[Expr], vars: &dyn Variables) -> ExprResult<Vec<Value>> {
        args.iter().map(|arg| self.eval_expr(arg, vars)).collect()
    }
}

pub(crate) fn qualified_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn member(value: Value, name: &str, safe: bool) -> ExprResult<Value> {
    match value {
        Value::Object(mut map) => Ok(map.remove(name).unwrap_or(Value::Null)),
        Value::Null if safe => Ok(Value::Null),
        Value::Null => Err(ExprError::evaluation(format!(
            "cannot access property '{}' of null (use '?.' for optional values)",
            name
        ))),
        other => Err(ExprError::evaluation(format!(
            "cannot access property '{}' of {}",
            name,
            type_name(&other)
        ))),
    }
}

fn element(value: Value, index: &Value) -> ExprResult<Value> {
    match (value, index) {
        (Value::Array(mut items), Value::Number(n)) => {
            let idx = n
                .as_i64()
                .ok_or_else(|| ExprError::evaluation(format!("invalid array index {}", n)))?;
            if idx < 0 || idx as usize >= items.len() {
                Ok(Value::Null)
            } else {
                Ok(items.swap_remove(idx as usize))
            }
        }
        (Value::Object(mut map), Value::String(key)) => Ok(map.remove(key).unwrap_or(Value::Null)),
        (Value::Null, _) => Err(ExprError::evaluation("cannot index into null")),
        (other, index) => Err(ExprError::evaluation(format!(
            "cannot index {} with {}",
            type_name(&other),
            type_name(index)
        ))),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> ExprResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .partial_cmp(&b.as_f64())
                    .ok_or_else(|| ExprError::evaluation("cannot compare numbers"))?,
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    return Err(ExprError::evaluation(format!(
                        "cannot compare {} with {}",
                        type_name(&l),
                        type_name(&r)
                    )))
                }
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Add if l.is_string() || r.is_string() => {
            Ok(Value::String(format!("{}{}", render(&l), render(&r))))
        }
        BinaryOp::Add if l.is_array() && r.is_array() => {
            let mut items = match l {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            if let Value::Array(more) = r {
                items.extend(more);
            }
            Ok(Value::Array(items))
        }
        _ => match (&l, &r) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            _ => Err(ExprError::evaluation(format!(
                "unsupported operands for {:?}: {} and {}",
                op,
                type_name(&l),
                type_name(&r)
            ))),
        },
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> ExprResult<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div if y == 0 => return Err(ExprError::evaluation("division by zero")),
            // i64::MIN / -1 overflows and falls through to the float path.
            BinaryOp::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            BinaryOp::Div => None,
            BinaryOp::Rem if y == 0 => return Err(ExprError::evaluation("division by zero")),
            BinaryOp::Rem if y == -1 => Some(0),
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }
    let x = a.as_f64().unwrap_or_default();
    let y = b.as_f64().unwrap_or_default();
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div if y == 0.0 => return Err(ExprError::evaluation("division by zero")),
        BinaryOp::Div => x / y,
        BinaryOp::Rem if y == 0.0 => return Err(ExprError::evaluation("division by zero")),
        BinaryOp::Rem => x % y,
        other => {
            return Err(ExprError::evaluation(format!(
                "{:?} is not an arithmetic operator",
                other
            )))
        }
    };
    float(result)
}

fn float(value: f64) -> ExprResult<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ExprError::evaluation("arithmetic result is not a finite number"))
}

/// Structural equality where numbers compare by numeric value (`1 == 1.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluator() -> Evaluator {
        Evaluator::new(Arc::new(FunctionRegistry::builtin().unwrap()))
    }

    fn vars() -> Map<String, Value> {
        json!({
            "rel": {"id": 7, "name": "1.0", "project": {"name": "APP"}},
            "issues": [{"id": 1}, {"id": 2}],
            "empty": null,
            "n": 3
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn eval(src: &str) -> ExprResult<Value> {
        evaluator().evaluate(&Template::parse(src)?, &vars(), ExpectedType::Any)
    }

    #[test]
    fn single_expression_keeps_raw_value() {
        assert_eq!(eval("${rel.project}").unwrap(), json!({"name": "APP"}));
        assert_eq!(eval("${n}").unwrap(), json!(3));
    }

    #[test]
    fn interpolation_renders_text() {
        assert_eq!(
            eval("Release ${rel.project.name}:${rel.name} has ${issues.size()} issues").unwrap(),
            json!("Release APP:1.0 has 2 issues")
        );
        assert_eq!(eval("[${empty}]").unwrap(), json!("[]"));
    }

    #[test]
    fn literal_text_is_returned_unchanged() {
        for text in ["plain", r"tab\there", "", "50% of $"] {
            assert_eq!(eval(text).unwrap(), json!(text));
        }
    }

    #[test]
    fn render_text_unescapes_literals_only() {
        let e = evaluator();
        let mut v = vars();
        v.insert("raw".into(), json!(r"a\nb"));
        let template = Template::parse(r"line1\n${raw}").unwrap();
        assert_eq!(e.render_text(&template, &v).unwrap(), "line1\na\\nb");
    }

    #[test]
    fn navigation_rules() {
        assert_eq!(eval("${rel.missing}").unwrap(), json!(null));
        assert_eq!(eval("${empty?.name}").unwrap(), json!(null));
        assert_eq!(eval("${issues[1].id}").unwrap(), json!(2));
        assert_eq!(eval("${issues[5]}").unwrap(), json!(null));
        assert_eq!(eval("${rel['name']}").unwrap(), json!("1.0"));
        assert!(matches!(
            eval("${empty.name}"),
            Err(ExprError::Evaluation(_))
        ));
        assert_eq!(
            eval("${nope}"),
            Err(ExprError::UndefinedVariable("nope".into()))
        );
    }

    #[test]
    fn operators() {
        assert_eq!(eval("${n * 2 + 1}").unwrap(), json!(7));
        assert_eq!(eval("${n / 2}").unwrap(), json!(1.5));
        assert_eq!(eval("${n % 2 == 1}").unwrap(), json!(true));
        assert_eq!(eval("${'v' + n}").unwrap(), json!("v3"));
        assert_eq!(eval("${empty ?? 'default'}").unwrap(), json!("default"));
        assert_eq!(eval("${n > 2 ? 'big' : 'small'}").unwrap(), json!("big"));
        assert_eq!(eval("${empty == null && !false}").unwrap(), json!(true));
        assert_eq!(eval("${[1] + [2]}").unwrap(), json!([1, 2]));
        assert!(eval("${n / 0}").is_err());
        assert!(eval("${rel < 1}").is_err());
    }

    #[test]
    fn integer_overflow_widens_to_float() {
        let mut v = vars();
        v.insert("min".into(), json!(i64::MIN));
        let eval_min = |src: &str| evaluator().evaluate(&Template::parse(src).unwrap(), &v, ExpectedType::Any);

        assert_eq!(eval_min("${min % -1}").unwrap(), json!(0));
        assert_eq!(eval_min("${min / -1}").unwrap(), json!(9_223_372_036_854_775_808.0));
        assert_eq!(eval_min("${-min}").unwrap(), json!(9_223_372_036_854_775_808.0));
        assert_eq!(eval_min("${min * 2}").unwrap(), json!(-18_446_744_073_709_551_616.0));
        assert_eq!(eval_min("${min / 2}").unwrap(), json!(i64::MIN / 2));
        assert_eq!(eval("${-n}").unwrap(), json!(-3));
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(eval("${false && nope}").unwrap(), json!(false));
        assert_eq!(eval("${true || nope}").unwrap(), json!(true));
    }

    #[test]
    fn functions_and_methods() {
        assert_eq!(eval("${txt.join(',', ['a', 'b'])}").unwrap(), json!("a,b"));
        assert_eq!(eval("${rel.name.startsWith('1')}").unwrap(), json!(true));
        assert_eq!(eval("${empty?.size()}").unwrap(), json!(null));
        assert_eq!(
            eval("${txt.nope()}"),
            Err(ExprError::UndefinedFunction("txt.nope".into()))
        );
        assert_eq!(
            eval("${frobnicate()}"),
            Err(ExprError::UndefinedFunction("frobnicate".into()))
        );
    }

    #[test]
    fn coercion_is_applied_to_result() {
        let e = evaluator();
        let template = Template::parse("${n}").unwrap();
        assert_eq!(e.evaluate(&template, &vars(), ExpectedType::String).unwrap(), json!("3"));
        let template = Template::parse("${rel}").unwrap();
        assert!(matches!(
            e.evaluate(&template, &vars(), ExpectedType::Bool),
            Err(ExprError::TypeCoercion { .. })
        ));
    }

    #[test]
    fn structured_templates() {
        let e = evaluator();
        let template = ValueTemplate::parse(&json!({
            "id": "${rel.id}",
            "label": r"${rel.project.name}\t${rel.name}",
            "fixed": [1, true]
        }))
        .unwrap();
        assert_eq!(
            e.evaluate_value(&template, &vars()).unwrap(),
            json!({"id": 7, "label": "APP\\t1.0", "fixed": [1, true]})
        );
        assert_eq!(
            e.evaluate_record(&template, &vars()).unwrap(),
            json!({"id": 7, "label": "APP\t1.0", "fixed": [1, true]})
        );
    }

    #[test]
    fn with_binding_shadows_base() {
        let base = vars();
        let record = json!({"id": 1});
        let layered = WithBinding::new(&base, "record", &record);
        assert_eq!(layered.get("record"), Some(&record));
        assert_eq!(layered.get("n"), Some(&json!(3)));
    }
}
