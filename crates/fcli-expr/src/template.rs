//! Parsed templates: literal text mixed with `${ expr }` fragments.

use crate::ast::Expr;
use crate::error::{ExprError, ExprResult};
use crate::parser::parse_expression;
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Expr { source: String, expr: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    text: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> ExprResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        let mut consumed = 0;

        while let Some(start) = rest.find("${") {
            literal.push_str(&rest[..start]);
            let body_start = start + 2;
            let body_len = find_closing_brace(&rest[body_start..]).ok_or_else(|| {
                ExprError::syntax(text, consumed + start, "unterminated '${' expression")
            })?;
            let raw = &rest[body_start..body_start + body_len];
            let source = raw.trim();
            let leading = raw.len() - raw.trim_start().len();
            if source.is_empty() {
                return Err(ExprError::syntax(text, consumed + start, "empty expression"));
            }
            let expr = parse_expression(source).map_err(|err| match err {
                ExprError::Syntax {
                    offset, message, ..
                } => ExprError::syntax(text, consumed + body_start + leading + offset, message),
                other => other,
            })?;
            if !literal.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Expr {
                source: source.to_string(),
                expr,
            });
            let next = body_start + body_len + 1;
            consumed += next;
            rest = &rest[next..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// A template that is taken verbatim, without looking for expressions.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let segments = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Text(text.clone())]
        };
        Self { text, segments }
    }

    pub fn source(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Text(_)))
    }

    /// The expression when the template is exactly one `${...}` with no surrounding text.
    pub fn single_expression(&self) -> Option<&Expr> {
        match self.segments.as_slice() {
            [Segment::Expr { expr, .. }] => Some(expr),
            _ => None,
        }
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Expr { expr, .. } => Some(expr),
            Segment::Text(_) => None,
        })
    }
}

impl FromStr for Template {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Length of the expression body up to (not including) the matching `}`.
/// Braces inside quoted strings and nested object literals are skipped.
fn find_closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, c) in body.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '{' => depth += 1,
                '}' if depth == 0 => return Some(idx),
                '}' => depth -= 1,
                _ => {}
            },
        }
    }
    None
}

/// A structured value (request body, output record, sub-action parameters) whose
/// string leaves are templates.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueTemplate {
    Null,
    Bool(bool),
    Number(Number),
    Text(Template),
    Array(Vec<ValueTemplate>),
    Object(IndexMap<String, ValueTemplate>),
}

impl ValueTemplate {
    pub fn parse(value: &Value) -> ExprResult<Self> {
        Ok(match value {
            Value::Null => ValueTemplate::Null,
            Value::Bool(b) => ValueTemplate::Bool(*b),
            Value::Number(n) => ValueTemplate::Number(n.clone()),
            Value::String(s) => ValueTemplate::Text(Template::parse(s)?),
            Value::Array(items) => ValueTemplate::Array(
                items
                    .iter()
                    .map(ValueTemplate::parse)
                    .collect::<ExprResult<Vec<_>>>()?,
            ),
            Value::Object(map) => ValueTemplate::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), ValueTemplate::parse(v)?)))
                    .collect::<ExprResult<IndexMap<_, _>>>()?,
            ),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ValueTemplate::Null)
    }

    /// Collect every expression contained in the structure.
    pub fn expressions<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            ValueTemplate::Text(template) => out.extend(template.expressions()),
            ValueTemplate::Array(items) => items.iter().for_each(|item| item.expressions(out)),
            ValueTemplate::Object(map) => map.values().for_each(|item| item.expressions(out)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_text_and_expressions() {
        let template = Template::parse("Release ${release.name} has ${issues.size()} issues").unwrap();
        let kinds: Vec<bool> = template
            .segments()
            .iter()
            .map(|s| matches!(s, Segment::Text(_)))
            .collect();
        assert_eq!(kinds, vec![true, false, true, false, true]);
        assert!(template.single_expression().is_none());
        assert_eq!(template.expressions().count(), 2);
    }

    #[test]
    fn single_expression_is_detected() {
        let template = Template::parse("${ rel }").unwrap();
        assert_eq!(template.single_expression(), Some(&Expr::Var("rel".into())));
    }

    #[test]
    fn braces_inside_expressions() {
        let template = Template::parse("${ {id: '}'}.id }!").unwrap();
        assert_eq!(template.expressions().count(), 1);
        assert_eq!(template.segments().last(), Some(&Segment::Text("!".into())));
    }

    #[test]
    fn plain_text_and_lone_dollars_are_literal() {
        let template = Template::parse("costs $5 {not an expr}").unwrap();
        assert!(template.is_literal());
        assert_eq!(template.source(), "costs $5 {not an expr}");
    }

    #[test]
    fn syntax_errors_report_template_offsets() {
        let err = Template::parse("abc ${a +}").unwrap_err();
        match err {
            ExprError::Syntax { text, offset, .. } => {
                assert_eq!(text, "abc ${a +}");
                assert_eq!(offset, 9);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(Template::parse("x ${a").is_err());
        assert!(Template::parse("${ }").is_err());
    }

    #[test]
    fn value_templates_preserve_structure() {
        let value = json!({"id": "${rel.id}", "tags": ["a", 1, null], "flag": true});
        let template = ValueTemplate::parse(&value).unwrap();
        let mut exprs = Vec::new();
        template.expressions(&mut exprs);
        assert_eq!(exprs.len(), 1);
        match template {
            ValueTemplate::Object(map) => {
                assert_eq!(map.keys().collect::<Vec<_>>(), vec!["id", "tags", "flag"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
