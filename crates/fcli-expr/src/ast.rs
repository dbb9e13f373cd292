use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Var(String),
    Member {
        target: Box<Expr>,
        name: String,
        safe: bool,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// `prefix.name(args)` function, `value.name(args)` method or bare `name(args)`.
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        safe: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Direct sub-expressions in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Var(_) => Vec::new(),
            Expr::Array(items) => items.iter().collect(),
            Expr::Object(entries) => entries.iter().map(|(_, e)| e).collect(),
            Expr::Member { target, .. } => vec![&**target],
            Expr::Index { target, index } => vec![&**target, &**index],
            Expr::Call { target, args, .. } => target.iter().map(|t| &**t).chain(args).collect(),
            Expr::Unary { operand, .. } => vec![&**operand],
            Expr::Binary { left, right, .. } => vec![&**left, &**right],
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => vec![&**condition, &**then, &**otherwise],
        }
    }

    /// Visit this expression and all nested sub-expressions, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Like [`Expr::walk`], but skips the identifier of `prefix.name(..)` calls
    /// whose prefix `is_prefix` accepts, so every visited `Var` is a variable reference.
    pub fn walk_references<'a>(&'a self, is_prefix: &dyn Fn(&str) -> bool, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        let skip_target = self.call_prefix().map_or(false, is_prefix);
        for (i, child) in self.children().into_iter().enumerate() {
            if skip_target && i == 0 {
                continue;
            }
            child.walk_references(is_prefix, visit);
        }
    }

    /// For `prefix.name(..)` calls, the identifier in prefix position.
    pub fn call_prefix(&self) -> Option<&str> {
        match self {
            Expr::Call {
                target: Some(target),
                ..
            } => match target.as_ref() {
                Expr::Var(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}
