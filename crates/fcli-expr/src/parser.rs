//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, lowest first: ternary, `??`, `||`, `&&`, equality, relational,
//! additive, multiplicative, unary, postfix (`.`, `?.`, `[]`, calls).

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::lexer::{tokenize, Spanned, Token};
use serde_json::Value;

pub fn parse_expression(src: &str) -> ExprResult<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    let expr = parser.ternary()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {}", other.describe()))),
    }
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> ExprResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", what, self.peek().describe())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::syntax(self.src, self.offset(), message)
    }

    fn ternary(&mut self) -> ExprResult<Expr> {
        let condition = self.coalesce()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.ternary()?;
        self.expect(Token::Colon, "':' in conditional expression")?;
        let otherwise = self.ternary()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn coalesce(&mut self) -> ExprResult<Expr> {
        let mut left = self.or()?;
        while self.eat(&Token::Coalesce) {
            let right = self.or()?;
            left = binary(BinaryOp::Coalesce, left, right);
        }
        Ok(left)
    }

    fn or(&mut self) -> ExprResult<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> ExprResult<Expr> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> ExprResult<Expr> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.relational()?;
            left = binary(op, left, right);
        }
    }

    fn relational(&mut self) -> ExprResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> ExprResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> ExprResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        let op = match self.peek() {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> ExprResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot | Token::SafeDot => {
                    let safe = matches!(self.advance(), Token::SafeDot);
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        // keywords are valid property names after a dot
                        Token::True => "true".to_string(),
                        Token::False => "false".to_string(),
                        Token::Null => "null".to_string(),
                        other => {
                            return Err(self.error(format!(
                                "expected property name, found {}",
                                other.describe()
                            )))
                        }
                    };
                    if self.eat(&Token::LParen) {
                        let args = self.arguments()?;
                        expr = Expr::Call {
                            target: Some(Box::new(expr)),
                            name,
                            args,
                            safe,
                        };
                    } else {
                        expr = Expr::Member {
                            target: Box::new(expr),
                            name,
                            safe,
                        };
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.ternary()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parse call arguments after the opening parenthesis.
    fn arguments(&mut self) -> ExprResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.ternary()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen, "',' or ')'")?;
            return Ok(args);
        }
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    Ok(Expr::Call {
                        target: None,
                        name,
                        args,
                        safe: false,
                    })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::LParen => {
                let expr = self.ternary()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.ternary()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RBracket, "',' or ']'")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = match self.advance() {
                            Token::Ident(key) | Token::Str(key) => key,
                            other => {
                                return Err(self.error(format!(
                                    "expected object key, found {}",
                                    other.describe()
                                )))
                            }
                        };
                        self.expect(Token::Colon, "':' after object key")?;
                        entries.push((key, self.ternary()?));
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RBrace, "',' or '}'")?;
                        break;
                    }
                }
                Ok(Expr::Object(entries))
            }
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
