//! Tokenizer for the expression language

use crate::error::{ExprError, ExprResult};
use serde_json::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(Number),
    Str(String),
    True,
    False,
    Null,
    Dot,
    SafeDot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Question,
    Coalesce,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string '{}'", s),
            Token::Eof => "end of expression".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// A token together with its byte offset in the expression source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(src: &str) -> ExprResult<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let peek = chars.get(i + 1).map(|(_, c)| *c);
        let (token, consumed) = match c {
            '.' => (Token::Dot, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '{' => (Token::LBrace, 1),
            '}' => (Token::RBrace, 1),
            ',' => (Token::Comma, 1),
            ':' => (Token::Colon, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '?' => match peek {
                Some('.') => (Token::SafeDot, 2),
                Some('?') => (Token::Coalesce, 2),
                _ => (Token::Question, 1),
            },
            '!' => match peek {
                Some('=') => (Token::Ne, 2),
                _ => (Token::Not, 1),
            },
            '=' => match peek {
                Some('=') => (Token::Eq, 2),
                _ => return Err(ExprError::syntax(src, offset, "expected '==' (assignment is not supported)")),
            },
            '<' => match peek {
                Some('=') => (Token::Le, 2),
                _ => (Token::Lt, 1),
            },
            '>' => match peek {
                Some('=') => (Token::Ge, 2),
                _ => (Token::Gt, 1),
            },
            '&' => match peek {
                Some('&') => (Token::And, 2),
                _ => return Err(ExprError::syntax(src, offset, "expected '&&'")),
            },
            '|' => match peek {
                Some('|') => (Token::Or, 2),
                _ => return Err(ExprError::syntax(src, offset, "expected '||'")),
            },
            '\'' | '"' => {
                let (text, consumed) = read_string(src, &chars[i..], c)?;
                (Token::Str(text), consumed)
            }
            c if c.is_ascii_digit() => {
                let (number, consumed) = read_number(src, &chars[i..])?;
                (Token::Number(number), consumed)
            }
            c if c.is_alphabetic() || c == '_' || c == '#' => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].1.is_alphanumeric() || chars[end].1 == '_') {
                    end += 1;
                }
                let word: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                // '#' is accepted as a leading marker on function prefixes and dropped
                let word = word.trim_start_matches('#').to_string();
                if word.is_empty() {
                    return Err(ExprError::syntax(src, offset, "expected identifier after '#'"));
                }
                let token = match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                };
                (token, end - i)
            }
            other => {
                return Err(ExprError::syntax(
                    src,
                    offset,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        tokens.push(Spanned { token, offset });
        i += consumed;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: src.len(),
    });
    Ok(tokens)
}

/// Quoted string; a doubled quote character stands for a literal quote. Backslashes are
/// kept as-is so that escape sequences survive until text rendering.
fn read_string(src: &str, chars: &[(usize, char)], quote: char) -> ExprResult<(String, usize)> {
    let mut text = String::new();
    let mut i = 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            if chars.get(i + 1).map(|(_, c)| *c) == Some(quote) {
                text.push(quote);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(c);
        i += 1;
    }
    Err(ExprError::syntax(src, chars[0].0, "unterminated string literal"))
}

fn read_number(src: &str, chars: &[(usize, char)]) -> ExprResult<(Number, usize)> {
    let mut end = 0;
    while end < chars.len() && chars[end].1.is_ascii_digit() {
        end += 1;
    }
    let mut is_decimal = false;
    if end + 1 < chars.len() && chars[end].1 == '.' && chars[end + 1].1.is_ascii_digit() {
        is_decimal = true;
        end += 1;
        while end < chars.len() && chars[end].1.is_ascii_digit() {
            end += 1;
        }
    }
    let text: String = chars[..end].iter().map(|(_, c)| *c).collect();
    let offset = chars[0].0;
    let number = if is_decimal {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(|| ExprError::syntax(src, offset, format!("invalid number '{}'", text)))?
    } else {
        text.parse::<i64>()
            .map(Number::from)
            .map_err(|_| ExprError::syntax(src, offset, format!("invalid number '{}'", text)))?
    };
    Ok((number, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn tokenizes_navigation_and_operators() {
        assert_eq!(
            kinds("rel?.name ?? 'x'"),
            vec![
                Token::Ident("rel".into()),
                Token::SafeDot,
                Token::Ident("name".into()),
                Token::Coalesce,
                Token::Str("x".into()),
                Token::Eof
            ]
        );
        assert_eq!(
            kinds("a >= 1 && !b"),
            vec![
                Token::Ident("a".into()),
                Token::Ge,
                Token::Number(1.into()),
                Token::And,
                Token::Not,
                Token::Ident("b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn numbers_do_not_swallow_member_dots() {
        assert_eq!(
            kinds("1.5 + 2"),
            vec![
                Token::Number(Number::from_f64(1.5).unwrap()),
                Token::Plus,
                Token::Number(2.into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn doubled_quotes_and_backslashes_in_strings() {
        assert_eq!(kinds("'it''s'")[0], Token::Str("it's".into()));
        assert_eq!(kinds(r"'a\nb'")[0], Token::Str(r"a\nb".into()));
    }

    #[test]
    fn keywords_and_hash_prefix() {
        assert_eq!(
            kinds("#txt and not null"),
            vec![
                Token::Ident("txt".into()),
                Token::And,
                Token::Not,
                Token::Null,
                Token::Eof
            ]
        );
    }

    #[test]
    fn reports_offsets_of_bad_input() {
        let err = tokenize("a = b").unwrap_err();
        assert!(matches!(err, ExprError::Syntax { offset: 2, .. }));
        assert!(tokenize("'open").is_err());
    }
}
