//! Boolean filter expressions for `query`.
//!
//! The service accepts a full expression language; [`Filter`] carries the raw
//! string to it unchanged. [`Filter::conditions`] understands the subset the
//! in-process store evaluates: `field == literal` and `field in [literals]`,
//! joined with `and` / `&&`.

use crate::error::{Result, RistobotError};
use crate::schema::{Row, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Filter(String);

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Condition {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Eq { field, value } => row.get(field) == Some(value),
            Condition::In { field, values } => {
                row.get(field).map(|v| values.contains(v)).unwrap_or(false)
            }
        }
    }
}

impl Filter {
    pub fn new(expr: impl Into<String>) -> Self {
        Filter(expr.into())
    }

    /// `field == <int>`
    pub fn eq_int(field: &str, value: i64) -> Self {
        Filter(format!("{} == {}", field, value))
    }

    /// `field == "<text>"`
    pub fn eq_str(field: &str, value: &str) -> Self {
        Filter(format!("{} == \"{}\"", field, value.replace('"', "\\\"")))
    }

    /// `field in [a, b, ...]`
    pub fn in_ints(field: &str, values: &[i64]) -> Self {
        let list: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        Filter(format!("{} in [{}]", field, list.join(", ")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into conditions; all of them must match for a row to be selected.
    pub fn conditions(&self) -> Result<Vec<Condition>> {
        let tokens = tokenize(&self.0)?;
        let mut parser = Parser { tokens, pos: 0 };
        let mut conditions = vec![parser.condition()?];
        while parser.pos < parser.tokens.len() {
            match parser.next() {
                Some(Token::And) => conditions.push(parser.condition()?),
                other => {
                    return Err(RistobotError::Filter(format!(
                        "expected `and` in `{}`, found {:?}",
                        self.0, other
                    )))
                }
            }
        }
        Ok(conditions)
    }

    pub fn matches(&self, row: &Row) -> Result<bool> {
        Ok(self.conditions()?.iter().all(|c| c.matches(row)))
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    EqEq,
    In,
    And,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(RistobotError::Filter(format!(
                                "unterminated string in `{}`",
                                expr
                            )))
                        }
                        Some('\\') => {
                            if let Some(next) = chars.get(i + 1) {
                                s.push(*next);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::Str(s)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = if text.contains('.') {
                    text.parse::<f64>().map(Value::Float).ok()
                } else {
                    text.parse::<i64>().map(Value::Int).ok()
                };
                let value = value.ok_or_else(|| {
                    RistobotError::Filter(format!("bad number `{}` in `{}`", text, expr))
                })?;
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "in" => Token::In,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(RistobotError::Filter(format!(
                    "unexpected `{}` in `{}`",
                    other, expr
                )))
            }
        }
    }

    if tokens.is_empty() {
        return Err(RistobotError::Filter("empty expression".into()));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn literal(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Literal(v)) => Ok(v),
            other => Err(RistobotError::Filter(format!("expected literal, found {:?}", other))),
        }
    }

    fn condition(&mut self) -> Result<Condition> {
        let field = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(RistobotError::Filter(format!(
                    "expected field name, found {:?}",
                    other
                )))
            }
        };

        match self.next() {
            Some(Token::EqEq) => Ok(Condition::Eq {
                field,
                value: self.literal()?,
            }),
            Some(Token::In) => {
                if self.next() != Some(Token::LBracket) {
                    return Err(RistobotError::Filter(format!("expected `[` after `{} in`", field)));
                }
                let mut values = Vec::new();
                loop {
                    if self.tokens.get(self.pos) == Some(&Token::RBracket) {
                        self.pos += 1;
                        break;
                    }
                    values.push(self.literal()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        other => {
                            return Err(RistobotError::Filter(format!(
                                "expected `,` or `]`, found {:?}",
                                other
                            )))
                        }
                    }
                }
                Ok(Condition::In { field, values })
            }
            other => Err(RistobotError::Filter(format!(
                "expected `==` or `in` after `{}`, found {:?}",
                field, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, sentence: &str) -> Row {
        let mut row = Row::new();
        row.insert("book_id".into(), Value::Int(id));
        row.insert("sentence".into(), Value::from(sentence));
        row
    }

    #[test]
    fn test_primary_key_equality() {
        let filter = Filter::eq_int("book_id", 1);
        assert_eq!(filter.as_str(), "book_id == 1");
        assert!(filter.matches(&row(1, "pera")).unwrap());
        assert!(!filter.matches(&row(2, "banana")).unwrap());
    }

    #[test]
    fn test_string_and_conjunction() {
        let filter = Filter::new("book_id in [0, 1] and sentence == 'pera'");
        assert!(filter.matches(&row(1, "pera")).unwrap());
        assert!(!filter.matches(&row(0, "mela")).unwrap());

        let filter = Filter::new("book_id == 2 && sentence == \"banana\"");
        assert!(filter.matches(&row(2, "banana")).unwrap());
    }

    #[test]
    fn test_eq_str_escapes_quotes() {
        let filter = Filter::eq_str("sentence", "say \"hi\"");
        assert!(filter.matches(&row(0, "say \"hi\"")).unwrap());
    }

    #[test]
    fn test_in_ints_builder() {
        let filter = Filter::in_ints("book_id", &[4, 5]);
        assert_eq!(filter.as_str(), "book_id in [4, 5]");
        assert_eq!(
            filter.conditions().unwrap(),
            vec![Condition::In {
                field: "book_id".into(),
                values: vec![Value::Int(4), Value::Int(5)],
            }]
        );
    }

    #[test]
    fn test_malformed_expressions() {
        for expr in [
            "",
            "book_id",
            "book_id == ",
            "book_id = 1",
            "book_id == 1 or x == 2",
            "s == 'open",
        ] {
            assert!(
                matches!(Filter::new(expr).conditions(), Err(RistobotError::Filter(_))),
                "expected failure for {:?}",
                expr
            );
        }
    }
}
