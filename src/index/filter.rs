//! Filter expressions for the in-memory index.
//!
//! A small subset of the Meilisearch filter language:
//!
//! ```text
//! expr   := and ( OR and )*
//! and    := clause ( AND clause )*
//! clause := attribute ( "=" | "!=" ) value
//! value  := bare-word | 'single quoted' | "double quoted"
//! ```
//!
//! `AND` binds tighter than `OR`; keywords are case-insensitive. Only
//! attributes configured as filterable may be referenced, mirroring the
//! real engine, which rejects filters on other attributes.

use serde_json::Value;

use super::IndexError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Eq,
    NotEq,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    attribute: String,
    negated: bool,
    value: String,
}

/// A parsed filter in disjunctive normal form.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    any_of: Vec<Vec<Clause>>,
}

fn invalid(msg: impl Into<String>) -> IndexError {
    IndexError::InvalidFilter(msg.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>, IndexError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '=' {
            chars.next();
            tokens.push(Token::Eq);
        } else if c == '!' {
            chars.next();
            if chars.next() != Some('=') {
                return Err(invalid("expected `=` after `!`"));
            }
            tokens.push(Token::NotEq);
        } else if c == '"' || c == '\'' {
            let quote = c;
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some('\\') => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    Some(ch) if ch == quote => break,
                    Some(ch) => value.push(ch),
                    None => return Err(invalid("unterminated quoted value")),
                }
            }
            tokens.push(Token::Quoted(value));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || ch == '=' || ch == '!' || ch == '"' || ch == '\'' {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            match word.to_ascii_uppercase().as_str() {
                "AND" => tokens.push(Token::And),
                "OR" => tokens.push(Token::Or),
                _ => tokens.push(Token::Word(word)),
            }
        }
    }

    Ok(tokens)
}

impl Filter {
    /// Parse `input`, rejecting attributes outside `filterable`.
    pub fn parse(input: &str, filterable: &[String]) -> Result<Filter, IndexError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(invalid("filter expression is empty"));
        }

        let mut any_of = Vec::new();
        let mut current = Vec::new();
        let mut pos = 0;

        loop {
            let attribute = match tokens.get(pos) {
                Some(Token::Word(w)) => w.clone(),
                Some(other) => {
                    return Err(invalid(format!(
                        "expected an attribute name at position {}, found {:?}",
                        pos, other
                    )))
                }
                None => return Err(invalid("expected an attribute name at end of filter")),
            };
            if !filterable.iter().any(|a| a == &attribute) {
                return Err(invalid(format!(
                    "Attribute `{}` is not filterable. Available filterable attributes are: `{}`.",
                    attribute,
                    filterable.join(", ")
                )));
            }

            let negated = match tokens.get(pos + 1) {
                Some(Token::Eq) => false,
                Some(Token::NotEq) => true,
                _ => {
                    return Err(invalid(format!(
                        "expected `=` or `!=` after `{}`",
                        attribute
                    )))
                }
            };

            let value = match tokens.get(pos + 2) {
                Some(Token::Word(w)) | Some(Token::Quoted(w)) => w.clone(),
                _ => return Err(invalid(format!("expected a value for `{}`", attribute))),
            };

            current.push(Clause {
                attribute,
                negated,
                value,
            });
            pos += 3;

            match tokens.get(pos) {
                None => break,
                Some(Token::And) => pos += 1,
                Some(Token::Or) => {
                    any_of.push(std::mem::take(&mut current));
                    pos += 1;
                }
                Some(other) => {
                    return Err(invalid(format!(
                        "expected AND or OR, found {:?}",
                        other
                    )))
                }
            }
        }
        any_of.push(current);

        Ok(Filter { any_of })
    }

    /// Whether `doc` satisfies the filter.
    pub fn matches(&self, doc: &Value) -> bool {
        self.any_of
            .iter()
            .any(|all| all.iter().all(|clause| clause.matches(doc)))
    }
}

impl Clause {
    fn matches(&self, doc: &Value) -> bool {
        let hit = match doc.get(&self.attribute) {
            Some(Value::Array(items)) => items.iter().any(|v| value_equals(v, &self.value)),
            Some(v) => value_equals(v, &self.value),
            None => false,
        };
        hit != self.negated
    }
}

fn value_equals(v: &Value, expected: &str) -> bool {
    match v {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}
