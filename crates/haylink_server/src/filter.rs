//! Read filters.
//!
//! Supports tag presence (`point`) and equality (`siteRef == @s1`), joined
//! with `and`. Literals are quoted strings, refs, `true`/`false` and numbers.

use crate::error::{ServerError, ServerResult};
use haylink_protocol::{EntityRef, Row, Value};

/// A parsed read filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Has(String),
    Equals(String, Value),
}

impl Filter {
    /// Parses a filter expression.
    pub fn parse(text: &str) -> ServerResult<Self> {
        let mut clauses = Vec::new();
        let mut current = Vec::new();
        for word in text.split_whitespace() {
            if word == "and" {
                clauses.push(Clause::parse(&current.join(" "))?);
                current.clear();
            } else {
                current.push(word);
            }
        }
        clauses.push(Clause::parse(&current.join(" "))?);
        Ok(Self { clauses })
    }

    /// Returns true if the row satisfies every clause.
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|clause| clause.matches(row))
    }
}

impl Clause {
    fn parse(text: &str) -> ServerResult<Self> {
        match text.split_once("==") {
            Some((tag, literal)) => Ok(Clause::Equals(
                parse_tag(tag.trim())?,
                parse_literal(literal.trim())?,
            )),
            None => Ok(Clause::Has(parse_tag(text.trim())?)),
        }
    }

    fn matches(&self, row: &Row) -> bool {
        match self {
            Clause::Has(tag) => row.get(tag).is_some_and(|value| !value.is_null()),
            Clause::Equals(tag, expected) => row.get(tag).is_some_and(|actual| same(actual, expected)),
        }
    }
}

fn parse_tag(text: &str) -> ServerResult<String> {
    let valid = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(text.to_string())
    } else {
        Err(ServerError::InvalidRequest(format!("invalid tag name {text:?}")))
    }
}

fn parse_literal(text: &str) -> ServerResult<Value> {
    if let Some(inner) = text.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        return Ok(Value::Str(inner.to_string()));
    }
    if text.starts_with('@') {
        return EntityRef::parse(text)
            .map(Value::reference)
            .map_err(|err| ServerError::InvalidRequest(err.to_string()));
    }
    match text {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    text.parse::<f64>()
        .map(Value::number)
        .map_err(|_| ServerError::InvalidRequest(format!("invalid literal {text:?}")))
}

// Units are ignored for numbers and display names for refs.
fn same(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number { value: a, .. }, Value::Number { value: b, .. }) => a == b,
        (Value::Ref { id: a, .. }, Value::Ref { id: b, .. }) => a == b,
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Row {
        Row::new()
            .with("id", EntityRef::new("p1"))
            .with("point", Value::Marker)
            .with("siteRef", EntityRef::new("s1"))
            .with("kind", "Number")
            .with("curVal", Value::number_with_unit(72.0, "°F"))
            .with("enabled", true)
    }

    #[test]
    fn tag_presence() {
        assert!(Filter::parse("point").unwrap().matches(&point()));
        assert!(!Filter::parse("equip").unwrap().matches(&point()));
    }

    #[test]
    fn equality_literals() {
        let row = point();
        assert!(Filter::parse("siteRef == @s1").unwrap().matches(&row));
        assert!(!Filter::parse("siteRef == @s2").unwrap().matches(&row));
        assert!(Filter::parse("kind == \"Number\"").unwrap().matches(&row));
        assert!(Filter::parse("curVal == 72").unwrap().matches(&row));
        assert!(Filter::parse("enabled == true").unwrap().matches(&row));
    }

    #[test]
    fn conjunction() {
        let row = point();
        assert!(Filter::parse("point and siteRef==@s1").unwrap().matches(&row));
        assert!(!Filter::parse("point and equip").unwrap().matches(&row));
    }

    #[test]
    fn rejects_malformed() {
        assert!(Filter::parse("").is_err());
        assert!(Filter::parse("point and").is_err());
        assert!(Filter::parse("kind == Number").is_err());
        assert!(Filter::parse("1abc").is_err());
    }
}
