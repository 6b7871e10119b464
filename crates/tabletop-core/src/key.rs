//! Natural-key expressions.
//!
//! A cell names a related entity by natural key with a bracketed
//! sequence: `[S1]`, `[poll, Question]`, or nested forms such as
//! `[[poll, Question], [S1]]` for generic references. The syntax is a
//! YAML flow sequence; parsing and rendering live here so the coercer,
//! the reference resolver, and the renderer agree on one format.

use crate::schema::ScalarKind;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a natural-key sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyAtom {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Seq(Vec<KeyAtom>),
}

impl KeyAtom {
    fn from_yaml(value: &serde_yaml::Value) -> Option<Self> {
        match value {
            serde_yaml::Value::String(s) => Some(Self::Text(s.clone())),
            serde_yaml::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_yaml::Value::Sequence(seq) => seq
                .iter()
                .map(Self::from_yaml)
                .collect::<Option<Vec<_>>>()
                .map(Self::Seq),
            _ => None,
        }
    }

    /// Convert this atom to the typed value a natural-key field of the
    /// given scalar kind stores. Sequences never match a scalar kind.
    pub fn to_value(&self, kind: ScalarKind) -> Option<Value> {
        match (self, kind) {
            (Self::Text(s), ScalarKind::Text) => Some(Value::Text(s.clone())),
            (Self::Int(i), ScalarKind::Text) => Some(Value::Text(i.to_string())),
            (Self::Int(i), ScalarKind::Integer) => Some(Value::Int(*i)),
            (Self::Text(s), ScalarKind::Integer) => s.parse().ok().map(Value::Int),
            (Self::Float(f), ScalarKind::Float) => Some(Value::Float(*f)),
            (Self::Int(i), ScalarKind::Float) => Some(Value::Float(*i as f64)),
            (Self::Bool(b), ScalarKind::Boolean) => Some(Value::Bool(*b)),
            (Self::Text(s), ScalarKind::Date) => s.parse().ok().map(Value::Date),
            _ => None,
        }
    }

    fn render_scalar(text: &str) -> String {
        let needs_quotes = text.is_empty()
            || text.parse::<f64>().is_ok()
            || matches!(text, "true" | "false" | "null" | "~")
            || text != text.trim()
            || text.contains(['[', ']', ',', '"', '\'', ':', '#']);
        if needs_quotes {
            format!("\"{}\"", text.replace('"', "\\\""))
        } else {
            text.to_string()
        }
    }
}

impl fmt::Display for KeyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(&Self::render_scalar(s)),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Seq(seq) => f.write_str(&format_key(seq)),
        }
    }
}

/// Whether a raw cell is shaped like a bracketed key expression.
pub fn is_key_expr(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.starts_with('[') && trimmed.ends_with(']')
}

/// Parse a bracketed cell into its key sequence. Returns `None` when the
/// cell is not bracket-delimited or is not a well-formed flow sequence.
pub fn parse_key_expr(raw: &str) -> Option<Vec<KeyAtom>> {
    if !is_key_expr(raw) {
        return None;
    }
    let parsed: serde_yaml::Value = serde_yaml::from_str(raw.trim()).ok()?;
    match KeyAtom::from_yaml(&parsed) {
        Some(KeyAtom::Seq(atoms)) => Some(atoms),
        _ => None,
    }
}

/// Render a key sequence back to its bracketed textual form, the inverse
/// of [`parse_key_expr`].
pub fn format_key(parts: &[KeyAtom]) -> String {
    let rendered: Vec<String> = parts.iter().map(KeyAtom::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_part_key() {
        assert_eq!(
            parse_key_expr("[S1]"),
            Some(vec![KeyAtom::Text("S1".into())])
        );
    }

    #[test]
    fn parses_composite_key() {
        assert_eq!(
            parse_key_expr("[poll, Question]"),
            Some(vec![
                KeyAtom::Text("poll".into()),
                KeyAtom::Text("Question".into())
            ])
        );
    }

    #[test]
    fn parses_nested_generic_key() {
        let parsed = parse_key_expr("[[poll, Question], [Q1]]").unwrap();
        assert_eq!(
            parsed,
            vec![
                KeyAtom::Seq(vec![
                    KeyAtom::Text("poll".into()),
                    KeyAtom::Text("Question".into())
                ]),
                KeyAtom::Seq(vec![KeyAtom::Text("Q1".into())]),
            ]
        );
    }

    #[test]
    fn rejects_unbracketed_cells() {
        assert_eq!(parse_key_expr("S1"), None);
        assert_eq!(parse_key_expr("12"), None);
    }

    #[test]
    fn round_trips_through_format() {
        for raw in ["[S1]", "[poll, Question]", "[[poll, Question], [Q1]]", "[1, 2]"] {
            let parsed = parse_key_expr(raw).unwrap();
            assert_eq!(parse_key_expr(&format_key(&parsed)), Some(parsed));
        }
    }

    #[test]
    fn numeric_looking_text_is_quoted_when_rendered() {
        let key = vec![KeyAtom::Text("42".into())];
        assert_eq!(format_key(&key), "[\"42\"]");
        assert_eq!(parse_key_expr("[\"42\"]"), Some(key));
    }
}
