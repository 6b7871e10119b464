//! Cell coercion: one string cell to one typed value.
//!
//! Pure, no I/O. Reference cells pass through unchanged here; turning
//! them into concrete references is the reference resolver's job.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tabletop_core::{FieldDescriptor, FieldKind, Result, ScalarKind, TabletopError, Value};

/// Convert a raw cell into the typed value for `field`.
///
/// The empty cell is `Null` for every kind except text, where the
/// literal sentinels `""` and `''` produce an actual empty string — a
/// plain-text table cannot otherwise distinguish "no value" from "empty
/// value". Malformed JSON is an error; every other failed scalar
/// conversion coerces to `Null` so that intentionally-invalid fixture
/// data exercises the system under test instead of the harness.
pub fn coerce(field: &FieldDescriptor, raw: &str) -> Result<Value> {
    match &field.kind {
        FieldKind::Reference { .. } | FieldKind::GenericReference { .. } => {
            if raw.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Text(raw.to_string()))
            }
        }
        FieldKind::Scalar(ScalarKind::Json) => {
            if raw.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(raw)
                .map(Value::Json)
                .map_err(|source| TabletopError::MalformedJson {
                    field: field.name.clone(),
                    raw: raw.to_string(),
                    source,
                })
        }
        FieldKind::Scalar(ScalarKind::Text) => Ok(coerce_text(raw)),
        FieldKind::Scalar(kind) => {
            if raw.is_empty() {
                return Ok(Value::Null);
            }
            Ok(coerce_scalar(*kind, raw))
        }
    }
}

fn coerce_text(raw: &str) -> Value {
    match raw {
        "" => Value::Null,
        "\"\"" | "''" => Value::Text(String::new()),
        other => Value::Text(other.to_string()),
    }
}

fn coerce_scalar(kind: ScalarKind, raw: &str) -> Value {
    match kind {
        ScalarKind::Integer => raw.parse::<i64>().map_or(Value::Null, Value::Int),
        ScalarKind::Float => raw.parse::<f64>().map_or(Value::Null, Value::Float),
        ScalarKind::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::Null,
        },
        ScalarKind::Date => raw
            .parse::<NaiveDate>()
            .map_or(Value::Null, Value::Date),
        ScalarKind::DateTime => coerce_datetime(raw),
        // Handled above; kept for exhaustiveness.
        ScalarKind::Text | ScalarKind::Json => Value::Null,
    }
}

fn coerce_datetime(raw: &str) -> Value {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Value::DateTime(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Value::DateTime(naive.and_utc());
    }
    if let Ok(date) = raw.parse::<NaiveDate>() {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Value::DateTime(naive.and_utc());
        }
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tabletop_core::Cardinality;

    fn scalar(kind: ScalarKind) -> FieldDescriptor {
        FieldDescriptor::scalar("field", kind)
    }

    #[test]
    fn empty_cell_is_null_for_every_kind() {
        for kind in [
            ScalarKind::Integer,
            ScalarKind::Float,
            ScalarKind::Boolean,
            ScalarKind::Text,
            ScalarKind::Date,
            ScalarKind::DateTime,
            ScalarKind::Json,
        ] {
            assert_eq!(coerce(&scalar(kind), "").unwrap(), Value::Null);
        }
        let reference = FieldDescriptor::reference("r", "app.Target", Cardinality::One);
        assert_eq!(coerce(&reference, "").unwrap(), Value::Null);
    }

    #[test]
    fn text_sentinels_produce_empty_string() {
        assert_eq!(
            coerce(&scalar(ScalarKind::Text), "\"\"").unwrap(),
            Value::Text(String::new())
        );
        assert_eq!(
            coerce(&scalar(ScalarKind::Text), "''").unwrap(),
            Value::Text(String::new())
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = coerce(&scalar(ScalarKind::Json), "{not json").unwrap_err();
        assert!(matches!(err, TabletopError::MalformedJson { .. }));
    }

    #[test]
    fn valid_json_parses() {
        assert_eq!(
            coerce(&scalar(ScalarKind::Json), "{\"a\": [1, 2]}").unwrap(),
            Value::Json(serde_json::json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn reference_cells_pass_through() {
        let reference = FieldDescriptor::reference("r", "app.Target", Cardinality::One);
        assert_eq!(
            coerce(&reference, "[S1]").unwrap(),
            Value::Text("[S1]".to_string())
        );
    }

    #[test]
    fn failed_scalar_conversion_is_permissive() {
        assert_eq!(coerce(&scalar(ScalarKind::Integer), "abc").unwrap(), Value::Null);
        assert_eq!(coerce(&scalar(ScalarKind::Date), "not-a-date").unwrap(), Value::Null);
        assert_eq!(coerce(&scalar(ScalarKind::Boolean), "maybe").unwrap(), Value::Null);
    }

    #[test]
    fn datetime_accepts_rfc3339_and_space_form() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 30, 12, 30, 0).unwrap();
        assert_eq!(
            coerce(&scalar(ScalarKind::DateTime), "2024-01-30T12:30:00Z").unwrap(),
            Value::DateTime(expected)
        );
        assert_eq!(
            coerce(&scalar(ScalarKind::DateTime), "2024-01-30 12:30:00").unwrap(),
            Value::DateTime(expected)
        );
    }
}
