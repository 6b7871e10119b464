//! Property tests: the coercer inverts the canonical rendering for
//! every non-reference scalar kind.

use chrono::{DateTime, NaiveDate, Utc};
use proptest::prelude::*;
use resolve_engine::coerce;
use tabletop_core::{FieldDescriptor, ScalarKind, Value};

fn roundtrip(kind: ScalarKind, value: Value) -> Value {
    let field = FieldDescriptor::scalar("field", kind);
    coerce(&field, &value.render()).expect("rendered form coerces back")
}

proptest! {
    #[test]
    fn integers_round_trip(n in any::<i64>()) {
        prop_assert_eq!(roundtrip(ScalarKind::Integer, Value::Int(n)), Value::Int(n));
    }

    #[test]
    fn floats_round_trip(f in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
        prop_assert_eq!(roundtrip(ScalarKind::Float, Value::Float(f)), Value::Float(f));
    }

    #[test]
    fn booleans_round_trip(b in any::<bool>()) {
        prop_assert_eq!(roundtrip(ScalarKind::Boolean, Value::Bool(b)), Value::Bool(b));
    }

    #[test]
    fn text_round_trips(s in "[a-zA-Z0-9 _.-]*") {
        // The empty string renders as the `""` sentinel and comes back
        // as an empty string, not null; everything else is unchanged.
        let value = Value::Text(s.clone());
        prop_assert_eq!(roundtrip(ScalarKind::Text, value), Value::Text(s));
    }

    #[test]
    fn dates_round_trip(days in -300_000i32..300_000) {
        let date = NaiveDate::from_num_days_from_ce_opt(days + 719_163).unwrap();
        prop_assert_eq!(roundtrip(ScalarKind::Date, Value::Date(date)), Value::Date(date));
    }

    #[test]
    fn datetimes_round_trip(secs in 0i64..4_102_444_800, nanos in 0u32..1_000_000_000) {
        let dt: DateTime<Utc> = DateTime::from_timestamp(secs, nanos).unwrap();
        prop_assert_eq!(
            roundtrip(ScalarKind::DateTime, Value::DateTime(dt)),
            Value::DateTime(dt)
        );
    }

    #[test]
    fn json_numbers_round_trip(n in any::<i64>()) {
        let value = Value::Json(serde_json::json!({"n": n}));
        prop_assert_eq!(roundtrip(ScalarKind::Json, value.clone()), value);
    }
}

#[test]
fn null_round_trips_for_every_kind() {
    for kind in [
        ScalarKind::Integer,
        ScalarKind::Float,
        ScalarKind::Boolean,
        ScalarKind::Text,
        ScalarKind::Date,
        ScalarKind::DateTime,
        ScalarKind::Json,
    ] {
        assert_eq!(roundtrip(kind, Value::Null), Value::Null);
    }
}
