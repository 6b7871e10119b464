//! The test clock and its freezing mock.

use crate::registry::{Mock, MockError, MockHandle};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A clock the suite can freeze. The system under test reads time
/// through this handle instead of the wall clock.
#[derive(Clone, Default)]
pub struct TestClock {
    frozen: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl std::fmt::Debug for TestClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClock")
            .field("frozen", &*self.frozen.read())
            .finish()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.frozen.read().unwrap_or_else(Utc::now)
    }

    pub fn freeze(&self, at: DateTime<Utc>) {
        *self.frozen.write() = Some(at);
    }

    pub fn thaw(&self) {
        *self.frozen.write() = None;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.read().is_some()
    }
}

/// Freezes the shared [`TestClock`] for a scope; thawing happens when
/// the handle ends.
pub struct FrozenClockMock {
    clock: TestClock,
}

impl FrozenClockMock {
    pub fn new(clock: TestClock) -> Self {
        Self { clock }
    }
}

impl Mock for FrozenClockMock {
    fn begin(&self, args: &BTreeMap<String, String>) -> Result<Box<dyn MockHandle>, MockError> {
        let raw = args.get("at").ok_or_else(|| MockError::BeginFailed {
            name: "frozen-clock".to_string(),
            reason: "missing \"at\" argument".to_string(),
        })?;
        let at = parse_moment(raw).ok_or_else(|| MockError::BeginFailed {
            name: "frozen-clock".to_string(),
            reason: format!("cannot parse moment {raw:?}"),
        })?;
        let previous = *self.clock.frozen.read();
        self.clock.freeze(at);
        Ok(Box::new(FrozenClockHandle {
            clock: self.clock.clone(),
            previous,
        }))
    }
}

#[derive(Debug)]
struct FrozenClockHandle {
    clock: TestClock,
    previous: Option<DateTime<Utc>>,
}

impl MockHandle for FrozenClockHandle {
    fn end(&mut self) {
        match self.previous {
            Some(at) => self.clock.freeze(at),
            None => self.clock.thaw(),
        }
    }
}

fn parse_moment(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    raw.parse::<NaiveDate>()
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn freezing_pins_now_until_the_handle_ends() {
        let clock = TestClock::new();
        assert!(!clock.is_frozen());

        let mock = FrozenClockMock::new(clock.clone());
        let mut args = BTreeMap::new();
        args.insert("at".to_string(), "2024-01-30".to_string());
        let mut handle = mock.begin(&args).unwrap();

        let expected = Utc.with_ymd_and_hms(2024, 1, 30, 0, 0, 0).unwrap();
        assert_eq!(clock.now(), expected);
        assert_eq!(clock.now(), expected);

        handle.end();
        assert!(!clock.is_frozen());
    }

    #[test]
    fn nested_freezes_restore_the_previous_moment() {
        let clock = TestClock::new();
        let mock = FrozenClockMock::new(clock.clone());

        let mut outer_args = BTreeMap::new();
        outer_args.insert("at".to_string(), "2024-01-01".to_string());
        let _outer = mock.begin(&outer_args).unwrap();

        let mut inner_args = BTreeMap::new();
        inner_args.insert("at".to_string(), "2024-06-15".to_string());
        let mut inner = mock.begin(&inner_args).unwrap();

        inner.end();
        let restored = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(clock.now(), restored);
    }

    #[test]
    fn missing_argument_fails_to_begin() {
        let mock = FrozenClockMock::new(TestClock::new());
        let err = mock.begin(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, MockError::BeginFailed { .. }));
    }
}
