//! Built-in mocks: environment variables and call recording.

use crate::registry::{Mock, MockError, MockHandle};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mocks process environment variables for a scope. Arguments are the
/// variables to set; with `clear_first` the environment holds only the
/// variables accounted for. The prior environment is restored when the
/// handle ends.
pub struct EnvVarMock {
    clear_first: bool,
}

impl EnvVarMock {
    pub fn new(clear_first: bool) -> Self {
        Self { clear_first }
    }
}

impl Mock for EnvVarMock {
    fn begin(&self, args: &BTreeMap<String, String>) -> Result<Box<dyn MockHandle>, MockError> {
        let snapshot: Vec<(String, String)> = std::env::vars().collect();
        if self.clear_first {
            for (key, _) in &snapshot {
                std::env::remove_var(key);
            }
        }
        for (key, value) in args {
            std::env::set_var(key, value);
        }
        Ok(Box::new(EnvVarHandle {
            snapshot,
            touched: args.keys().cloned().collect(),
            cleared: self.clear_first,
        }))
    }
}

#[derive(Debug)]
struct EnvVarHandle {
    snapshot: Vec<(String, String)>,
    touched: Vec<String>,
    cleared: bool,
}

impl MockHandle for EnvVarHandle {
    fn end(&mut self) {
        if self.cleared {
            for (key, _) in std::env::vars().collect::<Vec<_>>() {
                std::env::remove_var(&key);
            }
        } else {
            for key in &self.touched {
                std::env::remove_var(key);
            }
        }
        for (key, value) in &self.snapshot {
            std::env::set_var(key, value);
        }
    }
}

/// Shared log of the argument maps a mocked collaborator was called
/// with; the assertion step compares it against a table.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

impl std::fmt::Debug for CallLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLog")
            .field("calls", &self.calls.lock().len())
            .finish()
    }
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, args: BTreeMap<String, String>) {
        self.calls.lock().push(args);
    }

    pub fn calls(&self) -> Vec<BTreeMap<String, String>> {
        self.calls.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// A mock whose only behaviour is capturing calls into a [`CallLog`].
/// The log is cleared on begin and again on end, so recordings never
/// leak across scopes.
pub struct RecordingMock {
    log: CallLog,
}

impl RecordingMock {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

impl Mock for RecordingMock {
    fn begin(&self, _args: &BTreeMap<String, String>) -> Result<Box<dyn MockHandle>, MockError> {
        self.log.clear();
        Ok(Box::new(RecordingHandle {
            log: self.log.clone(),
        }))
    }
}

#[derive(Debug)]
struct RecordingHandle {
    log: CallLog,
}

impl MockHandle for RecordingHandle {
    fn end(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_are_set_and_restored() {
        let mock = EnvVarMock::new(false);
        let probe = "TABLETOP_ENV_MOCK_PROBE";
        std::env::remove_var(probe);

        let mut args = BTreeMap::new();
        args.insert(probe.to_string(), "on".to_string());
        let mut handle = mock.begin(&args).unwrap();
        assert_eq!(std::env::var(probe).as_deref(), Ok("on"));

        handle.end();
        assert!(std::env::var(probe).is_err());
    }

    #[test]
    fn recording_mock_captures_and_clears() {
        let log = CallLog::new();
        let mock = RecordingMock::new(log.clone());
        let mut handle = mock.begin(&BTreeMap::new()).unwrap();

        let mut call = BTreeMap::new();
        call.insert("param".to_string(), "10".to_string());
        log.record(call.clone());
        assert_eq!(log.calls(), vec![call]);

        handle.end();
        assert!(log.is_empty());
    }
}
