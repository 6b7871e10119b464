//! The registry itself.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MockError {
    #[error("Mock \"{name}\" already registered, mock names must be unique")]
    AlreadyRegistered { name: String },

    #[error("Unknown mock \"{name}\". You must register the mock before you use it.")]
    Unknown { name: String },

    #[error("Mock \"{name}\" is already active")]
    AlreadyActive { name: String },

    #[error("Mock named \"{name}\" was never started, cannot be turned off")]
    NeverStarted { name: String },

    #[error("Mock \"{name}\" failed to start: {reason}")]
    BeginFailed { name: String, reason: String },
}

/// How long an activation lives before the harness tears it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Scenario,
    Feature,
}

/// Something that can be switched on, yielding a handle that switches
/// it back off.
pub trait Mock: Send + Sync {
    fn begin(&self, args: &BTreeMap<String, String>) -> Result<Box<dyn MockHandle>, MockError>;
}

/// A live activation. `end` must be idempotent; the registry calls it
/// exactly once but a mock may also be ended early by name.
pub trait MockHandle: Send + std::fmt::Debug {
    fn end(&mut self);
}

struct Activation {
    id: Uuid,
    name: String,
    handle: Box<dyn MockHandle>,
}

/// Name-to-mock registration plus scope-to-activation bookkeeping.
pub struct MockRegistry {
    mocks: Mutex<BTreeMap<String, Arc<dyn Mock>>>,
    active: Mutex<BTreeMap<Scope, Vec<Activation>>>,
}

impl std::fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRegistry")
            .field("registered", &self.mocks.lock().len())
            .field("active", &self.active_count())
            .finish()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            mocks: Mutex::new(BTreeMap::new()),
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a mock under a unique name.
    pub fn register(&self, name: &str, mock: Arc<dyn Mock>) -> Result<(), MockError> {
        let mut mocks = self.mocks.lock();
        if mocks.contains_key(name) {
            return Err(MockError::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        mocks.insert(name.to_string(), mock);
        Ok(())
    }

    /// Begin a registered mock within a scope.
    pub fn begin(
        &self,
        scope: Scope,
        name: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<Uuid, MockError> {
        let mock = self
            .mocks
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| MockError::Unknown {
                name: name.to_string(),
            })?;
        self.ensure_inactive(name)?;
        let handle = mock.begin(args)?;
        self.track(scope, name, handle)
    }

    /// Track an externally constructed activation. Used by step glue
    /// that builds a mock on the spot instead of looking one up.
    pub fn activate(
        &self,
        scope: Scope,
        name: &str,
        handle: Box<dyn MockHandle>,
    ) -> Result<Uuid, MockError> {
        self.ensure_inactive(name)?;
        self.track(scope, name, handle)
    }

    /// End one activation early, searching every scope.
    pub fn end_named(&self, name: &str) -> Result<(), MockError> {
        let mut active = self.active.lock();
        for activations in active.values_mut() {
            if let Some(index) = activations.iter().position(|a| a.name == name) {
                let mut activation = activations.remove(index);
                activation.handle.end();
                info!(mock = name, id = %activation.id, "mock ended early");
                return Ok(());
            }
        }
        Err(MockError::NeverStarted {
            name: name.to_string(),
        })
    }

    /// End every live activation of one scope, in reverse activation
    /// order.
    pub fn end_scope(&self, scope: Scope) {
        let mut activations = self
            .active
            .lock()
            .remove(&scope)
            .unwrap_or_default();
        while let Some(mut activation) = activations.pop() {
            activation.handle.end();
            info!(mock = %activation.name, id = %activation.id, ?scope, "mock ended with scope");
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active
            .lock()
            .values()
            .any(|activations| activations.iter().any(|a| a.name == name))
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().values().map(Vec::len).sum()
    }

    fn ensure_inactive(&self, name: &str) -> Result<(), MockError> {
        if self.is_active(name) {
            return Err(MockError::AlreadyActive {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn track(
        &self,
        scope: Scope,
        name: &str,
        handle: Box<dyn MockHandle>,
    ) -> Result<Uuid, MockError> {
        let id = Uuid::new_v4();
        info!(mock = name, %id, ?scope, "mock activated");
        self.active.lock().entry(scope).or_default().push(Activation {
            id,
            name: name.to_string(),
            handle,
        });
        Ok(id)
    }
}
