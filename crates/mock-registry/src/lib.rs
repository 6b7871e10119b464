//! # Mock Registry
//!
//! Scope-scoped mock lifecycle management for Tabletop suites.
//!
//! A mock declares how to activate itself ([`Mock::begin`]) and hands
//! back a [`MockHandle`] that undoes the activation. The
//! [`MockRegistry`] tracks which handles are live per scope (scenario
//! or feature), so teardown at the end of a scope can end exactly the
//! mocks that belong to it — no global stop-everything exists.
//!
//! The registry is a constructed object, injected wherever activation
//! steps run; nothing here is a module-level singleton.

mod builtin;
mod clock;
mod registry;

pub use builtin::{CallLog, EnvVarMock, RecordingMock};
pub use clock::{FrozenClockMock, TestClock};
pub use registry::{Mock, MockError, MockHandle, MockRegistry, Scope};
