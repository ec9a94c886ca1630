//! Per-conversation session state machine.
//!
//! One [`Session`] exists per conversation key. It gates when costed
//! processing may start (via the validation gate), enforces two staged
//! timeouts (waiting-for-input and processing-in-progress) with cancellable
//! [`GuardTimer`]s, and tracks an accruing cost budget against a ceiling.
//! The [`SessionRegistry`] owns the concurrent key→session map and evicts
//! idle sessions on a TTL sweep.
//!
//! All mutation funnels through [`Session::dispatch`]: external input,
//! timer expiries, and backend results all arrive as [`SessionEvent`]s,
//! applied one at a time under the session lock.

pub mod backend;
pub mod event;
pub mod gate;
pub mod notify;
pub mod registry;
pub mod state;
pub mod timer;

pub use {
    backend::{BackendUpdate, ProcessingBackend, ProcessingJob},
    event::SessionEvent,
    gate::GateRejection,
    notify::Notifier,
    registry::SessionRegistry,
    state::{Session, SessionSnapshot, SessionState},
    timer::GuardTimer,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
