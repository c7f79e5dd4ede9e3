//! tern-session: Streaming conversation session controller
//!
//! This crate turns the loosely ordered event stream of an agent backend
//! into coherent UI state: a busy flag, a throttled progress indicator,
//! usage accounting and automatic fallback when a resource runs out of
//! quota.

pub mod backend;
pub mod busy;
pub mod classify;
pub mod controller;
pub mod correlation;
pub mod error;
pub mod events;
pub mod quota;
pub mod session;
pub mod throttle;
pub mod usage;

pub use backend::Backend;
pub use busy::BusyState;
pub use controller::{Command, ControllerConfig, SessionController};
pub use error::{Error, Result};
pub use events::{ContentUpdate, ControllerUpdate, SessionEvent};
pub use quota::is_quota_exhausted;
pub use usage::{InMemoryUsageStore, SharedUsageStore, UsageStore};
