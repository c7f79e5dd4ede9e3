//! tern-ai: Agent backend event protocol
//!
//! This crate provides the wire-level types shared by the session controller
//! and the agent backends it drives: raw events, identifiers, usage reports,
//! tool status, and the per-provider resource catalog.

pub mod error;
pub mod models;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use stream::{BackendEventStream, RawEvent};
pub use types::*;
