//! Shared contracts for the Warden agent orchestration runtime.
//!
//! `warden-kernel` carries the types and traits every other crate in the
//! workspace agrees on: agent definitions, queue items, session identity,
//! permission requests, document-agent entries, and the keyed event bus.
//! Concrete behaviour (the queue itself, the session store, the permission
//! broker, ...) lives in `warden-core`; this crate must never depend on it.

pub mod agent;
pub mod bus;
pub mod clock;
pub mod document;
pub mod error;
pub mod permission;
pub mod queue;
pub mod session;

pub use error::{KernelError, KernelResult};
