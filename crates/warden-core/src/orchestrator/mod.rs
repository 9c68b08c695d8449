//! Composes the Vault Store, Agent Loader, Queue, Session Store, Context
//! Builder, Permission Broker, and Event Bus into the three execution entry
//! points plus the four background loops.

pub mod core;
pub mod spawn;
pub mod types;

pub use core::Orchestrator;
pub use types::{ChatFailure, ChatRequest, ChatResponse, ChatStreamEvent, PermissionDenial, SpawnedChild};
