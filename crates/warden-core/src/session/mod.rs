//! Session persistence: on-disk text format, lazy-loaded store, and the
//! context-assembly strategy that decides what the LLM sees each turn.

pub mod context_builder;
pub mod format;
pub mod store;

pub use context_builder::{ContextBuilder, ResumeInfo, ResumeMethod};
pub use store::{SessionRecord, SessionStore};
