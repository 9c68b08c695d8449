//! The LLM client contract and one reference implementation.
//!
//! The orchestrator depends only on [`LlmClient`]; a real deployment can
//! swap in any provider that can yield a lazy sequence of [`LlmEvent`]s and
//! invoke a tool-approval callback.

pub mod anthropic;
pub mod client;

pub use client::{LlmClient, LlmEvent, LlmRequest, ToolApproval, ToolApprovalCallback};
