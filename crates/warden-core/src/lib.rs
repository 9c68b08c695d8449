//! Warden Core - the orchestration runtime.
//!
//! Ten components compose here: the Vault Store and Agent Loader resolve
//! what an agent is; the Queue and Document Scanner decide what runs and
//! when; the Session Store and Context Builder decide what the LLM sees;
//! the Permission Broker gates writes; the Event Bus fans events out to
//! subscribers; the Orchestrator ties all of it together; Lifecycle boots
//! and tears the whole thing down.

pub mod agent_loader;
pub mod config;
pub mod document_scanner;
pub mod event_bus;
pub mod lifecycle;
pub mod llm;
pub mod orchestrator;
pub mod permission_broker;
pub mod queue;
pub mod session;
pub mod vault;

pub use config::Config;
pub use lifecycle::AppContext;
