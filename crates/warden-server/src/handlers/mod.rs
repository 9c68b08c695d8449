pub mod agents;
pub mod chat;
pub mod documents;
pub mod health;
pub mod permissions;
pub mod queue;
pub mod sessions;
pub mod triggers;
pub mod vault;
