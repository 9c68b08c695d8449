//! Agent definitions: the declarative record parsed from a vault document.

mod error;
mod types;

pub use error::{AgentError, AgentResult};
pub use types::{AgentDefinition, AgentVariant, Permissions};
