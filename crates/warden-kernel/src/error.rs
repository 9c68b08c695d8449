//! Crate-level error type for `warden-kernel`.

use thiserror::Error;

/// Crate-level error type. Sub-module errors convert in via `#[from]` so `?`
/// composes across module boundaries; attach human-readable context with
/// [`error_stack::Report`] at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    #[error("agent error: {0}")]
    Agent(#[from] crate::agent::AgentError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`] for context chains.
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_converts_via_from() {
        let err: KernelError = crate::agent::AgentError::NotFound("helper".into()).into();
        assert!(matches!(err, KernelError::Agent(_)));
        assert!(err.to_string().contains("helper"));
    }

    #[test]
    fn internal_error_display() {
        let err = KernelError::Internal("boom".into());
        assert_eq!(err.to_string(), "boom");
    }
}
