use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("agent document malformed: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
