//! The contract an LLM client must satisfy: a streaming query primitive
//! that yields typed events, plus a user-supplied tool-approval callback.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("upstream session could not be resumed")]
    ResumeFailed,
}

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub resume_handle: Option<String>,
    pub tools: Vec<String>,
}

/// What the tool-approval callback decides for a single invocation.
#[derive(Debug, Clone)]
pub enum ToolApproval {
    Allow { updated_input: serde_json::Value },
    Deny { message: String },
}

/// Given (tool name, input, session id), decide whether the tool may run.
/// Implemented by `warden-core`'s permission-broker integration; the LLM
/// client invokes it once per write-class tool use.
pub type ToolApprovalCallback = std::sync::Arc<
    dyn Fn(
            String,
            serde_json::Value,
        ) -> Pin<Box<dyn std::future::Future<Output = ToolApproval> + Send>>
        + Send
        + Sync,
>;

/// An event yielded while a request streams. The assistant's `text` field
/// is a growing prefix; callers extract the delta themselves (see
/// `orchestrator::text_delta`).
#[derive(Debug, Clone)]
pub enum LlmEvent {
    Init,
    AssistantText { text: String },
    ToolUse {
        tool_use_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    Done { upstream_session_id: Option<String> },
    Error { message: String },
}

pub type LlmStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue a request and return a lazy stream of events. Cancellation
    /// (dropping the stream) tears down any underlying connection.
    async fn query_stream(
        &self,
        request: LlmRequest,
        on_tool_use: ToolApprovalCallback,
    ) -> LlmResult<LlmStream>;

    /// Convenience wrapper for callers that only want the final text.
    async fn query(&self, request: LlmRequest, on_tool_use: ToolApprovalCallback) -> LlmResult<String> {
        use futures::StreamExt;
        let mut stream = self.query_stream(request, on_tool_use).await?;
        let mut last_text = String::new();
        while let Some(event) = stream.next().await {
            match event {
                LlmEvent::AssistantText { text } => last_text = text,
                LlmEvent::Error { message } => return Err(LlmError::Request(message)),
                _ => {}
            }
        }
        Ok(last_text)
    }
}
