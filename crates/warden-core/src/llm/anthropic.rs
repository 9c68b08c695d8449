//! Reference [`LlmClient`] implementation against Anthropic's Messages API.
//!
//! Parses the server's SSE stream (`message_start`, `content_block_delta`,
//! `message_delta`, `message_stop`) into [`LlmEvent`]s. Tool use in the
//! Anthropic wire format arrives as a complete `tool_use` content block
//! rather than incremental deltas, so it is surfaced whole once its block
//! closes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use super::client::{LlmClient, LlmError, LlmEvent, LlmRequest, LlmResult, LlmStream, ToolApprovalCallback};

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub version: String,
    pub default_max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            version: "2023-06-01".to_string(),
            default_max_tokens: 4096,
        }
    }
}

impl AnthropicConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            ..Default::default()
        }
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

enum SseAction {
    Emit(LlmEvent),
    /// A text delta fragment, not yet folded into the cumulative prefix
    /// `pump_sse` tracks — handled separately from `Emit` since decoding is
    /// stateless but `AssistantText.text` is a growing prefix.
    TextDelta(String),
    Stop,
}

/// Decode one `event: <name>` / `data: <json>` pair into an action, or
/// `None` if this event type carries nothing we surface.
fn decode_event(event_name: &str, data: &str) -> Option<SseAction> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    match event_name {
        "message_start" => Some(SseAction::Emit(LlmEvent::Init)),
        "content_block_delta" => {
            let text = value
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())?;
            Some(SseAction::TextDelta(text.to_string()))
        }
        "content_block_stop" => {
            let block = value.get("content_block")?;
            if block.get("type").and_then(|t| t.as_str()) != Some("tool_use") {
                return None;
            }
            let tool_use_id = block.get("id").and_then(|v| v.as_str())?.to_string();
            let tool_name = block.get("name").and_then(|v| v.as_str())?.to_string();
            let input = block.get("input").cloned().unwrap_or(serde_json::json!({}));
            Some(SseAction::Emit(LlmEvent::ToolUse {
                tool_use_id,
                tool_name,
                input,
            }))
        }
        "message_stop" => Some(SseAction::Stop),
        _ => None,
    }
}

const WRITE_CLASS_TOOLS: &[&str] = &["write", "edit", "shell"];

/// Parse an SSE byte stream into `(event, data)` pairs, dispatching each to
/// [`decode_event`] and forwarding through `tx`. Write-class tool uses are
/// gated through `on_tool_use` before the corresponding event is forwarded;
/// a denial ends the stream with an `Error` event.
async fn pump_sse(
    mut bytes: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
    tx: tokio::sync::mpsc::UnboundedSender<LlmEvent>,
    on_tool_use: ToolApprovalCallback,
) {
    let mut buffer = String::new();
    let mut current_event = String::new();
    let mut cumulative_text = String::new();

    while let Some(chunk) = bytes.next().await {
        let Ok(chunk) = chunk else { break };
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(idx) = buffer.find('\n') {
            let line = buffer[..idx].trim_end_matches('\r').to_string();
            buffer.drain(..=idx);

            if let Some(name) = line.strip_prefix("event: ") {
                current_event = name.to_string();
            } else if let Some(data) = line.strip_prefix("data: ") {
                match decode_event(&current_event, data) {
                    Some(SseAction::TextDelta(fragment)) => {
                        cumulative_text.push_str(&fragment);
                        if tx
                            .send(LlmEvent::AssistantText { text: cumulative_text.clone() })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(SseAction::Emit(LlmEvent::ToolUse { tool_use_id, tool_name, input })) => {
                        if WRITE_CLASS_TOOLS.contains(&tool_name.as_str()) {
                            let key = format!("{tool_use_id}:{tool_name}");
                            match on_tool_use(key, input.clone()).await {
                                super::client::ToolApproval::Allow { updated_input } => {
                                    let event = LlmEvent::ToolUse {
                                        tool_use_id,
                                        tool_name,
                                        input: updated_input,
                                    };
                                    if tx.send(event).is_err() {
                                        return;
                                    }
                                }
                                super::client::ToolApproval::Deny { message } => {
                                    let _ = tx.send(LlmEvent::Error { message });
                                    return;
                                }
                            }
                        } else if tx
                            .send(LlmEvent::ToolUse { tool_use_id, tool_name, input })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(SseAction::Emit(event)) => {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Some(SseAction::Stop) => {
                        let _ = tx.send(LlmEvent::Done { upstream_session_id: None });
                        return;
                    }
                    None => {}
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn query_stream(
        &self,
        request: LlmRequest,
        on_tool_use: ToolApprovalCallback,
    ) -> LlmResult<LlmStream> {
        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": self.config.default_max_tokens,
            "system": request.system_prompt,
            "stream": true,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.version)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Request(format!("HTTP {}", response.status())));
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(pump_sse(response.bytes_stream(), tx, on_tool_use));

        let stream: Pin<Box<dyn Stream<Item = LlmEvent> + Send>> =
            Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx));
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        let action = decode_event("content_block_delta", data).unwrap();
        match action {
            SseAction::TextDelta(text) => assert_eq!(text, "Hello"),
            _ => panic!("expected a text delta"),
        }
    }

    #[test]
    fn decodes_tool_use_on_block_stop() {
        let data = r#"{"type":"content_block_stop","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"write","input":{"path":"a.txt"}}}"#;
        let action = decode_event("content_block_stop", data).unwrap();
        match action {
            SseAction::Emit(LlmEvent::ToolUse { tool_use_id, tool_name, .. }) => {
                assert_eq!(tool_use_id, "tu_1");
                assert_eq!(tool_name, "write");
            }
            _ => panic!("expected tool use"),
        }
    }

    #[test]
    fn message_stop_signals_stop() {
        let action = decode_event("message_stop", r#"{"type":"message_stop"}"#).unwrap();
        assert!(matches!(action, SseAction::Stop));
    }

    #[test]
    fn unknown_event_decodes_to_none() {
        assert!(decode_event("ping", "{}").is_none());
    }
}
