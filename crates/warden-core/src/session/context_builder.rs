//! Decides, for each outgoing message, whether to resume an upstream LLM
//! session, synthesize a context-injected prompt, or send the message as-is.

use warden_kernel::session::{Message, Role};

const TOKEN_BUDGET: usize = 50_000;
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMethod {
    New,
    SdkResume,
    ContextInjection,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeInfo {
    pub method: ResumeMethod,
    pub messages_injected: usize,
    pub token_estimate: usize,
    pub previous_message_count: usize,
}

pub struct BuiltPrompt {
    pub prompt: String,
    pub resume_handle: Option<String>,
    pub resume_info: ResumeInfo,
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// `history` is the session's prior messages (not including the new
    /// user message itself); `user_message` is what's about to be sent.
    pub fn build(
        upstream_handle: Option<&str>,
        history: &[Message],
        user_message: &str,
    ) -> BuiltPrompt {
        if let Some(handle) = upstream_handle {
            return BuiltPrompt {
                prompt: user_message.to_string(),
                resume_handle: Some(handle.to_string()),
                resume_info: ResumeInfo {
                    method: ResumeMethod::SdkResume,
                    messages_injected: 0,
                    token_estimate: user_message.len() / CHARS_PER_TOKEN,
                    previous_message_count: history.len(),
                },
            };
        }

        if history.is_empty() {
            return BuiltPrompt {
                prompt: user_message.to_string(),
                resume_handle: None,
                resume_info: ResumeInfo {
                    method: ResumeMethod::New,
                    messages_injected: 0,
                    token_estimate: user_message.len() / CHARS_PER_TOKEN,
                    previous_message_count: 0,
                },
            };
        }

        let (formatted, injected, omitted) = Self::format_history(history);
        let prompt = format!(
            "## Previous Conversation\n\n{formatted}\n\n---\n\n## Current Message\n\n{user_message}"
        );
        let token_estimate = prompt.len() / CHARS_PER_TOKEN;

        BuiltPrompt {
            prompt,
            resume_handle: None,
            resume_info: ResumeInfo {
                method: ResumeMethod::ContextInjection,
                messages_injected: injected,
                token_estimate,
                previous_message_count: history.len() + usize::from(omitted > 0),
            },
        }
    }

    /// Walk messages newest-first, skipping system messages, accumulating
    /// until the token budget would be exceeded. Returns the formatted
    /// (oldest-first) block, the count of messages included, and the
    /// count omitted.
    fn format_history(history: &[Message]) -> (String, usize, usize) {
        let mut included: Vec<&Message> = Vec::new();
        let mut char_budget = TOKEN_BUDGET * CHARS_PER_TOKEN;
        let mut omitted = 0;

        for msg in history.iter().rev() {
            if msg.role == Role::System {
                continue;
            }
            let cost = msg.content.len() + 32;
            if cost > char_budget && !included.is_empty() {
                omitted += 1;
                continue;
            }
            char_budget = char_budget.saturating_sub(cost);
            included.push(msg);
        }
        included.reverse();

        let mut out = String::new();
        if omitted > 0 {
            out.push_str(&format!("[{omitted} earlier messages omitted for context limits]\n\n"));
        }
        for msg in &included {
            out.push_str(&format!("{}: {}\n\n", msg.role.as_str(), msg.content));
        }
        (out.trim_end().to_string(), included.len(), omitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn fresh_when_no_handle_and_no_history() {
        let built = ContextBuilder::build(None, &[], "hello");
        assert_eq!(built.resume_info.method, ResumeMethod::New);
        assert_eq!(built.prompt, "hello");
    }

    #[test]
    fn resumes_when_handle_present() {
        let history = vec![msg(Role::User, "hi"), msg(Role::Assistant, "hello")];
        let built = ContextBuilder::build(Some("sdk-123"), &history, "next");
        assert_eq!(built.resume_info.method, ResumeMethod::SdkResume);
        assert_eq!(built.resume_handle, Some("sdk-123".to_string()));
        assert_eq!(built.prompt, "next");
    }

    #[test]
    fn injects_context_when_handle_absent_but_history_present() {
        let history = vec![msg(Role::User, "remember 42"), msg(Role::Assistant, "ok")];
        let built = ContextBuilder::build(None, &history, "what did I say?");
        assert_eq!(built.resume_info.method, ResumeMethod::ContextInjection);
        assert!(built.prompt.starts_with("## Previous Conversation"));
        assert!(built.prompt.contains("what did I say?"));
    }

    #[test]
    fn skips_system_messages_in_injected_history() {
        let history = vec![msg(Role::System, "internal note"), msg(Role::User, "hi")];
        let built = ContextBuilder::build(None, &history, "next");
        assert!(!built.prompt.contains("internal note"));
    }
}
