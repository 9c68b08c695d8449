//! The on-disk session text format: a simple front-matter block followed by
//! a `## Conversation` heading and `### Role | timestamp` message blocks.

use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_kernel::session::{sanitize_upstream_handle, Message, Role};

const DELIM: &str = "---";
const CONVERSATION_HEADING: &str = "## Conversation";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FormatError {
    #[error("missing opening front-matter delimiter")]
    MissingOpenDelim,
    #[error("missing closing front-matter delimiter")]
    MissingCloseDelim,
    #[error("front matter missing required key: {0}")]
    MissingKey(String),
    #[error("malformed timestamp: {0}")]
    BadTimestamp(String),
    #[error("malformed message header: {0}")]
    BadMessageHeader(String),
}

#[derive(Debug, Clone)]
pub struct ParsedSession {
    pub session_id: String,
    pub session_key: String,
    pub agent_path: String,
    pub agent_name: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub upstream_handle: Option<String>,
    pub archived: bool,
    pub context: Option<serde_json::Value>,
    pub messages: Vec<Message>,
}

pub fn parse(raw: &str) -> Result<ParsedSession, FormatError> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let rest = raw.strip_prefix(DELIM).ok_or(FormatError::MissingOpenDelim)?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest.find("\n---").ok_or(FormatError::MissingCloseDelim)?;
    let frontmatter_block = &rest[..end];
    let body = &rest[end + 4..];
    let body = body.strip_prefix('\n').unwrap_or(body);

    let kv = parse_front_matter_kv(frontmatter_block);
    let get = |key: &str| -> Result<String, FormatError> {
        kv.get(key)
            .cloned()
            .ok_or_else(|| FormatError::MissingKey(key.to_string()))
    };

    let session_id = get("session_id")?;
    let session_key = get("session_key")?;
    let agent_path = get("agent")?;
    let agent_name = kv.get("agent_name").cloned().unwrap_or_else(|| agent_path.clone());
    let title = kv.get("title").cloned().filter(|s| !s.is_empty());
    let created_at = parse_timestamp(&get("created_at")?)?;
    let last_accessed = parse_timestamp(&get("last_accessed")?)?;
    let upstream_handle = sanitize_upstream_handle(kv.get("sdk_session_id").map(|s| s.as_str()));
    let archived = kv.get("archived").map(|s| s == "true").unwrap_or(false);
    let context = kv
        .get("context")
        .and_then(|s| serde_json::from_str(s).ok());

    let messages = parse_messages(body)?;

    Ok(ParsedSession {
        session_id,
        session_key,
        agent_path,
        agent_name,
        title,
        created_at,
        last_accessed,
        upstream_handle,
        archived,
        context,
        messages,
    })
}

pub fn format(session: &ParsedSession) -> String {
    let mut fm = String::new();
    fm.push_str(DELIM);
    fm.push('\n');
    fm.push_str(&format!("session_id: {}\n", session.session_id));
    fm.push_str(&format!("session_key: {}\n", session.session_key));
    fm.push_str(&format!("agent: {}\n", session.agent_path));
    fm.push_str(&format!("agent_name: {}\n", session.agent_name));
    if let Some(title) = &session.title {
        fm.push_str(&format!("title: {title}\n"));
    }
    fm.push_str("type: chat\n");
    fm.push_str(&format!("created_at: {}\n", session.created_at.to_rfc3339()));
    fm.push_str(&format!("last_accessed: {}\n", session.last_accessed.to_rfc3339()));
    fm.push_str(&format!(
        "sdk_session_id: {}\n",
        session.upstream_handle.as_deref().unwrap_or("")
    ));
    fm.push_str(&format!("archived: {}\n", session.archived));
    if let Some(ctx) = &session.context {
        fm.push_str(&format!("context: {}\n", ctx));
    }
    fm.push_str(DELIM);
    fm.push('\n');

    let mut body = String::new();
    body.push_str(&format!("# {}\n\n", session.agent_name));
    body.push_str(CONVERSATION_HEADING);
    body.push('\n');
    body.push('\n');
    for msg in &session.messages {
        body.push_str(&format!(
            "### {} | {}\n\n{}\n\n",
            msg.role.as_str(),
            msg.timestamp.to_rfc3339(),
            msg.content
        ));
    }

    format!("{fm}\n{body}")
}

fn parse_front_matter_kv(block: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let mut value = value.trim().to_string();
        if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
            || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
        {
            value = value[1..value.len() - 1].to_string();
        }
        map.insert(key, value);
    }
    map
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FormatError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| FormatError::BadTimestamp(raw.to_string()))
}

fn parse_messages(body: &str) -> Result<Vec<Message>, FormatError> {
    let Some(idx) = body.find(CONVERSATION_HEADING) else {
        return Ok(Vec::new());
    };
    let after_heading = &body[idx + CONVERSATION_HEADING.len()..];

    let mut messages = Vec::new();
    let mut lines = after_heading.lines().peekable();
    let mut current: Option<(Role, DateTime<Utc>, Vec<String>)> = None;

    fn flush(current: &mut Option<(Role, DateTime<Utc>, Vec<String>)>, out: &mut Vec<Message>) {
        if let Some((role, timestamp, content_lines)) = current.take() {
            let content = content_lines.join("\n").trim().to_string();
            out.push(Message {
                role,
                content,
                timestamp,
            });
        }
    }

    while let Some(line) = lines.next() {
        if let Some(header) = line.strip_prefix("### ") {
            flush(&mut current, &mut messages);
            let (role_str, ts_str) = header
                .split_once(" | ")
                .ok_or_else(|| FormatError::BadMessageHeader(header.to_string()))?;
            let role = Role::parse(role_str.trim())
                .ok_or_else(|| FormatError::BadMessageHeader(header.to_string()))?;
            let timestamp = parse_timestamp(ts_str.trim())?;
            current = Some((role, timestamp, Vec::new()));
        } else if let Some((_, _, content_lines)) = &mut current {
            content_lines.push(line.to_string());
        }
    }
    flush(&mut current, &mut messages);
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParsedSession {
        let now = Utc::now();
        ParsedSession {
            session_id: "sess-1".into(),
            session_key: "agents/helper::default".into(),
            agent_path: "agents/helper".into(),
            agent_name: "Helper".into(),
            title: None,
            created_at: now,
            last_accessed: now,
            upstream_handle: None,
            archived: false,
            context: None,
            messages: vec![
                Message {
                    role: Role::User,
                    content: "Hello".into(),
                    timestamp: now,
                },
                Message {
                    role: Role::Assistant,
                    content: "Hi there".into(),
                    timestamp: now,
                },
            ],
        }
    }

    #[test]
    fn round_trips_session() {
        let session = sample();
        let text = format(&session);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.session_id, session.session_id);
        assert_eq!(parsed.session_key, session.session_key);
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].content, "Hello");
        assert_eq!(parsed.messages[1].content, "Hi there");
    }

    #[test]
    fn accepts_timestamps_without_fractional_seconds() {
        let raw = "---\nsession_id: s1\nsession_key: k1\nagent: agents/a\nagent_name: A\ntype: chat\ncreated_at: 2024-01-01T00:00:00Z\nlast_accessed: 2024-01-01T00:00:00Z\nsdk_session_id: \narchived: false\n---\n# A\n\n## Conversation\n\n### User | 2024-01-01T00:00:00Z\n\nHi\n\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.messages.len(), 1);
    }

    #[test]
    fn rejects_invalid_upstream_handle() {
        let raw = "---\nsession_id: s1\nsession_key: k1\nagent: agents/a\nagent_name: A\ntype: chat\ncreated_at: 2024-01-01T00:00:00Z\nlast_accessed: 2024-01-01T00:00:00Z\nsdk_session_id: [object Object]\narchived: false\n---\n# A\n\n## Conversation\n\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.upstream_handle, None);
    }

    #[test]
    fn missing_delimiter_errors() {
        assert!(parse("no delimiter here").is_err());
    }
}
