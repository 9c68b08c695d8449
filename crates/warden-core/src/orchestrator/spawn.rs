//! Parses `spawn` directives out of an assistant's final text and checks
//! them against the parent agent's spawn permissions and depth cap.

use warden_kernel::agent::AgentDefinition;
use warden_kernel::queue::Priority;

#[derive(Debug, Clone, serde::Deserialize)]
struct SpawnBlock {
    agent: String,
    message: String,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    context: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub agent_path: String,
    pub message: String,
    pub priority: Priority,
    pub context: Option<serde_json::Value>,
}

/// Extract fenced ```spawn ... ``` blocks from `text`, each containing one
/// JSON object. Malformed JSON is skipped (caller logs a warning).
pub fn parse_spawn_blocks(text: &str) -> Vec<SpawnRequest> {
    let mut out = Vec::new();
    let marker = "```spawn";
    let mut rest = text;
    while let Some(start) = rest.find(marker) {
        let after_marker = &rest[start + marker.len()..];
        let Some(end) = after_marker.find("```") else {
            break;
        };
        let block = after_marker[..end].trim();
        if let Ok(parsed) = serde_json::from_str::<SpawnBlock>(block) {
            out.push(SpawnRequest {
                agent_path: parsed.agent,
                message: parsed.message,
                priority: parsed.priority.unwrap_or_default(),
                context: parsed.context,
            });
        }
        rest = &after_marker[end + 3..];
    }
    out
}

pub enum SpawnDecision {
    Allowed { depth: u32 },
    DeniedByPermission,
    DepthExceeded,
}

/// Decide whether `parent` may spawn `request` at `parent_depth`, against
/// the configured maximum spawn depth.
pub fn decide(parent: &AgentDefinition, request: &SpawnRequest, parent_depth: u32) -> SpawnDecision {
    if !parent.permissions.matches_spawn(&request.agent_path) {
        return SpawnDecision::DeniedByPermission;
    }
    let child_depth = parent_depth + 1;
    if child_depth >= parent.max_spawn_depth {
        return SpawnDecision::DepthExceeded;
    }
    SpawnDecision::Allowed { depth: child_depth }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_kernel::agent::{AgentVariant, Permissions};

    fn agent(spawn_globs: &[&str], max_depth: u32) -> AgentDefinition {
        AgentDefinition {
            path: "agents/a".into(),
            name: "A".into(),
            description: String::new(),
            variant: AgentVariant::Standalone,
            model: "m".into(),
            tools: None,
            permissions: Permissions {
                spawn: spawn_globs.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            max_spawn_depth: max_depth,
            context_files: vec![],
            services: vec![],
            system_prompt: String::new(),
        }
    }

    #[test]
    fn parses_single_spawn_block() {
        let text = "here is a plan\n```spawn\n{\"agent\": \"agents/b\", \"message\": \"go\"}\n```\ndone";
        let blocks = parse_spawn_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].agent_path, "agents/b");
    }

    #[test]
    fn skips_malformed_json() {
        let text = "```spawn\nnot json\n```";
        assert!(parse_spawn_blocks(text).is_empty());
    }

    #[test]
    fn decision_allows_when_glob_matches_and_depth_ok() {
        let a = agent(&["agents/*"], 3);
        let req = SpawnRequest {
            agent_path: "agents/b".into(),
            message: "go".into(),
            priority: Priority::Normal,
            context: None,
        };
        assert!(matches!(decide(&a, &req, 0), SpawnDecision::Allowed { depth: 1 }));
    }

    #[test]
    fn decision_denies_on_glob_mismatch() {
        let a = agent(&["notes/*"], 3);
        let req = SpawnRequest {
            agent_path: "agents/b".into(),
            message: "go".into(),
            priority: Priority::Normal,
            context: None,
        };
        assert!(matches!(decide(&a, &req, 0), SpawnDecision::DeniedByPermission));
    }

    #[test]
    fn decision_denies_depth_at_max() {
        let a = agent(&["agents/*"], 2);
        let req = SpawnRequest {
            agent_path: "agents/b".into(),
            message: "go".into(),
            priority: Priority::Normal,
            context: None,
        };
        // parent at depth 1 -> child depth 2 == max -> exceeded
        assert!(matches!(decide(&a, &req, 1), SpawnDecision::DepthExceeded));
    }
}
