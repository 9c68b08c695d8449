//! Parses a document's front matter into an [`AgentDefinition`].

use warden_kernel::agent::{AgentDefinition, AgentError, AgentResult};

use crate::vault::VaultStore;

pub struct AgentLoader<'a> {
    vault: &'a VaultStore,
}

impl<'a> AgentLoader<'a> {
    pub fn new(vault: &'a VaultStore) -> Self {
        Self { vault }
    }

    pub async fn load(&self, path: &str) -> AgentResult<AgentDefinition> {
        let (frontmatter, body) = self
            .vault
            .read(path)
            .await
            .map_err(|e| AgentError::Io(e.to_string()))?;

        let name = frontmatter
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(path)
            .to_string();

        let variant_str = frontmatter
            .get("variant")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::Malformed(format!("{path}: missing `variant`")))?;
        let variant = parse_variant(variant_str)
            .ok_or_else(|| AgentError::Malformed(format!("{path}: unknown variant `{variant_str}`")))?;

        let model = frontmatter
            .get("model")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::Malformed(format!("{path}: missing `model`")))?
            .to_string();

        let description = frontmatter
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let tools = frontmatter
            .get("tools")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect());

        let permissions: warden_kernel::agent::Permissions = frontmatter
            .get("permissions")
            .map(|v| serde_yaml::from_value(v.clone()))
            .transpose()
            .map_err(|e| AgentError::Malformed(format!("{path}: bad `permissions`: {e}")))?
            .unwrap_or_default();

        let max_spawn_depth = frontmatter
            .get("max_spawn_depth")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(3);

        let context_files = frontmatter
            .get("context_files")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let services = frontmatter
            .get("services")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        Ok(AgentDefinition {
            path: path.to_string(),
            name,
            description,
            variant,
            model,
            tools,
            permissions,
            max_spawn_depth,
            context_files,
            services,
            system_prompt: body.trim().to_string(),
        })
    }
}

fn parse_variant(s: &str) -> Option<warden_kernel::agent::AgentVariant> {
    use warden_kernel::agent::AgentVariant::*;
    match s {
        "chatbot" => Some(Chatbot),
        "document-bound" => Some(DocumentBound),
        "standalone" => Some(Standalone),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_minimal_agent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::new(dir.path());
        let fm = serde_yaml::to_value(serde_json::json!({
            "name": "Helper",
            "variant": "chatbot",
            "model": "claude-sonnet",
        }))
        .unwrap();
        vault
            .write("agents/helper.md", &fm, "You are a helpful assistant.\n")
            .await
            .unwrap();

        let loader = AgentLoader::new(&vault);
        let def = loader.load("agents/helper.md").await.unwrap();
        assert_eq!(def.name, "Helper");
        assert_eq!(def.max_spawn_depth, 3);
        assert_eq!(def.system_prompt, "You are a helpful assistant.");
    }

    #[tokio::test]
    async fn missing_variant_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::new(dir.path());
        let fm = serde_yaml::to_value(serde_json::json!({"name": "Helper", "model": "x"})).unwrap();
        vault.write("agents/helper.md", &fm, "").await.unwrap();

        let loader = AgentLoader::new(&vault);
        assert!(loader.load("agents/helper.md").await.is_err());
    }
}
