//! Read/write access to the filesystem-rooted document vault: front-matter
//! parsing, path containment, and glob scanning.

use std::path::{Path, PathBuf};

use globset::Glob;
use serde_yaml::Value as YamlValue;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VaultError {
    #[error("path escapes vault root: {0}")]
    PathEscape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("front matter is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document has no front matter: {0}")]
    MissingFrontMatter(String),

    #[error("invalid glob pattern: {0}")]
    InvalidGlob(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

const FRONT_MATTER_DELIM: &str = "---";

#[derive(Clone)]
pub struct VaultStore {
    root: PathBuf,
}

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a vault-relative path to an absolute one, rejecting anything
    /// that escapes the vault root (via `..` or a symlink).
    pub fn resolve(&self, vault_relative: &str) -> VaultResult<PathBuf> {
        let candidate = self.root.join(vault_relative);
        let base = dunce_canonicalize_best_effort(&self.root);
        let joined = dunce_canonicalize_best_effort(&candidate);
        if !joined.starts_with(&base) {
            return Err(VaultError::PathEscape(vault_relative.to_string()));
        }
        Ok(candidate)
    }

    /// Convert an absolute path back to vault-relative form, if it lies
    /// within the vault root.
    pub fn to_relative(&self, absolute: &Path) -> Option<String> {
        absolute
            .strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    pub async fn exists(&self, vault_relative: &str) -> bool {
        match self.resolve(vault_relative) {
            Ok(path) => fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Read a document, splitting it into front matter and body.
    pub async fn read(&self, vault_relative: &str) -> VaultResult<(YamlValue, String)> {
        let path = self.resolve(vault_relative)?;
        let raw = fs::read_to_string(&path).await?;
        parse_front_matter(&raw)
    }

    /// Write a document, re-assembling front matter and body. Creates
    /// parent directories as needed.
    pub async fn write(
        &self,
        vault_relative: &str,
        frontmatter: &YamlValue,
        body: &str,
    ) -> VaultResult<()> {
        let path = self.resolve(vault_relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let yaml = serde_yaml::to_string(frontmatter)?;
        let content = format!("{FRONT_MATTER_DELIM}\n{yaml}{FRONT_MATTER_DELIM}\n{body}");
        fs::write(&path, content).await?;
        Ok(())
    }

    /// Enumerate vault-relative paths matching a glob, rooted at the vault.
    pub async fn scan(&self, pattern: &str) -> VaultResult<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| VaultError::InvalidGlob(e.to_string()))?
            .compile_matcher();
        let mut out = Vec::new();
        scan_dir(&self.root, &self.root, &matcher, &mut out).await?;
        Ok(out)
    }
}

fn scan_dir<'a>(
    root: &'a Path,
    dir: &'a Path,
    matcher: &'a globset::GlobMatcher,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = VaultResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                scan_dir(root, &path, matcher, out).await?;
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                if matcher.is_match(&relative) {
                    out.push(relative);
                }
            }
        }
        Ok(())
    })
}

fn dunce_canonicalize_best_effort(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Split a document into its YAML front matter and the remaining body.
pub fn parse_front_matter(raw: &str) -> VaultResult<(YamlValue, String)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let Some(rest) = raw.strip_prefix(FRONT_MATTER_DELIM) else {
        return Err(VaultError::MissingFrontMatter(
            "document does not start with '---'".to_string(),
        ));
    };
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let Some(end) = rest.find("\n---") else {
        return Err(VaultError::MissingFrontMatter(
            "no closing '---' found".to_string(),
        ));
    };
    let yaml_block = &rest[..end];
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);
    let value: YamlValue = serde_yaml::from_str(yaml_block)?;
    Ok((value, body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::new(dir.path());
        let result = vault.resolve("../outside.txt");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_then_read_round_trips_front_matter() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::new(dir.path());
        let fm = serde_yaml::to_value(serde_json::json!({"name": "helper"})).unwrap();
        vault.write("agents/helper.md", &fm, "body text\n").await.unwrap();
        let (read_fm, body) = vault.read("agents/helper.md").await.unwrap();
        assert_eq!(read_fm["name"].as_str(), Some("helper"));
        assert_eq!(body, "body text\n");
    }

    #[test]
    fn parse_front_matter_rejects_missing_delimiter() {
        assert!(parse_front_matter("no front matter here").is_err());
    }

    #[tokio::test]
    async fn scan_finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::new(dir.path());
        let fm = serde_yaml::to_value(serde_json::json!({})).unwrap();
        vault.write("agents/a.md", &fm, "").await.unwrap();
        vault.write("notes/b.md", &fm, "").await.unwrap();
        let found = vault.scan("agents/*.md").await.unwrap();
        assert_eq!(found, vec!["agents/a.md".to_string()]);
    }
}
