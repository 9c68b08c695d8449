//! Enumerates documents carrying agent entries, parses their triggers, and
//! rewrites a document's agent list without disturbing the rest of the file.

use chrono::{Datelike, Timelike};
use thiserror::Error;

use warden_kernel::document::{AgentStatus, DocumentAgentEntry, Trigger};

use crate::vault::{VaultError, VaultStore};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScannerError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("document has no `agents` list: {0}")]
    NoAgentsList(String),
}

pub type ScannerResult<T> = Result<T, ScannerError>;

pub struct DocumentScanner<'a> {
    vault: &'a VaultStore,
}

impl<'a> DocumentScanner<'a> {
    pub fn new(vault: &'a VaultStore) -> Self {
        Self { vault }
    }

    /// Scan every document under the vault for an `agents:` front-matter
    /// list, returning `(document_path, entries)` pairs.
    pub async fn scan_all(&self) -> ScannerResult<Vec<(String, Vec<DocumentAgentEntry>)>> {
        let mut out = Vec::new();
        for path in self.vault.scan("**/*.md").await? {
            if let Ok(entries) = self.get_document_agents(&path).await {
                if !entries.is_empty() {
                    out.push((path, entries));
                }
            }
        }
        Ok(out)
    }

    pub async fn get_document_agents(&self, doc_path: &str) -> ScannerResult<Vec<DocumentAgentEntry>> {
        let (frontmatter, _) = self.vault.read(doc_path).await?;
        let Some(list) = frontmatter.get("agents").and_then(|v| v.as_sequence()) else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for raw in list {
            let Ok(entry) = serde_yaml::from_value::<DocumentAgentEntry>(raw.clone()) else {
                continue;
            };
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Rewrite only the `agents` key of a document's front matter.
    pub async fn update_document_agents(
        &self,
        doc_path: &str,
        entries: &[DocumentAgentEntry],
    ) -> ScannerResult<()> {
        let (mut frontmatter, body) = self.vault.read(doc_path).await?;
        let serialized = serde_yaml::to_value(entries).unwrap_or(serde_yaml::Value::Sequence(vec![]));
        match frontmatter.as_mapping_mut() {
            Some(map) => {
                map.insert(serde_yaml::Value::String("agents".into()), serialized);
            }
            None => return Err(ScannerError::NoAgentsList(doc_path.to_string())),
        }
        self.vault.write(doc_path, &frontmatter, &body).await?;
        Ok(())
    }

    pub async fn update_status(
        &self,
        doc_path: &str,
        agent_path: &str,
        status: AgentStatus,
        last_result: Option<String>,
        last_error: Option<String>,
    ) -> ScannerResult<()> {
        let mut entries = self.get_document_agents(doc_path).await?;
        for entry in &mut entries {
            if entry.agent_path == agent_path {
                entry.status = Some(status);
                if matches!(status, AgentStatus::Completed | AgentStatus::Error) {
                    entry.last_run = Some(chrono::Utc::now());
                }
                if last_result.is_some() {
                    entry.last_result = last_result.clone();
                }
                if last_error.is_some() {
                    entry.last_error = last_error.clone();
                }
            }
        }
        self.update_document_agents(doc_path, &entries).await
    }

    pub async fn get_pending(&self, doc_path: &str) -> ScannerResult<Vec<DocumentAgentEntry>> {
        let entries = self.get_document_agents(doc_path).await?;
        Ok(entries
            .into_iter()
            .filter(|e| matches!(e.status, Some(AgentStatus::Pending) | None))
            .collect())
    }

    pub async fn reset(&self, doc_path: &str, agents: Option<&[String]>) -> ScannerResult<()> {
        let mut entries = self.get_document_agents(doc_path).await?;
        for entry in &mut entries {
            if agents.map(|a| a.contains(&entry.agent_path)).unwrap_or(true) {
                entry.status = Some(AgentStatus::Pending);
            }
        }
        self.update_document_agents(doc_path, &entries).await
    }

    pub async fn trigger_all(&self, doc_path: &str) -> ScannerResult<Vec<DocumentAgentEntry>> {
        let mut entries = self.get_document_agents(doc_path).await?;
        for entry in &mut entries {
            entry.status = Some(AgentStatus::NeedsRun);
        }
        self.update_document_agents(doc_path, &entries).await?;
        Ok(entries)
    }

    pub async fn trigger(&self, doc_path: &str, agents: &[String]) -> ScannerResult<Vec<DocumentAgentEntry>> {
        let mut entries = self.get_document_agents(doc_path).await?;
        for entry in &mut entries {
            if agents.contains(&entry.agent_path) {
                entry.status = Some(AgentStatus::NeedsRun);
            }
        }
        self.update_document_agents(doc_path, &entries).await?;
        Ok(entries.into_iter().filter(|e| agents.contains(&e.agent_path)).collect())
    }

    /// Entries whose trigger fires right now, given `now` (the caller's
    /// clock, so tests can control it).
    pub async fn find_triggered(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ScannerResult<Vec<(String, DocumentAgentEntry)>> {
        let mut out = Vec::new();
        for (doc_path, entries) in self.scan_all().await? {
            for entry in entries {
                if !matches!(entry.status, Some(AgentStatus::Pending) | None) {
                    continue;
                }
                let Ok(trigger) = Trigger::parse(&entry.trigger) else {
                    continue;
                };
                if trigger_fires(&trigger, entry.last_run, now) {
                    out.push((doc_path.clone(), entry));
                }
            }
        }
        Ok(out)
    }

    pub async fn find_needs_run(&self) -> ScannerResult<Vec<(String, DocumentAgentEntry)>> {
        let mut out = Vec::new();
        for (doc_path, entries) in self.scan_all().await? {
            for entry in entries {
                if matches!(entry.status, Some(AgentStatus::NeedsRun)) {
                    out.push((doc_path.clone(), entry));
                }
            }
        }
        Ok(out)
    }
}

fn trigger_fires(
    trigger: &Trigger,
    last_run: Option<chrono::DateTime<chrono::Utc>>,
    now: chrono::DateTime<chrono::Utc>,
) -> bool {
    match trigger {
        Trigger::Manual | Trigger::OnSave => false,
        Trigger::Hourly => last_run.map(|t| now.signed_duration_since(t).num_minutes() >= 60).unwrap_or(true),
        Trigger::Daily { hour, minute } => {
            let due_today = now.hour() > *hour || (now.hour() == *hour && now.minute() >= *minute);
            if !due_today {
                return false;
            }
            match last_run {
                None => true,
                Some(last) => last.date_naive() < now.date_naive(),
            }
        }
        Trigger::Weekly { day } => {
            if now.weekday() != *day {
                return false;
            }
            match last_run {
                None => true,
                Some(last) => now.signed_duration_since(last).num_days() >= 7,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn round_trips_document_agents_preserving_body() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultStore::new(dir.path());
        let fm = serde_yaml::to_value(serde_json::json!({
            "agents": [
                {"document_path": "daily/today.md", "agent_path": "agents/reflect", "trigger": "daily@00:00", "status": "pending", "last_run": null}
            ]
        }))
        .unwrap();
        vault.write("daily/today.md", &fm, "# Today\n\nsome body text\n").await.unwrap();

        let scanner = DocumentScanner::new(&vault);
        let entries = scanner.get_document_agents("daily/today.md").await.unwrap();
        assert_eq!(entries.len(), 1);

        scanner.update_document_agents("daily/today.md", &entries).await.unwrap();
        let (_, body) = vault.read("daily/today.md").await.unwrap();
        assert_eq!(body, "# Today\n\nsome body text\n");
    }

    #[test]
    fn daily_trigger_fires_after_time_passes_new_day() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 0, 5, 0).unwrap();
        let last_run = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let trigger = Trigger::Daily { hour: 0, minute: 0 };
        assert!(trigger_fires(&trigger, Some(last_run), now));
    }

    #[test]
    fn daily_trigger_does_not_fire_twice_same_day() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 30, 0).unwrap();
        let last_run = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let trigger = Trigger::Daily { hour: 0, minute: 0 };
        assert!(!trigger_fires(&trigger, Some(last_run), now));
    }

    #[test]
    fn manual_never_fires() {
        let now = chrono::Utc::now();
        assert!(!trigger_fires(&Trigger::Manual, None, now));
    }
}
