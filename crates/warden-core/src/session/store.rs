//! Lazy-loaded, write-on-change session persistence.
//!
//! At boot the store indexes every session file under the primary sessions
//! root plus two legacy roots (cheaply, via a header scan and a regex count
//! over message headers); full sessions load into an in-memory map on first
//! access by key, and an idle sweep evicts inactive entries from that map
//! without touching the on-disk files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;

use warden_kernel::session::{Message, Role, SessionDiscriminator, SessionKey};

use super::format::{self, ParsedSession};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionStoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format error: {0}")]
    Format(#[from] super::format::FormatError),
}

pub type SessionResult<T> = Result<T, SessionStoreError>;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub key: SessionKey,
    pub agent_name: String,
    pub title: Option<String>,
    pub messages: Vec<Message>,
    pub upstream_handle: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
    pub archived: bool,
    pub context: Option<serde_json::Value>,
    pub file_path: PathBuf,
}

impl SessionRecord {
    fn to_parsed(&self) -> ParsedSession {
        ParsedSession {
            session_id: self.id.clone(),
            session_key: self.key.canonical(),
            agent_path: self.key.agent_path.clone(),
            agent_name: self.agent_name.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            last_accessed: self.last_accessed,
            upstream_handle: self.upstream_handle.clone(),
            archived: self.archived,
            context: self.context.clone(),
            messages: self.messages.clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndexEntry {
    pub id: String,
    pub key: String,
    pub agent_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
    pub archived: bool,
    pub upstream_handle: Option<String>,
    pub message_count: usize,
    #[serde(skip)]
    pub file_path: PathBuf,
}

const DEFAULT_IDLE_MINUTES: i64 = 30;

pub struct SessionStore {
    sessions_root: PathBuf,
    legacy_roots: Vec<PathBuf>,
    index: RwLock<HashMap<String, SessionIndexEntry>>,
    loaded: RwLock<HashMap<String, SessionRecord>>,
    touched: RwLock<HashMap<String, Instant>>,
    idle_window: Duration,
    header_re: Arc<Regex>,
}

impl SessionStore {
    pub fn new(sessions_root: impl Into<PathBuf>, legacy_roots: Vec<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            legacy_roots,
            index: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashMap::new()),
            touched: RwLock::new(HashMap::new()),
            idle_window: Duration::from_secs((DEFAULT_IDLE_MINUTES * 60) as u64),
            header_re: Arc::new(Regex::new(r"(?m)^### (User|Assistant|System) \|").unwrap()),
        }
    }

    /// Walk the sessions directory tree plus the legacy roots, building a
    /// lightweight index without fully parsing message bodies.
    pub async fn boot(&self) -> SessionResult<()> {
        let mut all_roots = vec![self.sessions_root.clone()];
        all_roots.extend(self.legacy_roots.clone());

        let mut index = HashMap::new();
        for root in all_roots {
            if !root.exists() {
                continue;
            }
            self.index_dir(&root, &mut index).await?;
        }
        *self.index.write().await = index;
        Ok(())
    }

    fn index_dir<'a>(
        &'a self,
        dir: &'a Path,
        out: &'a mut HashMap<String, SessionIndexEntry>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = SessionResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    self.index_dir(&path, out).await?;
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                    continue;
                }
                let Ok(raw) = fs::read_to_string(&path).await else {
                    continue;
                };
                let Ok(parsed) = format::parse(&raw) else {
                    warn!("skipping unparsable session file: {path:?}");
                    continue;
                };
                let message_count = self.header_re.find_iter(&raw).count();
                out.insert(
                    parsed.session_id.clone(),
                    SessionIndexEntry {
                        id: parsed.session_id.clone(),
                        key: parsed.session_key.clone(),
                        agent_path: parsed.agent_path.clone(),
                        created_at: parsed.created_at,
                        last_accessed: parsed.last_accessed,
                        archived: parsed.archived,
                        upstream_handle: parsed.upstream_handle.clone(),
                        message_count,
                        file_path: path,
                    },
                );
            }
            Ok(())
        })
    }

    fn file_path_for(&self, key: &SessionKey, now: chrono::DateTime<chrono::Utc>) -> PathBuf {
        let agent_name = key.agent_path.trim_start_matches("agents/").replace('/', "_");
        let date = now.format("%Y-%m-%d");
        let discriminator_suffix = match &key.discriminator {
            SessionDiscriminator::Default => String::new(),
            other => format!("-{}", sanitize_filename(other.as_key_part())),
        };
        self.sessions_root
            .join(&agent_name)
            .join(format!("{date}{discriminator_suffix}.txt"))
    }

    pub async fn get_or_create(
        &self,
        agent_path: &str,
        discriminator: SessionDiscriminator,
    ) -> SessionResult<(SessionRecord, bool)> {
        let key = SessionKey::new(agent_path, discriminator);
        let canonical = key.canonical();

        if let Some(record) = self.loaded.read().await.get(&canonical).cloned() {
            self.touch(&canonical).await;
            return Ok((record, false));
        }

        if let Some(path) = self.index_path_for_key(&canonical).await {
            if let Ok(raw) = fs::read_to_string(&path).await {
                if let Ok(parsed) = format::parse(&raw) {
                    let record = record_from_parsed(parsed, path);
                    self.loaded.write().await.insert(canonical.clone(), record.clone());
                    self.touch(&canonical).await;
                    return Ok((record, false));
                }
            }
        }

        let now = chrono::Utc::now();
        let file_path = self.file_path_for(&key, now);
        let record = SessionRecord {
            id: new_session_id(),
            key: key.clone(),
            agent_name: agent_path.to_string(),
            title: None,
            messages: Vec::new(),
            upstream_handle: None,
            created_at: now,
            last_accessed: now,
            archived: false,
            context: None,
            file_path,
        };
        self.loaded.write().await.insert(canonical.clone(), record.clone());
        self.touch(&canonical).await;
        self.persist(&record).await;
        Ok((record, true))
    }

    async fn index_path_for_key(&self, canonical: &str) -> Option<PathBuf> {
        self.index
            .read()
            .await
            .values()
            .find(|e| e.key == canonical)
            .map(|e| e.file_path.clone())
    }

    async fn touch(&self, canonical: &str) {
        self.touched.write().await.insert(canonical.to_string(), Instant::now());
    }

    async fn persist(&self, record: &SessionRecord) {
        if let Some(parent) = record.file_path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!("failed to create sessions directory {parent:?}: {e}");
                return;
            }
        }
        let text = format::format(&record.to_parsed());
        if let Err(e) = fs::write(&record.file_path, text).await {
            warn!("failed to persist session {}: {e}", record.id);
        }
    }

    pub async fn add_message(
        &self,
        agent_path: &str,
        discriminator: SessionDiscriminator,
        role: Role,
        content: impl Into<String>,
    ) -> SessionResult<SessionRecord> {
        let (mut record, _) = self.get_or_create(agent_path, discriminator.clone()).await?;
        record.messages.push(Message {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        });
        record.last_accessed = chrono::Utc::now();
        let key = SessionKey::new(agent_path, discriminator);
        self.loaded.write().await.insert(key.canonical(), record.clone());
        self.persist(&record).await;
        Ok(record)
    }

    pub async fn update_upstream_handle(
        &self,
        agent_path: &str,
        discriminator: SessionDiscriminator,
        handle: Option<String>,
    ) -> SessionResult<()> {
        let sanitized = warden_kernel::session::sanitize_upstream_handle(handle.as_deref());
        let (mut record, _) = self.get_or_create(agent_path, discriminator.clone()).await?;
        record.upstream_handle = sanitized;
        let key = SessionKey::new(agent_path, discriminator);
        self.loaded.write().await.insert(key.canonical(), record.clone());
        self.persist(&record).await;
        Ok(())
    }

    pub async fn get_messages(
        &self,
        agent_path: &str,
        discriminator: SessionDiscriminator,
    ) -> SessionResult<Vec<Message>> {
        let (record, _) = self.get_or_create(agent_path, discriminator).await?;
        Ok(record.messages)
    }

    /// Archive the existing file by renaming with a timestamp suffix and
    /// reset the in-memory record to empty.
    pub async fn clear(&self, agent_path: &str, discriminator: SessionDiscriminator) -> SessionResult<()> {
        let key = SessionKey::new(agent_path, discriminator);
        let canonical = key.canonical();
        if let Some(record) = self.loaded.read().await.get(&canonical).cloned() {
            if record.file_path.exists() {
                let suffix = chrono::Utc::now().format("%Y%m%d%H%M%S");
                let archived_path = record
                    .file_path
                    .with_file_name(format!(
                        "{}-{suffix}.txt",
                        record.file_path.file_stem().unwrap_or_default().to_string_lossy()
                    ));
                let _ = fs::rename(&record.file_path, archived_path).await;
            }
        }
        self.loaded.write().await.remove(&canonical);
        self.touched.write().await.remove(&canonical);
        self.index.write().await.retain(|_, e| e.key != canonical);
        Ok(())
    }

    pub async fn delete(&self, agent_path: &str, discriminator: SessionDiscriminator) -> SessionResult<()> {
        let key = SessionKey::new(agent_path, discriminator);
        let canonical = key.canonical();
        if let Some(record) = self.loaded.read().await.get(&canonical).cloned() {
            let _ = fs::remove_file(&record.file_path).await;
        }
        self.loaded.write().await.remove(&canonical);
        self.touched.write().await.remove(&canonical);
        self.index.write().await.retain(|_, e| e.key != canonical);
        Ok(())
    }

    pub async fn list(&self) -> Vec<SessionIndexEntry> {
        self.index.read().await.values().cloned().collect()
    }

    pub async fn get_by_id(&self, id: &str) -> SessionResult<SessionRecord> {
        for record in self.loaded.read().await.values() {
            if record.id == id {
                return Ok(record.clone());
            }
        }
        let path = {
            let index = self.index.read().await;
            index
                .get(id)
                .map(|e| e.file_path.clone())
                .ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?
        };
        let raw = fs::read_to_string(&path).await?;
        let parsed = format::parse(&raw)?;
        let canonical = parsed.session_key.clone();
        let record = record_from_parsed(parsed, path);
        self.loaded.write().await.insert(canonical.clone(), record.clone());
        self.touch(&canonical).await;
        Ok(record)
    }

    pub async fn set_archived(&self, id: &str, archived: bool) -> SessionResult<()> {
        let mut record = self.get_by_id(id).await?;
        record.archived = archived;
        let canonical = record.key.canonical();
        self.loaded.write().await.insert(canonical, record.clone());
        self.persist(&record).await;
        if let Some(entry) = self.index.write().await.values_mut().find(|e| e.id == id) {
            entry.archived = archived;
        }
        Ok(())
    }

    pub async fn delete_by_id(&self, id: &str) -> SessionResult<()> {
        let record = self.get_by_id(id).await?;
        let _ = fs::remove_file(&record.file_path).await;
        let canonical = record.key.canonical();
        self.loaded.write().await.remove(&canonical);
        self.touched.write().await.remove(&canonical);
        self.index.write().await.remove(id);
        Ok(())
    }

    /// Drop loaded entries idle longer than the configured window from the
    /// in-memory map. Files are untouched.
    pub async fn evict_stale(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<String> = self
            .touched
            .read()
            .await
            .iter()
            .filter(|(_, t)| now.duration_since(**t) > self.idle_window)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.loaded.write().await.remove(key);
            self.touched.write().await.remove(key);
        }
        stale.len()
    }

    /// Remove index entries for archived sessions older than `max_age_days`.
    pub async fn cleanup(&self, max_age_days: i64) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(max_age_days);
        let mut index = self.index.write().await;
        let before = index.len();
        index.retain(|_, e| !(e.archived && e.last_accessed < cutoff));
        before - index.len()
    }
}

fn record_from_parsed(parsed: ParsedSession, file_path: PathBuf) -> SessionRecord {
    let discriminator = if parsed.session_key.ends_with("::default") {
        SessionDiscriminator::Default
    } else {
        SessionDiscriminator::Conversation(
            parsed
                .session_key
                .rsplit_once("::")
                .map(|(_, d)| d.to_string())
                .unwrap_or_default(),
        )
    };
    SessionRecord {
        id: parsed.session_id,
        key: SessionKey::new(parsed.agent_path, discriminator),
        agent_name: parsed.agent_name,
        title: parsed.title,
        messages: parsed.messages,
        upstream_handle: parsed.upstream_handle,
        created_at: parsed.created_at,
        last_accessed: parsed.last_accessed,
        archived: parsed.archived,
        context: parsed.context,
        file_path,
    }
}

fn new_session_id() -> String {
    format!("sess_{}", uuid::Uuid::new_v4())
}

fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_new_then_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("agent-sessions"), vec![]);
        let (rec1, is_new1) = store
            .get_or_create("agents/helper", SessionDiscriminator::Conversation("s1".into()))
            .await
            .unwrap();
        assert!(is_new1);
        let (rec2, is_new2) = store
            .get_or_create("agents/helper", SessionDiscriminator::Conversation("s1".into()))
            .await
            .unwrap();
        assert!(!is_new2);
        assert_eq!(rec1.id, rec2.id);
    }

    #[tokio::test]
    async fn add_message_persists_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("agent-sessions"), vec![]);
        let disc = SessionDiscriminator::Conversation("s1".into());
        store
            .add_message("agents/helper", disc.clone(), Role::User, "Hello")
            .await
            .unwrap();
        store
            .add_message("agents/helper", disc.clone(), Role::Assistant, "Hi")
            .await
            .unwrap();
        let messages = store.get_messages("agents/helper", disc).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].content, "Hi");
    }

    #[tokio::test]
    async fn invalid_upstream_handle_normalizes_to_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("agent-sessions"), vec![]);
        let disc = SessionDiscriminator::Conversation("s1".into());
        store
            .update_upstream_handle("agents/helper", disc.clone(), Some("[object Object]".into()))
            .await
            .unwrap();
        let (record, _) = store.get_or_create("agents/helper", disc).await.unwrap();
        assert_eq!(record.upstream_handle, None);
    }

    #[tokio::test]
    async fn boot_indexes_existing_files_without_loading_them() {
        let dir = tempfile::tempdir().unwrap();
        let sessions_root = dir.path().join("agent-sessions");
        let store = SessionStore::new(sessions_root.clone(), vec![]);
        store
            .add_message(
                "agents/helper",
                SessionDiscriminator::Conversation("s1".into()),
                Role::User,
                "Hello",
            )
            .await
            .unwrap();

        let reopened = SessionStore::new(sessions_root, vec![]);
        reopened.boot().await.unwrap();
        let entries = reopened.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message_count, 1);
        assert!(reopened.loaded.read().await.is_empty());
    }

    #[tokio::test]
    async fn clear_archives_file_and_resets_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("agent-sessions"), vec![]);
        let disc = SessionDiscriminator::Conversation("s1".into());
        store
            .add_message("agents/helper", disc.clone(), Role::User, "Hello")
            .await
            .unwrap();
        store.clear("agents/helper", disc.clone()).await.unwrap();
        let (record, is_new) = store.get_or_create("agents/helper", disc).await.unwrap();
        assert!(is_new);
        assert!(record.messages.is_empty());
    }
}
