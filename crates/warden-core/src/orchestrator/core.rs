//! The orchestrator: the three execution entry points and the four
//! background loops that drive them.

use std::path::Path;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

use warden_kernel::agent::AgentDefinition;
use warden_kernel::document::AgentStatus;
use warden_kernel::queue::{ExecutionContext, Priority, QueueItem, SpawnedBy};
use warden_kernel::session::{Role, SessionDiscriminator};

use crate::agent_loader::AgentLoader;
use crate::config::Config;
use crate::document_scanner::DocumentScanner;
use crate::event_bus::{QueueEventBus, QueueItemEvent};
use crate::llm::{LlmClient, LlmEvent, LlmRequest, ToolApproval};
use crate::permission_broker::{Decision, PermissionBroker};
use crate::queue::Queue;
use crate::session::{ContextBuilder, SessionStore};
use crate::vault::VaultStore;

use super::spawn::{decide, parse_spawn_blocks, SpawnDecision};
use super::types::{ChatFailure, ChatRequest, ChatResponse, ChatStreamEvent, PermissionDenial, SpawnedChild};

const WRITE_CLASS_TOOLS: &[&str] = &["write", "edit", "shell"];
const SYSTEM_PROMPT_CONTEXT_BUDGET_CHARS: usize = 50_000 * 4;

pub struct Orchestrator {
    pub vault: VaultStore,
    pub queue: Arc<Queue>,
    pub sessions: Arc<SessionStore>,
    pub permissions: Arc<PermissionBroker>,
    pub events: QueueEventBus,
    pub llm: Arc<dyn LlmClient>,
    pub config: Config,
    session_locks: dashmap::DashMap<String, Arc<Mutex<()>>>,
    in_flight: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        vault: VaultStore,
        queue: Arc<Queue>,
        sessions: Arc<SessionStore>,
        permissions: Arc<PermissionBroker>,
        events: QueueEventBus,
        llm: Arc<dyn LlmClient>,
        config: Config,
    ) -> Self {
        Self {
            vault,
            queue,
            sessions,
            permissions,
            events,
            llm,
            config,
            session_locks: dashmap::DashMap::new(),
            in_flight: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Record a spawned execution task so `drain_in_flight` can wait on it.
    /// Also sweeps handles of tasks that already finished, so the list
    /// doesn't grow unbounded across a long-running process.
    fn track_in_flight(&self, handle: tokio::task::JoinHandle<()>) {
        let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|h| !h.is_finished());
        guard.push(handle);
    }

    /// Give in-flight chat and queue-item executions up to `timeout` to
    /// finish. Called during shutdown, after new work stops being claimed.
    pub async fn drain_in_flight(&self, timeout: std::time::Duration) {
        let handles = std::mem::take(&mut *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()));
        let joined = futures::future::join_all(handles.into_iter().map(|h| async move { let _ = h.await; }));
        let _ = tokio::time::timeout(timeout, joined).await;
    }

    fn session_lock(&self, session_key: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_agent(&self, agent_path: &str) -> Result<AgentDefinition, String> {
        AgentLoader::new(&self.vault)
            .load(agent_path)
            .await
            .map_err(|e| e.to_string())
    }

    async fn build_system_prompt(&self, agent: &AgentDefinition) -> String {
        let mut prompt = agent.system_prompt.clone();
        let mut budget = SYSTEM_PROMPT_CONTEXT_BUDGET_CHARS.saturating_sub(prompt.len());
        for file in &agent.context_files {
            if budget == 0 {
                break;
            }
            if let Ok((_, body)) = self.vault.read(file).await {
                let take = body.len().min(budget);
                prompt.push_str("\n\n---\n\n");
                prompt.push_str(&body[..take]);
                budget = budget.saturating_sub(take);
            }
        }
        prompt
    }

    fn discriminator_for(agent: &AgentDefinition, req: &ChatRequest) -> SessionDiscriminator {
        match agent.variant {
            warden_kernel::agent::AgentVariant::DocumentBound => req
                .document_path
                .clone()
                .map(SessionDiscriminator::Document)
                .unwrap_or(SessionDiscriminator::Default),
            warden_kernel::agent::AgentVariant::Chatbot => req
                .session_id
                .clone()
                .map(SessionDiscriminator::Conversation)
                .unwrap_or(SessionDiscriminator::Default),
            warden_kernel::agent::AgentVariant::Standalone => SessionDiscriminator::Default,
        }
    }

    fn make_tool_approval_callback(
        &self,
        agent: Arc<AgentDefinition>,
        session_id: String,
        denials: Arc<tokio::sync::Mutex<Vec<PermissionDenial>>>,
    ) -> crate::llm::ToolApprovalCallback {
        let broker = self.permissions.clone();
        let vault_root = self.vault.root().to_path_buf();
        std::sync::Arc::new(move |tool_use_id_and_name: String, input: serde_json::Value| {
            let agent = agent.clone();
            let broker = broker.clone();
            let session_id = session_id.clone();
            let denials = denials.clone();
            let vault_root = vault_root.clone();
            Box::pin(async move {
                // `tool_use_id_and_name` is "<tool_use_id>:<tool_name>" — see call sites.
                let (tool_use_id, tool_name) = tool_use_id_and_name
                    .split_once(':')
                    .map(|(a, b)| (a.to_string(), b.to_string()))
                    .unwrap_or((tool_use_id_and_name.clone(), String::new()));

                if !agent.permissions.allows_tool(&tool_name) {
                    return ToolApproval::Deny {
                        message: format!("`{tool_name}` is not in this agent's tool whitelist"),
                    };
                }

                if !WRITE_CLASS_TOOLS.contains(&tool_name.as_str()) {
                    return ToolApproval::Allow { updated_input: input };
                }

                if tool_name == "shell" {
                    if agent.permissions.write_is_any() {
                        return ToolApproval::Allow { updated_input: input };
                    }
                    let command = input
                        .get("command")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    return Self::gate_write(&broker, &session_id, &tool_use_id, &agent, &tool_name, input, &command, &denials).await;
                }

                let Some(raw_path) = input
                    .get("file_path")
                    .or_else(|| input.get("path"))
                    .and_then(|v| v.as_str())
                else {
                    return ToolApproval::Allow { updated_input: input };
                };
                let relative = to_vault_relative(&vault_root, raw_path);
                if agent.permissions.matches_write(&relative) {
                    return ToolApproval::Allow { updated_input: input };
                }
                Self::gate_write(&broker, &session_id, &tool_use_id, &agent, &tool_name, input, &relative, &denials).await
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ToolApproval> + Send>>
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn gate_write(
        broker: &Arc<PermissionBroker>,
        session_id: &str,
        tool_use_id: &str,
        agent: &AgentDefinition,
        tool_name: &str,
        input: serde_json::Value,
        subject: &str,
        denials: &Arc<tokio::sync::Mutex<Vec<PermissionDenial>>>,
    ) -> ToolApproval {
        let decision = broker
            .request(
                session_id,
                tool_use_id,
                &agent.path,
                tool_name,
                input.clone(),
                subject,
                agent.permissions.write.clone(),
            )
            .await;
        match decision {
            Decision::Grant => ToolApproval::Allow { updated_input: input },
            Decision::Deny => {
                denials.lock().await.push(PermissionDenial {
                    path: subject.to_string(),
                    reason: "denied".to_string(),
                });
                ToolApproval::Deny {
                    message: format!("write to `{subject}` was not approved"),
                }
            }
        }
    }

    /// Immediate, unary execution.
    pub async fn run_chat(&self, req: ChatRequest) -> Result<ChatResponse, ChatFailure> {
        let start = std::time::Instant::now();
        let agent = self
            .load_agent(&req.agent_path)
            .await
            .map_err(|e| ChatFailure { success: false, error: e })?;
        let agent = Arc::new(agent);

        let discriminator = Self::discriminator_for(&agent, &req);
        let session_key_str = format!("{}::{}", agent.path, discriminator.as_key_part());
        let lock = self.session_lock(&session_key_str);
        let _guard = lock.lock().await;

        let system_prompt = self.build_system_prompt(&agent).await;

        let user_message = if agent.variant == warden_kernel::agent::AgentVariant::DocumentBound {
            if let Some(doc) = &req.document_path {
                match self.vault.read(doc).await {
                    Ok((_, body)) => format!("{body}\n\n---\n\n{}", req.message),
                    Err(_) => req.message.clone(),
                }
            } else {
                req.message.clone()
            }
        } else {
            req.message.clone()
        };

        let is_standalone = agent.variant == warden_kernel::agent::AgentVariant::Standalone;

        let (history, upstream_handle) = if is_standalone {
            (Vec::new(), None)
        } else {
            let (record, _) = self
                .sessions
                .get_or_create(&agent.path, discriminator.clone())
                .await
                .map_err(|e| ChatFailure { success: false, error: e.to_string() })?;
            (record.messages, record.upstream_handle)
        };

        let built = ContextBuilder::build(upstream_handle.as_deref(), &history, &user_message);

        if !is_standalone {
            self.sessions
                .add_message(&agent.path, discriminator.clone(), Role::User, user_message.clone())
                .await
                .map_err(|e| ChatFailure { success: false, error: e.to_string() })?;
        }

        let denials = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let session_id_for_permissions = req.session_id.clone().unwrap_or_else(|| session_key_str.clone());
        let callback = self.make_tool_approval_callback(agent.clone(), session_id_for_permissions, denials.clone());

        let llm_request = LlmRequest {
            model: agent.model.clone(),
            system_prompt,
            prompt: built.prompt,
            resume_handle: built.resume_handle,
            tools: agent.tools.clone().unwrap_or_default(),
        };

        let mut tool_calls = Vec::new();
        let mut final_text = String::new();
        let mut upstream_session_id = None;
        let mut errored = None;

        match self.llm.query_stream(llm_request, callback).await {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event {
                        LlmEvent::AssistantText { text } => final_text = text,
                        LlmEvent::ToolUse { tool_name, .. } => tool_calls.push(tool_name),
                        LlmEvent::Done { upstream_session_id: handle } => upstream_session_id = handle,
                        LlmEvent::Error { message } => errored = Some(message),
                        LlmEvent::Init => {}
                    }
                }
            }
            Err(e) => errored = Some(e.to_string()),
        }

        if let Some(message) = errored {
            if !is_standalone {
                let _ = self
                    .sessions
                    .add_message(&agent.path, discriminator.clone(), Role::System, format!("error: {message}"))
                    .await;
            }
            return Err(ChatFailure { success: false, error: message });
        }

        if !is_standalone {
            self.sessions
                .add_message(&agent.path, discriminator.clone(), Role::Assistant, final_text.clone())
                .await
                .map_err(|e| ChatFailure { success: false, error: e.to_string() })?;
            self.sessions
                .update_upstream_handle(&agent.path, discriminator.clone(), upstream_session_id)
                .await
                .map_err(|e| ChatFailure { success: false, error: e.to_string() })?;
        }

        let spawned = self.dispatch_spawns(&agent, &final_text, req.depth, None).await;

        let message_count = if is_standalone {
            0
        } else {
            self.sessions
                .get_messages(&agent.path, discriminator.clone())
                .await
                .map(|m| m.len())
                .unwrap_or(0)
        };

        Ok(ChatResponse {
            response: final_text,
            spawned,
            duration_ms: start.elapsed().as_millis() as u64,
            session_id: session_key_str,
            message_count,
            tool_calls,
            permission_denials: denials.lock().await.clone(),
            session_resume: built.resume_info,
            debug: serde_json::json!({}),
        })
    }

    /// Parse spawn directives out of assistant text and enqueue the ones
    /// the parent agent is permitted and depth-allowed to spawn.
    async fn dispatch_spawns(
        &self,
        parent: &AgentDefinition,
        text: &str,
        parent_depth: u32,
        parent_queue_id: Option<String>,
    ) -> Vec<SpawnedChild> {
        let mut spawned = Vec::new();
        for request in parse_spawn_blocks(text) {
            match decide(parent, &request, parent_depth) {
                SpawnDecision::Allowed { depth } => {
                    let Ok(child_agent) = self.load_agent(&request.agent_path).await else {
                        warn!("spawn target not found: {}", request.agent_path);
                        continue;
                    };
                    let context = ExecutionContext {
                        message: request.message,
                        document_path: None,
                        parent_agent_path: Some(parent.path.clone()),
                        extra: request.context.unwrap_or(serde_json::Value::Null),
                    };
                    let spawned_by = parent_queue_id.clone().map(|queue_id| SpawnedBy {
                        queue_id,
                        agent_path: parent.path.clone(),
                    });
                    let item = QueueItem::new(
                        new_queue_id(),
                        child_agent,
                        context,
                        request.priority,
                        depth,
                        spawned_by,
                        None,
                        chrono::Utc::now(),
                    );
                    match self.queue.enqueue(item).await {
                        Ok(queue_id) => spawned.push(SpawnedChild {
                            queue_id,
                            agent_path: request.agent_path,
                        }),
                        Err(e) => warn!("failed to enqueue spawned agent: {e}"),
                    }
                }
                SpawnDecision::DeniedByPermission => {
                    warn!("spawn denied by permission policy: {}", request.agent_path);
                }
                SpawnDecision::DepthExceeded => {
                    warn!("spawn denied, depth exceeded: {}", request.agent_path);
                }
            }
        }
        spawned
    }

    /// Immediate, streaming execution. The first event is always `session`.
    pub fn run_chat_stream(
        self: Arc<Self>,
        req: ChatRequest,
    ) -> impl Stream<Item = ChatStreamEvent> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            let agent = match self.load_agent(&req.agent_path).await {
                Ok(a) => Arc::new(a),
                Err(e) => {
                    let _ = tx.send(ChatStreamEvent::Error { message: e });
                    return;
                }
            };
            let discriminator = Self::discriminator_for(&agent, &req);
            let session_key_str = format!("{}::{}", agent.path, discriminator.as_key_part());

            let is_standalone = agent.variant == warden_kernel::agent::AgentVariant::Standalone;
            let (history, upstream_handle) = if is_standalone {
                (Vec::new(), None)
            } else {
                match self.sessions.get_or_create(&agent.path, discriminator.clone()).await {
                    Ok((record, _)) => (record.messages, record.upstream_handle),
                    Err(e) => {
                        let _ = tx.send(ChatStreamEvent::Error { message: e.to_string() });
                        return;
                    }
                }
            };

            let built = ContextBuilder::build(upstream_handle.as_deref(), &history, &req.message);
            let _ = tx.send(ChatStreamEvent::Session {
                session_id: session_key_str.clone(),
                session_resume: built.resume_info.clone(),
            });

            if !is_standalone {
                let _ = self
                    .sessions
                    .add_message(&agent.path, discriminator.clone(), Role::User, req.message.clone())
                    .await;
            }

            let system_prompt = self.build_system_prompt(&agent).await;
            let denials = Arc::new(tokio::sync::Mutex::new(Vec::new()));
            let callback = self.make_tool_approval_callback(
                agent.clone(),
                req.session_id.clone().unwrap_or_else(|| session_key_str.clone()),
                denials.clone(),
            );

            let llm_request = LlmRequest {
                model: agent.model.clone(),
                system_prompt,
                prompt: built.prompt,
                resume_handle: built.resume_handle,
                tools: agent.tools.clone().unwrap_or_default(),
            };

            let start = std::time::Instant::now();
            let mut last_text = String::new();
            let mut tool_calls = Vec::new();
            let mut upstream_session_id = None;

            let mut stream = match self.llm.query_stream(llm_request, callback).await {
                Ok(s) => s,
                Err(e) => {
                    let _ = tx.send(ChatStreamEvent::Error { message: e.to_string() });
                    return;
                }
            };

            while let Some(event) = stream.next().await {
                match event {
                    LlmEvent::Init => {
                        let _ = tx.send(ChatStreamEvent::Init);
                    }
                    LlmEvent::AssistantText { text } => {
                        let delta = text.strip_prefix(last_text.as_str()).unwrap_or(&text).to_string();
                        last_text = text.clone();
                        let _ = tx.send(ChatStreamEvent::Text { content: text, delta });
                    }
                    LlmEvent::ToolUse { tool_name, input, .. } => {
                        tool_calls.push(tool_name.clone());
                        let _ = tx.send(ChatStreamEvent::ToolUse { tool_name, input });
                    }
                    LlmEvent::Done { upstream_session_id: handle } => upstream_session_id = handle,
                    LlmEvent::Error { message } => {
                        let _ = tx.send(ChatStreamEvent::Error { message });
                        return;
                    }
                }
            }

            if !is_standalone {
                let _ = self
                    .sessions
                    .add_message(&agent.path, discriminator.clone(), Role::Assistant, last_text.clone())
                    .await;
                let _ = self
                    .sessions
                    .update_upstream_handle(&agent.path, discriminator.clone(), upstream_session_id)
                    .await;
            }

            let spawned = self.dispatch_spawns(&agent, &last_text, req.depth, None).await;
            let message_count = if is_standalone {
                0
            } else {
                self.sessions
                    .get_messages(&agent.path, discriminator.clone())
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0)
            };

            let result = ChatResponse {
                response: last_text,
                spawned,
                duration_ms: start.elapsed().as_millis() as u64,
                session_id: session_key_str,
                message_count,
                tool_calls,
                permission_denials: denials.lock().await.clone(),
                session_resume: built.resume_info,
                debug: serde_json::json!({}),
            };
            let _ = tx.send(ChatStreamEvent::Done { result: Box::new(result) });
        });
        tracker.track_in_flight(handle);

        tokio_stream::wrappers::UnboundedReceiverStream::new(rx)
    }

    /// Queued execution: appends a work item; the drain loop claims it.
    pub async fn enqueue(
        &self,
        agent_path: &str,
        context: ExecutionContext,
        priority: Priority,
        depth: u32,
        spawned_by: Option<SpawnedBy>,
        scheduled_for: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<String, String> {
        let agent = self.load_agent(agent_path).await?;
        let item = QueueItem::new(
            new_queue_id(),
            agent,
            context,
            priority,
            depth,
            spawned_by,
            scheduled_for,
            chrono::Utc::now(),
        );
        self.queue.enqueue(item).await.map_err(|e| e.to_string())
    }

    /// Execute a single claimed queue item, publishing events and
    /// persisting the outcome.
    async fn execute_queue_item(self: Arc<Self>, item: QueueItem) {
        self.events
            .publish(
                &item.id,
                QueueItemEvent::Connected {
                    queue_id: item.id.clone(),
                    agent_path: item.agent_path.clone(),
                },
            )
            .await;

        let req = ChatRequest {
            agent_path: item.agent_path.clone(),
            message: item.context.message.clone(),
            document_path: item.context.document_path.clone(),
            session_id: None,
            initial_context: Some(item.context.extra.clone()),
            depth: item.depth,
        };

        match self.run_chat(req).await {
            Ok(response) => {
                self.events
                    .publish(
                        &item.id,
                        QueueItemEvent::Done {
                            result: serde_json::to_value(&response).unwrap_or(serde_json::Value::Null),
                        },
                    )
                    .await;
                let _ = self
                    .queue
                    .mark_completed(&item.id, serde_json::to_value(&response).unwrap_or_default())
                    .await;
            }
            Err(failure) => {
                self.events
                    .publish(&item.id, QueueItemEvent::Error { message: failure.error.clone() })
                    .await;
                let _ = self.queue.mark_failed(&item.id, failure.error).await;
            }
        }
    }

    /// Claim up to `maxConcurrent` pending items and launch them without
    /// awaiting completion.
    pub async fn drain_once(self: Arc<Self>) {
        for _ in 0..self.config.max_concurrent {
            let Some(item) = self.queue.next().await else {
                break;
            };
            let this = Arc::clone(&self);
            let handle = tokio::spawn(async move {
                this.execute_queue_item(item).await;
            });
            self.track_in_flight(handle);
        }
    }

    pub async fn run_trigger_pass(&self) {
        let scanner = DocumentScanner::new(&self.vault);
        let now = chrono::Utc::now();

        let triggered = match scanner.find_triggered(now).await {
            Ok(t) => t,
            Err(e) => {
                warn!("trigger scan failed: {e}");
                return;
            }
        };
        for (doc_path, entry) in &triggered {
            if let Err(e) = scanner
                .update_status(doc_path, &entry.agent_path, AgentStatus::NeedsRun, None, None)
                .await
            {
                warn!("failed to promote {doc_path}/{}: {e}", entry.agent_path);
            }
        }

        let needs_run = match scanner.find_needs_run().await {
            Ok(v) => v,
            Err(e) => {
                warn!("needs_run scan failed: {e}");
                return;
            }
        };
        for (doc_path, entry) in needs_run {
            if let Err(e) = scanner
                .update_status(&doc_path, &entry.agent_path, AgentStatus::Running, None, None)
                .await
            {
                warn!("failed to mark running {doc_path}/{}: {e}", entry.agent_path);
                continue;
            }
            let context = ExecutionContext {
                message: format!("run as scheduled ({})", entry.trigger),
                document_path: Some(doc_path.clone()),
                parent_agent_path: None,
                extra: serde_json::Value::Null,
            };
            if let Err(e) = self
                .enqueue(&entry.agent_path, context, Priority::Normal, 0, None, None)
                .await
            {
                warn!("failed to enqueue triggered agent {}: {e}", entry.agent_path);
            }
            info!(document = %doc_path, agent = %entry.agent_path, "trigger fired");
        }
    }
}

fn new_queue_id() -> String {
    format!("q_{}", uuid::Uuid::new_v4())
}

fn to_vault_relative(vault_root: &Path, raw_path: &str) -> String {
    let candidate = Path::new(raw_path);
    if candidate.is_absolute() {
        candidate
            .strip_prefix(vault_root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| raw_path.to_string())
    } else {
        raw_path.to_string()
    }
}
