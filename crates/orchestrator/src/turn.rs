//! The Turn Orchestrator (§4.5): the 11-step procedure that drives one
//! user message to a persisted assistant Message, an updated Agent-State
//! row, and a fresh sandbox snapshot.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use stratus_core::{AgentMessage, AgentMode, AgentState, ChatRole, Session, SessionStatus};
use stratus_sandbox::{AcquireRequest, LocalProcessSandbox, SandboxCredentials, SandboxManager};
use stratus_store::{LiveStreamStore, SqliteStore};
use stratus_tools::ToolRegistry;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::engine::{EngineEvent, EngineOutcome, EngineRequest, InferenceEngine, ProviderConfig};
use crate::error::OrchestratorError;
use crate::provider_routing::{context_window_for, resolve_provider, route_model, ProviderEnv};
use crate::tool_context_impl::OrchestratorToolContext;

/// Coalesced flush window for token/reasoning buffers (§4.5 step 7: 50-100ms).
const TOKEN_FLUSH_INTERVAL: Duration = Duration::from_millis(75);
/// Cancellation poll interval (§4.5 step 8, §5).
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct TurnRequest {
    pub session_id: String,
    pub message: String,
    pub model: Option<String>,
    pub alpha_mode: bool,
    pub agent_mode: Option<AgentMode>,
}

/// Sandbox/runtime credentials read once at construction; §6 env vars.
#[derive(Debug, Clone, Default)]
pub struct RuntimeCredentials {
    pub sandbox: SandboxCredentials,
    pub github_token: Option<String>,
    pub github_identity: (u64, String),
}

impl RuntimeCredentials {
    pub fn from_environment() -> Self {
        let sandbox = SandboxCredentials {
            token: std::env::var("VERCEL_TOKEN").unwrap_or_default(),
            project_id: std::env::var("VERCEL_PROJECT_ID").unwrap_or_default(),
            team_id: std::env::var("VERCEL_TEAM_ID").unwrap_or_default(),
        };
        RuntimeCredentials {
            sandbox,
            github_token: std::env::var("GITHUB_TOKEN").ok(),
            // The authenticated-GitHub-user identity named in §4.3 comes
            // from the OAuth flow explicitly out of scope in §1; git
            // commit identity falls back to the session's repo owner.
            github_identity: (0, String::new()),
        }
    }
}

/// Drives turns for any session against a fixed [`LocalProcessSandbox`]
/// and a pluggable [`InferenceEngine`].
pub struct TurnOrchestrator {
    pub store: SqliteStore,
    pub live: LiveStreamStore,
    pub sandbox: Arc<SandboxManager<LocalProcessSandbox>>,
    pub http: reqwest::Client,
    pub engine: Arc<dyn InferenceEngine>,
    pub credentials: RuntimeCredentials,
}

/// What survives a successful LLM loop, carried into the success finalize
/// path. `ctx` is also threaded through the cancelled/error paths whenever
/// the sandbox was successfully acquired, since snapshotting still applies.
struct TurnRun {
    ctx: Arc<OrchestratorToolContext>,
    agent_state: AgentState,
    mode_switch: Option<AgentMode>,
    title_generated: bool,
    model: String,
    provider: ProviderConfig,
}

type TurnFailure = (Option<Arc<OrchestratorToolContext>>, Option<AgentState>, OrchestratorError);

impl TurnOrchestrator {
    pub fn new(
        store: SqliteStore,
        live: LiveStreamStore,
        sandbox: Arc<SandboxManager<LocalProcessSandbox>>,
        http: reqwest::Client,
        engine: Arc<dyn InferenceEngine>,
        credentials: RuntimeCredentials,
    ) -> Self {
        TurnOrchestrator {
            store,
            live,
            sandbox,
            http,
            engine,
            credentials,
        }
    }

    #[instrument(skip(self, req, abort), fields(session_id = %req.session_id))]
    pub async fn run_turn(&self, req: TurnRequest, abort: CancellationToken) -> Result<(), OrchestratorError> {
        match self.execute(&req, abort).await {
            Ok(run) => self.finalize_success(&req, run).await,
            Err((ctx, agent_state, OrchestratorError::CancelledByUser)) => {
                self.finalize_partial(&req, ctx, agent_state, None).await
            }
            Err((ctx, agent_state, e)) => {
                let message = e.to_string();
                self.finalize_partial(&req, ctx, agent_state, Some(message)).await?;
                Err(e)
            }
        }
    }

    async fn execute(&self, req: &TurnRequest, abort: CancellationToken) -> Result<TurnRun, TurnFailure> {
        let session = self
            .store
            .require_session(&req.session_id)
            .await
            .map_err(|e| (None, None, e.into()))?;

        // Step 1: resolve provider.
        let env = ProviderEnv::from_environment();
        let model = req.model.clone().unwrap_or_else(|| session.model.clone());
        let provider_kind = route_model(&model, &env);
        let provider = resolve_provider(provider_kind, &env, &session.id)
            .map_err(|e| (None, None, OrchestratorError::MissingCredentials(e)))?;

        let github_token = self
            .credentials
            .github_token
            .clone()
            .ok_or_else(|| (None, None, OrchestratorError::MissingCredentials("GITHUB_TOKEN not set".into())))?;

        // Step 2: acquire sandbox, persist handles.
        let (login, user_id) = if self.credentials.github_identity.1.is_empty() {
            (session.owner.clone(), self.credentials.github_identity.0)
        } else {
            (self.credentials.github_identity.1.clone(), self.credentials.github_identity.0)
        };
        let acquire_req = AcquireRequest {
            session_id: session.id.clone(),
            owner: session.owner.clone(),
            repo: session.repo.clone(),
            branch: session.branch.clone(),
            session_branch: if session.session_branch.is_empty() {
                None
            } else {
                Some(session.session_branch.clone())
            },
            snapshot_id: session.snapshot_id.clone(),
            sandbox_id: session.sandbox_id.clone(),
            github_user_id: user_id,
            github_login: login,
            github_token: github_token.clone(),
        };

        let outcome = self
            .sandbox
            .acquire(&acquire_req, &self.credentials.sandbox)
            .await
            .map_err(|e| (None, None, OrchestratorError::from(e)))?;

        self.store
            .set_sandbox_handles(&session.id, Some(outcome.handle.id.clone()), None)
            .await
            .map_err(|e| (None, None, OrchestratorError::from(e)))?;
        if session.session_branch.is_empty() {
            let _ = self.store.set_session_branch(&session.id, &outcome.session_branch).await;
        }

        let root = self
            .sandbox
            .provider()
            .workdir(&outcome.handle.id)
            .unwrap_or_else(|| PathBuf::from("/work"));

        // Build the ToolContext as soon as the sandbox is in hand, so every
        // failure from here on can still snapshot it on the way out.
        let mut registry = ToolRegistry::new();
        stratus_tools::register_all(&mut registry);

        let cancel_flag = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(OrchestratorToolContext {
            session_id: session.id.clone(),
            owner: session.owner.clone(),
            repo: session.repo.clone(),
            branch: session.branch.clone(),
            session_branch: outcome.session_branch.clone(),
            agent_mode: req.agent_mode.unwrap_or(session.agent),
            alpha_mode: req.alpha_mode,
            github_token,
            root: root.clone(),
            cancel_flag: cancel_flag.clone(),
            sandbox: self.sandbox.clone(),
            handle: AsyncMutex::new(outcome.handle),
            acquire_req,
            credentials: self.credentials.sandbox.clone(),
            http: self.http.clone(),
            live: self.live.clone(),
            store: self.store.clone(),
        });

        // Step 3: load agent-state.
        let mut agent_state = self
            .store
            .get_agent_state(&session.id)
            .await
            .map_err(|e| (Some(ctx.clone()), None, OrchestratorError::from(e)))?
            .unwrap_or_else(|| AgentState::new(session.id.clone()));

        let current_agent = req.agent_mode.unwrap_or(agent_state.current_agent);
        let just_switched_to_build = current_agent == AgentMode::Build && agent_state.current_agent == AgentMode::Plan;
        agent_state.current_agent = current_agent;

        // Step 4: compose message content.
        let mut user_text = req.message.clone();
        if current_agent == AgentMode::Plan {
            if agent_state.plan_file_path.is_none() {
                let plan_path = format!("/work/.stratuscode/plans/{}.md", session.id);
                let plans_dir = root.join(".stratuscode").join("plans");
                if let Err(e) = tokio::fs::create_dir_all(&plans_dir).await {
                    warn!(session_id = %session.id, error = %e, "failed to create plans directory");
                }
                let plan_file = plans_dir.join(format!("{}.md", session.id));
                if tokio::fs::metadata(&plan_file).await.is_err() {
                    let _ = tokio::fs::write(&plan_file, "# Plan\n").await;
                }
                agent_state.plan_file_path = Some(plan_path);
            }
            user_text.push_str(
                "\n\n[plan mode] You may only write to the plan file. End this turn with either a \
                 question or plan_exit.",
            );
        } else if just_switched_to_build {
            user_text.push_str("\n\n[build mode] The plan was approved; you may now make code changes.");
        }

        // Step 6: build system prompt.
        let system_prompt = build_system_prompt(&session, &registry, current_agent, req.alpha_mode);

        // Step 7/8: run the LLM loop with coalesced flushing + cancel poller.
        let request = EngineRequest {
            system_prompt,
            sage_messages: agent_state.sage_messages.clone(),
            user_message: user_text,
            session_id: session.id.clone(),
            existing_summary: agent_state.summary.clone(),
            model: model.clone(),
            context_window: context_window_for(&model),
            provider: provider.clone(),
        };

        let mode_switch = Arc::new(AsyncMutex::new(None::<AgentMode>));
        let run_result = self
            .run_llm_loop(&session, request, &registry, ctx.as_ref(), abort, cancel_flag, mode_switch.clone())
            .await;

        match run_result {
            Ok(outcome) => {
                agent_state.summary = outcome.new_summary.clone().or(agent_state.summary);
                agent_state.sage_messages = merge_sage_messages(&agent_state.sage_messages, &outcome);
                Ok(TurnRun {
                    ctx,
                    agent_state,
                    mode_switch: mode_switch.lock().await.clone(),
                    title_generated: session.title_generated,
                    model: model.clone(),
                    provider,
                })
            }
            Err(e) => Err((Some(ctx), Some(agent_state), e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_llm_loop(
        &self,
        session: &Session,
        request: EngineRequest,
        registry: &ToolRegistry,
        ctx: &OrchestratorToolContext,
        abort: CancellationToken,
        cancel_flag: Arc<AtomicBool>,
        mode_switch: Arc<AsyncMutex<Option<AgentMode>>>,
    ) -> Result<EngineOutcome, OrchestratorError> {
        let buffers = Arc::new(parking_lot::Mutex::new(FlushBuffers::default()));
        let live = self.live.clone();
        let session_id = session.id.clone();
        let store = self.store.clone();

        let flush_done = Arc::new(AtomicBool::new(false));
        let flush_task = {
            let buffers = buffers.clone();
            let live = live.clone();
            let session_id = session_id.clone();
            let flush_done = flush_done.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(TOKEN_FLUSH_INTERVAL);
                loop {
                    ticker.tick().await;
                    flush_buffers(&buffers, &live, &session_id);
                    if flush_done.load(Ordering::SeqCst) {
                        flush_buffers(&buffers, &live, &session_id);
                        break;
                    }
                }
            })
        };

        let cancel_poll_task = {
            let abort = abort.clone();
            let cancel_flag = cancel_flag.clone();
            let store = store.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
                loop {
                    ticker.tick().await;
                    if abort.is_cancelled() {
                        break;
                    }
                    match store.require_session(&session_id).await {
                        Ok(s) if s.cancel_requested => {
                            cancel_flag.store(true, Ordering::SeqCst);
                            abort.cancel();
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(session_id = %session_id, error = %e, "cancel poller lost session"),
                    }
                }
            })
        };

        let has_changes_marked = Arc::new(AtomicBool::new(session.has_changes));
        let last_error: Arc<parking_lot::Mutex<Option<String>>> = Arc::new(parking_lot::Mutex::new(None));

        let result = {
            let buffers = buffers.clone();
            let live = live.clone();
            let session_id = session_id.clone();
            let store = store.clone();
            let mode_switch = mode_switch.clone();
            let has_changes_marked = has_changes_marked.clone();
            let last_error = last_error.clone();
            let mut on_event = move |event: EngineEvent| {
                handle_event(
                    event,
                    &buffers,
                    &live,
                    &session_id,
                    &store,
                    &mode_switch,
                    &has_changes_marked,
                    &last_error,
                );
            };
            self.engine
                .process_directly(request, registry, ctx, abort.clone(), &mut on_event)
                .await
        };

        flush_done.store(true, Ordering::SeqCst);
        let _ = flush_task.await;
        cancel_poll_task.abort();

        if let Some(msg) = last_error.lock().take() {
            warn!(session_id = %session_id, error = %msg, "engine reported a non-fatal error during the turn");
        }

        result
    }

    async fn finalize_success(&self, req: &TurnRequest, run: TurnRun) -> Result<(), OrchestratorError> {
        self.live.finish(&req.session_id);
        let state = self.live.get(&req.session_id);
        let parts = state.map(|s| s.derive_message_parts()).unwrap_or_default();

        let mut assistant = AgentMessage::new(req.session_id.clone(), ChatRole::Assistant);
        assistant.parts = parts;
        assistant.content = assistant.text_preview();
        self.store.append_message(assistant.clone()).await?;

        let mut agent_state = run.agent_state;
        if let Some(mode) = run.mode_switch {
            agent_state.current_agent = mode;
            self.store.set_agent_mode(&req.session_id, mode).await?;
        }
        self.store.save_agent_state(agent_state).await?;

        // §4.6: fire-and-forget, only on the session's first turn.
        if !run.title_generated {
            let engine = self.engine.clone();
            let store = self.store.clone();
            let ctx = run.ctx.clone();
            let session_id = req.session_id.clone();
            let model = run.model.clone();
            let user_message = req.message.clone();
            let provider = run.provider.clone();
            tokio::spawn(async move {
                let mut registry = ToolRegistry::new();
                stratus_tools::register_all(&mut registry);
                crate::title::generate_title(
                    engine.as_ref(),
                    &registry,
                    ctx.as_ref(),
                    &store,
                    &session_id,
                    &model,
                    &user_message,
                    provider,
                )
                .await;
            });
        }

        let preview: String = assistant.text_preview().chars().take(200).collect();
        self.store.set_last_message(&req.session_id, &preview).await?;

        // status=idle before the snapshot so the UI unlocks promptly (§4.5 step 9).
        self.store.set_status(&req.session_id, SessionStatus::Idle, None).await?;

        let sandbox_id = run.ctx.current_sandbox_id().await;
        match self.sandbox.release(&stratus_sandbox::SandboxHandle {
            id: sandbox_id,
            status: stratus_sandbox::SandboxStatus::Running,
        }).await {
            Ok(snapshot_id) => {
                self.store
                    .set_sandbox_handles(&req.session_id, None, Some(snapshot_id))
                    .await?;
            }
            Err(e) => {
                warn!(session_id = %req.session_id, error = %e, "snapshot failed, leaving sandboxId set");
            }
        }

        Ok(())
    }

    /// Shared tail of the cancelled and error finalize paths (§4.5 steps
    /// 10/11): both synthesize a partial assistant Message, finish the
    /// stream, set status, and still attempt a snapshot if the sandbox was
    /// ever acquired.
    async fn finalize_partial(
        &self,
        req: &TurnRequest,
        ctx: Option<Arc<OrchestratorToolContext>>,
        agent_state: Option<AgentState>,
        error_message: Option<String>,
    ) -> Result<(), OrchestratorError> {
        self.live.finish(&req.session_id);
        let state = self.live.get(&req.session_id);
        let has_activity = state
            .as_ref()
            .map(|s| !s.content.is_empty() || !s.tool_calls.is_empty())
            .unwrap_or(false);

        if has_activity {
            let parts = state.map(|s| s.derive_message_parts()).unwrap_or_default();
            let mut assistant = AgentMessage::new(req.session_id.clone(), ChatRole::Assistant);
            assistant.parts = parts;
            let preview = assistant.text_preview();
            assistant.content = if preview.is_empty() { "(cancelled)".to_string() } else { preview };
            self.store.append_message(assistant).await?;
        }

        if let Some(agent_state) = agent_state {
            self.store.save_agent_state(agent_state).await?;
        }

        let status = if error_message.is_some() {
            SessionStatus::Error
        } else {
            SessionStatus::Idle
        };
        self.store.set_status(&req.session_id, status, error_message).await?;

        if let Some(ctx) = ctx {
            let sandbox_id = ctx.current_sandbox_id().await;
            match self
                .sandbox
                .release(&stratus_sandbox::SandboxHandle {
                    id: sandbox_id,
                    status: stratus_sandbox::SandboxStatus::Running,
                })
                .await
            {
                Ok(snapshot_id) => {
                    self.store
                        .set_sandbox_handles(&req.session_id, None, Some(snapshot_id))
                        .await?;
                }
                Err(e) => {
                    warn!(session_id = %req.session_id, error = %e, "snapshot failed after partial turn, leaving sandboxId set");
                }
            }
        }

        Ok(())
    }
}

#[derive(Default)]
struct FlushBuffers {
    content: String,
    reasoning: String,
}

fn flush_buffers(buffers: &Arc<parking_lot::Mutex<FlushBuffers>>, live: &LiveStreamStore, session_id: &str) {
    let mut guard = buffers.lock();
    if !guard.content.is_empty() {
        live.append_token(session_id, &guard.content);
        live.append_text_part(session_id, &guard.content);
        guard.content.clear();
    }
    if !guard.reasoning.is_empty() {
        live.append_reasoning(session_id, &guard.reasoning);
        live.append_reasoning_part(session_id, &guard.reasoning);
        guard.reasoning.clear();
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_event(
    event: EngineEvent,
    buffers: &Arc<parking_lot::Mutex<FlushBuffers>>,
    live: &LiveStreamStore,
    session_id: &str,
    store: &SqliteStore,
    mode_switch: &Arc<AsyncMutex<Option<AgentMode>>>,
    has_changes_marked: &Arc<AtomicBool>,
    last_error: &Arc<parking_lot::Mutex<Option<String>>>,
) {
    match event {
        EngineEvent::Token(text) => {
            buffers.lock().content.push_str(&text);
        }
        EngineEvent::Reasoning(text) => {
            buffers.lock().reasoning.push_str(&text);
        }
        EngineEvent::ToolCall { id, name, args } => {
            // Force-flush before the tool-call marker so ordering is
            // preserved (§9: "force-flush before any tool-call mutation").
            flush_buffers(buffers, live, session_id);
            live.add_tool_call(session_id, &id, &name, args);
        }
        EngineEvent::ToolResult { id, result } => {
            live.update_tool_result(session_id, &id, &result);

            if matches!(
                id_to_tool_name(live, session_id, &id).as_deref(),
                Some("write_to_file") | Some("edit") | Some("multi_edit")
            ) && !has_changes_marked.swap(true, Ordering::SeqCst)
            {
                let store = store.clone();
                let session_id = session_id.to_string();
                tokio::spawn(async move {
                    let _ = store.mark_has_changes(&session_id).await;
                });
            }

            if let Ok(parsed) = serde_json::from_str::<Value>(&result) {
                if let Some(mode) = parsed.get("modeSwitch").and_then(Value::as_str) {
                    if let Ok(mode) = mode.parse::<AgentMode>() {
                        let mode_switch = mode_switch.clone();
                        tokio::spawn(async move {
                            *mode_switch.lock().await = Some(mode);
                        });
                    }
                } else if parsed.get("entered").and_then(Value::as_bool) == Some(true)
                    && parsed.get("mode").and_then(Value::as_str) == Some("plan")
                {
                    let mode_switch = mode_switch.clone();
                    tokio::spawn(async move {
                        *mode_switch.lock().await = Some(AgentMode::Plan);
                    });
                }
            }
        }
        EngineEvent::Error(msg) => {
            *last_error.lock() = Some(msg);
        }
        EngineEvent::SubagentStart { id, label } => {
            flush_buffers(buffers, live, session_id);
            live.set_stage(session_id, Some(label));
            let _ = id;
        }
        EngineEvent::SubagentEnd { id } => {
            live.set_stage(session_id, None);
            let _ = id;
        }
        // Subagent token-level output is status noise, not part of the
        // session transcript; only start/end labels surface via `stage`.
        EngineEvent::SubagentToken { id, text } => {
            let _ = (id, text);
        }
    }
}

fn id_to_tool_name(live: &LiveStreamStore, session_id: &str, id: &str) -> Option<String> {
    live.get(session_id)
        .and_then(|s| s.tool_calls.into_iter().find(|tc| tc.id == id))
        .map(|tc| tc.name)
}

/// Appends this turn's user/assistant exchange onto the opaque sage-message
/// array the inference engine expects back on the next turn. The engine may
/// also return `responseMessages` with its own provider-specific shape; when
/// present, that supersedes our hand-rolled append.
fn merge_sage_messages(existing: &Value, outcome: &EngineOutcome) -> Value {
    if let Some(messages) = &outcome.response_messages {
        return messages.clone();
    }
    let mut messages = existing.as_array().cloned().unwrap_or_default();
    messages.push(json!({ "role": "assistant", "content": outcome.content }));
    Value::Array(messages)
}

fn build_system_prompt(session: &Session, registry: &ToolRegistry, mode: AgentMode, alpha_mode: bool) -> String {
    let tool_list: String = registry
        .definitions()
        .iter()
        .map(|d| format!("- {}: {}", d.function.name, d.function.description))
        .collect::<Vec<_>>()
        .join("\n");

    let agent_block = match mode {
        AgentMode::Build => "You are in build mode. You may edit files and run commands freely.",
        AgentMode::Plan => {
            "You are in plan mode. You may only write to the session's plan file. End the turn with \
             `question` or `plan_exit`."
        }
    };

    let permissions_block = if alpha_mode {
        "<alpha_mode>Destructive git tools execute without a confirmation step.</alpha_mode>".to_string()
    } else {
        "<permissions>Destructive git tools require confirmed=true before they execute.</permissions>".to_string()
    };

    format!(
        "{agent_block}\n\nProject directory: /work\n\nAvailable tools:\n{tool_list}\n\n\
         <repository>\n  owner: {owner}\n  repo: {repo}\n  branch: {branch}\n  sessionBranch: {session_branch}\n\
         </repository>\n{permissions_block}",
        owner = session.owner,
        repo = session.repo,
        branch = session.branch,
        session_branch = if session.session_branch.is_empty() { "(pending)" } else { &session.session_branch },
    )
}
