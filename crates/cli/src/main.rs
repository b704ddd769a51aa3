//! Thin command-line driver over [`stratus_orchestrator::TurnOrchestrator`].
//! One process per invocation; each session's turns are still serialized
//! through a [`SessionMailbox`] so a script that fires `send` twice in a
//! row for the same session behaves the same way a long-lived server would.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use stratus_core::{AgentMessage, AgentMode, ChatRole, Session};
use stratus_orchestrator::{
    HttpInferenceEngine, InferenceEngine, RuntimeCredentials, SessionMailbox, TurnOrchestrator, TurnRequest,
};
use stratus_sandbox::{LocalProcessSandbox, SandboxManager};
use stratus_store::{run_sweeper, LiveStreamStore, SqliteStore, DEFAULT_STALE_THRESHOLD, DEFAULT_SWEEP_INTERVAL};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "stratus", about = "Agent turn orchestrator CLI", version)]
struct Args {
    /// SQLite database path. Defaults to `~/.stratuscode/state.db`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Sandbox working-directory root for the local process sandbox.
    #[arg(long, global = true)]
    sandbox_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new session bound to a repo and branch.
    NewSession {
        owner: String,
        repo: String,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long, default_value = "gpt-4o")]
        model: String,
        #[arg(long, default_value = "cli")]
        user_id: String,
    },
    /// Send a message and run one turn to completion.
    Send {
        session_id: String,
        message: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        plan: bool,
        #[arg(long)]
        alpha: bool,
    },
    /// Request cancellation of a session's in-flight turn.
    Cancel { session_id: String },
    /// Print the message transcript for a session.
    Log { session_id: String },
    /// List sessions currently marked `running`.
    Sessions,
    /// Run the stale-session sweeper in the foreground (§4.2).
    Sweep,
    /// Cascade-delete a session's Messages, Todos, Agent-State, and
    /// StreamingState (§4.2 `purgeSessionData`).
    Purge { session_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let db_path = args.db.unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let store = SqliteStore::connect(db_path).await?;
    let live = LiveStreamStore::new();

    match args.command {
        Commands::NewSession { owner, repo, branch, model, user_id } => {
            let session = Session::new(stratus_core::new_id(), user_id, owner, repo, branch, model);
            let created = store.create_session(session).await?;
            println!("{}", created.id);
        }
        Commands::Sessions => {
            for session in store.list_running_sessions().await? {
                println!("{}\t{}/{}@{}\t{}", session.id, session.owner, session.repo, session.branch, session.status.as_str());
            }
        }
        Commands::Log { session_id } => {
            for message in store.list_messages(&session_id).await? {
                let role = match message.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                println!("[{role}] {}", message.content);
            }
        }
        Commands::Cancel { session_id } => {
            store.request_cancel(&session_id).await?;
            info!(session_id, "cancellation requested");
        }
        Commands::Sweep => {
            info!("sweeper running in the foreground, ctrl-c to stop");
            run_sweeper(store, live, DEFAULT_SWEEP_INTERVAL, DEFAULT_STALE_THRESHOLD).await;
        }
        Commands::Purge { session_id } => {
            store.purge_session_data(&session_id, &live).await?;
            info!(session_id, "session data purged");
        }
        Commands::Send { session_id, message, model, plan, alpha } => {
            let sandbox_root = args.sandbox_root.unwrap_or_else(default_sandbox_root);
            let sandbox = Arc::new(SandboxManager::new(Arc::new(LocalProcessSandbox::new(sandbox_root))));
            let http = reqwest::Client::new();
            let engine: Arc<dyn InferenceEngine> = Arc::new(HttpInferenceEngine::new(http.clone()));
            let credentials = RuntimeCredentials::from_environment();

            let orchestrator = Arc::new(TurnOrchestrator::new(
                store.clone(),
                live.clone(),
                sandbox,
                http,
                engine,
                credentials,
            ));
            let mailbox = SessionMailbox::spawn(orchestrator);

            let session = store.prepare_send(&session_id, &message).await?;
            live.start(&session_id);
            store.append_message(AgentMessage::user_text(session_id.clone(), message.clone())).await?;

            let agent_mode = if plan { Some(AgentMode::Plan) } else { None };
            let req = TurnRequest {
                session_id: session_id.clone(),
                message,
                model,
                alpha_mode: alpha,
                agent_mode,
            };
            mailbox.prompt(req).await?;

            let updated = store.require_session(&session_id).await?;
            println!("status: {}", updated.status.as_str());
            if let Some(err) = updated.error_message {
                eprintln!("error: {err}");
            }
            let _ = session;
        }
    }

    Ok(())
}

fn default_db_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".stratuscode").join("state.db")
}

fn default_sandbox_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".stratuscode").join("sandboxes")
}
