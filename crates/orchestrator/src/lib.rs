//! Wires the sandbox, store, and tools crates into the turn-orchestration
//! loop described in §4.5: resolve provider, acquire sandbox, run the LLM
//! loop, finalize.

pub mod engine;
pub mod error;
pub mod mailbox;
pub mod provider_routing;
pub mod title;
pub mod tool_context_impl;
pub mod turn;

pub use engine::{EngineEvent, EngineOutcome, EngineRequest, HttpInferenceEngine, InferenceEngine, ProviderConfig, ScriptedEngine, ScriptedStep};
pub use error::OrchestratorError;
pub use mailbox::SessionMailbox;
pub use provider_routing::{context_window_for, resolve_provider, route_model, ProviderEnv, ProviderKind};
pub use tool_context_impl::OrchestratorToolContext;
pub use turn::{RuntimeCredentials, TurnOrchestrator, TurnRequest};
