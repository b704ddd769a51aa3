use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::AgentMode;

/// Single row per session: the prior conversation as seen by the LLM, plus
/// summarization state and the current mode/plan path. Updated atomically
/// at end of turn (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub session_id: String,
    /// Serialized LLM-visible history ("sage messages"), opaque to this
    /// crate — the orchestrator knows how to build/consume it.
    pub sage_messages: Value,
    pub summary: Option<String>,
    pub plan_file_path: Option<String>,
    pub current_agent: AgentMode,
    pub updated_at: i64,
}

impl AgentState {
    pub fn new(session_id: String) -> Self {
        AgentState {
            session_id,
            sage_messages: Value::Array(Vec::new()),
            summary: None,
            plan_file_path: None,
            current_agent: AgentMode::Build,
            updated_at: crate::now_unix(),
        }
    }
}
