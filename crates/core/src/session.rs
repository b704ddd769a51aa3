use serde::{Deserialize, Serialize};

/// Runtime operating mode for the agent. Plan mode restricts file writes to
/// the plan file and mandates ending a turn with either a question or
/// `plan_exit`; Build mode has no such restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Build,
    Plan,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Build => "build",
            AgentMode::Plan => "plan",
        }
    }
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(AgentMode::Build),
            "plan" => Ok(AgentMode::Plan),
            other => Err(format!("unknown agent mode '{other}', expected build|plan")),
        }
    }
}

/// Session.status state machine: `idle -> running -> {idle, error}`, with a
/// transient `booting` state used while the first sandbox acquire is
/// in flight (§4.5 of the spec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Booting,
    Idle,
    Running,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Booting => "booting",
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booting" => Ok(SessionStatus::Booting),
            "idle" => Ok(SessionStatus::Idle),
            "running" => Ok(SessionStatus::Running),
            "error" => Ok(SessionStatus::Error),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// One chat session bound to a repo + branch. Mirrors the richer of the two
/// schema variants the spec's Open Questions call out: it carries
/// `sandbox_id`/`snapshot_id`, `has_changes`, `title_generated`, and
/// `cancel_requested`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub session_branch: String,
    pub agent: AgentMode,
    pub model: String,
    pub status: SessionStatus,
    pub sandbox_id: Option<String>,
    pub snapshot_id: Option<String>,
    pub title: String,
    pub title_generated: bool,
    pub last_message: Option<String>,
    pub cancel_requested: bool,
    pub has_changes: bool,
    pub error_message: Option<String>,
    pub token_usage: TokenUsage,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    pub fn new(id: String, user_id: String, owner: String, repo: String, branch: String, model: String) -> Self {
        let now = crate::now_unix();
        Session {
            id: id.clone(),
            user_id,
            owner,
            repo,
            branch,
            session_branch: String::new(),
            agent: AgentMode::Build,
            model,
            status: SessionStatus::Idle,
            sandbox_id: None,
            snapshot_id: None,
            title: String::new(),
            title_generated: false,
            last_message: None,
            cancel_requested: false,
            has_changes: false,
            error_message: None,
            token_usage: TokenUsage::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Default working-branch name when none has been chosen yet, matching
    /// the spec's `stratuscode/<sessionId>` convention.
    pub fn default_session_branch(session_id: &str) -> String {
        format!("stratuscode/{session_id}")
    }

    /// Invariant from the spec: exactly one of sandbox_id/snapshot_id holds
    /// a live handle at rest once a turn has completed successfully.
    pub fn has_single_live_handle(&self) -> bool {
        self.sandbox_id.is_some() ^ self.snapshot_id.is_some()
    }
}
