use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: Option<u8>,
    pub created_at: i64,
}

impl Todo {
    pub fn new(session_id: String, content: String, priority: Option<u8>) -> Self {
        Todo {
            id: crate::new_id(),
            session_id,
            content,
            status: TodoStatus::Pending,
            priority,
            created_at: crate::now_unix(),
        }
    }
}

/// Invariant from the spec: at most one `in_progress` todo per session.
pub fn validate_single_in_progress(todos: &[Todo]) -> Result<(), String> {
    let in_progress = todos
        .iter()
        .filter(|t| t.status == TodoStatus::InProgress)
        .count();
    if in_progress > 1 {
        return Err(format!(
            "at most one todo may be in_progress, found {in_progress}"
        ));
    }
    Ok(())
}
