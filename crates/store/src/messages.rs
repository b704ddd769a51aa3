use rusqlite::{params, Row};
use stratus_core::{AgentMessage, ChatRole, MessagePart};

use crate::error::StoreError;
use crate::store::SqliteStore;

fn row_to_message(row: &Row) -> rusqlite::Result<AgentMessage> {
    let role: String = row.get("role")?;
    let parts_json: String = row.get("parts_json")?;
    let parts: Vec<MessagePart> = serde_json::from_str(&parts_json).unwrap_or_default();
    Ok(AgentMessage {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        role: if role == "user" {
            ChatRole::User
        } else {
            ChatRole::Assistant
        },
        content: row.get("content")?,
        parts,
        created_at: row.get("created_at")?,
    })
}

impl SqliteStore {
    /// Messages are immutable once written (§3) — this is the only write
    /// path, and there is no corresponding update.
    pub async fn append_message(&self, message: AgentMessage) -> Result<AgentMessage, StoreError> {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        let parts_json = serde_json::to_string(&message.parts)?;
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, role, content, parts_json, created_at) \
                 VALUES (?,?,?,?,?,?)",
                params![
                    message.id,
                    message.session_id,
                    role,
                    message.content,
                    parts_json,
                    message.created_at,
                ],
            )?;
            Ok(message)
        })
        .await
    }

    /// Total order by `created_at` (§3).
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<AgentMessage>, StoreError> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, parts_json, created_at FROM messages \
                 WHERE session_id = ? ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![session_id], row_to_message)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }
}
