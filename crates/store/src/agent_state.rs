use rusqlite::{params, OptionalExtension};
use stratus_core::{AgentMode, AgentState};

use crate::error::StoreError;
use crate::store::SqliteStore;

impl SqliteStore {
    pub async fn get_agent_state(&self, session_id: &str) -> Result<Option<AgentState>, StoreError> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT session_id, sage_messages_json, summary, plan_file_path, current_agent, \
                 updated_at FROM agent_state WHERE session_id = ?",
                params![session_id],
                |row| {
                    let sage_json: String = row.get(1)?;
                    let agent: String = row.get(4)?;
                    Ok(AgentState {
                        session_id: row.get(0)?,
                        sage_messages: serde_json::from_str(&sage_json).unwrap_or(serde_json::Value::Null),
                        summary: row.get(2)?,
                        plan_file_path: row.get(3)?,
                        current_agent: agent.parse().unwrap_or(AgentMode::Build),
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// Updated atomically at end of turn (§3) — a single upsert.
    pub async fn save_agent_state(&self, state: AgentState) -> Result<(), StoreError> {
        let sage_json = serde_json::to_string(&state.sage_messages)?;
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO agent_state (session_id, sage_messages_json, summary, plan_file_path, \
                 current_agent, updated_at) VALUES (?,?,?,?,?,?) \
                 ON CONFLICT(session_id) DO UPDATE SET sage_messages_json = excluded.sage_messages_json, \
                 summary = excluded.summary, plan_file_path = excluded.plan_file_path, \
                 current_agent = excluded.current_agent, updated_at = excluded.updated_at",
                params![
                    state.session_id,
                    sage_json,
                    state.summary,
                    state.plan_file_path,
                    state.current_agent.as_str(),
                    state.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
