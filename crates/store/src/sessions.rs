use rusqlite::{params, OptionalExtension, Row};
use stratus_core::{AgentMode, Session, SessionStatus, TokenUsage};

use crate::error::StoreError;
use crate::store::SqliteStore;
use crate::streaming::LiveStreamStore;

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let agent: String = row.get("agent")?;
    let status: String = row.get("status")?;
    Ok(Session {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        owner: row.get("owner")?,
        repo: row.get("repo")?,
        branch: row.get("branch")?,
        session_branch: row.get("session_branch")?,
        agent: agent.parse().unwrap_or(AgentMode::Build),
        model: row.get("model")?,
        status: status.parse().unwrap_or(SessionStatus::Idle),
        sandbox_id: row.get("sandbox_id")?,
        snapshot_id: row.get("snapshot_id")?,
        title: row.get("title")?,
        title_generated: row.get::<_, i64>("title_generated")? != 0,
        last_message: row.get("last_message")?,
        cancel_requested: row.get::<_, i64>("cancel_requested")? != 0,
        has_changes: row.get::<_, i64>("has_changes")? != 0,
        error_message: row.get("error_message")?,
        token_usage: TokenUsage {
            input: row.get::<_, i64>("token_input")? as u64,
            output: row.get::<_, i64>("token_output")? as u64,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SELECT_COLS: &str = "id, user_id, owner, repo, branch, session_branch, agent, model, status, \
     sandbox_id, snapshot_id, title, title_generated, last_message, cancel_requested, \
     has_changes, error_message, token_input, token_output, created_at, updated_at";

impl SqliteStore {
    pub async fn create_session(&self, session: Session) -> Result<Session, StoreError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, owner, repo, branch, session_branch, agent, \
                 model, status, sandbox_id, snapshot_id, title, title_generated, last_message, \
                 cancel_requested, has_changes, error_message, token_input, token_output, \
                 created_at, updated_at) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
                params![
                    session.id,
                    session.user_id,
                    session.owner,
                    session.repo,
                    session.branch,
                    session.session_branch,
                    session.agent.as_str(),
                    session.model,
                    session.status.as_str(),
                    session.sandbox_id,
                    session.snapshot_id,
                    session.title,
                    session.title_generated as i64,
                    session.last_message,
                    session.cancel_requested as i64,
                    session.has_changes as i64,
                    session.error_message,
                    session.token_usage.input as i64,
                    session.token_usage.output as i64,
                    session.created_at,
                    session.updated_at,
                ],
            )?;
            Ok(session)
        })
        .await
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLS} FROM sessions WHERE id = ?"),
                params![id],
                row_to_session,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    pub async fn require_session(&self, id: &str) -> Result<Session, StoreError> {
        self.get_session(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    /// Sessions whose `status = 'running'`, used by the sweeper. Backed by
    /// the `idx_sessions_status` index so this stays O(pending) cost as the
    /// spec requires.
    pub async fn list_running_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.run_blocking(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SELECT_COLS} FROM sessions WHERE status = 'running'"))?;
            let rows = stmt.query_map([], row_to_session)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    /// §4.2 `prepareSend`: atomic pre-turn state transition — clear
    /// `cancel_requested`, set `status = running`, set a placeholder title
    /// if none exists yet. The caller is responsible for opening the
    /// StreamingState and persisting the user message (those touch
    /// different stores); this method only covers the Session row itself.
    pub async fn prepare_send(
        &self,
        session_id: &str,
        message_preview: &str,
    ) -> Result<Session, StoreError> {
        let session_id = session_id.to_string();
        let preview: String = message_preview.chars().take(200).collect();
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            let existing_title: String = tx.query_row(
                "SELECT title FROM sessions WHERE id = ?",
                params![session_id],
                |r| r.get(0),
            )?;
            let placeholder_title = if existing_title.is_empty() {
                let t: String = preview.chars().take(60).collect();
                Some(t)
            } else {
                None
            };
            let now = stratus_core::now_unix();
            tx.execute(
                "UPDATE sessions SET cancel_requested = 0, status = 'running', \
                 title = COALESCE(?, title), updated_at = ? WHERE id = ?",
                params![placeholder_title, now, session_id],
            )?;
            let session = tx.query_row(
                &format!("SELECT {SELECT_COLS} FROM sessions WHERE id = ?"),
                params![session_id],
                row_to_session,
            )?;
            tx.commit()?;
            Ok(session)
        })
        .await
    }

    pub async fn set_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        let now = stratus_core::now_unix();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
                params![status.as_str(), error_message, now, session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_sandbox_handles(
        &self,
        session_id: &str,
        sandbox_id: Option<String>,
        snapshot_id: Option<String>,
    ) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        let now = stratus_core::now_unix();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET sandbox_id = ?, snapshot_id = ?, updated_at = ? WHERE id = ?",
                params![sandbox_id, snapshot_id, now, session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_session_branch(
        &self,
        session_id: &str,
        session_branch: &str,
    ) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        let session_branch = session_branch.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET session_branch = ? WHERE id = ?",
                params![session_branch, session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_agent_mode(&self, session_id: &str, mode: AgentMode) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET agent = ? WHERE id = ?",
                params![mode.as_str(), session_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Idempotent: set `has_changes = true` on first file-modifying tool.
    pub async fn mark_has_changes(&self, session_id: &str) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET has_changes = 1 WHERE id = ?",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_last_message(&self, session_id: &str, preview: &str) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        let preview: String = preview.chars().take(200).collect();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET last_message = ? WHERE id = ?",
                params![preview, session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_title(
        &self,
        session_id: &str,
        title: &str,
        generated: bool,
    ) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        let title = title.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET title = ?, title_generated = ? WHERE id = ?",
                params![title, generated as i64, session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn request_cancel(&self, session_id: &str) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET cancel_requested = 1 WHERE id = ?",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn add_token_usage(
        &self,
        session_id: &str,
        input: u64,
        output: u64,
    ) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "UPDATE sessions SET token_input = token_input + ?, token_output = token_output + ? \
                 WHERE id = ?",
                params![input as i64, output as i64, session_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Cascade delete Messages, Todos, Agent-State, and StreamingState for a
    /// session (foreign keys with `ON DELETE CASCADE` handle the first three
    /// once the session row is gone; `live` is a separate in-memory store so
    /// its entry needs an explicit drop). Caller is responsible for stopping
    /// any live sandbox first.
    pub async fn purge_session_data(&self, session_id: &str, live: &LiveStreamStore) -> Result<(), StoreError> {
        live.remove(session_id);
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?", params![session_id])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use stratus_core::{AgentMessage, AgentState, ChatRole};

    use super::*;

    #[tokio::test]
    async fn purge_cascades_everything_including_live_stream() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let live = LiveStreamStore::new();

        let session = Session::new(
            "s1".into(),
            "u1".into(),
            "owner".into(),
            "repo".into(),
            "main".into(),
            "claude-sonnet".into(),
        );
        store.create_session(session).await.unwrap();
        store
            .append_message(AgentMessage::new("s1".into(), ChatRole::User))
            .await
            .unwrap();
        store.save_agent_state(AgentState::new("s1".into())).await.unwrap();
        live.start("s1");

        store.purge_session_data("s1", &live).await.unwrap();

        assert!(store.get_session("s1").await.unwrap().is_none());
        assert!(store.list_messages("s1").await.unwrap().is_empty());
        assert!(store.get_agent_state("s1").await.unwrap().is_none());
        assert!(live.get("s1").is_none());
    }
}
