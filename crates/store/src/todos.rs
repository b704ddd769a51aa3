use rusqlite::{params, Row};
use stratus_core::todo::validate_single_in_progress;
use stratus_core::{Todo, TodoStatus};

use crate::error::StoreError;
use crate::store::SqliteStore;

fn row_to_todo(row: &Row) -> rusqlite::Result<Todo> {
    let status: String = row.get("status")?;
    Ok(Todo {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        content: row.get("content")?,
        status: match status.as_str() {
            "in_progress" => TodoStatus::InProgress,
            "completed" => TodoStatus::Completed,
            _ => TodoStatus::Pending,
        },
        priority: row.get::<_, Option<i64>>("priority")?.map(|p| p as u8),
        created_at: row.get("created_at")?,
    })
}

fn status_str(s: TodoStatus) -> &'static str {
    match s {
        TodoStatus::Pending => "pending",
        TodoStatus::InProgress => "in_progress",
        TodoStatus::Completed => "completed",
    }
}

impl SqliteStore {
    pub async fn list_todos(&self, session_id: &str) -> Result<Vec<Todo>, StoreError> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, content, status, priority, created_at FROM todos \
                 WHERE session_id = ? ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![session_id], row_to_todo)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    /// Replace-all semantics (§3). Rejects if the incoming list has more
    /// than one `in_progress` todo; existing ids/created_at are not
    /// preserved (matches the spec's round-trip property: "up to ids and
    /// createdAt").
    pub async fn replace_todos(
        &self,
        session_id: &str,
        todos: Vec<(String, Option<u8>, TodoStatus)>,
    ) -> Result<Vec<Todo>, StoreError> {
        let materialized: Vec<Todo> = todos
            .into_iter()
            .map(|(content, priority, status)| {
                let mut t = Todo::new(session_id.to_string(), content, priority);
                t.status = status;
                t
            })
            .collect();
        validate_single_in_progress(&materialized).map_err(StoreError::InvalidState)?;

        let session_id = session_id.to_string();
        let to_insert = materialized.clone();
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM todos WHERE session_id = ?", params![session_id])?;
            for t in &to_insert {
                tx.execute(
                    "INSERT INTO todos (id, session_id, content, status, priority, created_at) \
                     VALUES (?,?,?,?,?,?)",
                    params![
                        t.id,
                        t.session_id,
                        t.content,
                        status_str(t.status),
                        t.priority.map(|p| p as i64),
                        t.created_at,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        Ok(materialized)
    }
}
