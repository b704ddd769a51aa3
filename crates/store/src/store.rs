use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StoreError;

/// Durable storage for Sessions, Messages, Agent-State, and Todos, backed by
/// `rusqlite` with a blocking connection moved onto `spawn_blocking` for
/// every call — the same pattern the teacher's `SqliteSessionStore` uses so
/// the async orchestrator never blocks its executor on disk I/O.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn connect(path: PathBuf) -> Result<Self, StoreError> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let mut conn = Connection::open(&path)?;
            conn.execute("PRAGMA foreign_keys = ON;", [])?;
            apply_migrations(&mut conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;

        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let mut conn = Connection::open_in_memory()?;
            conn.execute("PRAGMA foreign_keys = ON;", [])?;
            apply_migrations(&mut conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;

        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking thread
    /// pool. Mirrors `SqliteSessionStore::run_blocking` in the teacher.
    pub(crate) async fn run_blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn_arc = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn_arc.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn apply_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let migrations = Migrations::new(vec![M::up(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            owner TEXT NOT NULL,
            repo TEXT NOT NULL,
            branch TEXT NOT NULL,
            session_branch TEXT NOT NULL DEFAULT '',
            agent TEXT NOT NULL DEFAULT 'build',
            model TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'idle',
            sandbox_id TEXT,
            snapshot_id TEXT,
            title TEXT NOT NULL DEFAULT '',
            title_generated INTEGER NOT NULL DEFAULT 0,
            last_message TEXT,
            cancel_requested INTEGER NOT NULL DEFAULT 0,
            has_changes INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            token_input INTEGER NOT NULL DEFAULT 0,
            token_output INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_user_updated ON sessions(user_id, updated_at);

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            parts_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session_created ON messages(session_id, created_at);

        CREATE TABLE IF NOT EXISTS agent_state (
            session_id TEXT PRIMARY KEY,
            sage_messages_json TEXT NOT NULL,
            summary TEXT,
            plan_file_path TEXT,
            current_agent TEXT NOT NULL DEFAULT 'build',
            updated_at INTEGER NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS todos (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL,
            priority INTEGER,
            created_at INTEGER NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_todos_session ON todos(session_id);
        "#,
    )]);

    migrations
        .to_latest(conn)
        .map_err(|e| StoreError::Migration(e.to_string()))
}
