//! Durable storage for Sessions, Messages, Agent-State, and Todos (SQLite),
//! plus the ephemeral in-memory Live-Stream Store and the session sweeper.

pub mod agent_state;
pub mod error;
pub mod messages;
pub mod sessions;
pub mod store;
pub mod streaming;
pub mod sweeper;
pub mod todos;

pub use error::StoreError;
pub use store::SqliteStore;
pub use streaming::LiveStreamStore;
pub use sweeper::{run_sweeper, sweep_once, DEFAULT_STALE_THRESHOLD, DEFAULT_SWEEP_INTERVAL};
