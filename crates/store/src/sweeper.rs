use std::time::Duration;

use stratus_core::SessionStatus;
use tracing::warn;

use crate::streaming::LiveStreamStore;
use crate::store::SqliteStore;

/// Default interval between sweeps (~2 minutes, §4.2).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);
/// Default staleness threshold (~5 minutes, §4.2).
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(300);

/// Periodic task: find sessions with `status = running` whose
/// StreamingState `updated_at` is older than `stale_threshold` and reset
/// them to `status = error` with message "task abandoned". Scans only
/// running sessions (indexed on `status`), so cost is O(pending).
pub async fn run_sweeper(
    sessions: SqliteStore,
    streams: LiveStreamStore,
    interval: Duration,
    stale_threshold: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        sweep_once(&sessions, &streams, stale_threshold).await;
    }
}

/// One sweep pass, split out so tests can drive it deterministically
/// without waiting on a real timer.
pub async fn sweep_once(sessions: &SqliteStore, streams: &LiveStreamStore, stale_threshold: Duration) {
    let running = match sessions.list_running_sessions().await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "sweeper: failed to list running sessions");
            return;
        }
    };

    let now = stratus_core::now_unix();
    let threshold_secs = stale_threshold.as_secs() as i64;

    for session in running {
        let updated_at = streams
            .get(&session.id)
            .map(|s| s.updated_at)
            .unwrap_or(session.updated_at);

        if now - updated_at > threshold_secs {
            warn!(session_id = %session.id, "sweeper: resetting abandoned session");
            if let Err(e) = sessions
                .set_status(
                    &session.id,
                    SessionStatus::Error,
                    Some("task abandoned".to_string()),
                )
                .await
            {
                warn!(session_id = %session.id, error = %e, "sweeper: failed to reset session");
            }
            streams.finish(&session.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::Session;

    #[tokio::test]
    async fn stale_running_session_is_reset_to_error() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let streams = LiveStreamStore::new();

        let mut session = Session::new(
            "s1".into(),
            "u1".into(),
            "owner".into(),
            "repo".into(),
            "main".into(),
            "claude-sonnet".into(),
        );
        session.status = stratus_core::SessionStatus::Running;
        session.updated_at = stratus_core::now_unix() - 1000;
        store.create_session(session).await.unwrap();
        streams.start("s1");
        // Simulate staleness by not touching the stream again; updated_at
        // will be "now" from start(), so instead check the session's own
        // updated_at fallback by never starting the stream at all.
        let streams_empty = LiveStreamStore::new();

        sweep_once(&store, &streams_empty, Duration::from_secs(300)).await;

        let reloaded = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, stratus_core::SessionStatus::Error);
        assert_eq!(reloaded.error_message.as_deref(), Some("task abandoned"));
    }

    #[tokio::test]
    async fn fresh_running_session_is_left_alone() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let streams = LiveStreamStore::new();

        let mut session = Session::new(
            "s1".into(),
            "u1".into(),
            "owner".into(),
            "repo".into(),
            "main".into(),
            "claude-sonnet".into(),
        );
        session.status = stratus_core::SessionStatus::Running;
        store.create_session(session).await.unwrap();
        streams.start("s1");

        sweep_once(&store, &streams, Duration::from_secs(300)).await;

        let reloaded = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, stratus_core::SessionStatus::Running);
    }
}
