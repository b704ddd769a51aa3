//! §4.6: fire-and-forget session titling. Runs independently of the turn
//! orchestrator's own finalize path — failures here never touch
//! `Session.status` or `errorMessage`.

use serde_json::json;
use stratus_store::SqliteStore;
use tracing::warn;

use crate::engine::{EngineRequest, InferenceEngine, ProviderConfig};

const TITLE_CHAR_CAP: usize = 500;
const TITLE_PROMPT: &str = "Summarize the following user request as a short, plain title of at most six words. \
Respond with the title only, no quotes or punctuation at the end.";

/// Best-effort: call the model with a capped user message, parse a short
/// title, persist it with `titleGenerated=true`. Any failure (network,
/// empty response, store write) is logged and swallowed — the caller
/// (`turn.rs`, after scheduling the main turn) does not await this for
/// turn completion.
pub async fn generate_title(
    engine: &dyn InferenceEngine,
    tools: &stratus_tools::ToolRegistry,
    ctx: &dyn stratus_tools::ToolContext,
    store: &SqliteStore,
    session_id: &str,
    model: &str,
    user_message: &str,
    provider: ProviderConfig,
) {
    let capped: String = user_message.chars().take(TITLE_CHAR_CAP).collect();

    let request = EngineRequest {
        system_prompt: TITLE_PROMPT.to_string(),
        sage_messages: json!([]),
        user_message: capped,
        session_id: session_id.to_string(),
        existing_summary: None,
        model: model.to_string(),
        context_window: 8_000,
        provider,
    };

    let token = tokio_util::sync::CancellationToken::new();
    let mut title = String::new();
    let mut on_event = |event: crate::engine::EngineEvent| {
        if let crate::engine::EngineEvent::Token(text) = event {
            title.push_str(&text);
        }
    };

    let outcome = engine.process_directly(request, tools, ctx, token, &mut on_event).await;
    let title = match outcome {
        Ok(outcome) if !outcome.content.trim().is_empty() => outcome.content,
        Ok(_) if !title.trim().is_empty() => title,
        Ok(_) => {
            warn!(session_id, "title generation returned empty content");
            return;
        }
        Err(e) => {
            warn!(session_id, error = %e, "title generation failed");
            return;
        }
    };

    let title: String = title.trim().chars().take(80).collect();
    if let Err(e) = store.set_title(session_id, &title, true).await {
        warn!(session_id, error = %e, "failed to persist generated title");
    }
}
