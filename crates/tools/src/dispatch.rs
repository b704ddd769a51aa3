use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

const RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(5);
const RETRY_MAX_EXTRA_ATTEMPTS: u32 = 2;

/// §4.4 execution pipeline: validate args against schema, race `execute`
/// with a timeout, stringify and truncate the result, retry on retryable
/// failures with exponential backoff. Validation errors and non-retryable
/// errors are returned as a formatted JSON error string rather than
/// propagated — this function never errors to the caller.
pub async fn dispatch(tool: &dyn Tool, args: Value, ctx: &dyn ToolContext) -> String {
    if let Err(e) = validate_args(&tool.parameters_schema(), &args) {
        return error_json(&e);
    }

    let mut attempt = 0u32;
    let mut backoff = RETRY_INITIAL_BACKOFF;

    loop {
        let outcome = tokio::time::timeout(tool.timeout(), tool.execute(args.clone(), ctx)).await;

        let result = match outcome {
            Ok(r) => r,
            Err(_) => Err(ToolError::Timeout),
        };

        match result {
            Ok(value) => return truncate(&stringify(&value), tool.max_result_size()),
            Err(e) if e.is_retryable() && attempt < RETRY_MAX_EXTRA_ATTEMPTS => {
                warn!(tool = tool.name(), attempt, error = %e, "retryable tool failure, backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RETRY_MAX_BACKOFF);
                attempt += 1;
            }
            Err(e) => {
                debug!(tool = tool.name(), error = %e, "tool failed");
                return error_json(&e.to_string());
            }
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated {} bytes]", &s[..end], s.len() - end)
}

fn error_json(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Minimal structural validation: every name in `schema.required` must be
/// present in `args`. Full JSON-schema validation is out of scope; this
/// catches the common "forgot a required field" failure mode the tool
/// registry needs to reject before it ever reaches `execute`.
fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    let obj = args.as_object();
    for name in required {
        let Some(name) = name.as_str() else { continue };
        let present = obj.map(|o| o.contains_key(name)).unwrap_or(false);
        if !present {
            return Err(format!("missing required argument '{name}'"));
        }
    }
    Ok(())
}
