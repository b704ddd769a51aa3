use async_trait::async_trait;
use serde_json::{json, Value};
use stratus_core::streaming::PendingQuestion;

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

/// Blocks by polling `pendingAnswer` in the Live-Stream Store every
/// `poll_delay`, exiting early on `cancelRequested` (§3.3, §5).
async fn rendezvous(ctx: &dyn ToolContext, question: PendingQuestion) -> Result<Value, ToolError> {
    ctx.live().set_question(ctx.session_id(), question);

    loop {
        if ctx.cancel_requested() {
            ctx.live().clear_question(ctx.session_id());
            return Err(ToolError::CancelledByUser);
        }
        if let Some(state) = ctx.live().get(ctx.session_id()) {
            if let Some(answer) = state.pending_answer {
                let pending = state.pending_question;
                ctx.live().clear_question(ctx.session_id());
                return Ok(json!({ "answer": answer, "question": pending }));
            }
        }
        ctx.poll_delay().await;
    }
}

pub struct QuestionTool;

#[async_trait]
impl Tool for QuestionTool {
    fn name(&self) -> &str {
        "question"
    }

    fn description(&self) -> &str {
        "Ask the user a question and block until they answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "options": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["question"]
        })
    }

    // Rendezvous tools can wait indefinitely on a human; they bypass the
    // default 60s tool timeout.
    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::MAX / 2)
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let question = args
            .get("question")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("question".into()))?
            .to_string();
        let options: Vec<String> = args
            .get("options")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        rendezvous(
            ctx,
            PendingQuestion {
                id: stratus_core::new_id(),
                question,
                options,
                kind: None,
                extra: None,
            },
        )
        .await
    }
}

pub struct PlanExitTool;

#[async_trait]
impl Tool for PlanExitTool {
    fn name(&self) -> &str {
        "plan_exit"
    }

    fn description(&self) -> &str {
        "Request approval to leave plan mode and start building. Refuses if no todos exist."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "summary": { "type": "string" } },
            "required": ["summary"]
        })
    }

    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::MAX / 2)
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let summary = args
            .get("summary")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("summary".into()))?
            .to_string();

        let todos = ctx.list_todos().await?;
        if todos.is_empty() {
            return Err(ToolError::InvalidArgs(
                "no todos exist; call todowrite before plan_exit".into(),
            ));
        }

        let options = vec!["Approve & Start Building".to_string(), "Request Changes".to_string()];
        let result = rendezvous(
            ctx,
            PendingQuestion {
                id: stratus_core::new_id(),
                question: summary.clone(),
                options: options.clone(),
                kind: Some("plan_exit".to_string()),
                extra: Some(json!({ "summary": summary })),
            },
        )
        .await?;

        let answer = result.get("answer").and_then(Value::as_str).unwrap_or_default();
        let approved = answer == options[0];
        Ok(json!({
            "approved": approved,
            "modeSwitch": if approved { Value::String("build".to_string()) } else { Value::Null },
            "summary": summary,
        }))
    }
}

pub struct PlanEnterTool;

#[async_trait]
impl Tool for PlanEnterTool {
    fn name(&self) -> &str {
        "plan_enter"
    }

    fn description(&self) -> &str {
        "Pure marker tool: switch the agent into plan mode. Does not block."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _args: Value, _ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        Ok(json!({ "entered": true, "mode": "plan" }))
    }
}
