use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

/// §3.3: git tools require a prior `confirmed=true` unless Alpha mode is
/// enabled, otherwise they return `{error, needsConfirmation:true}` without
/// executing — as a normal result, not a thrown error.
fn needs_confirmation(ctx: &dyn ToolContext, args: &Value) -> Option<Value> {
    let confirmed = args.get("confirmed").and_then(Value::as_bool).unwrap_or(false);
    if confirmed || ctx.alpha_mode() {
        None
    } else {
        Some(json!({ "error": "confirmation required", "needsConfirmation": true }))
    }
}

pub struct GitCommitTool;

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Stage all changes and commit. Requires confirmed=true unless Alpha mode is enabled."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" },
                "confirmed": { "type": "boolean" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        if let Some(refusal) = needs_confirmation(ctx, &args) {
            return Ok(refusal);
        }
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("message".into()))?;

        ctx.exec("git", &["add".to_string(), "-A".to_string()]).await?;
        let out = ctx
            .exec("git", &["commit".to_string(), "-m".to_string(), message.to_string()])
            .await?;
        Ok(json!({ "committed": out.success(), "stdout": out.stdout, "stderr": out.stderr }))
    }
}

pub struct GitPushTool;

#[async_trait]
impl Tool for GitPushTool {
    fn name(&self) -> &str {
        "git_push"
    }

    fn description(&self) -> &str {
        "Push the session branch upstream (-u origin sessionBranch). Requires confirmed=true unless Alpha mode is enabled."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "confirmed": { "type": "boolean" } },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        if let Some(refusal) = needs_confirmation(ctx, &args) {
            return Ok(refusal);
        }
        let out = ctx
            .exec(
                "git",
                &["push".to_string(), "-u".to_string(), "origin".to_string(), ctx.session_branch().to_string()],
            )
            .await?;
        Ok(json!({ "pushed": out.success(), "stdout": out.stdout, "stderr": out.stderr }))
    }
}

pub struct PrCreateTool;

#[async_trait]
impl Tool for PrCreateTool {
    fn name(&self) -> &str {
        "pr_create"
    }

    fn description(&self) -> &str {
        "Open a pull request from the session branch into the base branch. Requires confirmed=true unless Alpha mode is enabled."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "body": { "type": "string" },
                "confirmed": { "type": "boolean" }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        if let Some(refusal) = needs_confirmation(ctx, &args) {
            return Ok(refusal);
        }
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("title".into()))?;
        let body = args.get("body").and_then(Value::as_str).unwrap_or("");

        let url = format!("https://api.github.com/repos/{}/{}/pulls", ctx.owner(), ctx.repo());
        let resp = ctx
            .http_client()
            .post(url)
            .bearer_auth(ctx.github_token())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "stratus-orchestrator")
            .json(&json!({
                "title": title,
                "body": body,
                "head": ctx.session_branch(),
                "base": ctx.branch(),
            }))
            .send()
            .await?;

        let status = resp.status();
        let payload: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(ToolError::Other(format!("GitHub PR creation failed ({status}): {payload}")));
        }
        Ok(json!({
            "created": true,
            "number": payload.get("number"),
            "url": payload.get("html_url"),
        }))
    }
}
