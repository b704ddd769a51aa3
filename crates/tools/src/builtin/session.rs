use async_trait::async_trait;
use serde_json::{json, Value};
use stratus_core::TodoStatus;

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        "todoread"
    }

    fn description(&self) -> &str {
        "List the session's todos."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let todos = ctx.list_todos().await?;
        Ok(json!({ "todos": todos }))
    }
}

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todowrite"
    }

    fn description(&self) -> &str {
        "Replace all todos atomically. Rejects more than one in_progress todo."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] },
                            "priority": { "type": "integer" }
                        },
                        "required": ["content"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let items = args
            .get("todos")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArgs("todos".into()))?;

        let mut parsed = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArgs(format!("todos[{i}].content")))?
                .to_string();
            let status = match item.get("status").and_then(Value::as_str) {
                Some("in_progress") => TodoStatus::InProgress,
                Some("completed") => TodoStatus::Completed,
                _ => TodoStatus::Pending,
            };
            let priority = item.get("priority").and_then(Value::as_u64).map(|p| p as u8);
            parsed.push((content, priority, status));
        }

        let todos = ctx.replace_todos(parsed).await?;
        Ok(json!({ "todos": todos }))
    }
}
