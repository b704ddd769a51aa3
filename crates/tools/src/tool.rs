use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::ToolContext;
use crate::error::ToolError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RESULT_SIZE: usize = 100 * 1024;

/// Function-calling shape passed to the inference engine, mirroring the
/// teacher's `querymt::chat::Tool { type, function: { name, description,
/// parameters } }`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A named tool with a JSON-schema parameter contract and an execute
/// function (§3: "A tool has name, description, JSON-schema parameters,
/// timeout, maxResultSize, and execute(args, ctx)").
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    fn max_result_size(&self) -> usize {
        DEFAULT_MAX_RESULT_SIZE
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function",
            function: FunctionDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
            },
        }
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError>;
}
