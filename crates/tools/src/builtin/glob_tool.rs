use std::path::Path;

use async_trait::async_trait;
use ignore::WalkBuilder;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

const MAX_RESULTS: usize = 100;
const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files by glob pattern, capped at 100 results. Always excludes node_modules, .git, dist, build."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "path": { "type": "string", "description": "subdirectory to search, defaults to the repo root" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("pattern".into()))?
            .to_string();
        let subdir = args.get("path").and_then(Value::as_str).unwrap_or(".").to_string();
        let root = ctx.root().to_path_buf();
        let search_root = root.join(&subdir);

        tokio::task::spawn_blocking(move || run_glob(&root, &search_root, &pattern))
            .await
            .map_err(|e| ToolError::Other(e.to_string()))?
    }
}

fn run_glob(root: &Path, search_root: &Path, pattern: &str) -> Result<Value, ToolError> {
    let glob_pattern = glob::Pattern::new(pattern).map_err(|e| ToolError::InvalidArgs(format!("bad pattern: {e}")))?;

    let mut results = Vec::new();
    let mut truncated = false;

    let walker = WalkBuilder::new(search_root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|e| !EXCLUDED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        .build();

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_string_lossy().into_owned();
        if glob_pattern.matches(&rel) {
            if results.len() >= MAX_RESULTS {
                truncated = true;
                break;
            }
            results.push(rel);
        }
    }

    Ok(json!({ "files": results, "truncated": truncated }))
}
