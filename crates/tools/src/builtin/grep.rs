use std::path::Path;

use async_trait::async_trait;
use grep_regex::RegexMatcher;
use grep_searcher::sinks::Lossy;
use grep_searcher::Searcher;
use ignore::WalkBuilder;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

const CONTEXT_LINES: usize = 2;

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regex pattern. Returns matching file paths by default, \
         or per-line matches with surrounding context when match_per_line is set."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "path": { "type": "string", "description": "subdirectory to search, defaults to the repo root" },
                "globs": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "include globs; prefix an entry with ! to exclude"
                },
                "match_per_line": { "type": "boolean" }
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
        let globs: Vec<String> = args
            .get("globs")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let match_per_line = args.get("match_per_line").and_then(Value::as_bool).unwrap_or(false);

        let root = ctx.root().to_path_buf();
        let search_root = root.join(&subdir);

        tokio::task::spawn_blocking(move || run_grep(&root, &search_root, &pattern, &globs, match_per_line))
            .await
            .map_err(|e| ToolError::Other(e.to_string()))?
    }
}

fn run_grep(root: &Path, search_root: &Path, pattern: &str, globs: &[String], match_per_line: bool) -> Result<Value, ToolError> {
    let matcher = RegexMatcher::new(pattern).map_err(|e| ToolError::InvalidArgs(format!("bad pattern: {e}")))?;

    let mut include_patterns = Vec::new();
    let mut exclude_patterns = Vec::new();
    for g in globs {
        if let Some(rest) = g.strip_prefix('!') {
            if let Ok(p) = glob::Pattern::new(rest) {
                exclude_patterns.push(p);
            }
        } else if let Ok(p) = glob::Pattern::new(g) {
            include_patterns.push(p);
        }
    }

    let mut files_with_matches: Vec<String> = Vec::new();
    let mut line_matches: Vec<Value> = Vec::new();

    for entry in WalkBuilder::new(search_root).hidden(false).git_ignore(true).build().filter_map(Result::ok) {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().into_owned();

        if !include_patterns.is_empty() && !include_patterns.iter().any(|p| p.matches(&rel)) {
            continue;
        }
        if exclude_patterns.iter().any(|p| p.matches(&rel)) {
            continue;
        }

        let mut matched_lines: Vec<u64> = Vec::new();
        let search_result = Searcher::new().search_path(
            &matcher,
            path,
            Lossy(|lnum, _line| {
                matched_lines.push(lnum);
                Ok(true)
            }),
        );
        if search_result.is_err() || matched_lines.is_empty() {
            continue;
        }

        if match_per_line {
            line_matches.extend(context_blocks(path, &rel, &matched_lines));
        } else {
            files_with_matches.push(rel);
        }
    }

    if match_per_line {
        Ok(json!({ "matches": line_matches }))
    } else {
        Ok(json!({ "files": files_with_matches }))
    }
}

fn context_blocks(path: &Path, rel: &str, matched_lines: &[u64]) -> Vec<Value> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = content.lines().collect();

    matched_lines
        .iter()
        .map(|&lnum| {
            let idx = (lnum as usize).saturating_sub(1);
            let start = idx.saturating_sub(CONTEXT_LINES);
            let end = (idx + CONTEXT_LINES + 1).min(lines.len());
            let context = lines[start..end].join("\n");
            json!({ "file": rel, "line": lnum, "context": context })
        })
        .collect()
}
