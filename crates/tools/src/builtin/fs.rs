use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

fn resolve(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file from the working tree, with 1-indexed offset/limit line selection."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "offset": { "type": "integer", "description": "1-indexed starting line" },
                "limit": { "type": "integer", "description": "maximum number of lines" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("path".into()))?;
        let full = resolve(ctx.root(), path);
        let content = tokio::fs::read_to_string(&full).await?;

        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(1).max(1) as usize;
        let limit = args.get("limit").and_then(Value::as_u64).map(|l| l as usize);

        let lines: Vec<&str> = content.lines().collect();
        let start = offset - 1;
        if start >= lines.len() {
            return Ok(Value::String(String::new()));
        }
        let end = limit.map(|l| (start + l).min(lines.len())).unwrap_or(lines.len());

        let mut out = String::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            out.push_str(&format!("{:6}\t{}\n", start + i + 1, line));
        }
        Ok(Value::String(out))
    }
}

pub struct WriteToFileTool;

#[async_trait]
impl Tool for WriteToFileTool {
    fn name(&self) -> &str {
        "write_to_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file, creating parent directories as needed (mkdir -p then overwrite)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("path".into()))?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("content".into()))?;

        let full = resolve(ctx.root(), path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(json!({ "written": true, "path": path }))
    }
}

pub struct EditTool;

/// Exact unique-substring replace. Fails on zero matches, fails on more
/// than one match unless `replace_all`, fails if old/new are identical.
fn apply_edit(content: &str, old: &str, new: &str, replace_all: bool) -> Result<(String, usize), ToolError> {
    if old == new {
        return Err(ToolError::InvalidArgs("old_string and new_string are identical".into()));
    }
    let count = content.matches(old).count();
    if count == 0 {
        return Err(ToolError::NotFound("old_string not found in file".into()));
    }
    if count > 1 && !replace_all {
        return Err(ToolError::InvalidArgs(format!(
            "old_string matches {count} times; pass replace_all=true or supply more surrounding context"
        )));
    }
    let replaced = if replace_all { count } else { 1 };
    let new_content = if replace_all {
        content.replace(old, new)
    } else {
        content.replacen(old, new, 1)
    };
    Ok((new_content, replaced))
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace an exact, unique substring in a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "old_string": { "type": "string" },
                "new_string": { "type": "string" },
                "replace_all": { "type": "boolean" }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("path".into()))?;
        let old_string = args
            .get("old_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("old_string".into()))?;
        let new_string = args
            .get("new_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("new_string".into()))?;
        let replace_all = args.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        let full = resolve(ctx.root(), path);
        let content = tokio::fs::read_to_string(&full).await?;
        let (new_content, replacements) = apply_edit(&content, old_string, new_string, replace_all)?;
        tokio::fs::write(&full, new_content).await?;
        Ok(json!({ "edited": true, "path": path, "replacements": replacements }))
    }
}

pub struct MultiEditTool;

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multi_edit"
    }

    fn description(&self) -> &str {
        "Apply a sequence of exact-substring edits to a file, all-or-nothing."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_string": { "type": "string" },
                            "new_string": { "type": "string" },
                            "replace_all": { "type": "boolean" }
                        },
                        "required": ["old_string", "new_string"]
                    }
                }
            },
            "required": ["path", "edits"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("path".into()))?;
        let edits = args
            .get("edits")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArgs("edits".into()))?;
        if edits.is_empty() {
            return Err(ToolError::InvalidArgs("edits must be non-empty".into()));
        }

        let full = resolve(ctx.root(), path);
        let mut working = tokio::fs::read_to_string(&full).await?;
        let mut total = 0usize;

        for (i, edit) in edits.iter().enumerate() {
            let old_string = edit
                .get("old_string")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArgs(format!("edits[{i}].old_string")))?;
            let new_string = edit
                .get("new_string")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArgs(format!("edits[{i}].new_string")))?;
            let replace_all = edit.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

            let (next, replaced) = apply_edit(&working, old_string, new_string, replace_all)
                .map_err(|e| ToolError::InvalidArgs(format!("edits[{i}]: {e}")))?;
            working = next;
            total += replaced;
        }

        tokio::fs::write(&full, working).await?;
        Ok(json!({ "edited": true, "path": path, "replacements": total }))
    }
}

pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List the entries of a directory in the working tree."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let full = resolve(ctx.root(), path);
        let mut entries = tokio::fs::read_dir(&full).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            names.push(if is_dir { format!("{name}/") } else { name });
        }
        names.sort();
        Ok(json!({ "entries": names }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_rejects_identical_strings() {
        let err = apply_edit("hello world", "hello", "hello", false).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[test]
    fn edit_rejects_ambiguous_match_without_replace_all() {
        let err = apply_edit("a a a", "a", "b", false).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[test]
    fn edit_replace_all_replaces_every_match() {
        let (out, n) = apply_edit("a a a", "a", "b", true).unwrap();
        assert_eq!(out, "b b b");
        assert_eq!(n, 3);
    }

    #[test]
    fn edit_rejects_missing_match() {
        let err = apply_edit("hello", "goodbye", "hi", false).unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
