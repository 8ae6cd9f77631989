use crate::{
    edit,
    errors::AppError,
    mcp::{registry::Tool, types::CallToolResult},
    range::TextRange,
    sandbox::AllowedRoots,
    tools::{object_schema, parse_args, string_prop, text_range_schema},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TransferArgs {
    source_path: String,
    range: TextRange,
    target_path: String,
}

fn transfer_schema(target: &str) -> serde_json::Value {
    object_schema(
        &["sourcePath", "range", "targetPath"],
        json!({
            "sourcePath": string_prop("File to take the text from"),
            "range": text_range_schema("Markers bracketing the text to take"),
            "targetPath": string_prop(target),
        }),
    )
}

pub struct CopyToNewFileTool { roots: Arc<AllowedRoots> }
impl CopyToNewFileTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for CopyToNewFileTool {
    fn name(&self) -> &'static str { "copy_to_new_file" }
    fn description(&self) -> &'static str {
        "Copy the text between two markers in a file into a new file, overwriting it. The source is not modified."
    }
    fn input_schema(&self) -> serde_json::Value { transfer_schema("File to write the copied text to") }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: TransferArgs = parse_args(params)?;
        let msg = edit::copy_to_new_file(&self.roots, &args.source_path, &args.range, &args.target_path).await?;
        Ok(CallToolResult::text(msg))
    }
}

pub struct CutToNewFileTool { roots: Arc<AllowedRoots> }
impl CutToNewFileTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for CutToNewFileTool {
    fn name(&self) -> &'static str { "cut_to_new_file" }
    fn description(&self) -> &'static str {
        "Move the text between two markers into a new file and remove it from the source. \
         The target is written first; if writing the source then fails, the target keeps the text."
    }
    fn input_schema(&self) -> serde_json::Value { transfer_schema("File to write the cut text to") }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: TransferArgs = parse_args(params)?;
        let msg = edit::cut_to_new_file(&self.roots, &args.source_path, &args.range, &args.target_path).await?;
        Ok(CallToolResult::text(msg))
    }
}

pub struct AppendToFileTool { roots: Arc<AllowedRoots> }
impl AppendToFileTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for AppendToFileTool {
    fn name(&self) -> &'static str { "append_to_file" }
    fn description(&self) -> &'static str {
        "Append the text between two markers in a file to the end of another file, creating it if absent."
    }
    fn input_schema(&self) -> serde_json::Value { transfer_schema("File to append the text to") }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: TransferArgs = parse_args(params)?;
        let msg = edit::append_to_file(&self.roots, &args.source_path, &args.range, &args.target_path).await?;
        Ok(CallToolResult::text(msg))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct InsertArgs {
    path: String,
    position: TextRange,
    content: String,
}

pub struct InsertAtPositionTool { roots: Arc<AllowedRoots> }
impl InsertAtPositionTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for InsertAtPositionTool {
    fn name(&self) -> &'static str { "insert_at_position" }
    fn description(&self) -> &'static str {
        "Insert content right after beforeText, ahead of the text bracketed by the position markers. \
         The bracketed text is kept."
    }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(
            &["path", "position", "content"],
            json!({
                "path": string_prop("File to edit"),
                "position": text_range_schema("Markers bracketing the insertion point"),
                "content": string_prop("Text to insert"),
            }),
        )
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: InsertArgs = parse_args(params)?;
        let msg = edit::insert_at_position(&self.roots, &args.path, &args.position, &args.content).await?;
        Ok(CallToolResult::text(msg))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeleteArgs {
    path: String,
    range: TextRange,
}

pub struct DeleteRangeTool { roots: Arc<AllowedRoots> }
impl DeleteRangeTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for DeleteRangeTool {
    fn name(&self) -> &'static str { "delete_range" }
    fn description(&self) -> &'static str { "Remove the text between two markers. The markers stay." }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(
            &["path", "range"],
            json!({
                "path": string_prop("File to edit"),
                "range": text_range_schema("Markers bracketing the text to delete"),
            }),
        )
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: DeleteArgs = parse_args(params)?;
        let msg = edit::delete_range(&self.roots, &args.path, &args.range).await?;
        Ok(CallToolResult::text(msg))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReplaceBlockArgs {
    path: String,
    range: TextRange,
    content: String,
}

pub struct ReplaceBlockTool { roots: Arc<AllowedRoots> }
impl ReplaceBlockTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for ReplaceBlockTool {
    fn name(&self) -> &'static str { "replace_block" }
    fn description(&self) -> &'static str { "Replace the text between two markers with new content. The markers stay." }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(
            &["path", "range", "content"],
            json!({
                "path": string_prop("File to edit"),
                "range": text_range_schema("Markers bracketing the text to replace"),
                "content": string_prop("Replacement text"),
            }),
        )
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: ReplaceBlockArgs = parse_args(params)?;
        let msg = edit::replace_block(&self.roots, &args.path, &args.range, &args.content).await?;
        Ok(CallToolResult::text(msg))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReplacePatternArgs {
    path: String,
    pattern: String,
    #[serde(default)]
    flags: String,
    replacement: String,
}

pub struct ReplaceByPatternTool { roots: Arc<AllowedRoots> }
impl ReplaceByPatternTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for ReplaceByPatternTool {
    fn name(&self) -> &'static str { "replace_by_pattern" }
    fn description(&self) -> &'static str {
        "Replace the first match of a regular expression in a file, or every match with the g flag. \
         The replacement may use $1, $<name>, $& and $$."
    }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(
            &["path", "pattern", "replacement"],
            json!({
                "path": string_prop("File to edit"),
                "pattern": string_prop("Regular expression"),
                "flags": string_prop("Any of g, i, m, s, u, x"),
                "replacement": string_prop("Replacement text with optional back-references"),
            }),
        )
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: ReplacePatternArgs = parse_args(params)?;
        let msg = edit::replace_by_pattern(&self.roots, &args.path, &args.pattern, &args.flags, &args.replacement).await?;
        Ok(CallToolResult::text(msg))
    }
}
