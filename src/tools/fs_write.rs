use crate::{
    errors::AppError,
    mcp::{registry::Tool, types::CallToolResult},
    sandbox::AllowedRoots,
    tools::{object_schema, parse_args, string_prop},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::{io, sync::Arc};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteArgs {
    path: String,
    content: String,
}

pub struct WriteFileTool { roots: Arc<AllowedRoots> }
impl WriteFileTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str { "write_file" }
    fn description(&self) -> &'static str { "Create a file or overwrite it with the given text." }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(
            &["path", "content"],
            json!({"path": string_prop("File to write"), "content": string_prop("Full file contents")}),
        )
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: WriteArgs = parse_args(params)?;
        let full = self.roots.validate(&args.path).await?;
        tokio::fs::write(&full, &args.content).await?;
        debug!(path = %full.display(), bytes = args.content.len(), "write file");
        Ok(CallToolResult::text(format!("Successfully wrote to {}", args.path)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirArgs {
    path: String,
}

pub struct CreateDirectoryTool { roots: Arc<AllowedRoots> }
impl CreateDirectoryTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &'static str { "create_directory" }
    fn description(&self) -> &'static str { "Create a directory and any missing parents. Succeeds if it already exists." }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(&["path"], json!({"path": string_prop("Directory to create")}))
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: DirArgs = parse_args(params)?;
        let full = self.roots.validate_tree(&args.path).await?;
        tokio::fs::create_dir_all(&full).await?;
        debug!(path = %full.display(), "create directory");
        Ok(CallToolResult::text(format!("Successfully created directory {}", args.path)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveArgs {
    source: String,
    destination: String,
}

pub struct MoveFileTool { roots: Arc<AllowedRoots> }
impl MoveFileTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &'static str { "move_file" }
    fn description(&self) -> &'static str { "Move or rename a file or directory. Fails if the destination exists." }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(
            &["source", "destination"],
            json!({"source": string_prop("Path to move"), "destination": string_prop("New path")}),
        )
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: MoveArgs = parse_args(params)?;
        let from = self.roots.validate(&args.source).await?;
        let to = self.roots.validate(&args.destination).await?;
        if tokio::fs::try_exists(&to).await? {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("destination already exists: {}", args.destination),
            )));
        }
        tokio::fs::rename(&from, &to).await?;
        debug!(from = %from.display(), to = %to.display(), "move");
        Ok(CallToolResult::text(format!("Successfully moved {} to {}", args.source, args.destination)))
    }
}
