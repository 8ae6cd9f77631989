use crate::{
    errors::{AppError, AppResult},
    mcp::{registry::Tool, types::CallToolResult},
    sandbox::AllowedRoots,
    tools::{object_schema, parse_args, string_prop},
};
use async_trait::async_trait;
use axum::body::Body;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use serde_json::json;
use std::{fs::Metadata, path::Path, sync::Arc, time::SystemTime};
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathArgs {
    path: String,
}

fn path_schema(description: &str) -> serde_json::Value {
    object_schema(&["path"], json!({"path": string_prop(description)}))
}

pub struct ReadFileTool { roots: Arc<AllowedRoots> }
impl ReadFileTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str { "read_file" }
    fn description(&self) -> &'static str { "Read the complete UTF-8 contents of a file." }
    fn input_schema(&self) -> serde_json::Value { path_schema("File to read") }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: PathArgs = parse_args(params)?;
        let full = self.roots.validate(&args.path).await?;
        let content = tokio::fs::read_to_string(&full).await?;
        Ok(CallToolResult::text(content))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsArgs {
    paths: Vec<String>,
}

pub struct ReadMultipleFilesTool { roots: Arc<AllowedRoots> }
impl ReadMultipleFilesTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

async fn read_one(roots: &AllowedRoots, path: &str) -> AppResult<String> {
    let full = roots.validate(path).await?;
    Ok(tokio::fs::read_to_string(&full).await?)
}

#[async_trait]
impl Tool for ReadMultipleFilesTool {
    fn name(&self) -> &'static str { "read_multiple_files" }
    fn description(&self) -> &'static str {
        "Read several files at once. A path that fails reports its own error without stopping the others."
    }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(&["paths"], json!({"paths": {"type": "array", "items": {"type": "string"}}}))
    }
    fn streams(&self) -> bool { true }

    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: PathsArgs = parse_args(params)?;
        let mut parts = Vec::with_capacity(args.paths.len());
        for path in &args.paths {
            match read_one(&self.roots, path).await {
                Ok(content) => parts.push(format!("{path}:\n{content}\n")),
                Err(e) => parts.push(format!("{path}: Error - {e}")),
            }
        }
        Ok(CallToolResult::text(parts.join("\n---\n")))
    }

    async fn call_stream(&self, params: serde_json::Value) -> Result<crate::server::StreamBody, AppError> {
        use futures::StreamExt;
        use tokio::sync::mpsc;
        use tokio_stream::wrappers::ReceiverStream;

        let args: PathsArgs = parse_args(params)?;
        let roots = self.roots.clone();
        let (tx, rx) = mpsc::channel::<String>(32);
        tokio::spawn(async move {
            let _ = tx.send(line(json!({"event": "start", "tool": "read_multiple_files"}))).await;
            for path in &args.paths {
                let event = match read_one(&roots, path).await {
                    Ok(content) => json!({"event": "file", "path": path, "content": content}),
                    Err(e) => json!({"event": "file", "path": path, "error": {"code": e.code(), "message": format!("Error: {e}")}}),
                };
                if tx.send(line(event)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(line(json!({"event": "end", "count": args.paths.len()}))).await;
        });

        Ok(Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, std::io::Error>)))
    }
}

fn line(v: serde_json::Value) -> String {
    format!("{v}\n")
}

pub struct ListDirectoryTool { roots: Arc<AllowedRoots> }
impl ListDirectoryTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str { "list_directory" }
    fn description(&self) -> &'static str { "List a directory, marking entries with [FILE] or [DIR]." }
    fn input_schema(&self) -> serde_json::Value { path_schema("Directory to list") }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: PathArgs = parse_args(params)?;
        let full = self.roots.validate(&args.path).await?;
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&full).await?;
        while let Some(entry) = dir.next_entry().await? {
            let kind = if entry.file_type().await?.is_dir() { "[DIR]" } else { "[FILE]" };
            entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
        }
        entries.sort();
        let listing: Vec<String> = entries.into_iter().map(|(name, kind)| format!("{kind} {name}")).collect();
        Ok(CallToolResult::text(listing.join("\n")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SearchArgs {
    path: String,
    pattern: String,
    #[serde(default)]
    exclude_patterns: Vec<String>,
}

pub struct SearchFilesTool { roots: Arc<AllowedRoots> }
impl SearchFilesTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

/// Bare names exclude any entry with that name, anywhere below the search root.
fn exclude_set(patterns: &[String]) -> AppResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        let globs = if p.contains('*') || p.contains('/') {
            vec![p.clone()]
        } else {
            vec![p.clone(), format!("**/{p}")]
        };
        for g in globs {
            builder.add(Glob::new(&g).map_err(|e| AppError::InvalidPattern(e.to_string()))?);
        }
    }
    builder.build().map_err(|e| AppError::InvalidPattern(e.to_string()))
}

fn search(roots: &AllowedRoots, base: &Path, needle: &str, excludes: &GlobSet) -> Vec<String> {
    let needle = needle.to_lowercase();
    WalkDir::new(base)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let rel = e.path().strip_prefix(base).unwrap_or(e.path());
            !excludes.is_match(rel)
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().to_lowercase().contains(&needle))
        // walkdir lists links without following them; judge each hit by where it resolves
        .filter(|e| dunce::canonicalize(e.path()).is_ok_and(|real| roots.contains_real(&real)))
        .map(|e| e.path().display().to_string())
        .collect()
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &'static str { "search_files" }
    fn description(&self) -> &'static str {
        "Recursively find files and directories whose name contains the pattern (case-insensitive)."
    }
    fn input_schema(&self) -> serde_json::Value {
        object_schema(
            &["path", "pattern"],
            json!({
                "path": string_prop("Directory to search from"),
                "pattern": string_prop("Substring to look for in entry names"),
                "excludePatterns": {"type": "array", "items": {"type": "string"}},
            }),
        )
    }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: SearchArgs = parse_args(params)?;
        let excludes = exclude_set(&args.exclude_patterns)?;
        let base = self.roots.validate(&args.path).await?;
        let roots = self.roots.clone();
        let hits = tokio::task::spawn_blocking(move || search(&roots, &base, &args.pattern, &excludes))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if hits.is_empty() {
            Ok(CallToolResult::text("No matches found"))
        } else {
            Ok(CallToolResult::text(hits.join("\n")))
        }
    }
}

/// A point-in-time view of a path's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub is_directory: bool,
    pub is_file: bool,
    pub permissions: String,
}

impl FileInfo {
    pub fn from_metadata(meta: &Metadata) -> Self {
        let stamp = |t: std::io::Result<SystemTime>| t.ok().map(DateTime::<Utc>::from);
        Self {
            size: meta.len(),
            created: stamp(meta.created()),
            modified: stamp(meta.modified()),
            accessed: stamp(meta.accessed()),
            is_directory: meta.is_dir(),
            is_file: meta.is_file(),
            permissions: permission_bits(meta),
        }
    }

    pub fn render(&self) -> String {
        let ts = |t: &Option<DateTime<Utc>>| t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "unknown".to_string());
        [
            format!("size: {}", self.size),
            format!("created: {}", ts(&self.created)),
            format!("modified: {}", ts(&self.modified)),
            format!("accessed: {}", ts(&self.accessed)),
            format!("isDirectory: {}", self.is_directory),
            format!("isFile: {}", self.is_file),
            format!("permissions: {}", self.permissions),
        ]
        .join("\n")
    }
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:03o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> String {
    if meta.permissions().readonly() { "444".to_string() } else { "666".to_string() }
}

pub struct GetFileInfoTool { roots: Arc<AllowedRoots> }
impl GetFileInfoTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for GetFileInfoTool {
    fn name(&self) -> &'static str { "get_file_info" }
    fn description(&self) -> &'static str {
        "Report size, timestamps, type and permissions of a file or directory."
    }
    fn input_schema(&self) -> serde_json::Value { path_schema("File or directory to inspect") }
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let args: PathArgs = parse_args(params)?;
        let full = self.roots.validate(&args.path).await?;
        let meta = tokio::fs::metadata(&full).await?;
        Ok(CallToolResult::text(FileInfo::from_metadata(&meta).render()))
    }
}

pub struct ListAllowedDirectoriesTool { roots: Arc<AllowedRoots> }
impl ListAllowedDirectoriesTool { pub fn new(roots: Arc<AllowedRoots>) -> Self { Self { roots } } }

#[async_trait]
impl Tool for ListAllowedDirectoriesTool {
    fn name(&self) -> &'static str { "list_allowed_directories" }
    fn description(&self) -> &'static str { "List the directories this server may access." }
    fn input_schema(&self) -> serde_json::Value { object_schema(&[], json!({})) }
    async fn call(&self, _params: serde_json::Value) -> Result<CallToolResult, AppError> {
        let dirs: Vec<String> = self.roots.paths().map(|p| p.display().to_string()).collect();
        Ok(CallToolResult::text(format!("Allowed directories:\n{}", dirs.join("\n"))))
    }
}
