use crate::{errors::AppError, mcp::types::CallToolResult, sandbox::AllowedRoots};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::sync::Arc;

pub type DynTool = Arc<dyn Tool + Send + Sync + 'static>;

#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<(String, DynTool)>,
}

impl ToolRegistry {
    pub fn new(roots: Arc<AllowedRoots>) -> Self {
        use crate::tools::{fs_read::*, fs_write::*, range_edit::*};
        let r = || roots.clone();
        let candidates: Vec<DynTool> = vec![
            Arc::new(ReadFileTool::new(r())),
            Arc::new(ReadMultipleFilesTool::new(r())),
            Arc::new(ListDirectoryTool::new(r())),
            Arc::new(SearchFilesTool::new(r())),
            Arc::new(GetFileInfoTool::new(r())),
            Arc::new(ListAllowedDirectoriesTool::new(r())),
            Arc::new(WriteFileTool::new(r())),
            Arc::new(CreateDirectoryTool::new(r())),
            Arc::new(MoveFileTool::new(r())),
            Arc::new(CopyToNewFileTool::new(r())),
            Arc::new(CutToNewFileTool::new(r())),
            Arc::new(AppendToFileTool::new(r())),
            Arc::new(InsertAtPositionTool::new(r())),
            Arc::new(DeleteRangeTool::new(r())),
            Arc::new(ReplaceBlockTool::new(r())),
            Arc::new(ReplaceByPatternTool::new(r())),
        ];
        let mut tools: Vec<(String, DynTool)> = candidates.into_iter().map(|t| (t.name().to_string(), t)).collect();
        tools.sort_by(|a, b| a.0.cmp(&b.0));
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<DynTool> { self.tools.iter().find(|(n, _)| n == name).map(|(_, t)| t.clone()) }
    pub fn list_names(&self) -> Vec<String> { self.tools.iter().map(|(n, _)| n.clone()).collect() }
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub stream: bool,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct CallResponse {
    pub id: String,
    pub result: Option<CallToolResult>,
    pub error: Option<super::types::ErrorObj>,
}

#[async_trait]
pub trait Tool {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> serde_json::Value;
    async fn call(&self, params: serde_json::Value) -> Result<CallToolResult, AppError>;
    fn streams(&self) -> bool { false }
    async fn call_stream(&self, _params: serde_json::Value) -> Result<crate::server::StreamBody, AppError> {
        Err(AppError::SchemaInvalid("streaming not supported".into()))
    }
}
