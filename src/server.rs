use crate::{
    config::Config,
    errors::{into_response, AppError},
    mcp::{
        registry::{CallRequest, CallResponse, ToolRegistry},
        types::{CallToolResult, Capabilities, ToolInfo},
    },
    security,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub registry: Arc<ToolRegistry>,
    pub rls: security::RateLimiters,
}

pub type StreamBody = axum::body::Body;

pub async fn serve(cfg: Config, registry: ToolRegistry) -> anyhow::Result<()> {
    let shared = AppState {
        rls: security::RateLimiters::from_limits(&cfg.limits),
        cfg: Arc::new(cfg),
        registry: Arc::new(registry),
    };

    let app = build_router(shared.clone());

    let addr: std::net::SocketAddr =
        format!("{}:{}", shared.cfg.server.bind_addr, shared.cfg.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(shared: AppState) -> Router {
    let base = shared.cfg.server.base_path.clone();
    use tower_http::limit::RequestBodyLimitLayer;
    let limit_bytes = shared.cfg.limits.max_request_kb * 1024;
    Router::new()
        .route("/healthz", get(health))
        .route(&format!("{base}/capabilities"), get(capabilities))
        .route(
            &format!("{base}/call"),
            post(call).layer(RequestBodyLimitLayer::new(limit_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    match authorize(&state, &headers) {
        Ok(()) => (StatusCode::OK, Json(json!({"status":"ok"}))).into_response(),
        Err(e) => into_response(e).into_response(),
    }
}

async fn capabilities(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return into_response(e).into_response();
    }
    let tools: Vec<ToolInfo> = state
        .registry
        .list_names()
        .into_iter()
        .filter_map(|n| {
            let t = state.registry.get(&n)?;
            Some(ToolInfo {
                name: n,
                description: t.description().to_string(),
                input_schema: t.input_schema(),
                streaming: t.streams(),
            })
        })
        .collect();
    let caps = Capabilities {
        mcp_version: "1.0",
        tools,
        streaming: true,
    };
    (StatusCode::OK, Json(caps)).into_response()
}

/// Fields common to every audit line of one request.
struct Audit {
    request_id: String,
    origin: String,
    token_present: bool,
    tool: String,
    started: std::time::Instant,
}

impl Audit {
    fn end(&self, decision: &str, code: &str, bytes_out: u64, streaming: bool) {
        tracing::info!(
            request_id = %self.request_id,
            origin = %self.origin,
            token_present = self.token_present,
            tool = %self.tool,
            decision = decision,
            code = code,
            duration_ms = self.started.elapsed().as_millis() as u64,
            bytes_out = bytes_out,
            streaming = streaming,
            "audit"
        );
    }

    fn deny(&self, e: AppError) -> Response {
        self.end("deny", e.code(), 0, false);
        into_response(e).into_response()
    }
}

async fn call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CallRequest>,
) -> Response {
    let token = security::extract_bearer(&headers);
    let audit = Audit {
        request_id: uuid::Uuid::new_v4().to_string(),
        origin: headers
            .get("Origin")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string(),
        token_present: token.is_some(),
        tool: req.tool.clone(),
        started: std::time::Instant::now(),
    };

    if let Err(e) = authorize(&state, &headers) {
        return audit.deny(e);
    }
    if let Err(e) = security::content_length_ok(&headers, state.cfg.limits.max_request_kb) {
        return audit.deny(e);
    }
    if let Err(e) = state.rls.check(token.as_deref()) {
        return audit.deny(e);
    }
    let Some(tool) = state.registry.get(&req.tool) else {
        return audit.deny(AppError::NotFound);
    };

    if req.stream && tool.streams() {
        return match tool.call_stream(req.params).await {
            Ok(body) => {
                audit.end("allow", "OK", 0, true);
                (
                    StatusCode::OK,
                    [(axum::http::header::CONTENT_TYPE, "application/x-ndjson")],
                    body,
                )
                    .into_response()
            }
            Err(e) => {
                audit.end("error", e.code(), 0, true);
                tool_error_response(req.id, e)
            }
        };
    }

    let (result, code) = match tool.call(req.params).await {
        Ok(result) => (result, "OK"),
        Err(e) if e.is_tool_level() => (CallToolResult::error(&e), e.code()),
        Err(e) => {
            audit.end("error", e.code(), 0, false);
            return tool_error_response(req.id, e);
        }
    };
    let decision = if result.is_error() { "error" } else { "allow" };
    let payload = CallResponse { id: req.id, result: Some(result), error: None };
    let bytes_out = serde_json::to_vec(&payload).map(|v| v.len()).unwrap_or(0) as u64;
    audit.end(decision, code, bytes_out, false);
    (StatusCode::OK, Json(payload)).into_response()
}

/// Tool failures become error-flagged results; anything else is a transport error.
fn tool_error_response(id: String, e: AppError) -> Response {
    if e.is_tool_level() {
        let payload = CallResponse { id, result: Some(CallToolResult::error(&e)), error: None };
        return (StatusCode::OK, Json(payload)).into_response();
    }
    let error = crate::mcp::types::ErrorObj { code: e.code().to_string(), message: e.to_string() };
    (e.status(), Json(CallResponse { id, result: None, error: Some(error) })).into_response()
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    security::require_bearer(headers, &state.cfg.auth.bearer_token)?;
    security::check_origin(headers, &state.cfg.auth.allowed_origins)?;
    Ok(())
}
