use crate::config::{Auth, Config, Limits, Sandbox, Server};
use crate::mcp::registry::ToolRegistry;
use crate::sandbox::AllowedRoots;
use crate::security::RateLimiters;
use crate::server::{build_router, AppState};
use assert_fs::prelude::*;
use assert_fs::TempDir;
use axum::{body::Body, http::{Request, StatusCode}, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        server: Server { bind_addr: "127.0.0.1".into(), port: 0, base_path: "/mcp".into() },
        auth: Auth { bearer_token: "t".into(), allowed_origins: vec!["https://good".into()] },
        limits: Limits::default(),
        sandbox: Sandbox { allowed_dirs: vec![dir.to_path_buf()] },
    }
}

fn app_with(tmp: &TempDir, rls: RateLimiters) -> Router {
    let cfg = test_config(tmp.path());
    let roots = AllowedRoots::new(&cfg.sandbox.allowed_dirs).unwrap();
    let registry = ToolRegistry::new(Arc::new(roots));
    build_router(AppState { cfg: Arc::new(cfg), registry: Arc::new(registry), rls })
}

fn app(tmp: &TempDir) -> Router {
    app_with(tmp, RateLimiters::new(1000, 1000, 1000, 1000))
}

fn call_req(body: Value) -> Request<Body> {
    Request::builder()
        .uri("/mcp/call")
        .method("POST")
        .header("Origin", "https://good")
        .header("Authorization", "Bearer t")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn capabilities_list_every_tool() {
    let tmp = TempDir::new().unwrap();
    let req = Request::builder()
        .uri("/mcp/capabilities")
        .method("GET")
        .header("Origin", "https://good")
        .header("Authorization", "Bearer t")
        .body(Body::empty())
        .unwrap();
    let resp = app(&tmp).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let caps = json_body(resp).await;
    let names: Vec<&str> = caps["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names.len(), 16);
    for expected in [
        "append_to_file",
        "copy_to_new_file",
        "cut_to_new_file",
        "delete_range",
        "insert_at_position",
        "list_allowed_directories",
        "replace_block",
        "replace_by_pattern",
    ] {
        assert!(names.contains(&expected), "missing {expected}");
    }
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let tmp = TempDir::new().unwrap();
    let req = Request::builder()
        .uri("/mcp/call")
        .method("POST")
        .header("Origin", "https://good")
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"id": "1", "tool": "read_file", "params": {}}).to_string()))
        .unwrap();
    let resp = app(&tmp).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["code"], "Unauthorized");
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let resp = app(&tmp).oneshot(call_req(json!({"id": "1", "tool": "run_shell"}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replace_block_over_http() {
    let tmp = TempDir::new().unwrap();
    tmp.child("notes.txt").write_str("a\n[start]\nold\n[end]\nz").unwrap();
    let body = json!({
        "id": "42",
        "tool": "replace_block",
        "params": {
            "path": tmp.child("notes.txt").path(),
            "range": {"beforeText": "[start]\n", "afterText": "[end]"},
            "content": "new\n"
        }
    });

    let resp = app(&tmp).oneshot(call_req(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["id"], "42");
    assert!(v["result"].get("isError").is_none());
    assert_eq!(v["result"]["content"][0]["type"], "text");
    tmp.child("notes.txt").assert("a\n[start]\nnew\n[end]\nz");
}

#[tokio::test]
async fn tool_failures_are_error_flagged_results() {
    let tmp = TempDir::new().unwrap();
    tmp.child("a.txt").write_str("unchanged").unwrap();
    let body = json!({
        "id": "7",
        "tool": "delete_range",
        "params": {"path": tmp.child("a.txt").path(), "range": {"beforeText": "<<", "afterText": ">>"}}
    });

    let resp = app(&tmp).oneshot(call_req(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["result"]["isError"], true);
    let text = v["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Error: Could not find a text range"), "{text}");
    tmp.child("a.txt").assert("unchanged");
}

#[tokio::test]
async fn sandbox_denial_is_an_error_result() {
    let tmp = TempDir::new().unwrap();
    let body = json!({"id": "8", "tool": "read_file", "params": {"path": "/etc/passwd"}});
    let v = json_body(app(&tmp).oneshot(call_req(body)).await.unwrap()).await;
    assert_eq!(v["result"]["isError"], true);
    assert!(v["result"]["content"][0]["text"].as_str().unwrap().starts_with("Error: Access denied"));
}

#[tokio::test]
async fn schema_errors_name_the_field() {
    let tmp = TempDir::new().unwrap();
    let body = json!({"id": "9", "tool": "copy_to_new_file", "params": {"sourcePath": "x"}});
    let v = json_body(app(&tmp).oneshot(call_req(body)).await.unwrap()).await;
    assert_eq!(v["result"]["isError"], true);
    let text = v["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Error: invalid arguments"), "{text}");
}

#[tokio::test]
async fn read_multiple_files_streams_ndjson() {
    let tmp = TempDir::new().unwrap();
    tmp.child("one.txt").write_str("1").unwrap();
    let body = json!({
        "id": "s",
        "tool": "read_multiple_files",
        "stream": true,
        "params": {"paths": [tmp.child("one.txt").path(), "/etc/passwd"]}
    });

    let resp = app(&tmp).oneshot(call_req(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/x-ndjson");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let events: Vec<Value> = String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["event"], "start");
    assert_eq!(events[1]["content"], "1");
    assert_eq!(events[2]["error"]["code"], "AccessDenied");
    assert_eq!(events[3]["event"], "end");
}

#[tokio::test]
async fn rate_limit_applies_per_token() {
    let tmp = TempDir::new().unwrap();
    let app = app_with(&tmp, RateLimiters::new(1, 1, 1000, 1000));
    let body = json!({"id": "r", "tool": "list_allowed_directories"});

    let first = app.clone().oneshot(call_req(body.clone())).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.oneshot(call_req(body)).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}
