//! JSON-RPC envelope tests over stdio and HTTP.

use super::common::*;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use quarry_mcp::create_router;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tower::ServiceExt;

async fn rpc(ctx: &TestContext, message: Value) -> Value {
    let response = ctx
        .server()
        .handle_message(&message.to_string())
        .await
        .expect("request should be answered");
    serde_json::to_value(response).unwrap()
}

#[tokio::test]
async fn test_initialize() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);

    let response = rpc(
        &ctx,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2025-03-26"}}),
    )
    .await;

    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["protocolVersion"], json!("2025-03-26"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("quarry"));
    assert!(response["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_tools_list_depends_on_auth_mode() {
    let sa = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let oauth = TestContext::oauth(
        FakeWarehouse::standard(),
        &[],
        ScriptedProvider::default(),
        None,
    );
    let request = json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"});

    let names = |response: Value| -> Vec<String> {
        response["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect()
    };

    assert_eq!(
        names(rpc(&sa, request.clone()).await),
        vec!["execute-query", "list-tables", "describe-table"]
    );
    assert_eq!(
        names(rpc(&oauth, request).await),
        vec!["execute-query", "list-tables", "describe-table", "reauth-oauth"]
    );
}

#[tokio::test]
async fn test_tool_success_has_text_and_structured_content() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let response = rpc(
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "list-tables", "arguments": {}}
        }),
    )
    .await;

    let result = &response["result"];
    assert_eq!(result["isError"], json!(false));
    assert_eq!(result["structuredContent"]["tables"][0]["table"], json!("orders"));
    let text = result["content"][0]["text"].as_str().unwrap();
    let decoded: Value = serde_json::from_str(text).unwrap();
    assert_eq!(decoded, result["structuredContent"]);
}

#[tokio::test]
async fn test_tool_failure_is_error_result() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let response = rpc(
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "tools/call",
            "params": {"name": "describe-table", "arguments": {"table_name": "hr.people"}}
        }),
    )
    .await;

    assert!(response.get("error").is_none());
    let result = &response["result"];
    assert_eq!(result["isError"], json!(true));
    assert_eq!(result["structuredContent"]["kind"], json!("permission"));

    let unknown = rpc(
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {"name": "nonexistent", "arguments": {}}
        }),
    )
    .await;
    assert_eq!(
        unknown["result"]["structuredContent"]["kind"],
        json!("unsupported_tool")
    );
}

#[tokio::test]
async fn test_protocol_errors() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let server = ctx.server();

    let parse = server.handle_message("{not json").await.unwrap();
    assert_eq!(parse.error.unwrap().code, -32700);
    assert_eq!(parse.id, Value::Null);

    let method = rpc(&ctx, json!({"jsonrpc": "2.0", "id": 2, "method": "tables/drop"})).await;
    assert_eq!(method["error"]["code"], json!(-32601));

    let params = rpc(&ctx, json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call"})).await;
    assert_eq!(params["error"]["code"], json!(-32602));

    let bad_params = rpc(
        &ctx,
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"arguments": {}}}),
    )
    .await;
    assert_eq!(bad_params["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let server = ctx.server();

    let response = server
        .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    assert!(response.is_none());

    let ping = rpc(&ctx, json!({"jsonrpc": "2.0", "id": 5, "method": "ping"})).await;
    assert_eq!(ping["result"], json!({}));
}

#[tokio::test]
async fn test_stdio_answers_every_request() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let server = ctx.server();

    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "execute-query", "arguments": {"sql": "SELECT 1"}}}),
    ]
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join("\n")
        + "\n\nnot json\n";

    let (writer, mut output) = tokio::io::duplex(64 * 1024);
    server.serve_io(input.as_bytes(), writer).await.unwrap();

    let mut text = String::new();
    output.read_to_string(&mut text).await.unwrap();
    let responses: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(responses.len(), 4);
    let mut ids: Vec<String> = responses.iter().map(|r| r["id"].to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3", "null"]);
    assert!(
        responses
            .iter()
            .any(|r| r["id"] == json!(3) && r["result"]["isError"] == json!(false))
    );
}

#[tokio::test]
async fn test_stdio_stops_on_cancel() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let cancel = tokio_util::sync::CancellationToken::new();
    let server = std::sync::Arc::new(quarry_mcp::McpServer::new(
        quarry_core::McpConfig::default(),
        ctx.dispatcher.clone(),
        cancel.clone(),
    ));

    // Input that never ends.
    let (_input_writer, input) = tokio::io::duplex(1024);
    let (writer, _output) = tokio::io::duplex(1024);

    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), server.serve_io(input, writer))
        .await
        .expect("serve_io should return after cancellation")
        .unwrap();
}

#[tokio::test]
async fn test_http_post_mcp() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let app = create_router(ctx.server());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["result"]["tools"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_http_notification_is_accepted() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let app = create_router(ctx.server());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .body(Body::from(
                    r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);
    let app = create_router(ctx.server());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], json!("ok"));
}
