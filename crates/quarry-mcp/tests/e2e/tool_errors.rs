//! Argument validation and error kind tests.

use super::common::*;
use pretty_assertions::assert_eq;
use quarry_mcp::ErrorKind;
use serde_json::json;

#[tokio::test]
async fn test_unknown_tool_is_unsupported() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);

    let err = ctx.call("drop-table", json!({})).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::UnsupportedTool);
    assert!(err.message.contains("drop-table"));
}

#[tokio::test]
async fn test_missing_sql_is_validation_error_without_side_effects() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);

    let err = ctx.call("execute-query", json!({})).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(ctx.acquires(), 0);
    assert_eq!(ctx.warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_missing_table_argument_is_validation_error() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);

    let err = ctx
        .call("describe-table", json!({"dataset": "sales"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(ctx.warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_query_alias_and_dry_run() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);

    let payload = ctx
        .call(
            "execute-query",
            json!({"query": "SELECT * FROM sales.orders", "dry_run": true}),
        )
        .await
        .unwrap();

    assert_eq!(payload["dry_run"], json!(true));
    assert_eq!(payload["bytes_processed"], json!(1024));
    assert_eq!(payload["rows"], json!([]));
}

#[tokio::test]
async fn test_warehouse_failure_is_transport_error() {
    let mut warehouse = FakeWarehouse::standard();
    warehouse.query_failure = Some((503, "backend unavailable".to_string()));
    let ctx = TestContext::service_account(warehouse, &[]);

    let err = ctx
        .call("execute-query", json!({"sql": "SELECT 1"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Transport);
    assert!(err.message.contains("backend unavailable"));
}

#[tokio::test]
async fn test_rejected_query_is_validation_error() {
    let mut warehouse = FakeWarehouse::standard();
    warehouse.query_failure = Some((400, "Syntax error: Unexpected end of script".to_string()));
    let ctx = TestContext::service_account(warehouse, &[]);

    let err = ctx
        .call("execute-query", json!({"sql": "SELECT"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
}
