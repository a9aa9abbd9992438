//! Dataset allow-list tests.
//!
//! Out-of-scope references must fail with a permission error before any
//! credential is acquired or any warehouse call is made.

use super::common::*;
use pretty_assertions::assert_eq;
use quarry_mcp::ErrorKind;
use serde_json::json;

#[tokio::test]
async fn test_list_tables_only_returns_allowed_datasets() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let payload = ctx.call("list-tables", json!({})).await.unwrap();

    assert_eq!(
        payload,
        json!({
            "tables": [
                {"dataset": "sales", "table": "orders"},
                {"dataset": "sales", "table": "customers"}
            ]
        })
    );
    let listed: Vec<_> = ctx
        .warehouse
        .calls()
        .into_iter()
        .filter(|c| c.op == "list_tables")
        .map(|c| c.target)
        .collect();
    assert_eq!(listed, vec!["sales"]);
}

#[tokio::test]
async fn test_list_tables_unrestricted_keeps_enumeration_order() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);

    let payload = ctx.call("list-tables", json!({})).await.unwrap();

    let names: Vec<String> = payload["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| format!("{}.{}", t["dataset"].as_str().unwrap(), t["table"].as_str().unwrap()))
        .collect();
    assert_eq!(names, vec!["sales.orders", "sales.customers", "hr.people"]);
}

#[tokio::test]
async fn test_describe_out_of_scope_table_fails_before_network() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let err = ctx
        .call("describe-table", json!({"dataset": "hr", "table": "people"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Permission);
    assert_eq!(ctx.acquires(), 0);
    assert_eq!(ctx.warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_describe_out_of_scope_qualified_name() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let err = ctx
        .call("describe-table", json!({"table_name": "other-project.hr.people"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Permission);
    assert_eq!(ctx.warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_query_referencing_out_of_scope_dataset_fails_before_network() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    for sql in [
        "SELECT * FROM hr.people",
        "SELECT o.id FROM sales.orders o JOIN hr.people p ON o.owner = p.id",
        "SELECT * FROM sales.orders WHERE owner IN (SELECT id FROM `proj.hr.people`)",
        "SELECT schema_name FROM `region-us`.INFORMATION_SCHEMA.SCHEMATA",
        "SELECT * FROM `other-project.sales.orders`",
        "EXECUTE IMMEDIATE 'SELECT * FROM hr.people'",
        "CALL hr.leak_proc()",
        "SELECT hr.udf(id) FROM sales.orders",
        "SELECT * FROM sales.orders WHERE status = 'unterminated",
    ] {
        let err = ctx.call("execute-query", json!({"sql": sql})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Permission, "{sql}");
    }

    assert_eq!(ctx.acquires(), 0);
    assert_eq!(ctx.warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_describe_table_in_other_project_fails_before_network() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let err = ctx
        .call("describe-table", json!({"table_name": "other-project.sales.orders"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Permission);
    assert!(err.message.contains("other-project"), "{}", err.message);
    assert_eq!(ctx.warehouse.call_count(), 0);

    let payload = ctx
        .call(
            "describe-table",
            json!({"table_name": format!("{PROJECT}.sales.orders")}),
        )
        .await
        .unwrap();
    assert_eq!(payload["table"]["dataset"], json!("sales"));
    assert_eq!(ctx.warehouse.call_count(), 1);
}

#[tokio::test]
async fn test_query_inside_scope_runs() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let payload = ctx
        .call(
            "execute-query",
            json!({
                "sql": "WITH open_orders AS (SELECT * FROM sales.orders WHERE status = @status) \
                        SELECT * FROM open_orders",
                "params": {"status": "open"}
            }),
        )
        .await
        .unwrap();

    assert_eq!(payload["rows"], json!([{"id": 1, "status": "open"}]));
    assert_eq!(payload["total_rows"], json!(1));
    assert_eq!(payload["truncated"], json!(false));
    assert_eq!(ctx.warehouse.calls().len(), 1);
    assert_eq!(ctx.warehouse.calls()[0].token, "sa-token");
}

#[tokio::test]
async fn test_describe_missing_table_in_scope_is_not_found() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let err = ctx
        .call("describe-table", json!({"dataset": "sales", "table": "refunds"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_describe_table_returns_ordered_columns() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &["sales"]);

    let payload = ctx
        .call("describe-table", json!({"table_name": "sales.orders"}))
        .await
        .unwrap();

    assert_eq!(payload["table"], json!({"dataset": "sales", "table": "orders"}));
    assert_eq!(
        payload["columns"],
        json!([
            {"name": "id", "type": "INTEGER", "mode": "REQUIRED"},
            {"name": "status", "type": "STRING", "mode": "NULLABLE"}
        ])
    );
}
