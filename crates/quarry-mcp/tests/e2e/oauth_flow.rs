//! OAuth credential lifecycle as seen through the tools.

use super::common::*;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use quarry_auth::{OAuthPhase, TokenStore};
use quarry_mcp::ErrorKind;
use serde_json::json;

const QUERY: &str = "SELECT * FROM sales.orders";

#[tokio::test]
async fn test_first_query_authorizes_before_running() {
    let ctx = TestContext::oauth(
        FakeWarehouse::standard(),
        &["sales"],
        ScriptedProvider::default(),
        None,
    );
    assert_eq!(
        ctx.oauth_source().phase(),
        OAuthPhase::Unauthenticated {
            reauth_required: false
        }
    );

    let payload = ctx.call("execute-query", json!({"sql": QUERY})).await.unwrap();

    assert_eq!(payload["rows"][0]["status"], json!("open"));
    assert_eq!(ctx.provider().authorizes(), 1);
    assert_eq!(ctx.warehouse.calls()[0].token, "access-1");
    assert_eq!(ctx.oauth_source().phase(), OAuthPhase::Authenticated);

    let saved = ctx.store.as_ref().unwrap().load().await.unwrap();
    assert_eq!(saved.access_token, "access-1");
}

#[tokio::test]
async fn test_saved_token_is_reused_without_prompting() {
    let ctx = TestContext::oauth(
        FakeWarehouse::standard(),
        &[],
        ScriptedProvider::default(),
        Some(valid_token()),
    );

    ctx.call("execute-query", json!({"sql": QUERY})).await.unwrap();

    assert_eq!(ctx.provider().authorizes(), 0);
    assert_eq!(ctx.provider().refreshes(), 0);
    assert_eq!(ctx.warehouse.calls()[0].token, "saved-access");
}

#[tokio::test]
async fn test_expired_token_refreshes_transparently() {
    let ctx = TestContext::oauth(
        FakeWarehouse::standard(),
        &[],
        ScriptedProvider::default(),
        Some(expired_token()),
    );

    ctx.call("execute-query", json!({"sql": QUERY})).await.unwrap();

    assert_eq!(ctx.provider().refreshes(), 1);
    assert_eq!(ctx.provider().authorizes(), 0);
    assert_eq!(ctx.warehouse.calls()[0].token, "refreshed-1");

    let saved = ctx.store.as_ref().unwrap().load().await.unwrap();
    assert_eq!(saved.access_token, "refreshed-1");
    assert_eq!(saved.refresh_token, "saved-refresh");
}

#[tokio::test]
async fn test_concurrent_calls_share_one_refresh() {
    let ctx = TestContext::oauth(
        FakeWarehouse::standard(),
        &[],
        ScriptedProvider::default(),
        Some(expired_token()),
    );

    let calls = (0..8).map(|_| ctx.call("execute-query", json!({"sql": QUERY})));
    let results = join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(ctx.provider().refreshes(), 1);
    assert!(ctx.warehouse.calls().iter().all(|c| c.token == "refreshed-1"));
}

#[tokio::test]
async fn test_reauth_then_call_authorizes_exactly_once() {
    let ctx = TestContext::oauth(
        FakeWarehouse::standard(),
        &["sales"],
        ScriptedProvider::default(),
        Some(valid_token()),
    );

    let payload = ctx.call("reauth-oauth", json!({})).await.unwrap();
    assert_eq!(payload["status"], json!("authenticated"));
    assert_eq!(ctx.provider().authorizes(), 1);

    ctx.call("execute-query", json!({"sql": QUERY})).await.unwrap();
    assert_eq!(ctx.provider().authorizes(), 1);

    let tokens: Vec<_> = ctx.warehouse.calls().into_iter().map(|c| c.token).collect();
    assert!(tokens.iter().all(|t| t == "access-1"), "{tokens:?}");
}

#[tokio::test]
async fn test_reauth_failure_leaves_state_unauthenticated() {
    let provider = ScriptedProvider {
        deny: true,
        ..Default::default()
    };
    let ctx = TestContext::oauth(
        FakeWarehouse::standard(),
        &[],
        provider,
        Some(valid_token()),
    );

    let err = ctx.call("reauth-oauth", json!({})).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Auth);
    assert_eq!(
        ctx.oauth_source().phase(),
        OAuthPhase::Unauthenticated {
            reauth_required: false
        }
    );
    assert!(ctx.store.as_ref().unwrap().load().await.is_none());
    assert_eq!(ctx.warehouse.call_count(), 0);
}

#[tokio::test]
async fn test_reauth_unavailable_for_service_account() {
    let ctx = TestContext::service_account(FakeWarehouse::standard(), &[]);

    let err = ctx.call("reauth-oauth", json!({})).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::UnsupportedTool);
    assert_eq!(ctx.acquires(), 0);
}
