//! Metered API integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn data_without_key_is_unauthorized() {
    let harness = TestHarness::new();

    let response = harness.server.get("/api/data").await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn data_with_unknown_key_is_unauthorized() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/api/data")
        .add_header("x-api-key", "tly_not_a_real_key")
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn expired_key_is_unauthorized() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;

    let response = harness
        .server
        .post("/v1/admin/api-keys")
        .add_header("x-admin-token", harness.admin_token.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "name": "expired key",
            "expires_at": "2020-01-01T00:00:00Z"
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let key = body["api_key"].as_str().unwrap();

    let response = harness
        .server
        .get("/api/data")
        .add_header("x-api-key", key)
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn banned_owner_is_forbidden() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    harness
        .server
        .post("/v1/admin/users")
        .add_header("x-admin-token", harness.admin_token.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "banned": true
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/api/data")
        .add_header("x-api-key", key)
        .await;

    response.assert_status_forbidden();
}

// ============================================================================
// Data endpoint billing
// ============================================================================

#[tokio::test]
async fn data_call_charges_one_credit() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    let response = harness
        .server
        .get("/api/data")
        .add_header("x-api-key", key)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
    assert_eq!(body["page"], 1);
    assert_eq!(body["total"], 100);
    assert_eq!(body["credits"]["used"], 1);
    assert_eq!(body["credits"]["remaining"], 99);

    assert_eq!(harness.available_balance().await, 99);
}

#[tokio::test]
async fn repeated_data_reads_are_deterministic() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    let first: serde_json::Value = harness
        .server
        .get("/api/data?page=2&per_page=5")
        .add_header("x-api-key", key.clone())
        .await
        .json();
    let second: serde_json::Value = harness
        .server
        .get("/api/data?page=2&per_page=5")
        .add_header("x-api-key", key)
        .await
        .json();

    assert_eq!(first["data"], second["data"]);
    assert_eq!(first["data"].as_array().unwrap().len(), 5);
    assert_eq!(first["data"][0]["id"], 6);
}

#[tokio::test]
async fn page_past_end_is_not_found_and_not_charged() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    let response = harness
        .server
        .get("/api/data?page=999")
        .add_header("x-api-key", key)
        .await;

    response.assert_status_not_found();
    assert_eq!(harness.available_balance().await, 100);
}

#[tokio::test]
async fn page_offset_beyond_usize_is_not_found_and_not_charged() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    // A page number whose item offset does not fit a usize must behave
    // like any other past-the-end page.
    let response = harness
        .server
        .get("/api/data?page=999999999999999999&per_page=50")
        .add_header("x-api-key", key)
        .await;

    response.assert_status_not_found();
    assert_eq!(harness.available_balance().await, 100);
}

#[tokio::test]
async fn exhausted_balance_is_payment_required() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    // Drain the signup grant.
    harness
        .server
        .post("/v1/admin/credits/adjust")
        .add_header("x-admin-token", harness.admin_token.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": -100
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/api/data")
        .add_header("x-api-key", key)
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["available"], 0);
    assert_eq!(body["error"]["details"]["required"], 1);
}

#[tokio::test]
async fn frozen_credits_cannot_pay_for_calls() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    harness
        .server
        .post("/v1/admin/credits/freeze")
        .add_header("x-admin-token", harness.admin_token.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 100
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/api/data")
        .add_header("x-api-key", key)
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
}

// ============================================================================
// Chat endpoint billing
// ============================================================================

#[tokio::test]
async fn chat_charges_by_prompt_length() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    // Short prompt: floor is one credit.
    let response = harness
        .server
        .post("/api/v1/ai/chat")
        .add_header("x-api-key", key.clone())
        .json(&json!({ "prompt": "hello" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["prompt_chars"], 5);
    assert_eq!(body["credits"]["used"], 1);
    assert_eq!(body["credits"]["remaining"], 99);

    // 2000 characters at 1000 chars per credit: two credits.
    let long_prompt = "x".repeat(2000);
    let response = harness
        .server
        .post("/api/v1/ai/chat")
        .add_header("x-api-key", key)
        .json(&json!({ "prompt": long_prompt }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"]["used"], 2);
    assert_eq!(body["credits"]["remaining"], 97);
}

#[tokio::test]
async fn chat_rejects_empty_prompts() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    let response = harness
        .server
        .post("/api/v1/ai/chat")
        .add_header("x-api-key", key)
        .json(&json!({ "prompt": "   " }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(harness.available_balance().await, 100);
}

#[tokio::test]
async fn billing_stops_exactly_at_zero() {
    let harness = TestHarness::new();
    harness.bootstrap_test_user().await;
    let key = harness.mint_key_for_test_user().await;

    // 100 calls at one credit each exhaust the signup grant.
    for _ in 0..100 {
        harness
            .server
            .get("/api/data")
            .add_header("x-api-key", key.clone())
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get("/api/data")
        .add_header("x-api-key", key)
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    assert_eq!(harness.available_balance().await, 0);
}
