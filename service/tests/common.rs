//! Common test utilities for tally integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;

use tally_core::UserId;
use tally_service::{create_router, AppState, ServiceConfig};
use tally_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The admin token for operator requests.
    pub admin_token: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let admin_token = "test-admin-token".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            admin_token: Some(admin_token.clone()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            plan: tally_core::PlanConfig::default(),
        };

        let state = AppState::new(Arc::new(store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            _temp_dir: temp_dir,
            test_user_id,
            admin_token,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_user_id)
    }

    /// Get a specific user's auth header.
    pub fn auth_header_for(user_id: UserId) -> String {
        format!("Bearer test-token:{user_id}")
    }

    /// Bootstrap the test user's account, granting the signup bonus.
    pub async fn bootstrap_test_user(&self) {
        self.server
            .post("/v1/accounts/bootstrap")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "user_id": self.test_user_id.to_string() }))
            .await
            .assert_status_ok();
    }

    /// Mint an API key for the test user via the admin surface, returning
    /// the plaintext key.
    pub async fn mint_key_for_test_user(&self) -> String {
        let response = self
            .server
            .post("/v1/admin/api-keys")
            .add_header("x-admin-token", self.admin_token.clone())
            .json(&json!({
                "user_id": self.test_user_id.to_string(),
                "name": "test key"
            }))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["api_key"]
            .as_str()
            .expect("mint response contains the plaintext key")
            .to_string()
    }

    /// The test user's available balance, via the balance endpoint.
    pub async fn available_balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["available"].as_i64().expect("available is a number")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
