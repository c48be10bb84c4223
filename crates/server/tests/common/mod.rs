//! Common test utilities for in-process API testing.
//!
//! `TestFixture` wires a real SQLite ticket store (in a temp directory), the
//! audit system and the router together, so requests can be sent with
//! `tower::ServiceExt::oneshot` without binding a port.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use ticketdesk_core::testing::{fixtures, FixedClock};
use ticketdesk_core::{
    create_audit_system, AuditStore, Config, SqliteAuditStore, SqliteTicketStore, TicketStore,
};
use ticketdesk_server::state::AppState;

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// In-process server backed by a temporary database.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ticket_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/tickets", json!({ "subject": "VPN down" })).await;
///
///     assert_eq!(response.status, StatusCode::CREATED);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Controls the store's notion of "now"
    pub clock: Arc<FixedClock>,
    /// Direct access to the audit trail
    pub audit_store: Arc<dyn AuditStore>,
    /// Temporary directory holding the database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    /// Build a fixture; the database path in `config` is replaced by a temp file.
    pub async fn with_config(mut config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        config.database.path = db_path.clone();

        let clock = Arc::new(FixedClock::new(fixtures::reference_time()));

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let ticket_store: Arc<dyn TicketStore> = Arc::new(
            SqliteTicketStore::open(
                &db_path,
                Duration::from_millis(config.database.lock_timeout_ms),
            )
            .expect("Failed to create ticket store")
            .with_sla_policy((&config.sla).into())
            .with_clock(clock.clone()),
        );

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let state = Arc::new(AppState::new(
            config,
            audit_handle,
            Arc::clone(&audit_store),
            ticket_store,
        ));

        Self {
            router: ticketdesk_server::api::create_router(state),
            clock,
            audit_store,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body), None).await
    }

    /// Send a POST request on behalf of `actor`.
    pub async fn post_as(&self, actor: &str, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), Some(actor)).await
    }

    /// Send a PUT request on behalf of `actor`.
    pub async fn put_as(&self, actor: &str, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body), Some(actor)).await
    }

    /// Fetch the raw text body of a GET request.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Create a ticket and return its JSON.
    pub async fn create_ticket(&self, body: Value) -> Value {
        let response = self.post_as("customer-1", "/api/v1/tickets", body).await;
        assert_status!(response, StatusCode::CREATED);
        response.body
    }

    /// Wait until the audit writer has persisted `count` events matching `event_type`.
    pub async fn wait_for_audit(&self, event_type: &str, count: i64) -> bool {
        let filter = ticketdesk_core::AuditFilter::new().with_event_type(event_type);
        for _ in 0..50 {
            if self.audit_store.count(&filter).unwrap_or(0) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        actor: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(actor) = actor {
            request_builder = request_builder.header("X-Actor-Id", actor);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
