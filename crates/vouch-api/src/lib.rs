//! JSON REST API for Vouch.
//!
//! Exposes an axum [`Router`] backed by any
//! [`vouch_core::store::ComplianceStore`]. Identity is HTTP Basic auth
//! verified against the users table; the core receives `(user_id, role)`
//! and trusts them. TLS and deployment concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = vouch_api::api_router(state);
//! ```

pub mod audit;
pub mod auth;
pub mod error;
pub mod evidence;
pub mod requests;
pub mod users;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use vouch_core::store::ComplianceStore;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: ComplianceStore> {
  pub store: Arc<S>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
pub fn api_router<S>(state: AppState<S>) -> Router
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Router::new()
    // Users
    .route("/api/users", post(users::register::<S>))
    // Evidence
    .route(
      "/api/evidence",
      get(evidence::list::<S>).post(evidence::create::<S>),
    )
    .route("/api/evidence/{id}", get(evidence::get_one::<S>))
    .route(
      "/api/evidence/{id}/versions",
      get(evidence::list_versions::<S>).post(evidence::add_version::<S>),
    )
    .route("/api/versions/{id}/share", post(evidence::share_version::<S>))
    // Requests
    .route(
      "/api/requests",
      get(requests::list::<S>).post(requests::create::<S>),
    )
    .route("/api/requests/{id}", get(requests::get_one::<S>))
    .route("/api/requests/{id}/items", get(requests::items::<S>))
    .route(
      "/api/requests/{id}/items/{item_id}/fulfill",
      post(requests::fulfill::<S>),
    )
    .route(
      "/api/requests/{id}/items/{item_id}/reject",
      post(requests::reject::<S>),
    )
    .route("/api/requests/{id}/cancel", post(requests::cancel::<S>))
    // Audit
    .route("/api/audit", get(audit::list::<S>))
    .route("/api/audit/verify", get(audit::verify::<S>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use tower::ServiceExt as _;
  use vouch_store_sqlite::SqliteStore;

  async fn make_state() -> AppState<SqliteStore> {
    AppState {
      store: Arc::new(SqliteStore::open_in_memory().await.unwrap()),
    }
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn send(
    state: &AppState<SqliteStore>,
    method: &str,
    uri: &str,
    auth: Option<(&str, &str)>,
    body: Option<serde_json::Value>,
  ) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user, pass)) = auth {
      builder = builder.header(header::AUTHORIZATION, basic(user, pass));
    }
    let req = match body {
      Some(v) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };

    let resp = api_router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let json = if bytes.is_empty() {
      serde_json::Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
  }

  async fn register(
    state: &AppState<SqliteStore>,
    user_id: &str,
    role: &str,
  ) {
    let (status, _) = send(
      state,
      "POST",
      "/api/users",
      None,
      Some(serde_json::json!({
        "user_id": user_id, "role": role, "password": "secret",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
  }

  // ── Auth ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unauthenticated_requests_return_401() {
    let state = make_state().await;
    let (status, _) = send(&state, "GET", "/api/evidence", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn wrong_password_returns_401() {
    let state = make_state().await;
    register(&state, "f1", "factory").await;
    let (status, _) = send(
      &state,
      "GET",
      "/api/evidence",
      Some(("f1", "nope")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn duplicate_registration_conflicts() {
    let state = make_state().await;
    register(&state, "f1", "factory").await;
    let (status, _) = send(
      &state,
      "POST",
      "/api/users",
      None,
      Some(serde_json::json!({
        "user_id": "f1", "role": "buyer", "password": "other",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  // ── End-to-end fulfillment flow ──────────────────────────────────────────

  #[tokio::test]
  async fn fulfillment_flow_maps_statuses() {
    let state = make_state().await;
    register(&state, "f1", "factory").await;
    register(&state, "b1", "buyer").await;
    register(&state, "b2", "buyer").await;
    register(&state, "root", "admin").await;

    // Factory publishes evidence with its first version.
    let (status, view) = send(
      &state,
      "POST",
      "/api/evidence",
      Some(("f1", "secret")),
      Some(serde_json::json!({
        "name": "ISO cert", "doc_type": "ISO9001",
        "content_ref": "blob://iso/1",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let evidence_id = view["evidence"]["evidence_id"].as_str().unwrap().to_string();
    let version_id = view["versions"][0]["version_id"].as_str().unwrap().to_string();

    // Buyers cannot create evidence.
    let (status, _) = send(
      &state,
      "POST",
      "/api/evidence",
      Some(("b1", "secret")),
      Some(serde_json::json!({
        "name": "x", "doc_type": "y", "content_ref": "blob://x",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Buyer opens a request for that document type.
    let (status, req) = send(
      &state,
      "POST",
      "/api/requests",
      Some(("b1", "secret")),
      Some(serde_json::json!({
        "title": "compliance pack", "factory": "f1",
        "items": [{ "doc_type": "ISO9001" }],
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = req["request_id"].as_str().unwrap().to_string();
    let item_id = req["items"][0]["item_id"].as_str().unwrap().to_string();

    // An ungranted buyer cannot list versions.
    let (status, _) = send(
      &state,
      "GET",
      &format!("/api/evidence/{evidence_id}/versions"),
      Some(("b2", "secret")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The factory fulfills the item.
    let (status, updated) = send(
      &state,
      "POST",
      &format!("/api/requests/{request_id}/items/{item_id}/fulfill"),
      Some(("f1", "secret")),
      Some(serde_json::json!({ "version_id": version_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "completed");
    assert_eq!(updated["items"][0]["status"], "fulfilled");

    // The buyer now sees exactly the granted version.
    let (status, versions) = send(
      &state,
      "GET",
      &format!("/api/evidence/{evidence_id}/versions"),
      Some(("b1", "secret")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(versions.as_array().unwrap().len(), 1);

    // Replay of the fulfillment conflicts and changes nothing.
    let (status, _) = send(
      &state,
      "POST",
      &format!("/api/requests/{request_id}/items/{item_id}/fulfill"),
      Some(("f1", "secret")),
      Some(serde_json::json!({ "version_id": version_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Audit log: admin only, and the chain verifies.
    let (status, _) = send(
      &state,
      "GET",
      "/api/audit",
      Some(("b1", "secret")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = send(
      &state,
      "GET",
      "/api/audit/verify",
      Some(("root", "secret")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["intact"], true);
    assert!(report["records"].as_u64().unwrap() >= 7);
  }

  #[tokio::test]
  async fn type_mismatch_maps_to_conflict() {
    let state = make_state().await;
    register(&state, "f1", "factory").await;
    register(&state, "b1", "buyer").await;

    let (_, view) = send(
      &state,
      "POST",
      "/api/evidence",
      Some(("f1", "secret")),
      Some(serde_json::json!({
        "name": "Social audit", "doc_type": "BSCI",
        "content_ref": "blob://bsci/1",
      })),
    )
    .await;
    let version_id = view["versions"][0]["version_id"].as_str().unwrap().to_string();

    let (_, req) = send(
      &state,
      "POST",
      "/api/requests",
      Some(("b1", "secret")),
      Some(serde_json::json!({
        "title": "pack", "factory": "f1",
        "items": [{ "doc_type": "ISO9001" }],
      })),
    )
    .await;
    let request_id = req["request_id"].as_str().unwrap().to_string();
    let item_id = req["items"][0]["item_id"].as_str().unwrap().to_string();

    let (status, body) = send(
      &state,
      "POST",
      &format!("/api/requests/{request_id}/items/{item_id}/fulfill"),
      Some(("f1", "secret")),
      Some(serde_json::json!({ "version_id": version_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("mismatch"));
  }

  #[tokio::test]
  async fn cancel_is_buyer_scoped_over_http() {
    let state = make_state().await;
    register(&state, "f1", "factory").await;
    register(&state, "b1", "buyer").await;

    let (_, req) = send(
      &state,
      "POST",
      "/api/requests",
      Some(("b1", "secret")),
      Some(serde_json::json!({
        "title": "pack", "factory": "f1",
        "items": [{ "doc_type": "ISO9001" }],
      })),
    )
    .await;
    let request_id = req["request_id"].as_str().unwrap().to_string();

    let (status, _) = send(
      &state,
      "POST",
      &format!("/api/requests/{request_id}/cancel"),
      Some(("f1", "secret")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = send(
      &state,
      "POST",
      &format!("/api/requests/{request_id}/cancel"),
      Some(("b1", "secret")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
  }
}
