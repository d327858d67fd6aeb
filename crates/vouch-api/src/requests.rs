//! Handlers for `/api/requests` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/requests` | Scoped: buyer sees own, factory sees addressed |
//! | `POST` | `/api/requests` | Buyer only; body: [`CreateRequestBody`] |
//! | `GET`  | `/api/requests/:id` | 404 for non-parties |
//! | `GET`  | `/api/requests/:id/items` | Items of one request |
//! | `POST` | `/api/requests/:id/items/:item_id/fulfill` | Factory; 200 with updated request, 403 on permission, 409 on state/type conflicts |
//! | `POST` | `/api/requests/:id/items/:item_id/reject` | Factory; reason required |
//! | `POST` | `/api/requests/:id/cancel` | Buyer only |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use vouch_core::{
  request::{NewRequest, NewRequestItem, Request, RequestItem, RequestStatus},
  store::ComplianceStore,
};

use crate::{AppState, auth::Identity, error::ApiError};

// ─── List / get ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<RequestStatus>,
}

/// `GET /api/requests[?status=pending|in_progress|completed|cancelled]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Request>>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.list_requests(&user, params.status).await?))
}

/// `GET /api/requests/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Request>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.get_request(id, &user).await?))
}

/// `GET /api/requests/:id/items`
pub async fn items<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<RequestItem>>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.get_request(id, &user).await?.items))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRequestItemBody {
  pub doc_type: String,
}

/// JSON body accepted by `POST /api/requests`.
#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
  pub title:   String,
  /// `user_id` of the factory the request is addressed to.
  pub factory: String,
  pub items:   Vec<CreateRequestItemBody>,
}

/// `POST /api/requests` — returns 201 + the request with its items.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  let request = state
    .store
    .create_request(
      NewRequest {
        title:   body.title,
        factory: body.factory,
        items:   body
          .items
          .into_iter()
          .map(|i| NewRequestItem { doc_type: i.doc_type })
          .collect(),
      },
      &user,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(request)))
}

// ─── Transitions ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FulfillBody {
  pub version_id: Uuid,
}

/// `POST /api/requests/:id/items/:item_id/fulfill`
pub async fn fulfill<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path((id, item_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<FulfillBody>,
) -> Result<Json<Request>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(
    state
      .store
      .fulfill_item(id, item_id, body.version_id, &user)
      .await?,
  ))
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
  pub reason: String,
}

/// `POST /api/requests/:id/items/:item_id/reject`
pub async fn reject<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path((id, item_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<RejectBody>,
) -> Result<Json<Request>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(
    state
      .store
      .reject_item(id, item_id, &body.reason, &user)
      .await?,
  ))
}

/// `POST /api/requests/:id/cancel`
pub async fn cancel<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Request>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.cancel_request(id, &user).await?))
}
