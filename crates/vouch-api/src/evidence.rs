//! Handlers for `/api/evidence` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/evidence` | Listing scoped by the caller's access |
//! | `POST` | `/api/evidence` | Factory only; creates evidence + first version |
//! | `GET`  | `/api/evidence/:id` | 403 unless owner, grantee, or admin |
//! | `GET`  | `/api/evidence/:id/versions` | Version-scoped listing |
//! | `POST` | `/api/evidence/:id/versions` | Owner only; appends a version |
//! | `POST` | `/api/versions/:id/share` | Owner or admin; idempotent grant |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use vouch_core::{
  evidence::{Evidence, EvidenceVersion, EvidenceView, NewEvidence, NewVersion},
  grant::GrantOutcome,
  store::ComplianceStore,
};

use crate::{AppState, auth::Identity, error::ApiError};

// ─── List / get ──────────────────────────────────────────────────────────────

/// `GET /api/evidence`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
) -> Result<Json<Vec<Evidence>>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.list_evidence(&user).await?))
}

/// `GET /api/evidence/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<EvidenceView>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.get_evidence(id, &user).await?))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /api/evidence`.
#[derive(Debug, Deserialize)]
pub struct CreateEvidenceBody {
  pub name:        String,
  pub doc_type:    String,
  #[serde(default)]
  pub notes:       String,
  pub content_ref: String,
}

/// `POST /api/evidence` — returns 201 + the evidence with its first
/// version.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Json(body): Json<CreateEvidenceBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  let view = state
    .store
    .create_evidence(
      NewEvidence {
        name:        body.name,
        doc_type:    body.doc_type,
        notes:       body.notes,
        content_ref: body.content_ref,
      },
      &user,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(view)))
}

// ─── Versions ────────────────────────────────────────────────────────────────

/// `GET /api/evidence/:id/versions`
pub async fn list_versions<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<EvidenceVersion>>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.list_versions(id, &user).await?))
}

/// JSON body accepted by `POST /api/evidence/:id/versions`.
#[derive(Debug, Deserialize)]
pub struct AddVersionBody {
  #[serde(default)]
  pub notes:       String,
  pub content_ref: String,
}

/// `POST /api/evidence/:id/versions` — returns 201 + the new version.
pub async fn add_version<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(id): Path<Uuid>,
  Json(body): Json<AddVersionBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  let version = state
    .store
    .add_version(
      id,
      NewVersion { notes: body.notes, content_ref: body.content_ref },
      &user,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(version)))
}

// ─── Sharing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ShareBody {
  pub user_id: String,
}

/// `POST /api/versions/:id/share` — grant a version directly. Idempotent:
/// re-sharing returns the existing grant with `created = false`.
pub async fn share_version<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Path(version_id): Path<Uuid>,
  Json(body): Json<ShareBody>,
) -> Result<Json<GrantOutcome>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(
    state
      .store
      .grant_version(version_id, &body.user_id, &user)
      .await?,
  ))
}
