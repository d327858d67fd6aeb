//! Handlers for `/api/users`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/users` | Body: [`RegisterBody`]; returns 201 + stored user |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use vouch_core::{
  store::ComplianceStore,
  user::{NewUser, Role},
};

use crate::{AppState, auth::hash_password, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub user_id:  String,
  pub role:     Role,
  pub password: String,
}

/// `POST /api/users` — returns 201 + the stored user.
pub async fn register<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  let user = state
    .store
    .create_user(NewUser {
      user_id:       body.user_id,
      role:          body.role,
      password_hash: hash_password(&body.password)?,
    })
    .await?;
  Ok((StatusCode::CREATED, Json(user)))
}
