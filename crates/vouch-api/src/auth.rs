//! HTTP Basic-auth extractor backed by the users table.
//!
//! The core trusts `(user_id, role)` as supplied here and never re-derives
//! them; this module is the identity boundary that makes the pair
//! trustworthy. Password hashes are argon2 PHC strings stored alongside
//! the user row.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand_core::OsRng;
use vouch_core::{Error as CoreError, store::ComplianceStore, user::User};

use crate::{AppState, error::ApiError};

/// The authenticated caller. Present in a handler's signature means the
/// request carried valid credentials.
pub struct Identity(pub User);

/// Hash a password into an argon2 PHC string for storage.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| {
      ApiError::Core(CoreError::StorageFailure(format!("argon2 error: {e}")))
    })
}

/// Verify credentials directly from headers against the users table.
pub async fn verify_auth<S>(
  headers: &HeaderMap,
  store: &S,
) -> Result<User, ApiError>
where
  S: ComplianceStore,
{
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (user_id, password) =
    creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let (user, stored_hash) = store
    .credentials(user_id)
    .await?
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash =
    PasswordHash::new(&stored_hash).map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(user)
}

impl<S> FromRequestParts<AppState<S>> for Identity
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let user = verify_auth(&parts.headers, state.store.as_ref()).await?;
    Ok(Identity(user))
  }
}
