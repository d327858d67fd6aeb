//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! The mapping follows the core error taxonomy: permission and access
//! failures are 403, state conflicts 409, missing entities 404, argument
//! problems 400, storage failures 500.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use vouch_core::Error as CoreError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error(transparent)]
  Core(#[from] CoreError),
}

fn core_status(e: &CoreError) -> StatusCode {
  match e {
    CoreError::PermissionDenied(_) | CoreError::AccessDenied => {
      StatusCode::FORBIDDEN
    }
    CoreError::InvalidState(_)
    | CoreError::TypeMismatch { .. }
    | CoreError::DuplicateUser(_) => StatusCode::CONFLICT,
    CoreError::UserNotFound(_)
    | CoreError::EvidenceNotFound(_)
    | CoreError::VersionNotFound(_)
    | CoreError::RequestNotFound(_)
    | CoreError::ItemNotFound(_) => StatusCode::NOT_FOUND,
    CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
    CoreError::Serialization(_) | CoreError::StorageFailure(_) => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"vouch\""),
        );
        res
      }
      ApiError::Core(e) => {
        let status = core_status(&e);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
          tracing::error!(error = %e, "internal error");
        }
        (status, Json(json!({ "error": e.to_string() }))).into_response()
      }
    }
  }
}
