//! Error types for `vouch-core`.
//!
//! The variants mirror the operation contracts: precondition failures
//! (`PermissionDenied`, `InvalidState`, `TypeMismatch`) leave all state
//! unchanged; `AccessDenied` is the read-path visibility failure;
//! `StorageFailure` aborts and rolls back the enclosing unit of work.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("user not found: {0}")]
  UserNotFound(String),

  #[error("user already exists: {0}")]
  DuplicateUser(String),

  #[error("evidence not found: {0}")]
  EvidenceNotFound(Uuid),

  #[error("evidence version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("request not found: {0}")]
  RequestNotFound(Uuid),

  #[error("request item not found: {0}")]
  ItemNotFound(Uuid),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("invalid state: {0}")]
  InvalidState(String),

  #[error("document type mismatch: item requires {requested:?}, version carries {supplied:?}")]
  TypeMismatch {
    requested: String,
    supplied:  String,
  },

  #[error("access denied")]
  AccessDenied,

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("storage failure: {0}")]
  StorageFailure(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
