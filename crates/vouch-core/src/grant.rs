//! Grants — the authoritative record of version visibility.
//!
//! A grant is a durable fact: this user may view this evidence version.
//! At most one grant exists per (version, user) pair; re-granting is a
//! successful no-op, never an error, which keeps fulfillment safely
//! retriable. No deletion operation exists — shared versions stay shared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the grant ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
  pub grant_id:   Uuid,
  pub version_id: Uuid,
  /// `user_id` of the grantee.
  pub user_id:    String,
  pub granted_at: DateTime<Utc>,
  /// `user_id` of the granter; `None` if the granter identity is lost.
  pub granted_by: Option<String>,
}

/// Result of a grant insertion. `created` is `false` when the (version,
/// user) pair already existed; only newly created grants produce an audit
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantOutcome {
  pub grant:   Grant,
  pub created: bool,
}
