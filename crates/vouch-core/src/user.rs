//! Users — externally-issued identities with a fixed role.
//!
//! Identity and role arrive from the authentication boundary; this crate
//! only reads them. A user's role never changes after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role a user acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  /// Requests evidence; sees only versions explicitly granted to them.
  Buyer,
  /// Produces evidence; sees everything they own.
  Factory,
  /// Full visibility — a deliberate, explicit exception.
  Admin,
}

impl Role {
  pub fn is_buyer(self) -> bool { matches!(self, Self::Buyer) }

  pub fn is_factory(self) -> bool { matches!(self, Self::Factory) }

  pub fn is_admin(self) -> bool { matches!(self, Self::Admin) }
}

/// An identity known to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:    String,
  pub role:       Role,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::ComplianceStore::create_user`].
/// `created_at` is always set by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub user_id:       String,
  pub role:          Role,
  /// PHC string produced at the authentication boundary; opaque here.
  pub password_hash: String,
}
