//! Access policy — who may see which evidence versions.
//!
//! Visibility decisions are expressed as a closed set of per-role
//! capabilities instead of inline role comparisons scattered through read
//! paths. New roles extend the variant set; call sites stay unchanged.

use crate::user::{Role, User};

/// The capability a user holds over the evidence space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
  /// Factories see everything they own.
  FactoryOwner { user_id: String },
  /// Buyers see exactly the versions granted to them.
  BuyerGrantee { user_id: String },
  /// Admins see everything.
  AdminBypass,
}

impl AccessPolicy {
  pub fn for_user(user: &User) -> Self {
    match user.role {
      Role::Factory => Self::FactoryOwner { user_id: user.user_id.clone() },
      Role::Buyer => Self::BuyerGrantee { user_id: user.user_id.clone() },
      Role::Admin => Self::AdminBypass,
    }
  }

  /// May the holder see a version whose parent evidence is owned by
  /// `owner`, given whether a grant row exists for the holder?
  pub fn allows_version(&self, owner: &str, has_grant: bool) -> bool {
    match self {
      Self::FactoryOwner { user_id } => user_id == owner || has_grant,
      Self::BuyerGrantee { .. } => has_grant,
      Self::AdminBypass => true,
    }
  }

  /// Evidence-level visibility: an evidence record becomes visible the
  /// moment at least one of its versions is granted. Version listings stay
  /// version-scoped regardless.
  pub fn allows_evidence(&self, owner: &str, granted_versions: usize) -> bool {
    self.allows_version(owner, granted_versions > 0)
  }

  /// Whether version listings under this policy must be narrowed to
  /// granted versions (buyers) or may return every version (owner, admin).
  pub fn sees_all_versions_of(&self, owner: &str) -> bool {
    match self {
      Self::FactoryOwner { user_id } => user_id == owner,
      Self::BuyerGrantee { .. } => false,
      Self::AdminBypass => true,
    }
  }
}
