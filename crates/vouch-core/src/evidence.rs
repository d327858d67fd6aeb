//! Evidence — a named document category owned by one factory — and its
//! immutable versions.
//!
//! A version is a snapshot of evidence content at a point in time. Once
//! written, its content reference and ownership never change; only its
//! visibility evolves, through the grant ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document category. Created by a factory; never transferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
  pub evidence_id: Uuid,
  pub name:        String,
  /// Free-form category tag (e.g. "ISO9001"). Fulfillment requires the
  /// version's parent to agree with the requested item on this field.
  pub doc_type:    String,
  /// `user_id` of the owning factory.
  pub owner:       String,
  pub created_at:  DateTime<Utc>,
}

/// An immutable snapshot of evidence content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceVersion {
  pub version_id:     Uuid,
  pub evidence_id:    Uuid,
  /// Assigned by the store: max within the parent plus one, starting at 1.
  pub version_number: u32,
  pub notes:          String,
  /// Opaque pointer into the external content store; never dereferenced
  /// here.
  pub content_ref:    String,
  pub created_at:     DateTime<Utc>,
  pub created_by:     String,
}

/// Input to [`crate::store::ComplianceStore::create_evidence`]. Evidence is
/// always created together with its first version.
#[derive(Debug, Clone)]
pub struct NewEvidence {
  pub name:        String,
  pub doc_type:    String,
  pub notes:       String,
  pub content_ref: String,
}

/// Input to [`crate::store::ComplianceStore::add_version`].
/// `version_number`, `created_at`, and `created_by` are set by the store.
#[derive(Debug, Clone)]
pub struct NewVersion {
  pub notes:       String,
  pub content_ref: String,
}

/// Evidence bundled with the versions visible to the requesting user —
/// never stored, always derived through the access policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceView {
  pub evidence: Evidence,
  pub versions: Vec<EvidenceVersion>,
}
