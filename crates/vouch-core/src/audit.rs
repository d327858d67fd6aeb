//! Append-only audit records, hash-chained for tamper evidence.
//!
//! Every privileged state transition appends exactly one record inside the
//! same unit of work as the transition itself; a failed append aborts the
//! whole operation. Records are never updated or deleted. Each record's
//! hash covers its own fields plus the previous record's hash, so any
//! in-place edit breaks the chain from that point on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// `prev_hash` of the first record in the log.
pub const GENESIS_HASH: &str =
  "0000000000000000000000000000000000000000000000000000000000000000";

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// What the actor did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
  Create,
  Fulfill,
  Reject,
  Cancel,
  Grant,
}

impl AuditAction {
  /// The discriminant string stored in the `action` column and fed to the
  /// chain hash. Must match the serde tags above.
  pub fn discriminant(self) -> &'static str {
    match self {
      Self::Create => "create",
      Self::Fulfill => "fulfill",
      Self::Reject => "reject",
      Self::Cancel => "cancel",
      Self::Grant => "grant",
    }
  }
}

/// What kind of object was acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSubject {
  User,
  Evidence,
  Version,
  Request,
  RequestItem,
  Grant,
}

impl AuditSubject {
  pub fn discriminant(self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Evidence => "evidence",
      Self::Version => "version",
      Self::Request => "request",
      Self::RequestItem => "request_item",
      Self::Grant => "grant",
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// An immutable audit fact. Once written, no field is ever updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
  pub record_id:    Uuid,
  /// Append order, assigned by the store; the chain runs in `seq` order.
  pub seq:          i64,
  /// `user_id` of the acting user; `None` if the actor identity is lost.
  pub actor:        Option<String>,
  pub action:       AuditAction,
  pub subject_type: AuditSubject,
  pub subject_id:   String,
  pub recorded_at:  DateTime<Utc>,
  pub metadata:     serde_json::Value,
  pub prev_hash:    String,
  pub record_hash:  String,
}

impl AuditRecord {
  /// Recompute this record's chain hash from its own fields.
  pub fn compute_hash(&self) -> String {
    chain_hash(
      &self.prev_hash,
      self.record_id,
      self.actor.as_deref(),
      self.action,
      self.subject_type,
      &self.subject_id,
      self.recorded_at,
      &self.metadata,
    )
  }
}

/// Input to an audit append. `seq`, `recorded_at`, and the hashes are set
/// by the store at append time.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
  pub actor:        Option<String>,
  pub action:       AuditAction,
  pub subject_type: AuditSubject,
  pub subject_id:   String,
  pub metadata:     serde_json::Value,
}

// ─── Chain hashing ───────────────────────────────────────────────────────────

/// Chain hash over the canonical byte encoding of one record.
///
/// Stable across serialisation round-trips: `serde_json::Value` maps are
/// ordered, timestamps hash at microsecond precision.
#[allow(clippy::too_many_arguments)]
pub fn chain_hash(
  prev_hash: &str,
  record_id: Uuid,
  actor: Option<&str>,
  action: AuditAction,
  subject_type: AuditSubject,
  subject_id: &str,
  recorded_at: DateTime<Utc>,
  metadata: &serde_json::Value,
) -> String {
  let mut hasher = Sha256::new();
  hasher.update(prev_hash.as_bytes());
  hasher.update(record_id.as_bytes());
  hasher.update(actor.unwrap_or("").as_bytes());
  hasher.update(action.discriminant().as_bytes());
  hasher.update(subject_type.discriminant().as_bytes());
  hasher.update(subject_id.as_bytes());
  hasher.update(recorded_at.timestamp_micros().to_le_bytes());
  hasher.update(metadata.to_string().as_bytes());
  hex::encode(hasher.finalize())
}

/// Where and how a chain verification failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
  /// `seq` of the first record that fails verification.
  pub seq:    i64,
  pub reason: String,
}

/// Walk `records` (which must be in ascending `seq` order, starting from
/// the beginning of the log) and verify the hash chain.
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), ChainBreak> {
  let mut expected_prev = GENESIS_HASH.to_string();
  for record in records {
    if record.prev_hash != expected_prev {
      return Err(ChainBreak {
        seq:    record.seq,
        reason: "prev_hash does not match the preceding record".to_string(),
      });
    }
    let recomputed = record.compute_hash();
    if recomputed != record.record_hash {
      return Err(ChainBreak {
        seq:    record.seq,
        reason: "record_hash does not match record contents".to_string(),
      });
    }
    expected_prev = record.record_hash.clone();
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn record(seq: i64, prev_hash: &str, subject_id: &str) -> AuditRecord {
    let recorded_at = Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap();
    let mut r = AuditRecord {
      record_id: Uuid::new_v4(),
      seq,
      actor: Some("f1".to_string()),
      action: AuditAction::Fulfill,
      subject_type: AuditSubject::RequestItem,
      subject_id: subject_id.to_string(),
      recorded_at,
      metadata: serde_json::json!({ "docType": "ISO9001" }),
      prev_hash: prev_hash.to_string(),
      record_hash: String::new(),
    };
    r.record_hash = r.compute_hash();
    r
  }

  fn chain(len: i64) -> Vec<AuditRecord> {
    let mut prev = GENESIS_HASH.to_string();
    let mut out = Vec::new();
    for seq in 1..=len {
      let r = record(seq, &prev, &format!("item-{seq}"));
      prev = r.record_hash.clone();
      out.push(r);
    }
    out
  }

  #[test]
  fn intact_chain_verifies() {
    assert_eq!(verify_chain(&chain(4)), Ok(()));
    assert_eq!(verify_chain(&[]), Ok(()));
  }

  #[test]
  fn edited_field_breaks_the_chain_at_that_record() {
    let mut records = chain(4);
    records[2].subject_id = "forged".to_string();
    let err = verify_chain(&records).unwrap_err();
    assert_eq!(err.seq, 3);
  }

  #[test]
  fn rewritten_hash_breaks_the_successor_link() {
    let mut records = chain(3);
    // Recompute record 2's hash after tampering; the successor's prev_hash
    // no longer lines up.
    records[1].subject_id = "forged".to_string();
    records[1].record_hash = records[1].compute_hash();
    let err = verify_chain(&records).unwrap_err();
    assert_eq!(err.seq, 3);
  }

  #[test]
  fn hash_covers_metadata() {
    let a = record(1, GENESIS_HASH, "item-1");
    let mut b = a.clone();
    b.metadata = serde_json::json!({ "docType": "BSCI" });
    assert_ne!(a.record_hash, b.compute_hash());
  }
}
