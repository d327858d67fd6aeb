//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Metadata is stored as
//! compact JSON. UUIDs are stored as hyphenated lowercase strings. Decode
//! failures surface as `rusqlite` conversion errors so transaction bodies
//! stay uniform.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use uuid::Uuid;
use vouch_core::{
  audit::{AuditAction, AuditRecord, AuditSubject},
  evidence::{Evidence, EvidenceVersion},
  request::{ItemStatus, RequestItem, RequestStatus},
  user::{Role, User},
};

fn conv_err(msg: String) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(0, Type::Text, msg.into())
}

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> rusqlite::Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| conv_err(format!("bad uuid {s:?}: {e}")))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| conv_err(format!("bad timestamp {s:?}: {e}")))
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn encode_role(r: Role) -> &'static str {
  match r {
    Role::Buyer => "buyer",
    Role::Factory => "factory",
    Role::Admin => "admin",
  }
}

pub fn decode_role(s: &str) -> rusqlite::Result<Role> {
  match s {
    "buyer" => Ok(Role::Buyer),
    "factory" => Ok(Role::Factory),
    "admin" => Ok(Role::Admin),
    other => Err(conv_err(format!("unknown role: {other:?}"))),
  }
}

// ─── Statuses ────────────────────────────────────────────────────────────────

pub fn encode_request_status(s: RequestStatus) -> &'static str {
  match s {
    RequestStatus::Pending => "pending",
    RequestStatus::InProgress => "in_progress",
    RequestStatus::Completed => "completed",
    RequestStatus::Cancelled => "cancelled",
  }
}

pub fn decode_request_status(s: &str) -> rusqlite::Result<RequestStatus> {
  match s {
    "pending" => Ok(RequestStatus::Pending),
    "in_progress" => Ok(RequestStatus::InProgress),
    "completed" => Ok(RequestStatus::Completed),
    "cancelled" => Ok(RequestStatus::Cancelled),
    other => Err(conv_err(format!("unknown request status: {other:?}"))),
  }
}

pub fn encode_item_status(s: ItemStatus) -> &'static str {
  match s {
    ItemStatus::Pending => "pending",
    ItemStatus::Fulfilled => "fulfilled",
    ItemStatus::Rejected => "rejected",
  }
}

pub fn decode_item_status(s: &str) -> rusqlite::Result<ItemStatus> {
  match s {
    "pending" => Ok(ItemStatus::Pending),
    "fulfilled" => Ok(ItemStatus::Fulfilled),
    "rejected" => Ok(ItemStatus::Rejected),
    other => Err(conv_err(format!("unknown item status: {other:?}"))),
  }
}

// ─── Audit vocabulary ────────────────────────────────────────────────────────

pub fn decode_action(s: &str) -> rusqlite::Result<AuditAction> {
  match s {
    "create" => Ok(AuditAction::Create),
    "fulfill" => Ok(AuditAction::Fulfill),
    "reject" => Ok(AuditAction::Reject),
    "cancel" => Ok(AuditAction::Cancel),
    "grant" => Ok(AuditAction::Grant),
    other => Err(conv_err(format!("unknown audit action: {other:?}"))),
  }
}

pub fn decode_subject(s: &str) -> rusqlite::Result<AuditSubject> {
  match s {
    "user" => Ok(AuditSubject::User),
    "evidence" => Ok(AuditSubject::Evidence),
    "version" => Ok(AuditSubject::Version),
    "request" => Ok(AuditSubject::Request),
    "request_item" => Ok(AuditSubject::RequestItem),
    "grant" => Ok(AuditSubject::Grant),
    other => Err(conv_err(format!("unknown audit subject: {other:?}"))),
  }
}

pub fn decode_metadata(s: &str) -> rusqlite::Result<serde_json::Value> {
  serde_json::from_str(s)
    .map_err(|e| conv_err(format!("bad audit metadata: {e}")))
}

// ─── Row mappers ─────────────────────────────────────────────────────────────

/// Columns: user_id, role, created_at.
pub fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
  Ok(User {
    user_id:    row.get(0)?,
    role:       decode_role(&row.get::<_, String>(1)?)?,
    created_at: decode_dt(&row.get::<_, String>(2)?)?,
  })
}

/// Columns: evidence_id, name, doc_type, owner, created_at.
pub fn evidence_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evidence> {
  Ok(Evidence {
    evidence_id: decode_uuid(&row.get::<_, String>(0)?)?,
    name:        row.get(1)?,
    doc_type:    row.get(2)?,
    owner:       row.get(3)?,
    created_at:  decode_dt(&row.get::<_, String>(4)?)?,
  })
}

/// Columns: version_id, evidence_id, version_number, notes, content_ref,
/// created_at, created_by.
pub fn version_from_row(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<EvidenceVersion> {
  Ok(EvidenceVersion {
    version_id:     decode_uuid(&row.get::<_, String>(0)?)?,
    evidence_id:    decode_uuid(&row.get::<_, String>(1)?)?,
    version_number: row.get(2)?,
    notes:          row.get(3)?,
    content_ref:    row.get(4)?,
    created_at:     decode_dt(&row.get::<_, String>(5)?)?,
    created_by:     row.get(6)?,
  })
}

/// A `requests` row before its items are attached.
pub struct RequestRow {
  pub request_id: Uuid,
  pub title:      String,
  pub buyer:      String,
  pub factory:    String,
  pub status:     RequestStatus,
  pub created_at: DateTime<Utc>,
}

/// Columns: request_id, title, buyer, factory, status, created_at.
pub fn request_from_row(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<RequestRow> {
  Ok(RequestRow {
    request_id: decode_uuid(&row.get::<_, String>(0)?)?,
    title:      row.get(1)?,
    buyer:      row.get(2)?,
    factory:    row.get(3)?,
    status:     decode_request_status(&row.get::<_, String>(4)?)?,
    created_at: decode_dt(&row.get::<_, String>(5)?)?,
  })
}

/// Columns: item_id, request_id, doc_type, status, fulfilling_version,
/// fulfilled_by, fulfilled_at, reject_reason, created_at.
pub fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestItem> {
  Ok(RequestItem {
    item_id:            decode_uuid(&row.get::<_, String>(0)?)?,
    request_id:         decode_uuid(&row.get::<_, String>(1)?)?,
    doc_type:           row.get(2)?,
    status:             decode_item_status(&row.get::<_, String>(3)?)?,
    fulfilling_version: row
      .get::<_, Option<String>>(4)?
      .as_deref()
      .map(decode_uuid)
      .transpose()?,
    fulfilled_by:       row.get(5)?,
    fulfilled_at:       row
      .get::<_, Option<String>>(6)?
      .as_deref()
      .map(decode_dt)
      .transpose()?,
    reject_reason:      row.get(7)?,
    created_at:         decode_dt(&row.get::<_, String>(8)?)?,
  })
}

/// Columns: seq, record_id, actor, action, subject_type, subject_id,
/// recorded_at, metadata, prev_hash, record_hash.
pub fn audit_from_row(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<AuditRecord> {
  Ok(AuditRecord {
    seq:          row.get(0)?,
    record_id:    decode_uuid(&row.get::<_, String>(1)?)?,
    actor:        row.get(2)?,
    action:       decode_action(&row.get::<_, String>(3)?)?,
    subject_type: decode_subject(&row.get::<_, String>(4)?)?,
    subject_id:   row.get(5)?,
    recorded_at:  decode_dt(&row.get::<_, String>(6)?)?,
    metadata:     decode_metadata(&row.get::<_, String>(7)?)?,
    prev_hash:    row.get(8)?,
    record_hash:  row.get(9)?,
  })
}
