//! [`SqliteStore`] — the SQLite implementation of [`ComplianceStore`].
//!
//! Every mutating operation runs inside one `rusqlite` transaction on the
//! store's single connection: the precondition checks, the state
//! transition, the grant ledger insert, and the audit appends either all
//! land or all roll back. Domain precondition failures return early and
//! drop the transaction, leaving state untouched.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use serde_json::json;
use uuid::Uuid;
use vouch_core::{
  Error, Result,
  access::AccessPolicy,
  audit::{AuditAction, AuditRecord, AuditSubject, NewAuditRecord, chain_hash},
  evidence::{Evidence, EvidenceVersion, EvidenceView, NewEvidence, NewVersion},
  grant::{Grant, GrantOutcome},
  request::{
    self, ItemStatus, NewRequest, Request, RequestItem, RequestStatus,
  },
  store::ComplianceStore,
  user::{NewUser, Role, User},
};

use crate::{
  encode::{
    RequestRow, audit_from_row, encode_dt, encode_item_status,
    encode_request_status, encode_role, encode_uuid, evidence_from_row,
    item_from_row, request_from_row, user_from_row, version_from_row,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vouch compliance store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All
/// database work funnels through one connection thread, so concurrent
/// mutating calls serialize; the loser of a race over the same request
/// item observes the winner's committed state.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

fn storage(e: tokio_rusqlite::Error) -> Error {
  Error::StorageFailure(e.to_string())
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path)
      .await
      .map_err(storage)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(storage)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
      .map_err(storage)
  }

  /// Shared read path behind `get_evidence` and `list_versions`: fetch the
  /// evidence, apply the access policy, scope the version listing.
  async fn evidence_view(
    &self,
    evidence_id: Uuid,
    actor: &User,
  ) -> Result<EvidenceView> {
    let policy = AccessPolicy::for_user(actor);
    let user_id = actor.user_id.clone();

    let out: Result<EvidenceView> = self
      .conn
      .call(move |conn| {
        let evidence = match find_evidence(conn, evidence_id)? {
          Some(e) => e,
          None => return Ok(Err(Error::EvidenceNotFound(evidence_id))),
        };
        let mut versions = versions_of(conn, evidence_id)?;
        let granted = granted_of_evidence(conn, evidence_id, &user_id)?;

        if !policy.allows_evidence(&evidence.owner, granted.len()) {
          return Ok(Err(Error::AccessDenied));
        }
        if !policy.sees_all_versions_of(&evidence.owner) {
          versions.retain(|v| granted.contains(&v.version_id));
        }

        Ok(Ok(EvidenceView { evidence, versions }))
      })
      .await
      .map_err(storage)?;
    out
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Test hook: run raw SQL against the underlying connection (e.g. to
  /// simulate in-place tampering with the audit log).
  pub(crate) async fn raw_execute(&self, sql: &'static str) -> Result<usize> {
    self
      .conn
      .call(move |conn| Ok(conn.execute(sql, [])?))
      .await
      .map_err(storage)
  }
}

// ─── In-transaction helpers ──────────────────────────────────────────────────

fn find_user(
  conn: &rusqlite::Connection,
  user_id: &str,
) -> rusqlite::Result<Option<User>> {
  conn
    .query_row(
      "SELECT user_id, role, created_at FROM users WHERE user_id = ?1",
      rusqlite::params![user_id],
      user_from_row,
    )
    .optional()
}

fn find_evidence(
  conn: &rusqlite::Connection,
  evidence_id: Uuid,
) -> rusqlite::Result<Option<Evidence>> {
  conn
    .query_row(
      "SELECT evidence_id, name, doc_type, owner, created_at
       FROM evidence WHERE evidence_id = ?1",
      rusqlite::params![encode_uuid(evidence_id)],
      evidence_from_row,
    )
    .optional()
}

fn find_version(
  conn: &rusqlite::Connection,
  version_id: Uuid,
) -> rusqlite::Result<Option<EvidenceVersion>> {
  conn
    .query_row(
      "SELECT version_id, evidence_id, version_number, notes, content_ref,
              created_at, created_by
       FROM evidence_versions WHERE version_id = ?1",
      rusqlite::params![encode_uuid(version_id)],
      version_from_row,
    )
    .optional()
}

/// All versions of one evidence, newest first.
fn versions_of(
  conn: &rusqlite::Connection,
  evidence_id: Uuid,
) -> rusqlite::Result<Vec<EvidenceVersion>> {
  let mut stmt = conn.prepare(
    "SELECT version_id, evidence_id, version_number, notes, content_ref,
            created_at, created_by
     FROM evidence_versions
     WHERE evidence_id = ?1
     ORDER BY version_number DESC",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![encode_uuid(evidence_id)], version_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Version ids of one evidence granted to `user_id`.
fn granted_of_evidence(
  conn: &rusqlite::Connection,
  evidence_id: Uuid,
  user_id: &str,
) -> rusqlite::Result<Vec<Uuid>> {
  let mut stmt = conn.prepare(
    "SELECT g.version_id
     FROM grants g
     JOIN evidence_versions v ON v.version_id = g.version_id
     WHERE v.evidence_id = ?1 AND g.user_id = ?2",
  )?;
  let rows = stmt
    .query_map(
      rusqlite::params![encode_uuid(evidence_id), user_id],
      |row| {
        let id: String = row.get(0)?;
        crate::encode::decode_uuid(&id)
      },
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn find_request(
  conn: &rusqlite::Connection,
  request_id: Uuid,
) -> rusqlite::Result<Option<RequestRow>> {
  conn
    .query_row(
      "SELECT request_id, title, buyer, factory, status, created_at
       FROM requests WHERE request_id = ?1",
      rusqlite::params![encode_uuid(request_id)],
      request_from_row,
    )
    .optional()
}

fn find_item(
  conn: &rusqlite::Connection,
  request_id: Uuid,
  item_id: Uuid,
) -> rusqlite::Result<Option<RequestItem>> {
  conn
    .query_row(
      "SELECT item_id, request_id, doc_type, status, fulfilling_version,
              fulfilled_by, fulfilled_at, reject_reason, created_at
       FROM request_items WHERE item_id = ?1 AND request_id = ?2",
      rusqlite::params![encode_uuid(item_id), encode_uuid(request_id)],
      item_from_row,
    )
    .optional()
}

/// Items of one request in insertion order.
fn items_of(
  conn: &rusqlite::Connection,
  request_id: Uuid,
) -> rusqlite::Result<Vec<RequestItem>> {
  let mut stmt = conn.prepare(
    "SELECT item_id, request_id, doc_type, status, fulfilling_version,
            fulfilled_by, fulfilled_at, reject_reason, created_at
     FROM request_items
     WHERE request_id = ?1
     ORDER BY rowid",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![encode_uuid(request_id)], item_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn assemble_request(
  conn: &rusqlite::Connection,
  row: RequestRow,
) -> rusqlite::Result<Request> {
  let items = items_of(conn, row.request_id)?;
  Ok(Request {
    request_id: row.request_id,
    title:      row.title,
    buyer:      row.buyer,
    factory:    row.factory,
    status:     row.status,
    created_at: row.created_at,
    items,
  })
}

/// Append one audit record, linking it into the hash chain. Runs inside
/// the caller's transaction; a failure here fails the whole unit of work.
fn insert_audit(
  conn: &rusqlite::Connection,
  input: &NewAuditRecord,
) -> rusqlite::Result<AuditRecord> {
  let prev_hash: String = conn
    .query_row(
      "SELECT record_hash FROM audit_log ORDER BY seq DESC LIMIT 1",
      [],
      |row| row.get(0),
    )
    .optional()?
    .unwrap_or_else(|| vouch_core::audit::GENESIS_HASH.to_string());

  let record_id = Uuid::new_v4();
  let recorded_at = Utc::now();
  let record_hash = chain_hash(
    &prev_hash,
    record_id,
    input.actor.as_deref(),
    input.action,
    input.subject_type,
    &input.subject_id,
    recorded_at,
    &input.metadata,
  );

  conn.execute(
    "INSERT INTO audit_log (record_id, actor, action, subject_type,
                            subject_id, recorded_at, metadata,
                            prev_hash, record_hash)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      encode_uuid(record_id),
      input.actor,
      input.action.discriminant(),
      input.subject_type.discriminant(),
      input.subject_id,
      encode_dt(recorded_at),
      input.metadata.to_string(),
      prev_hash,
      record_hash,
    ],
  )?;
  let seq = conn.last_insert_rowid();

  Ok(AuditRecord {
    record_id,
    seq,
    actor: input.actor.clone(),
    action: input.action,
    subject_type: input.subject_type,
    subject_id: input.subject_id.clone(),
    recorded_at,
    metadata: input.metadata.clone(),
    prev_hash,
    record_hash,
  })
}

/// Idempotent grant insert. The UNIQUE (version_id, user_id) constraint
/// makes the race between two first-grants leave exactly one row; both
/// callers observe success. Only a newly created grant appends an audit
/// record, attributed to `granted_by`.
fn insert_grant(
  conn: &rusqlite::Connection,
  version_id: Uuid,
  user_id: &str,
  granted_by: Option<&str>,
) -> rusqlite::Result<GrantOutcome> {
  let grant_id = Uuid::new_v4();
  let granted_at = Utc::now();

  let changed = conn.execute(
    "INSERT INTO grants (grant_id, version_id, user_id, granted_at, granted_by)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (version_id, user_id) DO NOTHING",
    rusqlite::params![
      encode_uuid(grant_id),
      encode_uuid(version_id),
      user_id,
      encode_dt(granted_at),
      granted_by,
    ],
  )?;

  if changed == 1 {
    insert_audit(conn, &NewAuditRecord {
      actor:        granted_by.map(str::to_owned),
      action:       AuditAction::Grant,
      subject_type: AuditSubject::Grant,
      subject_id:   encode_uuid(grant_id),
      metadata:     json!({
        "versionId": encode_uuid(version_id),
        "grantedTo": user_id,
      }),
    })?;
    return Ok(GrantOutcome {
      grant:   Grant {
        grant_id,
        version_id,
        user_id: user_id.to_owned(),
        granted_at,
        granted_by: granted_by.map(str::to_owned),
      },
      created: true,
    });
  }

  // The pair already existed; surface the original row.
  let grant = conn.query_row(
    "SELECT grant_id, granted_at, granted_by
     FROM grants WHERE version_id = ?1 AND user_id = ?2",
    rusqlite::params![encode_uuid(version_id), user_id],
    |row| {
      Ok(Grant {
        grant_id:   crate::encode::decode_uuid(&row.get::<_, String>(0)?)?,
        version_id,
        user_id:    user_id.to_owned(),
        granted_at: crate::encode::decode_dt(&row.get::<_, String>(1)?)?,
        granted_by: row.get(2)?,
      })
    },
  )?;
  Ok(GrantOutcome { grant, created: false })
}

// ─── ComplianceStore impl ────────────────────────────────────────────────────

impl ComplianceStore for SqliteStore {
  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<User> {
    let user = User {
      user_id:    input.user_id.clone(),
      role:       input.role,
      created_at: Utc::now(),
    };

    let user_id = input.user_id;
    let role_str = encode_role(input.role).to_owned();
    let hash = input.password_hash;
    let at_str = encode_dt(user.created_at);

    let out: Result<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let taken: bool = tx
          .query_row(
            "SELECT 1 FROM users WHERE user_id = ?1",
            rusqlite::params![user_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(Err(Error::DuplicateUser(user_id)));
        }

        tx.execute(
          "INSERT INTO users (user_id, role, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![user_id, role_str, hash, at_str],
        )?;
        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(user_id.clone()),
          action:       AuditAction::Create,
          subject_type: AuditSubject::User,
          subject_id:   user_id.clone(),
          metadata:     json!({ "role": role_str.as_str() }),
        })?;

        tx.commit()?;
        Ok(Ok(()))
      })
      .await
      .map_err(storage)?;
    out?;
    Ok(user)
  }

  async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
    let user_id = user_id.to_owned();
    self
      .conn
      .call(move |conn| Ok(find_user(conn, &user_id)?))
      .await
      .map_err(storage)
  }

  async fn credentials(&self, user_id: &str) -> Result<Option<(User, String)>> {
    let user_id = user_id.to_owned();
    self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id, role, created_at, password_hash
               FROM users WHERE user_id = ?1",
              rusqlite::params![user_id],
              |row| Ok((user_from_row(row)?, row.get::<_, String>(3)?)),
            )
            .optional()?,
        )
      })
      .await
      .map_err(storage)
  }

  // ── Evidence ──────────────────────────────────────────────────────────────

  async fn create_evidence(
    &self,
    input: NewEvidence,
    actor: &User,
  ) -> Result<EvidenceView> {
    if !actor.role.is_factory() {
      return Err(Error::PermissionDenied(
        "only factory users can create evidence".to_string(),
      ));
    }
    if input.name.trim().is_empty() || input.doc_type.trim().is_empty() {
      return Err(Error::InvalidArgument(
        "evidence name and doc_type must not be empty".to_string(),
      ));
    }

    let now = Utc::now();
    let evidence = Evidence {
      evidence_id: Uuid::new_v4(),
      name:        input.name,
      doc_type:    input.doc_type,
      owner:       actor.user_id.clone(),
      created_at:  now,
    };
    let version = EvidenceVersion {
      version_id:     Uuid::new_v4(),
      evidence_id:    evidence.evidence_id,
      version_number: 1,
      notes:          input.notes,
      content_ref:    input.content_ref,
      created_at:     now,
      created_by:     actor.user_id.clone(),
    };

    let ev = evidence.clone();
    let v = version.clone();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(
          "INSERT INTO evidence (evidence_id, name, doc_type, owner, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            encode_uuid(ev.evidence_id),
            ev.name,
            ev.doc_type,
            ev.owner,
            encode_dt(ev.created_at),
          ],
        )?;
        tx.execute(
          "INSERT INTO evidence_versions (version_id, evidence_id,
             version_number, notes, content_ref, created_at, created_by)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            encode_uuid(v.version_id),
            encode_uuid(v.evidence_id),
            v.version_number,
            v.notes,
            v.content_ref,
            encode_dt(v.created_at),
            v.created_by,
          ],
        )?;

        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(ev.owner.clone()),
          action:       AuditAction::Create,
          subject_type: AuditSubject::Evidence,
          subject_id:   encode_uuid(ev.evidence_id),
          metadata:     json!({
            "factoryId": ev.owner.as_str(),
            "docType": ev.doc_type.as_str(),
            "name": ev.name.as_str(),
          }),
        })?;
        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(v.created_by.clone()),
          action:       AuditAction::Create,
          subject_type: AuditSubject::Version,
          subject_id:   encode_uuid(v.version_id),
          metadata:     json!({
            "evidenceId": encode_uuid(v.evidence_id),
            "factoryId": v.created_by.as_str(),
            "versionNumber": v.version_number,
          }),
        })?;

        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(storage)?;

    Ok(EvidenceView { evidence, versions: vec![version] })
  }

  async fn add_version(
    &self,
    evidence_id: Uuid,
    input: NewVersion,
    actor: &User,
  ) -> Result<EvidenceVersion> {
    let actor_id = actor.user_id.clone();
    let notes = input.notes;
    let content_ref = input.content_ref;

    let out: Result<EvidenceVersion> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let evidence = match find_evidence(&tx, evidence_id)? {
          Some(e) => e,
          None => return Ok(Err(Error::EvidenceNotFound(evidence_id))),
        };
        if evidence.owner != actor_id {
          return Ok(Err(Error::PermissionDenied(
            "you can only add versions to your own evidence".to_string(),
          )));
        }

        // Monotonic within the parent; the UNIQUE constraint backs this up.
        let next_number: u32 = tx.query_row(
          "SELECT COALESCE(MAX(version_number), 0) + 1
           FROM evidence_versions WHERE evidence_id = ?1",
          rusqlite::params![encode_uuid(evidence_id)],
          |row| row.get(0),
        )?;

        let version = EvidenceVersion {
          version_id: Uuid::new_v4(),
          evidence_id,
          version_number: next_number,
          notes,
          content_ref,
          created_at: Utc::now(),
          created_by: actor_id.clone(),
        };

        tx.execute(
          "INSERT INTO evidence_versions (version_id, evidence_id,
             version_number, notes, content_ref, created_at, created_by)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            encode_uuid(version.version_id),
            encode_uuid(version.evidence_id),
            version.version_number,
            version.notes,
            version.content_ref,
            encode_dt(version.created_at),
            version.created_by,
          ],
        )?;
        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(actor_id.clone()),
          action:       AuditAction::Create,
          subject_type: AuditSubject::Version,
          subject_id:   encode_uuid(version.version_id),
          metadata:     json!({
            "evidenceId": encode_uuid(evidence_id),
            "factoryId": actor_id.as_str(),
            "versionNumber": version.version_number,
          }),
        })?;

        tx.commit()?;
        Ok(Ok(version))
      })
      .await
      .map_err(storage)?;
    out
  }

  async fn get_evidence(
    &self,
    evidence_id: Uuid,
    actor: &User,
  ) -> Result<EvidenceView> {
    self.evidence_view(evidence_id, actor).await
  }

  async fn list_evidence(&self, actor: &User) -> Result<Vec<Evidence>> {
    let user_id = actor.user_id.clone();
    let role = actor.role;

    self
      .conn
      .call(move |conn| {
        let rows = match role {
          Role::Factory => {
            let mut stmt = conn.prepare(
              "SELECT evidence_id, name, doc_type, owner, created_at
               FROM evidence WHERE owner = ?1
               ORDER BY created_at DESC",
            )?;
            stmt
              .query_map(rusqlite::params![user_id], evidence_from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
          Role::Buyer => {
            let mut stmt = conn.prepare(
              "SELECT DISTINCT e.evidence_id, e.name, e.doc_type, e.owner,
                      e.created_at
               FROM evidence e
               JOIN evidence_versions v ON v.evidence_id = e.evidence_id
               JOIN grants g ON g.version_id = v.version_id
               WHERE g.user_id = ?1
               ORDER BY e.created_at DESC",
            )?;
            stmt
              .query_map(rusqlite::params![user_id], evidence_from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
          Role::Admin => {
            let mut stmt = conn.prepare(
              "SELECT evidence_id, name, doc_type, owner, created_at
               FROM evidence ORDER BY created_at DESC",
            )?;
            stmt
              .query_map([], evidence_from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
        };
        Ok(rows)
      })
      .await
      .map_err(storage)
  }

  async fn list_versions(
    &self,
    evidence_id: Uuid,
    actor: &User,
  ) -> Result<Vec<EvidenceVersion>> {
    Ok(self.evidence_view(evidence_id, actor).await?.versions)
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn create_request(
    &self,
    input: NewRequest,
    actor: &User,
  ) -> Result<Request> {
    if !actor.role.is_buyer() {
      return Err(Error::PermissionDenied(
        "only buyers can create requests".to_string(),
      ));
    }
    if input.title.trim().is_empty() {
      return Err(Error::InvalidArgument(
        "request title must not be empty".to_string(),
      ));
    }
    if input.items.is_empty() {
      return Err(Error::InvalidArgument(
        "a request needs at least one item".to_string(),
      ));
    }
    if input.items.iter().any(|i| i.doc_type.trim().is_empty()) {
      return Err(Error::InvalidArgument(
        "every item needs a doc_type".to_string(),
      ));
    }

    let buyer = actor.user_id.clone();
    let factory = input.factory;
    let title = input.title;
    let doc_types: Vec<String> =
      input.items.into_iter().map(|i| i.doc_type).collect();

    let out: Result<Request> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let addressee = match find_user(&tx, &factory)? {
          Some(u) => u,
          None => return Ok(Err(Error::UserNotFound(factory))),
        };
        if !addressee.role.is_factory() {
          return Ok(Err(Error::InvalidArgument(format!(
            "addressee {} is not a factory",
            addressee.user_id
          ))));
        }

        let now = Utc::now();
        let request_id = Uuid::new_v4();
        tx.execute(
          "INSERT INTO requests (request_id, title, buyer, factory, status,
                                 created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            encode_uuid(request_id),
            title,
            buyer,
            factory,
            encode_request_status(RequestStatus::Pending),
            encode_dt(now),
          ],
        )?;
        for doc_type in &doc_types {
          tx.execute(
            "INSERT INTO request_items (item_id, request_id, doc_type,
                                        status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
              encode_uuid(Uuid::new_v4()),
              encode_uuid(request_id),
              doc_type,
              encode_item_status(ItemStatus::Pending),
              encode_dt(now),
            ],
          )?;
        }

        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(buyer.clone()),
          action:       AuditAction::Create,
          subject_type: AuditSubject::Request,
          subject_id:   encode_uuid(request_id),
          metadata:     json!({
            "buyerId": buyer.as_str(),
            "factoryId": factory.as_str(),
            "title": title.as_str(),
            "docTypes": doc_types,
          }),
        })?;

        let request = assemble_request(&tx, RequestRow {
          request_id,
          title,
          buyer,
          factory,
          status: RequestStatus::Pending,
          created_at: now,
        })?;

        tx.commit()?;
        Ok(Ok(request))
      })
      .await
      .map_err(storage)?;
    out
  }

  async fn get_request(
    &self,
    request_id: Uuid,
    actor: &User,
  ) -> Result<Request> {
    let user_id = actor.user_id.clone();
    let role = actor.role;

    let out: Result<Request> = self
      .conn
      .call(move |conn| {
        let row = match find_request(conn, request_id)? {
          Some(r) => r,
          None => return Ok(Err(Error::RequestNotFound(request_id))),
        };
        // Parties and admins only; everyone else learns nothing, not even
        // that the request exists.
        let visible = role.is_admin()
          || row.buyer == user_id
          || row.factory == user_id;
        if !visible {
          return Ok(Err(Error::RequestNotFound(request_id)));
        }
        Ok(Ok(assemble_request(conn, row)?))
      })
      .await
      .map_err(storage)?;
    out
  }

  async fn list_requests(
    &self,
    actor: &User,
    status: Option<RequestStatus>,
  ) -> Result<Vec<Request>> {
    let user_id = actor.user_id.clone();
    let role = actor.role;
    let status_str = status.map(encode_request_status).map(str::to_owned);

    self
      .conn
      .call(move |conn| {
        let mut conds: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        match role {
          Role::Buyer => {
            binds.push(user_id);
            conds.push(format!("buyer = ?{}", binds.len()));
          }
          Role::Factory => {
            binds.push(user_id);
            conds.push(format!("factory = ?{}", binds.len()));
          }
          Role::Admin => {}
        }
        if let Some(s) = status_str {
          binds.push(s);
          conds.push(format!("status = ?{}", binds.len()));
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };
        let sql = format!(
          "SELECT request_id, title, buyer, factory, status, created_at
           FROM requests {where_clause} ORDER BY created_at DESC"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params_from_iter(binds.iter()),
            request_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(
          rows
            .into_iter()
            .map(|row| assemble_request(conn, row))
            .collect::<rusqlite::Result<Vec<_>>>()?,
        )
      })
      .await
      .map_err(storage)
  }

  async fn fulfill_item(
    &self,
    request_id: Uuid,
    item_id: Uuid,
    version_id: Uuid,
    actor: &User,
  ) -> Result<Request> {
    let actor_id = actor.user_id.clone();

    let out: Result<Request> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let req = match find_request(&tx, request_id)? {
          Some(r) => r,
          None => return Ok(Err(Error::RequestNotFound(request_id))),
        };
        let item = match find_item(&tx, request_id, item_id)? {
          Some(i) => i,
          None => return Ok(Err(Error::ItemNotFound(item_id))),
        };
        let version = match find_version(&tx, version_id)? {
          Some(v) => v,
          None => return Ok(Err(Error::VersionNotFound(version_id))),
        };
        let evidence = match find_evidence(&tx, version.evidence_id)? {
          Some(e) => e,
          None => return Ok(Err(Error::EvidenceNotFound(version.evidence_id))),
        };

        if req.factory != actor_id {
          return Ok(Err(Error::PermissionDenied(
            "only the factory the request is addressed to may fulfill its items"
              .to_string(),
          )));
        }
        if evidence.owner != actor_id {
          return Ok(Err(Error::PermissionDenied(
            "actor does not own the evidence backing this version".to_string(),
          )));
        }
        if req.status.is_terminal() {
          return Ok(Err(Error::InvalidState(format!(
            "request {} is {}",
            req.request_id,
            encode_request_status(req.status),
          ))));
        }
        if !item.status.can_transition_to(ItemStatus::Fulfilled) {
          return Ok(Err(Error::InvalidState(format!(
            "request item {} is {}, not pending",
            item.item_id,
            encode_item_status(item.status),
          ))));
        }
        if evidence.doc_type != item.doc_type {
          return Ok(Err(Error::TypeMismatch {
            requested: item.doc_type.clone(),
            supplied:  evidence.doc_type.clone(),
          }));
        }

        let now = Utc::now();
        tx.execute(
          "UPDATE request_items
           SET status = 'fulfilled', fulfilling_version = ?1,
               fulfilled_by = ?2, fulfilled_at = ?3
           WHERE item_id = ?4",
          rusqlite::params![
            encode_uuid(version_id),
            actor_id,
            encode_dt(now),
            encode_uuid(item_id),
          ],
        )?;

        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(actor_id.clone()),
          action:       AuditAction::Fulfill,
          subject_type: AuditSubject::RequestItem,
          subject_id:   encode_uuid(item_id),
          metadata:     json!({
            "requestId": encode_uuid(request_id),
            "buyerId": req.buyer.as_str(),
            "factoryId": req.factory.as_str(),
            "docType": item.doc_type.as_str(),
            "evidenceId": encode_uuid(evidence.evidence_id),
            "versionId": encode_uuid(version_id),
            "statusChange": { "from": "pending", "to": "fulfilled" },
          }),
        })?;

        // Share the fulfilling version with the requesting buyer.
        insert_grant(&tx, version_id, &req.buyer, Some(&actor_id))?;

        let statuses: Vec<ItemStatus> =
          items_of(&tx, request_id)?.iter().map(|i| i.status).collect();
        let next = request::recompute_status(req.status, &statuses);
        if next != req.status {
          tx.execute(
            "UPDATE requests SET status = ?1 WHERE request_id = ?2",
            rusqlite::params![
              encode_request_status(next),
              encode_uuid(request_id),
            ],
          )?;
        }

        let updated =
          assemble_request(&tx, RequestRow { status: next, ..req })?;
        tx.commit()?;
        Ok(Ok(updated))
      })
      .await
      .map_err(storage)?;

    let updated = out?;
    tracing::info!(
      request_id = %updated.request_id,
      item_id = %item_id,
      version_id = %version_id,
      "request item fulfilled"
    );
    Ok(updated)
  }

  async fn reject_item(
    &self,
    request_id: Uuid,
    item_id: Uuid,
    reason: &str,
    actor: &User,
  ) -> Result<Request> {
    if reason.trim().is_empty() {
      return Err(Error::InvalidArgument(
        "a rejection needs a non-empty reason".to_string(),
      ));
    }

    let actor_id = actor.user_id.clone();
    let reason = reason.to_owned();

    let out: Result<Request> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let req = match find_request(&tx, request_id)? {
          Some(r) => r,
          None => return Ok(Err(Error::RequestNotFound(request_id))),
        };
        let item = match find_item(&tx, request_id, item_id)? {
          Some(i) => i,
          None => return Ok(Err(Error::ItemNotFound(item_id))),
        };

        if req.factory != actor_id {
          return Ok(Err(Error::PermissionDenied(
            "only the factory the request is addressed to may reject its items"
              .to_string(),
          )));
        }
        if req.status.is_terminal() {
          return Ok(Err(Error::InvalidState(format!(
            "request {} is {}",
            req.request_id,
            encode_request_status(req.status),
          ))));
        }
        if !item.status.can_transition_to(ItemStatus::Rejected) {
          return Ok(Err(Error::InvalidState(format!(
            "request item {} is {}, not pending",
            item.item_id,
            encode_item_status(item.status),
          ))));
        }

        tx.execute(
          "UPDATE request_items SET status = 'rejected', reject_reason = ?1
           WHERE item_id = ?2",
          rusqlite::params![reason, encode_uuid(item_id)],
        )?;

        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(actor_id.clone()),
          action:       AuditAction::Reject,
          subject_type: AuditSubject::RequestItem,
          subject_id:   encode_uuid(item_id),
          metadata:     json!({
            "requestId": encode_uuid(request_id),
            "buyerId": req.buyer.as_str(),
            "factoryId": req.factory.as_str(),
            "docType": item.doc_type.as_str(),
            "reason": reason.as_str(),
            "statusChange": { "from": "pending", "to": "rejected" },
          }),
        })?;

        let statuses: Vec<ItemStatus> =
          items_of(&tx, request_id)?.iter().map(|i| i.status).collect();
        let next = request::recompute_status(req.status, &statuses);
        if next != req.status {
          tx.execute(
            "UPDATE requests SET status = ?1 WHERE request_id = ?2",
            rusqlite::params![
              encode_request_status(next),
              encode_uuid(request_id),
            ],
          )?;
        }

        let updated =
          assemble_request(&tx, RequestRow { status: next, ..req })?;
        tx.commit()?;
        Ok(Ok(updated))
      })
      .await
      .map_err(storage)?;

    let updated = out?;
    tracing::info!(
      request_id = %updated.request_id,
      item_id = %item_id,
      "request item rejected"
    );
    Ok(updated)
  }

  async fn cancel_request(
    &self,
    request_id: Uuid,
    actor: &User,
  ) -> Result<Request> {
    let actor_id = actor.user_id.clone();

    let out: Result<Request> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let req = match find_request(&tx, request_id)? {
          Some(r) => r,
          None => return Ok(Err(Error::RequestNotFound(request_id))),
        };
        if req.buyer != actor_id {
          return Ok(Err(Error::PermissionDenied(
            "only the requesting buyer may cancel a request".to_string(),
          )));
        }
        if !req.status.can_transition_to(RequestStatus::Cancelled) {
          return Ok(Err(Error::InvalidState(format!(
            "request {} is {}, not cancellable",
            req.request_id,
            encode_request_status(req.status),
          ))));
        }

        tx.execute(
          "UPDATE requests SET status = ?1 WHERE request_id = ?2",
          rusqlite::params![
            encode_request_status(RequestStatus::Cancelled),
            encode_uuid(request_id),
          ],
        )?;

        insert_audit(&tx, &NewAuditRecord {
          actor:        Some(actor_id.clone()),
          action:       AuditAction::Cancel,
          subject_type: AuditSubject::Request,
          subject_id:   encode_uuid(request_id),
          metadata:     json!({
            "buyerId": req.buyer.as_str(),
            "factoryId": req.factory.as_str(),
            "statusChange": {
              "from": encode_request_status(req.status),
              "to": "cancelled",
            },
          }),
        })?;

        let updated = assemble_request(&tx, RequestRow {
          status: RequestStatus::Cancelled,
          ..req
        })?;
        tx.commit()?;
        Ok(Ok(updated))
      })
      .await
      .map_err(storage)?;

    let updated = out?;
    tracing::info!(request_id = %updated.request_id, "request cancelled");
    Ok(updated)
  }

  // ── Grant ledger ──────────────────────────────────────────────────────────

  async fn grant_version(
    &self,
    version_id: Uuid,
    user_id: &str,
    actor: &User,
  ) -> Result<GrantOutcome> {
    let actor_id = actor.user_id.clone();
    let admin = actor.role.is_admin();
    let grantee = user_id.to_owned();

    let out: Result<GrantOutcome> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let version = match find_version(&tx, version_id)? {
          Some(v) => v,
          None => return Ok(Err(Error::VersionNotFound(version_id))),
        };
        let evidence = match find_evidence(&tx, version.evidence_id)? {
          Some(e) => e,
          None => return Ok(Err(Error::EvidenceNotFound(version.evidence_id))),
        };
        if find_user(&tx, &grantee)?.is_none() {
          return Ok(Err(Error::UserNotFound(grantee)));
        }
        if !admin && evidence.owner != actor_id {
          return Ok(Err(Error::PermissionDenied(
            "only the owning factory or an admin may share a version"
              .to_string(),
          )));
        }

        let outcome = insert_grant(&tx, version_id, &grantee, Some(&actor_id))?;
        tx.commit()?;
        Ok(Ok(outcome))
      })
      .await
      .map_err(storage)?;
    out
  }

  async fn is_granted(&self, version_id: Uuid, user_id: &str) -> Result<bool> {
    let user_id = user_id.to_owned();
    self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM grants WHERE version_id = ?1 AND user_id = ?2",
              rusqlite::params![encode_uuid(version_id), user_id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await
      .map_err(storage)
  }

  async fn granted_versions_for(&self, user_id: &str) -> Result<Vec<Uuid>> {
    let user_id = user_id.to_owned();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id FROM grants WHERE user_id = ?1
           ORDER BY granted_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_id], |row| {
            let id: String = row.get(0)?;
            crate::encode::decode_uuid(&id)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(storage)
  }

  async fn can_access_version(
    &self,
    version_id: Uuid,
    user: &User,
  ) -> Result<bool> {
    let policy = AccessPolicy::for_user(user);
    let user_id = user.user_id.clone();

    let out: Result<bool> = self
      .conn
      .call(move |conn| {
        let owner: Option<String> = conn
          .query_row(
            "SELECT e.owner
             FROM evidence e
             JOIN evidence_versions v ON v.evidence_id = e.evidence_id
             WHERE v.version_id = ?1",
            rusqlite::params![encode_uuid(version_id)],
            |row| row.get(0),
          )
          .optional()?;
        let owner = match owner {
          Some(o) => o,
          None => return Ok(Err(Error::VersionNotFound(version_id))),
        };

        let has_grant: bool = conn
          .query_row(
            "SELECT 1 FROM grants WHERE version_id = ?1 AND user_id = ?2",
            rusqlite::params![encode_uuid(version_id), user_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        Ok(Ok(policy.allows_version(&owner, has_grant)))
      })
      .await
      .map_err(storage)?;
    out
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn list_audit(
    &self,
    actor: &User,
    limit: Option<usize>,
  ) -> Result<Vec<AuditRecord>> {
    if !actor.role.is_admin() {
      return Err(Error::PermissionDenied(
        "only admins may read the audit log".to_string(),
      ));
    }

    self
      .conn
      .call(move |conn| {
        let rows = match limit {
          Some(n) => {
            let mut stmt = conn.prepare(
              "SELECT seq, record_id, actor, action, subject_type,
                      subject_id, recorded_at, metadata, prev_hash,
                      record_hash
               FROM audit_log ORDER BY seq LIMIT ?1",
            )?;
            stmt
              .query_map(rusqlite::params![n as i64], audit_from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
          None => {
            let mut stmt = conn.prepare(
              "SELECT seq, record_id, actor, action, subject_type,
                      subject_id, recorded_at, metadata, prev_hash,
                      record_hash
               FROM audit_log ORDER BY seq",
            )?;
            stmt
              .query_map([], audit_from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
        };
        Ok(rows)
      })
      .await
      .map_err(storage)
  }
}
