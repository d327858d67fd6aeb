//! The `ComplianceStore` trait.
//!
//! Implemented by storage backends (e.g. `vouch-store-sqlite`). Higher
//! layers depend on this abstraction, not on any concrete backend.
//!
//! Every mutating operation is a single atomic unit of work: the state
//! transition, the grant ledger write, and the audit appends all land
//! together or not at all. Fulfillment orchestrates its collaborators
//! explicitly — validate the transition, write the grant, append the audit
//! records — inside one transaction; nothing happens through persistence
//! hooks. Backend failures surface as
//! [`Error::StorageFailure`](crate::Error::StorageFailure) and roll the
//! whole unit back.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use uuid::Uuid;

use crate::{
  Result,
  audit::AuditRecord,
  evidence::{Evidence, EvidenceVersion, EvidenceView, NewEvidence, NewVersion},
  grant::GrantOutcome,
  request::{NewRequest, Request, RequestStatus},
  user::{NewUser, User},
};

/// Abstraction over a Vouch storage backend.
pub trait ComplianceStore: Send + Sync {
  // ── Users ─────────────────────────────────────────────────────────────

  /// Create and persist a user. Fails with
  /// [`Error::DuplicateUser`](crate::Error::DuplicateUser) if the id is
  /// taken.
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User>> + Send + '_;

  /// Retrieve a user by id. Returns `None` if not found.
  fn get_user<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<User>>> + Send + 'a;

  /// Retrieve a user together with their stored password hash — used only
  /// by the authentication boundary.
  fn credentials<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<(User, String)>>> + Send + 'a;

  // ── Evidence ──────────────────────────────────────────────────────────

  /// Create evidence together with its first version. `actor` must be a
  /// factory; it becomes the owner.
  fn create_evidence<'a>(
    &'a self,
    input: NewEvidence,
    actor: &'a User,
  ) -> impl Future<Output = Result<EvidenceView>> + Send + 'a;

  /// Append a new version to existing evidence. `actor` must own it; the
  /// version number is assigned by the store, monotonically within the
  /// parent.
  fn add_version<'a>(
    &'a self,
    evidence_id: Uuid,
    input: NewVersion,
    actor: &'a User,
  ) -> impl Future<Output = Result<EvidenceVersion>> + Send + 'a;

  /// Retrieve evidence with the versions visible to `actor`. Fails with
  /// [`Error::AccessDenied`](crate::Error::AccessDenied) if `actor` may
  /// not see the evidence at all.
  fn get_evidence<'a>(
    &'a self,
    evidence_id: Uuid,
    actor: &'a User,
  ) -> impl Future<Output = Result<EvidenceView>> + Send + 'a;

  /// List the evidence visible to `actor`: owned evidence for a factory,
  /// evidence with at least one granted version for a buyer, everything
  /// for an admin.
  fn list_evidence<'a>(
    &'a self,
    actor: &'a User,
  ) -> impl Future<Output = Result<Vec<Evidence>>> + Send + 'a;

  /// List the versions of one evidence visible to `actor`. Read-guarded:
  /// a buyer with zero granted versions gets
  /// [`Error::AccessDenied`](crate::Error::AccessDenied), not an empty
  /// list.
  fn list_versions<'a>(
    &'a self,
    evidence_id: Uuid,
    actor: &'a User,
  ) -> impl Future<Output = Result<Vec<EvidenceVersion>>> + Send + 'a;

  // ── Requests ──────────────────────────────────────────────────────────

  /// Create a request with its items. `actor` must be a buyer; the
  /// addressee must be a factory; at least one item is required.
  fn create_request<'a>(
    &'a self,
    input: NewRequest,
    actor: &'a User,
  ) -> impl Future<Output = Result<Request>> + Send + 'a;

  /// Retrieve one request with items. Visible to its buyer, its factory,
  /// and admins; everyone else gets
  /// [`Error::RequestNotFound`](crate::Error::RequestNotFound).
  fn get_request<'a>(
    &'a self,
    request_id: Uuid,
    actor: &'a User,
  ) -> impl Future<Output = Result<Request>> + Send + 'a;

  /// List requests visible to `actor`, optionally narrowed by status.
  fn list_requests<'a>(
    &'a self,
    actor: &'a User,
    status: Option<RequestStatus>,
  ) -> impl Future<Output = Result<Vec<Request>>> + Send + 'a;

  /// Fulfill a pending item with an evidence version.
  ///
  /// Preconditions: `actor` is the factory the request is addressed to and
  /// owns the version's evidence; the item is `Pending`; the version's
  /// parent agrees with the item on `doc_type`. On success, atomically:
  /// the item becomes `Fulfilled`, the version is granted to the buyer
  /// (idempotently), the parent request status is recomputed, and the
  /// audit records land. Any precondition failure leaves all state
  /// unchanged.
  fn fulfill_item<'a>(
    &'a self,
    request_id: Uuid,
    item_id: Uuid,
    version_id: Uuid,
    actor: &'a User,
  ) -> impl Future<Output = Result<Request>> + Send + 'a;

  /// Reject a pending item with a non-empty reason. Terminal per item.
  fn reject_item<'a>(
    &'a self,
    request_id: Uuid,
    item_id: Uuid,
    reason: &'a str,
    actor: &'a User,
  ) -> impl Future<Output = Result<Request>> + Send + 'a;

  /// Cancel a request. Buyer-initiated only, from `Pending` or
  /// `InProgress`. Grants already issued stay in force.
  fn cancel_request<'a>(
    &'a self,
    request_id: Uuid,
    actor: &'a User,
  ) -> impl Future<Output = Result<Request>> + Send + 'a;

  // ── Grant ledger ──────────────────────────────────────────────────────

  /// Share a version with a user directly. `actor` must own the parent
  /// evidence or be an admin. Idempotent: a duplicate (version, user) pair
  /// is a successful no-op with `created = false`.
  fn grant_version<'a>(
    &'a self,
    version_id: Uuid,
    user_id: &'a str,
    actor: &'a User,
  ) -> impl Future<Output = Result<GrantOutcome>> + Send + 'a;

  /// Whether a grant row exists for (version, user).
  fn is_granted<'a>(
    &'a self,
    version_id: Uuid,
    user_id: &'a str,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;

  /// All version ids granted to `user_id` — used by filtering queries.
  fn granted_versions_for<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Uuid>>> + Send + 'a;

  /// Whether `user` may see `version_id`: ownership of the parent
  /// evidence, an explicit grant, or admin bypass.
  fn can_access_version<'a>(
    &'a self,
    version_id: Uuid,
    user: &'a User,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;

  // ── Audit log ─────────────────────────────────────────────────────────

  /// Read the audit log in chain (`seq`) order. Admin only. `limit` caps
  /// the result from the front of the log; pass `None` to read everything
  /// (chain verification needs the full log).
  fn list_audit<'a>(
    &'a self,
    actor: &'a User,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<AuditRecord>>> + Send + 'a;
}
