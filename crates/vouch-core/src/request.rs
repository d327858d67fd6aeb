//! Requests, request items, and the fulfillment state machine.
//!
//! Transition legality lives in the explicit tables below
//! ([`RequestStatus::can_transition_to`], [`ItemStatus::can_transition_to`])
//! rather than in ad hoc field checks at call sites. Storage backends
//! validate every transition through these functions and reject all other
//! (from, to) pairs uniformly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Request status ──────────────────────────────────────────────────────────

/// Lifecycle status of a [`Request`]. `Completed` and `Cancelled` are
/// terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
  Pending,
  InProgress,
  Completed,
  Cancelled,
}

impl RequestStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Cancelled)
  }

  /// The full set of legal request transitions. Everything else is
  /// rejected as an invalid state change.
  pub fn can_transition_to(self, next: Self) -> bool {
    matches!(
      (self, next),
      (Self::Pending, Self::InProgress)
        | (Self::Pending, Self::Completed)
        | (Self::Pending, Self::Cancelled)
        | (Self::InProgress, Self::Completed)
        | (Self::InProgress, Self::Cancelled)
    )
  }
}

// ─── Item status ─────────────────────────────────────────────────────────────

/// Lifecycle status of a [`RequestItem`]. `Fulfilled` and `Rejected` are
/// both terminal per item; a second fulfill or reject call on a terminal
/// item fails with a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
  Pending,
  Fulfilled,
  Rejected,
}

impl ItemStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Fulfilled | Self::Rejected)
  }

  pub fn can_transition_to(self, next: Self) -> bool {
    matches!(
      (self, next),
      (Self::Pending, Self::Fulfilled) | (Self::Pending, Self::Rejected)
    )
  }
}

// ─── Status recomputation ────────────────────────────────────────────────────

/// Recompute a request's status after one of its items changed.
///
/// All items terminal → `Completed`. This includes the all-rejected,
/// zero-fulfilled case: such a request is completed with zero artifacts.
/// Any item terminal while others still pend → `InProgress`. Terminal
/// request statuses are never recomputed away.
pub fn recompute_status(
  current: RequestStatus,
  items: &[ItemStatus],
) -> RequestStatus {
  if current.is_terminal() {
    return current;
  }
  if !items.is_empty() && items.iter().all(|s| s.is_terminal()) {
    RequestStatus::Completed
  } else if items.iter().any(|s| s.is_terminal()) {
    RequestStatus::InProgress
  } else {
    current
  }
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// An intent by a buyer, addressed to one factory, carrying an ordered
/// collection of requested document types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  pub request_id: Uuid,
  pub title:      String,
  /// `user_id` of the requesting buyer.
  pub buyer:      String,
  /// `user_id` of the factory the request is addressed to.
  pub factory:    String,
  pub status:     RequestStatus,
  pub created_at: DateTime<Utc>,
  pub items:      Vec<RequestItem>,
}

/// One requested document type within a request. The fulfilling version,
/// once set, is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestItem {
  pub item_id:            Uuid,
  pub request_id:         Uuid,
  pub doc_type:           String,
  pub status:             ItemStatus,
  /// Set exactly when `status` is `Fulfilled`.
  pub fulfilling_version: Option<Uuid>,
  pub fulfilled_by:       Option<String>,
  pub fulfilled_at:       Option<DateTime<Utc>>,
  /// Set exactly when `status` is `Rejected`; always non-empty.
  pub reject_reason:      Option<String>,
  pub created_at:         DateTime<Utc>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::ComplianceStore::create_request`]. The buyer is
/// taken from the acting user; all items start `Pending`.
#[derive(Debug, Clone)]
pub struct NewRequest {
  pub title:   String,
  /// `user_id` of the factory the request is addressed to.
  pub factory: String,
  pub items:   Vec<NewRequestItem>,
}

#[derive(Debug, Clone)]
pub struct NewRequestItem {
  pub doc_type: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn terminal_request_statuses_admit_no_transition() {
    for terminal in [RequestStatus::Completed, RequestStatus::Cancelled] {
      for next in [
        RequestStatus::Pending,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
      ] {
        assert!(!terminal.can_transition_to(next));
      }
    }
  }

  #[test]
  fn pending_request_may_cancel_or_progress() {
    assert!(RequestStatus::Pending.can_transition_to(RequestStatus::InProgress));
    assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Cancelled));
    assert!(RequestStatus::InProgress.can_transition_to(RequestStatus::Completed));
    assert!(!RequestStatus::InProgress.can_transition_to(RequestStatus::Pending));
  }

  #[test]
  fn item_transitions_are_pending_to_terminal_only() {
    assert!(ItemStatus::Pending.can_transition_to(ItemStatus::Fulfilled));
    assert!(ItemStatus::Pending.can_transition_to(ItemStatus::Rejected));
    assert!(!ItemStatus::Fulfilled.can_transition_to(ItemStatus::Rejected));
    assert!(!ItemStatus::Rejected.can_transition_to(ItemStatus::Fulfilled));
    assert!(!ItemStatus::Fulfilled.can_transition_to(ItemStatus::Fulfilled));
  }

  #[test]
  fn recompute_moves_to_in_progress_on_first_terminal_item() {
    let items = [ItemStatus::Fulfilled, ItemStatus::Pending];
    assert_eq!(
      recompute_status(RequestStatus::Pending, &items),
      RequestStatus::InProgress
    );
  }

  #[test]
  fn recompute_completes_when_all_items_terminal() {
    let items = [ItemStatus::Fulfilled, ItemStatus::Rejected];
    assert_eq!(
      recompute_status(RequestStatus::InProgress, &items),
      RequestStatus::Completed
    );
  }

  #[test]
  fn recompute_completes_all_rejected_request() {
    // Completed with zero artifacts.
    let items = [ItemStatus::Rejected, ItemStatus::Rejected];
    assert_eq!(
      recompute_status(RequestStatus::InProgress, &items),
      RequestStatus::Completed
    );
  }

  #[test]
  fn recompute_never_leaves_terminal_statuses() {
    let items = [ItemStatus::Pending];
    assert_eq!(
      recompute_status(RequestStatus::Cancelled, &items),
      RequestStatus::Cancelled
    );
    assert_eq!(
      recompute_status(RequestStatus::Completed, &items),
      RequestStatus::Completed
    );
  }

  #[test]
  fn recompute_leaves_all_pending_untouched() {
    let items = [ItemStatus::Pending, ItemStatus::Pending];
    assert_eq!(
      recompute_status(RequestStatus::Pending, &items),
      RequestStatus::Pending
    );
  }
}
