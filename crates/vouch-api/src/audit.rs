//! Handlers for `/api/audit` endpoints. Admin only.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/audit` | Optional `?limit=`; records in chain order |
//! | `GET`  | `/api/audit/verify` | Recomputes the hash chain |

use axum::{
  Json,
  extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use vouch_core::{
  audit::{AuditRecord, ChainBreak, verify_chain},
  store::ComplianceStore,
};

use crate::{AppState, auth::Identity, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit: Option<usize>,
}

/// `GET /api/audit[?limit=n]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AuditRecord>>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  Ok(Json(state.store.list_audit(&user, params.limit).await?))
}

/// Outcome of a chain verification pass.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
  pub records: usize,
  pub intact:  bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub broken:  Option<ChainBreak>,
}

/// `GET /api/audit/verify`
pub async fn verify<S>(
  State(state): State<AppState<S>>,
  Identity(user): Identity,
) -> Result<Json<VerifyReport>, ApiError>
where
  S: ComplianceStore + Clone + Send + Sync + 'static,
{
  let records = state.store.list_audit(&user, None).await?;
  let outcome = verify_chain(&records);
  Ok(Json(VerifyReport {
    records: records.len(),
    intact:  outcome.is_ok(),
    broken:  outcome.err(),
  }))
}
