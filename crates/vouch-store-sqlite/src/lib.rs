//! SQLite backend for the Vouch compliance store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every mutating operation is
//! one SQLite transaction: the state transition, the grant ledger write,
//! and the audit appends land together or not at all.

mod encode;
mod schema;
mod store;

pub use store::SqliteStore;
