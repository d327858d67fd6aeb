//! SQL schema for the Vouch SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.
//!
//! The workflow-consistency invariants that must survive races live here
//! as constraints, not in application code: one grant per (version, user),
//! one version number per (evidence, number).

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    role          TEXT NOT NULL,      -- 'buyer' | 'factory' | 'admin'
    password_hash TEXT NOT NULL,      -- argon2 PHC string; opaque here
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS evidence (
    evidence_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    doc_type    TEXT NOT NULL,
    owner       TEXT NOT NULL REFERENCES users(user_id),
    created_at  TEXT NOT NULL
);

-- Versions are immutable snapshots.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS evidence_versions (
    version_id     TEXT PRIMARY KEY,
    evidence_id    TEXT NOT NULL REFERENCES evidence(evidence_id),
    version_number INTEGER NOT NULL,
    notes          TEXT NOT NULL DEFAULT '',
    content_ref    TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    created_by     TEXT NOT NULL REFERENCES users(user_id),
    UNIQUE (evidence_id, version_number)
);

-- The grant ledger: one row per (version, user) pair, enforced here so a
-- race between two first-grants leaves exactly one row. No deletion.
CREATE TABLE IF NOT EXISTS grants (
    grant_id   TEXT PRIMARY KEY,
    version_id TEXT NOT NULL REFERENCES evidence_versions(version_id),
    user_id    TEXT NOT NULL REFERENCES users(user_id),
    granted_at TEXT NOT NULL,
    granted_by TEXT,
    UNIQUE (version_id, user_id)
);

CREATE TABLE IF NOT EXISTS requests (
    request_id TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    buyer      TEXT NOT NULL REFERENCES users(user_id),
    factory    TEXT NOT NULL REFERENCES users(user_id),
    status     TEXT NOT NULL,  -- 'pending' | 'in_progress' | 'completed' | 'cancelled'
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS request_items (
    item_id            TEXT PRIMARY KEY,
    request_id         TEXT NOT NULL REFERENCES requests(request_id),
    doc_type           TEXT NOT NULL,
    status             TEXT NOT NULL,  -- 'pending' | 'fulfilled' | 'rejected'
    fulfilling_version TEXT REFERENCES evidence_versions(version_id),
    fulfilled_by       TEXT REFERENCES users(user_id),
    fulfilled_at       TEXT,
    reject_reason      TEXT,
    created_at         TEXT NOT NULL
);

-- Strictly append-only; rows are hash-chained in seq order.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS audit_log (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id    TEXT NOT NULL UNIQUE,
    actor        TEXT,
    action       TEXT NOT NULL,
    subject_type TEXT NOT NULL,
    subject_id   TEXT NOT NULL,
    recorded_at  TEXT NOT NULL,
    metadata     TEXT NOT NULL DEFAULT '{}',
    prev_hash    TEXT NOT NULL,
    record_hash  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS evidence_owner_idx    ON evidence(owner);
CREATE INDEX IF NOT EXISTS versions_evidence_idx ON evidence_versions(evidence_id);
CREATE INDEX IF NOT EXISTS grants_user_idx       ON grants(user_id);
CREATE INDEX IF NOT EXISTS requests_buyer_idx    ON requests(buyer);
CREATE INDEX IF NOT EXISTS requests_factory_idx  ON requests(factory);
CREATE INDEX IF NOT EXISTS items_request_idx     ON request_items(request_id);

PRAGMA user_version = 1;
";
