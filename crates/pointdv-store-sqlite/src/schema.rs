//! SQL schema for the credential store.

/// Idempotent DDL, run on every open.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- At most one row: the persisted credential of the signed-in account.
CREATE TABLE IF NOT EXISTS credential_slot (
    slot        INTEGER PRIMARY KEY CHECK (slot = 0),
    value       TEXT NOT NULL,   -- opaque to the store
    written_at  TEXT NOT NULL    -- ISO 8601 UTC
);
";
