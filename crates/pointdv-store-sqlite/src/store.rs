//! [`SqliteTokenStore`]: the SQLite implementation of [`TokenStore`].

use std::path::Path;

use chrono::Utc;
use pointdv_core::TokenStore;
use rusqlite::OptionalExtension as _;
use tracing::debug;

use crate::{Error, Result, schema::SCHEMA};

/// A single-slot credential store backed by one SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteTokenStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteTokenStore {
  /// Open (or create) a store at `path`, creating parent directories.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
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
      .await?;
    Ok(())
  }
}

// ─── TokenStore impl ─────────────────────────────────────────────────────────

impl TokenStore for SqliteTokenStore {
  type Error = Error;

  async fn get(&self) -> Result<Option<String>> {
    let value = self
      .conn
      .call(|conn| {
        let value: Option<String> = conn
          .query_row("SELECT value FROM credential_slot WHERE slot = 0", [], |row| row.get(0))
          .optional()?;
        Ok(value)
      })
      .await?;
    Ok(value)
  }

  async fn set(&self, value: &str) -> Result<()> {
    let value = value.to_owned();
    let written_at = Utc::now().to_rfc3339();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO credential_slot (slot, value, written_at) VALUES (0, ?1, ?2)
           ON CONFLICT (slot) DO UPDATE SET value = excluded.value, written_at = excluded.written_at",
          rusqlite::params![value, written_at],
        )?;
        Ok(())
      })
      .await?;
    debug!("credential slot written");
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    let removed = self
      .conn
      .call(|conn| Ok(conn.execute("DELETE FROM credential_slot", [])?))
      .await?;
    debug!(removed, "credential slot cleared");
    Ok(())
  }
}
