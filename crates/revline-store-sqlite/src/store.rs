//! [`SqliteStore`] — the SQLite implementation of [`LocalStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use revline_core::store::LocalStore;

use crate::{Error, Result, schema::SCHEMA};

/// A Revline local blob store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
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

impl LocalStore for SqliteStore {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
    let key = key.to_owned();

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value_json FROM blobs WHERE key = ?1",
              rusqlite::params![key],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|s| serde_json::from_str(&s))
      .transpose()
      .map_err(Error::Json)
  }

  async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
    let key = key.to_owned();
    let value_json = value.to_string();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO blobs (key, value_json) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET
             value_json = excluded.value_json,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
          rusqlite::params![key, value_json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
