//! The `LocalStore` and `RemoteStore` traits.
//!
//! Implemented by storage backends (`revline-store-sqlite`,
//! `revline-remote-rest`). The reconciliation flow depends on these
//! abstractions, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  identity::UserId,
  record::{Collection, RemoteRecord},
};

/// Device-local key-value store of JSON blobs.
///
/// Guest data lives here exclusively. It is device-local by design and is
/// never synced across devices.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait LocalStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read the blob stored under `key`; `None` if the key was never written.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<serde_json::Value>, Self::Error>> + Send + 'a;

  /// Overwrite the blob stored under `key`.
  fn put<'a>(
    &'a self,
    key: &'a str,
    value: serde_json::Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Row-oriented remote persistence, filterable by user.
///
/// All writes are id-keyed: `upsert` carries the full row and inserts or
/// replaces by primary id, so a re-run of the claim migration can never
/// duplicate a record, and payload changes ride the same operation as
/// creation.
pub trait RemoteStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// All rows of `collection` claimed by `user_id`.
  fn select_by_user(
    &self,
    collection: Collection,
    user_id: UserId,
  ) -> impl Future<Output = Result<Vec<RemoteRecord>, Self::Error>> + Send + '_;

  /// Insert-or-replace keyed by `row.id`.
  fn upsert(
    &self,
    collection: Collection,
    row: RemoteRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete the row with primary id `id`, if present.
  fn delete(
    &self,
    collection: Collection,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
