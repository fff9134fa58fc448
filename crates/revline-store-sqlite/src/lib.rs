//! SQLite backend for the Revline local store.
//!
//! Plays the role the browser's local storage plays in the storefront: a
//! device-local key-value store of JSON blobs. Wraps [`tokio_rusqlite`] so
//! all database access runs on a dedicated thread without blocking the async
//! runtime.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
