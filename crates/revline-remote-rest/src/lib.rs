//! REST backend for the Revline remote store.
//!
//! Implements [`revline_core::store::RemoteStore`] against a row-oriented
//! backend-as-a-service (PostgREST dialect): rows are selected with
//! `user_id=eq.<uuid>` filters and upserted by primary key, which keeps every
//! write idempotent.

mod client;

pub mod error;

pub use client::{RemoteConfig, RestRemoteStore};
pub use error::{Error, Result};
