//! Guest/account reconciliation for the Revline storefront.
//!
//! Keeps the garage, order, and appointment collections consistent across an
//! anonymous session-scoped identity (backed by the local store) and an
//! authenticated identity (backed by the remote store), including the
//! one-time rescue/claim migration of guest records when a guest logs in or
//! registers.

pub mod collection;
pub mod reconciler;
pub mod session;

pub use collection::{
  REMOTE_TIMEOUT, ROLL_BACK_ON_REMOTE_FAILURE, SyncPhase, SyncedCollection,
};
pub use reconciler::Reconciler;

#[cfg(test)]
mod tests;
