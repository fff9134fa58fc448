//! Error types for `revline-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or incomplete user input. Surfaced synchronously, before any
  /// network call is attempted.
  #[error("validation failed: {0}")]
  Validation(String),

  /// Attempted to claim a record that is already claimed by a different
  /// user. The `user_id` of a record is set-once and never reassigned.
  #[error("record {record} is already claimed by user {owner}")]
  ClaimConflict { record: Uuid, owner: Uuid },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
