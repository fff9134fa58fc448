//! Error type for `revline-commerce`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Rejected before any network call was attempted.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The commerce API returned user-facing errors; carries the first
  /// message. The caller owns user-visible messaging.
  #[error("checkout failed: {0}")]
  Checkout(String),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The mutation response carried neither a cart nor user errors.
  #[error("commerce API response missing cart")]
  MissingCart,

  #[error("invalid canonical checkout host: {0:?}")]
  InvalidHost(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
