//! Error type for `revline-remote-rest`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The service answered with a non-success status.
  #[error("remote service returned {status}: {message}")]
  Api { status: u16, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
