//! Identity — who owns a record: a device-local guest session, optionally
//! upgraded to an authenticated account.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A browser/device-scoped session identifier.
///
/// Generated once per device, persisted indefinitely in the local store, and
/// stable across logins and logouts. Guest records are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
  pub fn generate() -> Self {
    Self(Uuid::new_v4())
  }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// An authenticated user id, issued by the external identity provider.
/// Exists only while authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// The current identity. Always session-scoped; additionally user-scoped
/// while authenticated. The session id does not change on login or logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
  Guest { session_id: SessionId },
  Account { session_id: SessionId, user_id: UserId },
}

impl Identity {
  pub fn session_id(&self) -> SessionId {
    match self {
      Self::Guest { session_id } | Self::Account { session_id, .. } => *session_id,
    }
  }

  pub fn user_id(&self) -> Option<UserId> {
    match self {
      Self::Guest { .. } => None,
      Self::Account { user_id, .. } => Some(*user_id),
    }
  }

  pub fn is_authenticated(&self) -> bool {
    matches!(self, Self::Account { .. })
  }
}
