//! Owned records — the envelope shared by garage entries, orders, and
//! appointments, plus the untyped row shape used at the remote boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
  Error, Result,
  identity::{Identity, SessionId, UserId},
};

// ─── Collections ─────────────────────────────────────────────────────────────

/// The three owned collections kept consistent across identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Garage,
  Orders,
  Appointments,
}

impl Collection {
  /// Table name on the remote persistence service.
  pub fn table(self) -> &'static str {
    match self {
      Self::Garage => "vehicles",
      Self::Orders => "orders",
      Self::Appointments => "appointments",
    }
  }

  /// Namespaced key for the whole-collection blob in the local store.
  pub fn local_key(self) -> &'static str {
    match self {
      Self::Garage => "revline_garage",
      Self::Orders => "revline_orders",
      Self::Appointments => "revline_appointments",
    }
  }
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// A record owned by a session and, once claimed, by a user.
///
/// Records belong to a session always. `user_id` is set-once: absent while
/// created as a guest, stamped during the claim migration or at creation time
/// while authenticated, and never cleared or reassigned afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedRecord<P> {
  pub id:         Uuid,
  pub session_id: SessionId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id:    Option<UserId>,
  pub created_at: DateTime<Utc>,
  #[serde(flatten)]
  pub payload:    P,
}

impl<P> OwnedRecord<P> {
  /// A new unclaimed record owned by `session_id`, with a freshly generated
  /// UUID as its identity and idempotency key.
  pub fn new(session_id: SessionId, payload: P) -> Self {
    Self {
      id: Uuid::new_v4(),
      session_id,
      user_id: None,
      created_at: Utc::now(),
      payload,
    }
  }

  /// Stamp the claiming user. Idempotent for the same user; refuses to
  /// reassign a record already claimed by a different one.
  pub fn claim(&mut self, user_id: UserId) -> Result<()> {
    match self.user_id {
      None => {
        self.user_id = Some(user_id);
        Ok(())
      }
      Some(owner) if owner == user_id => Ok(()),
      Some(owner) => Err(Error::ClaimConflict { record: self.id, owner: owner.0 }),
    }
  }

  /// Whether `identity` may see this record: claimed by the current user, or
  /// created under the current session.
  ///
  /// The session arm means a freshly-authenticated user still sees records
  /// tagged only with their session, before and without claiming.
  pub fn visible_to(&self, identity: &Identity) -> bool {
    if self.session_id == identity.session_id() {
      return true;
    }
    match identity.user_id() {
      Some(user_id) => self.user_id == Some(user_id),
      None => false,
    }
  }
}

// ─── Remote row shape ────────────────────────────────────────────────────────

/// The untyped row shape exchanged with the remote persistence service.
///
/// Payload fields ride as raw JSON. Typing happens exactly once, at this
/// boundary, via [`OwnedRecord::to_remote`] and [`OwnedRecord::from_remote`];
/// everything above operates on the typed payloads only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
  pub id:         Uuid,
  pub session_id: SessionId,
  #[serde(default)]
  pub user_id:    Option<UserId>,
  pub created_at: DateTime<Utc>,
  pub payload:    serde_json::Value,
}

impl<P: Serialize> OwnedRecord<P> {
  pub fn to_remote(&self) -> Result<RemoteRecord> {
    Ok(RemoteRecord {
      id:         self.id,
      session_id: self.session_id,
      user_id:    self.user_id,
      created_at: self.created_at,
      payload:    serde_json::to_value(&self.payload)?,
    })
  }
}

impl<P: DeserializeOwned> OwnedRecord<P> {
  pub fn from_remote(row: RemoteRecord) -> Result<Self> {
    Ok(Self {
      id:         row.id,
      session_id: row.session_id,
      user_id:    row.user_id,
      created_at: row.created_at,
      payload:    serde_json::from_value(row.payload)?,
    })
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
