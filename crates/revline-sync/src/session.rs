//! Session-id provisioning.
//!
//! The session id is generated once per device, persisted under a fixed key
//! in the local store, and reused forever after. It is stable across logins
//! and logouts; guest records are traced back to their device through it.

use tracing::warn;

use revline_core::{identity::SessionId, store::LocalStore};

/// Local-store key holding the persisted session id.
pub const SESSION_KEY: &str = "revline_session";

/// Load the persisted session id, or generate and persist a new one.
///
/// A failing local store degrades to an ephemeral session id: records
/// created under it are still visible and rescuable within the current run,
/// they just won't survive a restart.
pub async fn load_or_create<L: LocalStore>(local: &L) -> SessionId {
  match local.get(SESSION_KEY).await {
    Ok(Some(value)) => match serde_json::from_value::<SessionId>(value) {
      Ok(id) => return id,
      Err(err) => warn!(%err, "stored session id is malformed; regenerating"),
    },
    Ok(None) => {}
    Err(err) => warn!(%err, "local store read failed while loading session id"),
  }

  let id = SessionId::generate();
  if let Err(err) = local.put(SESSION_KEY, serde_json::json!(id)).await {
    warn!(%err, "failed to persist new session id");
  }
  id
}
