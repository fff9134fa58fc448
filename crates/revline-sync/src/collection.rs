//! [`SyncedCollection`] — one owned collection kept consistent across guest
//! and authenticated identities.
//!
//! Guests read and write against the local store only; authenticated users
//! against the remote store. Every mutation is applied to the in-memory
//! state first (optimistically), then persisted best-effort. On login, the
//! rescue/claim pass migrates guest-created local records into the remote
//! store, stamped with the new user id.

use std::{collections::HashSet, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use revline_core::{
  identity::{Identity, SessionId, UserId},
  record::{Collection, OwnedRecord, RemoteRecord},
  store::{LocalStore, RemoteStore},
};

/// Remote calls are bounded rather than allowed to hang; a timeout is logged
/// and treated like any other remote failure.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Optimistic in-memory updates are never rolled back when the backing
/// remote write fails. This sync is best-effort storefront state, not a
/// ledger of record: failed writes are logged and the affected records stay
/// eligible for rescue on a later login.
pub const ROLL_BACK_ON_REMOTE_FAILURE: bool = false;

/// Loading phase of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
  Uninitialized,
  LoadingLocal,
  LoadingRemote,
  Ready,
}

/// A remote mutation queued for the collection's writer task. All mutations
/// are id-keyed upserts or deletes, so replaying the queue in issue order
/// always converges the remote on the in-memory state.
enum RemoteWrite {
  Upsert(RemoteRecord),
  Delete(Uuid),
}

struct Inner<P> {
  phase:      SyncPhase,
  identity:   Identity,
  records:    Vec<OwnedRecord<P>>,
  /// Bumped on every identity change. A load captures the generation at
  /// dispatch and discards its result if a newer identity change has
  /// happened by the time it resolves.
  generation: u64,
  /// Ids written while a load is in flight. The load commit preserves the
  /// in-memory version of every touched id, including removals, instead of
  /// clobbering them with the (older) load result.
  touched:    HashSet<Uuid>,
}

impl<P: Clone> Inner<P> {
  /// Install a load result as the in-memory state.
  fn commit(&mut self, loaded: Vec<OwnedRecord<P>>) {
    if self.touched.is_empty() {
      self.records = loaded;
    } else {
      let mut merged = Vec::with_capacity(loaded.len());
      for record in loaded {
        if self.touched.contains(&record.id) {
          // In-memory wins; absence means the record was removed mid-load.
          if let Some(current) = self.records.iter().find(|r| r.id == record.id) {
            merged.push(current.clone());
          }
        } else {
          merged.push(record);
        }
      }
      for record in &self.records {
        if self.touched.contains(&record.id) && merged.iter().all(|r| r.id != record.id) {
          merged.push(record.clone());
        }
      }
      self.records = merged;
    }
    self.touched.clear();
    self.phase = SyncPhase::Ready;
  }
}

/// One owned collection (garage, orders, or appointments), generic over the
/// local and remote storage backends.
///
/// The in-memory state is guarded by a single mutex, which preserves the
/// read-after-optimistic-write ordering guarantee: records appear in the
/// order the originating calls were issued, regardless of when (or whether)
/// their remote persistence resolves.
pub struct SyncedCollection<P, L, R> {
  kind:   Collection,
  local:  Arc<L>,
  remote: Arc<R>,
  writes: mpsc::UnboundedSender<RemoteWrite>,
  inner:  Mutex<Inner<P>>,
}

impl<P, L, R> SyncedCollection<P, L, R>
where
  P: Clone + Serialize + DeserializeOwned + Send + 'static,
  L: LocalStore,
  R: RemoteStore + 'static,
{
  pub fn new(kind: Collection, session_id: SessionId, local: Arc<L>, remote: Arc<R>) -> Self {
    Self {
      kind,
      local,
      writes: Self::spawn_writer(kind, remote.clone()),
      remote,
      inner: Mutex::new(Inner {
        phase:      SyncPhase::Uninitialized,
        identity:   Identity::Guest { session_id },
        records:    Vec::new(),
        generation: 0,
        touched:    HashSet::new(),
      }),
    }
  }

  pub fn kind(&self) -> Collection {
    self.kind
  }

  pub async fn phase(&self) -> SyncPhase {
    self.inner.lock().await.phase
  }

  pub async fn identity(&self) -> Identity {
    self.inner.lock().await.identity
  }

  // ── Identity transitions ──────────────────────────────────────────────────

  /// Apply an identity change and (re)load the collection for it.
  ///
  /// Guests load the local snapshot; authenticated users fetch their remote
  /// records and then run the rescue/claim pass. Logout falls back to the
  /// unchanged local store contents.
  pub async fn set_identity(&self, identity: Identity) {
    let generation = {
      let mut inner = self.inner.lock().await;
      inner.generation += 1;
      inner.touched.clear();
      inner.phase = if identity.is_authenticated() {
        SyncPhase::LoadingRemote
      } else {
        SyncPhase::LoadingLocal
      };
      inner.identity = identity;
      inner.generation
    };

    match identity {
      Identity::Account { user_id, .. } => self.load_remote(generation, user_id).await,
      Identity::Guest { .. } => self.load_local(generation).await,
    }
  }

  async fn load_local(&self, generation: u64) {
    let records = self.read_local_snapshot().await;

    let mut inner = self.inner.lock().await;
    if inner.generation != generation {
      debug!(collection = self.kind.table(), "discarding stale local load");
      return;
    }
    inner.commit(records);
  }

  async fn load_remote(&self, generation: u64, user_id: UserId) {
    let rows = match tokio::time::timeout(
      REMOTE_TIMEOUT,
      self.remote.select_by_user(self.kind, user_id),
    )
    .await
    {
      Ok(Ok(rows)) => rows,
      Ok(Err(err)) => {
        // Fall back to an empty set rather than blocking the UI.
        warn!(collection = self.kind.table(), %err, "remote fetch failed; falling back to empty");
        Vec::new()
      }
      Err(_) => {
        warn!(collection = self.kind.table(), "remote fetch timed out; falling back to empty");
        Vec::new()
      }
    };

    let mut records: Vec<OwnedRecord<P>> = Vec::with_capacity(rows.len());
    for row in rows {
      match OwnedRecord::from_remote(row) {
        Ok(record) => records.push(record),
        Err(err) => {
          warn!(collection = self.kind.table(), %err, "skipping malformed remote row")
        }
      }
    }

    // A superseding identity change makes both the fetch result and the
    // rescue pass moot; bail before doing any more work.
    if self.inner.lock().await.generation != generation {
      debug!(collection = self.kind.table(), "discarding stale remote load");
      return;
    }

    let rescued = self.rescue(user_id, &records).await;
    records.extend(rescued);

    let mut inner = self.inner.lock().await;
    if inner.generation != generation {
      debug!(collection = self.kind.table(), "discarding stale remote load");
      return;
    }
    inner.commit(records);
  }

  // ── Rescue/claim ──────────────────────────────────────────────────────────

  /// Migrate guest-created local records to the newly authenticated user.
  ///
  /// Every local record whose id is not already present remotely is stamped
  /// with `user_id` and upserted using its existing id as the idempotency
  /// key — running this twice with the same state changes nothing. Upsert
  /// failures are logged and leave the record eligible for rescue on a
  /// subsequent login.
  async fn rescue(
    &self,
    user_id: UserId,
    remote_records: &[OwnedRecord<P>],
  ) -> Vec<OwnedRecord<P>> {
    let snapshot = self.read_local_snapshot().await;
    let known: HashSet<Uuid> = remote_records.iter().map(|r| r.id).collect();

    let mut rescued = Vec::new();
    for mut record in snapshot {
      if known.contains(&record.id) {
        continue;
      }
      if let Err(err) = record.claim(user_id) {
        // Claimed by a different account on this device; leave it alone.
        warn!(collection = self.kind.table(), %err, "skipping record owned by another user");
        continue;
      }
      let row = match record.to_remote() {
        Ok(row) => row,
        Err(err) => {
          warn!(collection = self.kind.table(), %err, "skipping unserialisable local record");
          continue;
        }
      };

      match tokio::time::timeout(REMOTE_TIMEOUT, self.remote.upsert(self.kind, row)).await {
        Ok(Ok(())) => rescued.push(record),
        Ok(Err(err)) => warn!(
          collection = self.kind.table(),
          id = %record.id,
          %err,
          "rescue upsert failed; record stays local until the next login"
        ),
        Err(_) => warn!(
          collection = self.kind.table(),
          id = %record.id,
          "rescue upsert timed out; record stays local until the next login"
        ),
      }
    }
    rescued
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Create a new record owned by the current identity.
  ///
  /// The in-memory insert happens before this returns; remote persistence
  /// (when authenticated) is fire-and-forget from the caller's perspective,
  /// with failures logged. Guest creates are mirrored to the local store.
  pub async fn create(&self, payload: P) -> OwnedRecord<P> {
    let (record, authenticated) = {
      let mut inner = self.inner.lock().await;
      let mut record = OwnedRecord::new(inner.identity.session_id(), payload);
      if let Some(user_id) = inner.identity.user_id() {
        record.user_id = Some(user_id);
      }
      inner.records.push(record.clone());
      if inner.phase != SyncPhase::Ready {
        inner.touched.insert(record.id);
      }
      let authenticated = inner.identity.is_authenticated();
      if authenticated {
        self.enqueue_upsert(&record);
      }
      (record, authenticated)
    };

    if !authenticated {
      self.mirror_local().await;
    }
    record
  }

  /// Mutate the payload of the record with `id` (status changes and the
  /// like). Returns `false` if no such record is in memory.
  ///
  /// Applied optimistically in memory first, then propagated: a remote
  /// upsert when authenticated, a whole-collection local mirror when guest.
  pub async fn update(&self, id: Uuid, mutate: impl FnOnce(&mut P)) -> bool {
    let authenticated = {
      let mut inner = self.inner.lock().await;
      let authenticated = inner.identity.is_authenticated();
      let updated = inner.records.iter_mut().find(|r| r.id == id).map(|record| {
        mutate(&mut record.payload);
        record.clone()
      });

      let Some(record) = updated else {
        return false;
      };
      if inner.phase != SyncPhase::Ready {
        inner.touched.insert(record.id);
      }
      if authenticated {
        self.enqueue_upsert(&record);
      }
      authenticated
    };

    if !authenticated {
      self.mirror_local().await;
    }
    true
  }

  /// Remove the record with `id`. Returns `false` if it was not in memory.
  pub async fn remove(&self, id: Uuid) -> bool {
    let (removed, authenticated) = {
      let mut inner = self.inner.lock().await;
      let authenticated = inner.identity.is_authenticated();
      let before = inner.records.len();
      inner.records.retain(|r| r.id != id);
      let removed = inner.records.len() != before;
      if removed {
        if inner.phase != SyncPhase::Ready {
          inner.touched.insert(id);
        }
        if authenticated {
          self.enqueue(RemoteWrite::Delete(id));
        }
      }
      (removed, authenticated)
    };

    if !removed {
      return false;
    }

    if !authenticated {
      self.mirror_local().await;
    }
    true
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// The records visible to the current identity, in creation order:
  /// claimed by the current user, or created under the current session.
  pub async fn records(&self) -> Vec<OwnedRecord<P>> {
    let inner = self.inner.lock().await;
    inner
      .records
      .iter()
      .filter(|r| r.visible_to(&inner.identity))
      .cloned()
      .collect()
  }

  // ── Persistence effects ───────────────────────────────────────────────────

  /// Persistent-effect mirror: writes the whole in-memory collection back to
  /// the local store. Not incremental.
  async fn mirror_local(&self) {
    let snapshot = self.inner.lock().await.records.clone();
    let value = match serde_json::to_value(&snapshot) {
      Ok(value) => value,
      Err(err) => {
        warn!(collection = self.kind.table(), %err, "cannot serialise local mirror");
        return;
      }
    };
    if let Err(err) = self.local.put(self.kind.local_key(), value).await {
      warn!(collection = self.kind.table(), %err, "local mirror write failed");
    }
  }

  async fn read_local_snapshot(&self) -> Vec<OwnedRecord<P>> {
    match self.local.get(self.kind.local_key()).await {
      Ok(Some(value)) => match serde_json::from_value(value) {
        Ok(records) => records,
        Err(err) => {
          warn!(collection = self.kind.table(), %err, "local snapshot is malformed; treating as empty");
          Vec::new()
        }
      },
      Ok(None) => Vec::new(),
      Err(err) => {
        warn!(collection = self.kind.table(), %err, "local read failed; treating as empty");
        Vec::new()
      }
    }
  }

  /// One writer task per collection drains the queue sequentially, so
  /// remote rows are written in the order the mutations were issued. Each
  /// mutation is an id-keyed upsert or delete: a payload written out of
  /// order would silently lose the later state, a replay in order cannot.
  /// The task ends when the collection (the only sender) is dropped.
  fn spawn_writer(kind: Collection, remote: Arc<R>) -> mpsc::UnboundedSender<RemoteWrite> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
      while let Some(write) = rx.recv().await {
        match write {
          RemoteWrite::Upsert(row) => {
            let id = row.id;
            match tokio::time::timeout(REMOTE_TIMEOUT, remote.upsert(kind, row)).await {
              Ok(Ok(())) => {}
              Ok(Err(err)) => {
                warn!(collection = kind.table(), %id, %err, "remote upsert failed; keeping optimistic state")
              }
              Err(_) => {
                warn!(collection = kind.table(), %id, "remote upsert timed out; keeping optimistic state")
              }
            }
          }
          RemoteWrite::Delete(id) => {
            match tokio::time::timeout(REMOTE_TIMEOUT, remote.delete(kind, id)).await {
              Ok(Ok(())) => {}
              Ok(Err(err)) => {
                warn!(collection = kind.table(), %id, %err, "remote delete failed; keeping optimistic state")
              }
              Err(_) => {
                warn!(collection = kind.table(), %id, "remote delete timed out; keeping optimistic state")
              }
            }
          }
        }
      }
    });
    tx
  }

  fn enqueue_upsert(&self, record: &OwnedRecord<P>) {
    match record.to_remote() {
      Ok(row) => self.enqueue(RemoteWrite::Upsert(row)),
      Err(err) => {
        warn!(collection = self.kind.table(), %err, "cannot serialise record for remote write")
      }
    }
  }

  fn enqueue(&self, write: RemoteWrite) {
    // Send only fails once the writer task is gone (runtime shutdown).
    let _ = self.writes.send(write);
  }
}
