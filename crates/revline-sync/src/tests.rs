//! Integration tests for the reconciliation flow, driven through the real
//! SQLite local store and an in-memory remote fake.

use std::{
  collections::HashMap,
  future::Future,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use thiserror::Error;
use tokio::sync::{Notify, Semaphore, watch};
use uuid::Uuid;

use revline_core::{
  history::{
    Appointment, AppointmentStatus, BookingConfirmed, Order, OrderLine, OrderStatus,
  },
  identity::{Identity, SessionId, UserId},
  record::{Collection, OwnedRecord, RemoteRecord},
  store::{LocalStore, RemoteStore},
  vehicle::Vehicle,
};
use revline_store_sqlite::SqliteStore;

use crate::{Reconciler, SyncPhase, SyncedCollection, session};

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("fake remote failure")]
struct FakeRemoteError;

/// In-memory [`RemoteStore`] with switchable write failures and an upsert
/// counter for idempotence assertions.
#[derive(Default)]
struct MemoryRemote {
  rows:        Mutex<HashMap<(Collection, Uuid), RemoteRecord>>,
  fail_writes: AtomicBool,
  upserts:     AtomicUsize,
}

impl MemoryRemote {
  fn row_count(&self, collection: Collection) -> usize {
    self
      .rows
      .lock()
      .unwrap()
      .keys()
      .filter(|(c, _)| *c == collection)
      .count()
  }

  fn row(&self, collection: Collection, id: Uuid) -> Option<RemoteRecord> {
    self.rows.lock().unwrap().get(&(collection, id)).cloned()
  }

  fn seed(&self, collection: Collection, row: RemoteRecord) {
    self.rows.lock().unwrap().insert((collection, row.id), row);
  }

  fn set_fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }
}

impl RemoteStore for MemoryRemote {
  type Error = FakeRemoteError;

  async fn select_by_user(
    &self,
    collection: Collection,
    user_id: UserId,
  ) -> Result<Vec<RemoteRecord>, FakeRemoteError> {
    let rows = self.rows.lock().unwrap();
    Ok(
      rows
        .iter()
        .filter(|((c, _), row)| *c == collection && row.user_id == Some(user_id))
        .map(|(_, row)| row.clone())
        .collect(),
    )
  }

  async fn upsert(
    &self,
    collection: Collection,
    row: RemoteRecord,
  ) -> Result<(), FakeRemoteError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(FakeRemoteError);
    }
    self.upserts.fetch_add(1, Ordering::SeqCst);
    self.rows.lock().unwrap().insert((collection, row.id), row);
    Ok(())
  }

  async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), FakeRemoteError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(FakeRemoteError);
    }
    self.rows.lock().unwrap().remove(&(collection, id));
    Ok(())
  }
}

/// Remote whose reads block until released — used to race an identity change
/// against an in-flight fetch.
#[derive(Default)]
struct BlockedRemote {
  release: Notify,
  inner:   MemoryRemote,
}

impl RemoteStore for BlockedRemote {
  type Error = FakeRemoteError;

  async fn select_by_user(
    &self,
    collection: Collection,
    user_id: UserId,
  ) -> Result<Vec<RemoteRecord>, FakeRemoteError> {
    self.release.notified().await;
    self.inner.select_by_user(collection, user_id).await
  }

  async fn upsert(
    &self,
    collection: Collection,
    row: RemoteRecord,
  ) -> Result<(), FakeRemoteError> {
    self.inner.upsert(collection, row).await
  }

  async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), FakeRemoteError> {
    self.inner.delete(collection, id).await
  }
}

/// Remote whose writes each consume a permit — used to hold queued writes
/// back and release them at a chosen point.
struct GatedWriteRemote {
  gate:  Semaphore,
  inner: MemoryRemote,
}

impl Default for GatedWriteRemote {
  fn default() -> Self {
    Self { gate: Semaphore::new(0), inner: MemoryRemote::default() }
  }
}

impl RemoteStore for GatedWriteRemote {
  type Error = FakeRemoteError;

  async fn select_by_user(
    &self,
    collection: Collection,
    user_id: UserId,
  ) -> Result<Vec<RemoteRecord>, FakeRemoteError> {
    self.inner.select_by_user(collection, user_id).await
  }

  async fn upsert(
    &self,
    collection: Collection,
    row: RemoteRecord,
  ) -> Result<(), FakeRemoteError> {
    self.gate.acquire().await.unwrap().forget();
    self.inner.upsert(collection, row).await
  }

  async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), FakeRemoteError> {
    self.gate.acquire().await.unwrap().forget();
    self.inner.delete(collection, id).await
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn vehicle(make: &str) -> Vehicle {
  Vehicle {
    id:      Vehicle::derive_id(make, "M3", 2020),
    make:    make.into(),
    model:   "M3".into(),
    year:    2020,
    engine:  "S58".into(),
    trim:    None,
    variant: None,
  }
}

async fn local_store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

fn garage(
  session: SessionId,
  local: Arc<SqliteStore>,
  remote: Arc<MemoryRemote>,
) -> SyncedCollection<Vehicle, SqliteStore, MemoryRemote> {
  SyncedCollection::new(Collection::Garage, session, local, remote)
}

fn guest(session: SessionId) -> Identity {
  Identity::Guest { session_id: session }
}

fn account(session: SessionId, user: UserId) -> Identity {
  Identity::Account { session_id: session, user_id: user }
}

/// Poll until `check` holds — spawned remote writes resolve asynchronously.
async fn eventually(mut check: impl FnMut() -> bool) {
  for _ in 0..200 {
    if check() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("condition not met within 1s");
}

// ─── Guest mode ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn guest_create_is_visible_and_mirrored_locally() {
  let session = SessionId::generate();
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local.clone(), remote.clone());

  assert_eq!(col.phase().await, SyncPhase::Uninitialized);
  col.set_identity(guest(session)).await;
  assert_eq!(col.phase().await, SyncPhase::Ready);

  let record = col.create(vehicle("BMW")).await;
  assert!(record.user_id.is_none());
  assert_eq!(record.session_id, session);

  let records = col.records().await;
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].id, record.id);

  // Nothing remote; full collection mirrored into the local blob.
  assert_eq!(remote.row_count(Collection::Garage), 0);
  let blob = local.get("revline_garage").await.unwrap().unwrap();
  assert_eq!(blob.as_array().unwrap().len(), 1);
  assert_eq!(blob[0]["id"], serde_json::json!(record.id.to_string()));
}

#[tokio::test]
async fn guest_records_survive_reload() {
  let session = SessionId::generate();
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());

  let first = garage(session, local.clone(), remote.clone());
  first.set_identity(guest(session)).await;
  let record = first.create(vehicle("BMW")).await;

  // A fresh collection over the same local store — the "page reload".
  let second = garage(session, local, remote);
  second.set_identity(guest(session)).await;

  let records = second.records().await;
  assert_eq!(records.len(), 1);
  assert_eq!(records[0], record);
}

// ─── Rescue/claim ────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_claims_guest_records() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local, remote.clone());

  col.set_identity(guest(session)).await;
  let a = col.create(vehicle("BMW")).await;
  let b = col.create(vehicle("Audi")).await;

  col.set_identity(account(session, user)).await;
  assert_eq!(col.phase().await, SyncPhase::Ready);

  // Both records upserted remotely, stamped with the new user id.
  assert_eq!(remote.row_count(Collection::Garage), 2);
  for id in [a.id, b.id] {
    let row = remote.row(Collection::Garage, id).unwrap();
    assert_eq!(row.user_id, Some(user));
    assert_eq!(row.session_id, session);
  }

  // And merged into the in-memory view without a re-fetch.
  let records = col.records().await;
  assert_eq!(records.len(), 2);
  assert!(records.iter().all(|r| r.user_id == Some(user)));
}

#[tokio::test]
async fn rescue_is_idempotent() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local, remote.clone());

  col.set_identity(guest(session)).await;
  col.create(vehicle("BMW")).await;
  col.create(vehicle("Audi")).await;

  col.set_identity(account(session, user)).await;
  assert_eq!(remote.upserts.load(Ordering::SeqCst), 2);

  // Same local + remote state: the second pass must find nothing missing.
  col.set_identity(account(session, user)).await;
  assert_eq!(remote.upserts.load(Ordering::SeqCst), 2);
  assert_eq!(remote.row_count(Collection::Garage), 2);
  assert_eq!(col.records().await.len(), 2);
}

#[tokio::test]
async fn rescue_never_reassigns_another_users_records() {
  let session = SessionId::generate();
  let owner = UserId(Uuid::new_v4());
  let intruder = UserId(Uuid::new_v4());
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());

  // Seed the local blob with a record already claimed by `owner`.
  let mut claimed = OwnedRecord::new(session, vehicle("BMW"));
  claimed.claim(owner).unwrap();
  local
    .put("revline_garage", serde_json::to_value(vec![&claimed]).unwrap())
    .await
    .unwrap();

  let col = garage(session, local, remote.clone());
  col.set_identity(account(session, intruder)).await;

  // Nothing upserted, nothing reassigned.
  assert_eq!(remote.row_count(Collection::Garage), 0);
  assert!(col.records().await.iter().all(|r| r.id != claimed.id));
}

#[tokio::test]
async fn failed_rescue_is_retried_on_next_login() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());

  // One record already remote for this user.
  let mut synced = OwnedRecord::new(session, vehicle("Porsche"));
  synced.claim(user).unwrap();
  remote.seed(Collection::Garage, synced.to_remote().unwrap());

  let col = garage(session, local, remote.clone());
  col.set_identity(guest(session)).await;
  let stranded = col.create(vehicle("BMW")).await;

  // First login: fetch succeeds, rescue upserts fail.
  remote.set_fail_writes(true);
  col.set_identity(account(session, user)).await;

  let records = col.records().await;
  assert_eq!(records.len(), 1, "remote rows still surface when rescue fails");
  assert_eq!(records[0].id, synced.id);
  assert_eq!(remote.row_count(Collection::Garage), 1);

  // Second login with a healthy remote rescues the stranded record.
  remote.set_fail_writes(false);
  col.set_identity(account(session, user)).await;

  assert_eq!(remote.row_count(Collection::Garage), 2);
  assert_eq!(
    remote.row(Collection::Garage, stranded.id).unwrap().user_id,
    Some(user)
  );
  assert_eq!(col.records().await.len(), 2);
}

#[tokio::test]
async fn logout_falls_back_to_local_snapshot() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local, remote.clone());

  col.set_identity(guest(session)).await;
  let record = col.create(vehicle("BMW")).await;

  col.set_identity(account(session, user)).await;
  col.set_identity(guest(session)).await;

  // The local snapshot was never torn down by the login.
  let records = col.records().await;
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].id, record.id);
}

// ─── Authenticated writes ────────────────────────────────────────────────────

#[tokio::test]
async fn authenticated_create_persists_remotely() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local_store().await, remote.clone());

  col.set_identity(account(session, user)).await;
  let record = col.create(vehicle("BMW")).await;
  assert_eq!(record.user_id, Some(user));

  eventually(|| remote.row(Collection::Garage, record.id).is_some()).await;
  let row = remote.row(Collection::Garage, record.id).unwrap();
  assert_eq!(row.user_id, Some(user));
}

#[tokio::test]
async fn write_then_read_ordering_survives_unresolved_remote_writes() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local_store().await, remote.clone());

  col.set_identity(account(session, user)).await;

  // Remote writes fail throughout; the optimistic state must not care.
  remote.set_fail_writes(true);
  let a = col.create(vehicle("BMW")).await;
  let b = col.create(vehicle("Audi")).await;

  let records = col.records().await;
  assert_eq!(
    records.iter().map(|r| r.id).collect::<Vec<_>>(),
    vec![a.id, b.id],
    "creation order, even with no remote confirmation"
  );
}

#[tokio::test]
async fn update_applies_optimistically_and_propagates() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let remote = Arc::new(MemoryRemote::default());
  let col: SyncedCollection<Appointment, SqliteStore, MemoryRemote> =
    SyncedCollection::new(
      Collection::Appointments,
      session,
      local_store().await,
      remote.clone(),
    );

  col.set_identity(account(session, user)).await;
  let record = col
    .create(Appointment::from_booking(BookingConfirmed {
      service:       "Alignment".into(),
      scheduled_for: chrono::Utc::now(),
    }))
    .await;

  let changed = col
    .update(record.id, |a| a.status = AppointmentStatus::Cancelled)
    .await;
  assert!(changed);

  // Optimistic view first...
  let records = col.records().await;
  assert_eq!(records[0].payload.status, AppointmentStatus::Cancelled);

  // ...then the remote row catches up.
  eventually(|| {
    remote
      .row(Collection::Appointments, record.id)
      .is_some_and(|row| row.payload["status"] == serde_json::json!("cancelled"))
  })
  .await;
}

#[tokio::test]
async fn update_issued_before_create_resolves_still_reaches_the_remote() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let remote = Arc::new(GatedWriteRemote::default());
  let col: SyncedCollection<Appointment, SqliteStore, GatedWriteRemote> =
    SyncedCollection::new(
      Collection::Appointments,
      session,
      local_store().await,
      remote.clone(),
    );

  col.set_identity(account(session, user)).await;

  // Create then immediately update; both writes are still held at the gate.
  let record = col
    .create(Appointment::from_booking(BookingConfirmed {
      service:       "Alignment".into(),
      scheduled_for: chrono::Utc::now(),
    }))
    .await;
  assert!(
    col
      .update(record.id, |a| a.status = AppointmentStatus::Cancelled)
      .await
  );
  assert!(remote.inner.row(Collection::Appointments, record.id).is_none());

  // Released writes land in issue order, so the row converges on the
  // updated payload rather than the stale create.
  remote.gate.add_permits(2);
  eventually(|| {
    remote
      .inner
      .row(Collection::Appointments, record.id)
      .is_some_and(|row| row.payload["status"] == serde_json::json!("cancelled"))
  })
  .await;
}

#[tokio::test]
async fn update_of_unknown_record_is_a_noop() {
  let session = SessionId::generate();
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local_store().await, remote);

  col.set_identity(guest(session)).await;
  let changed = col.update(Uuid::new_v4(), |v| v.year = 1999).await;
  assert!(!changed);
}

#[tokio::test]
async fn remove_deletes_locally_and_remotely() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());
  let col = garage(session, local.clone(), remote.clone());

  // Guest removal updates the local mirror.
  col.set_identity(guest(session)).await;
  let record = col.create(vehicle("BMW")).await;
  assert!(col.remove(record.id).await);
  assert!(col.records().await.is_empty());
  let blob = local.get("revline_garage").await.unwrap().unwrap();
  assert!(blob.as_array().unwrap().is_empty());

  // Authenticated removal reaches the remote store.
  col.set_identity(account(session, user)).await;
  let record = col.create(vehicle("Audi")).await;
  eventually(|| remote.row(Collection::Garage, record.id).is_some()).await;

  assert!(col.remove(record.id).await);
  eventually(|| remote.row(Collection::Garage, record.id).is_none()).await;
}

// ─── Identity race ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stale_remote_load_is_discarded_after_identity_change() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let local = local_store().await;
  let remote = Arc::new(BlockedRemote::default());

  // A remote row that would clobber the guest view if the race were lost.
  let mut remote_only = OwnedRecord::new(SessionId::generate(), vehicle("Porsche"));
  remote_only.claim(user).unwrap();
  remote
    .inner
    .seed(Collection::Garage, remote_only.to_remote().unwrap());

  let col: Arc<SyncedCollection<Vehicle, SqliteStore, BlockedRemote>> =
    Arc::new(SyncedCollection::new(
      Collection::Garage,
      session,
      local,
      remote.clone(),
    ));

  col.set_identity(guest(session)).await;
  let guest_record = col.create(vehicle("BMW")).await;

  // Login whose fetch stalls...
  let login = {
    let col = col.clone();
    tokio::spawn(async move { col.set_identity(account(session, user)).await })
  };
  tokio::time::sleep(Duration::from_millis(20)).await;

  // ...superseded by a logout before the fetch resolves.
  col.set_identity(guest(session)).await;
  remote.release.notify_waiters();
  login.await.unwrap();

  // The stale fetch result must not have clobbered the guest view.
  let records = col.records().await;
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].id, guest_record.id);
  assert_eq!(col.phase().await, SyncPhase::Ready);
}

#[tokio::test]
async fn create_during_an_in_flight_remote_load_is_not_clobbered() {
  let session = SessionId::generate();
  let user = UserId(Uuid::new_v4());
  let remote = Arc::new(BlockedRemote::default());

  // One row already remote for this user.
  let mut fetched = OwnedRecord::new(SessionId::generate(), vehicle("Porsche"));
  fetched.claim(user).unwrap();
  remote
    .inner
    .seed(Collection::Garage, fetched.to_remote().unwrap());

  let col: Arc<SyncedCollection<Vehicle, SqliteStore, BlockedRemote>> =
    Arc::new(SyncedCollection::new(
      Collection::Garage,
      session,
      local_store().await,
      remote.clone(),
    ));

  // Login whose fetch stalls...
  let login = {
    let col = col.clone();
    tokio::spawn(async move { col.set_identity(account(session, user)).await })
  };
  tokio::time::sleep(Duration::from_millis(20)).await;

  // ...while the same identity creates a record.
  let created = col.create(vehicle("BMW")).await;
  assert_eq!(created.user_id, Some(user));

  remote.release.notify_waiters();
  login.await.unwrap();

  // The load result and the concurrent create both survive.
  let records = col.records().await;
  assert_eq!(records.len(), 2);
  assert!(records.iter().any(|r| r.id == fetched.id));
  assert!(records.iter().any(|r| r.id == created.id));
  eventually(|| remote.inner.row(Collection::Garage, created.id).is_some()).await;
}

// ─── Session provisioning ────────────────────────────────────────────────────

#[tokio::test]
async fn session_id_is_stable_across_reloads() {
  let local = local_store().await;

  let first = session::load_or_create(local.as_ref()).await;
  let second = session::load_or_create(local.as_ref()).await;
  assert_eq!(first, second);
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn reconciler_follows_identity_watch() {
  let local = local_store().await;
  let remote = Arc::new(MemoryRemote::default());
  let user = UserId(Uuid::new_v4());

  let rec = Arc::new(Reconciler::new(local, remote.clone()).await);
  let (tx, rx) = watch::channel(None::<UserId>);
  {
    let rec = rec.clone();
    tokio::spawn(async move { rec.run(rx).await });
  }

  // Wait for the initial guest load, then create a guest vehicle.
  eventually_async(|| async { rec.garage.phase().await == SyncPhase::Ready }).await;
  let record = rec.garage.create(vehicle("BMW")).await;

  // Login: the watch-driven reconciler rescues the record.
  tx.send(Some(user)).unwrap();
  eventually(|| remote.row(Collection::Garage, record.id).is_some()).await;
  assert_eq!(
    remote.row(Collection::Garage, record.id).unwrap().user_id,
    Some(user)
  );

  // All three collections pick up the login, not just the garage.
  eventually_async(|| async {
    rec.appointments.identity().await.is_authenticated()
      && rec.orders.identity().await.is_authenticated()
  })
  .await;

  // Bookings land in the appointments collection.
  let appointment = rec
    .booking_confirmed(BookingConfirmed {
      service:       "Dyno tune".into(),
      scheduled_for: chrono::Utc::now(),
    })
    .await;
  assert_eq!(appointment.payload.status, AppointmentStatus::Booked);
  eventually(|| remote.row(Collection::Appointments, appointment.id).is_some()).await;

  // Orders land in the order history.
  let order = rec
    .order_placed(Order {
      lines:       vec![OrderLine {
        merchandise_id:   "gid://shopify/ProductVariant/42".into(),
        title:            "Carbon intake".into(),
        quantity:         1,
        unit_price_cents: 64_900,
      }],
      total_cents: 64_900,
      status:      OrderStatus::Placed,
      placed_at:   chrono::Utc::now(),
    })
    .await;
  eventually(|| remote.row(Collection::Orders, order.id).is_some()).await;
  assert_eq!(rec.orders.records().await.len(), 1);
}

/// Like [`eventually`] but for async conditions.
async fn eventually_async<F, Fut>(mut check: F)
where
  F: FnMut() -> Fut,
  Fut: Future<Output = bool>,
{
  for _ in 0..200 {
    if check().await {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("condition not met within 1s");
}
