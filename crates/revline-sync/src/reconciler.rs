//! [`Reconciler`] — the application-scoped context object that owns the
//! three synced collections and reacts to identity changes.
//!
//! Constructed once at application start and torn down never; there are no
//! module-level singletons, so call sites receive the reconciler (or a
//! collection borrowed from it) explicitly.

use std::sync::Arc;

use tokio::sync::watch;

use revline_core::{
  history::{Appointment, BookingConfirmed, Order},
  identity::{Identity, SessionId, UserId},
  record::{Collection, OwnedRecord},
  store::{LocalStore, RemoteStore},
  vehicle::Vehicle,
};

use crate::{collection::SyncedCollection, session};

pub struct Reconciler<L, R> {
  session_id:       SessionId,
  pub garage:       SyncedCollection<Vehicle, L, R>,
  pub orders:       SyncedCollection<Order, L, R>,
  pub appointments: SyncedCollection<Appointment, L, R>,
}

impl<L, R> Reconciler<L, R>
where
  L: LocalStore,
  R: RemoteStore + 'static,
{
  /// Provision the session id and construct the collections.
  pub async fn new(local: Arc<L>, remote: Arc<R>) -> Self {
    let session_id = session::load_or_create(local.as_ref()).await;
    Self {
      session_id,
      garage: SyncedCollection::new(
        Collection::Garage,
        session_id,
        local.clone(),
        remote.clone(),
      ),
      orders: SyncedCollection::new(
        Collection::Orders,
        session_id,
        local.clone(),
        remote.clone(),
      ),
      appointments: SyncedCollection::new(
        Collection::Appointments,
        session_id,
        local,
        remote,
      ),
    }
  }

  pub fn session_id(&self) -> SessionId {
    self.session_id
  }

  /// The identity for an auth state reported by the identity provider. The
  /// session id is carried along unchanged in both cases.
  pub fn identity_for(&self, user_id: Option<UserId>) -> Identity {
    match user_id {
      Some(user_id) => Identity::Account { session_id: self.session_id, user_id },
      None => Identity::Guest { session_id: self.session_id },
    }
  }

  /// Apply an auth-state change to all three collections.
  ///
  /// Login triggers the remote load plus the rescue/claim pass per
  /// collection; logout falls back to the unchanged local snapshots.
  pub async fn handle_auth_change(&self, user_id: Option<UserId>) {
    let identity = self.identity_for(user_id);
    self.garage.set_identity(identity).await;
    self.orders.set_identity(identity).await;
    self.appointments.set_identity(identity).await;
  }

  /// Drive the reconciler from an identity-provider subscription until the
  /// sender side is dropped.
  pub async fn run(&self, mut auth: watch::Receiver<Option<UserId>>) {
    // Apply whatever identity is current at subscription time, then follow
    // every change.
    let current = *auth.borrow_and_update();
    self.handle_auth_change(current).await;
    while auth.changed().await.is_ok() {
      let user_id = *auth.borrow_and_update();
      self.handle_auth_change(user_id).await;
    }
  }

  /// Record a placed order in the order history.
  pub async fn order_placed(&self, order: Order) -> OwnedRecord<Order> {
    self.orders.create(order).await
  }

  /// Record an appointment for a completed scheduling-widget booking.
  pub async fn booking_confirmed(&self, event: BookingConfirmed) -> OwnedRecord<Appointment> {
    self.appointments.create(Appointment::from_booking(event)).await
  }
}
