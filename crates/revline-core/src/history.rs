//! Order and appointment payloads for the owned-record collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Orders ──────────────────────────────────────────────────────────────────

/// A single purchased line within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  pub merchandise_id:   String,
  pub title:            String,
  pub quantity:         u32,
  pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Placed,
  Processing,
  Shipped,
  Cancelled,
}

/// An order as shown in the account's order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub lines:       Vec<OrderLine>,
  pub total_cents: i64,
  pub status:      OrderStatus,
  pub placed_at:   DateTime<Utc>,
}

// ─── Appointments ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
  Booked,
  Completed,
  Cancelled,
}

/// A service booking as shown in the account's appointment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
  pub service:       String,
  pub scheduled_for: DateTime<Utc>,
  pub status:        AppointmentStatus,
}

/// Emitted by the embedded scheduling widget when a booking completes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmed {
  pub service:       String,
  pub scheduled_for: DateTime<Utc>,
}

impl Appointment {
  /// The appointment payload recorded for a successful booking.
  pub fn from_booking(event: BookingConfirmed) -> Self {
    Self {
      service:       event.service,
      scheduled_for: event.scheduled_for,
      status:        AppointmentStatus::Booked,
    }
  }
}
