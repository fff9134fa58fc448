//! Vehicle — an immutable value object describing one configured car.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A vehicle configuration as completed by the user in the year/make/model
/// selector.
///
/// Vehicles are never mutated: "editing" one means removing it from the
/// garage and adding a new one. The `id` is conventionally derived as
/// `make-model-year`, but every consumer treats it as an opaque unique
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
  pub id:      String,
  pub make:    String,
  pub model:   String,
  pub year:    i32,
  pub engine:  String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trim:    Option<String>,
  /// Engine-variant code (e.g. a facelift engine option); participates in
  /// rule engine matching alongside `engine`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variant: Option<String>,
}

impl Vehicle {
  /// The conventional id for a completed year/make/model selection.
  /// Nothing downstream parses this — it exists only so that two identical
  /// selections collide on the same key.
  pub fn derive_id(make: &str, model: &str, year: i32) -> String {
    format!("{make}-{model}-{year}")
  }
}

/// An in-progress year/make/model selection, checked for completeness before
/// it becomes a [`Vehicle`]. Incomplete selections are rejected here,
/// synchronously, before anything touches a store.
#[derive(Debug, Clone, Default)]
pub struct VehicleSelection {
  pub make:    Option<String>,
  pub model:   Option<String>,
  pub year:    Option<i32>,
  pub engine:  Option<String>,
  pub trim:    Option<String>,
  pub variant: Option<String>,
}

impl VehicleSelection {
  pub fn build(self) -> Result<Vehicle> {
    let missing = |field: &str| Error::Validation(format!("vehicle selection is missing {field}"));

    let make = self.make.filter(|s| !s.is_empty()).ok_or_else(|| missing("make"))?;
    let model = self.model.filter(|s| !s.is_empty()).ok_or_else(|| missing("model"))?;
    let year = self.year.ok_or_else(|| missing("year"))?;
    let engine = self.engine.filter(|s| !s.is_empty()).ok_or_else(|| missing("engine"))?;

    Ok(Vehicle {
      id: Vehicle::derive_id(&make, &model, year),
      make,
      model,
      year,
      engine,
      trim: self.trim,
      variant: self.variant,
    })
  }
}
