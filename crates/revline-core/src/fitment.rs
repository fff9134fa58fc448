//! Fitment — pure compatibility evaluation of catalog items against vehicles.
//!
//! The engine runs on every render of every catalog card, so it is strictly
//! synchronous, O(rules-per-item), and allocation-free. Malformed rule data
//! fails loudly at the deserialisation boundary; nothing is swallowed here.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::vehicle::Vehicle;

// ─── Rule selectors ──────────────────────────────────────────────────────────

/// A make or model constraint: the literal wildcard `"All"` or an exact name.
///
/// Matching is case-sensitive exact string equality with no normalisation of
/// case or whitespace. Catalog rule content depends on the exact strings, so
/// this behaviour is preserved rather than "fixed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
  All,
  Exact(String),
}

impl NameFilter {
  pub fn admits(&self, name: &str) -> bool {
    match self {
      Self::All => true,
      Self::Exact(want) => want == name,
    }
  }
}

impl Serialize for NameFilter {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::All => serializer.serialize_str("All"),
      Self::Exact(name) => serializer.serialize_str(name),
    }
  }
}

impl<'de> Deserialize<'de> for NameFilter {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    Ok(if s == "All" { Self::All } else { Self::Exact(s) })
  }
}

/// An engine constraint: the literal wildcard `"All"` or an explicit list of
/// engine codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFilter {
  All,
  OneOf(Vec<String>),
}

impl EngineFilter {
  /// True when the vehicle's engine code — or its variant code, if set — is
  /// listed.
  pub fn admits(&self, vehicle: &Vehicle) -> bool {
    match self {
      Self::All => true,
      Self::OneOf(codes) => {
        codes.iter().any(|c| *c == vehicle.engine)
          || vehicle
            .variant
            .as_deref()
            .is_some_and(|v| codes.iter().any(|c| c == v))
      }
    }
  }
}

impl Serialize for EngineFilter {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::All => serializer.serialize_str("All"),
      Self::OneOf(codes) => codes.serialize(serializer),
    }
  }
}

impl<'de> Deserialize<'de> for EngineFilter {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
      Literal(String),
      List(Vec<String>),
    }

    match Wire::deserialize(deserializer)? {
      Wire::Literal(s) if s == "All" => Ok(Self::All),
      Wire::Literal(other) => Err(de::Error::custom(format!(
        "expected \"All\" or a list of engine codes, got {other:?}"
      ))),
      Wire::List(codes) => Ok(Self::OneOf(codes)),
    }
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// One declarative compatibility rule attached to a catalog item.
///
/// Rules form an unordered set — matching is existential, so rule order
/// affects only iteration termination, never the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRule {
  pub make:       NameFilter,
  pub model:      NameFilter,
  /// Inclusive lower bound on model year; `None` means unbounded below.
  #[serde(default)]
  pub year_start: Option<i32>,
  /// Inclusive upper bound on model year; `None` means unbounded above.
  #[serde(default)]
  pub year_end:   Option<i32>,
  pub engines:    EngineFilter,
}

impl CompatibilityRule {
  /// Whether this rule admits `vehicle`. All four predicates — make, model,
  /// year range, engine — must hold.
  pub fn matches(&self, vehicle: &Vehicle) -> bool {
    self.make.admits(&vehicle.make)
      && self.model.admits(&vehicle.model)
      && self.year_start.is_none_or(|lo| vehicle.year >= lo)
      && self.year_end.is_none_or(|hi| vehicle.year <= hi)
      && self.engines.admits(vehicle)
  }
}

// ─── Catalog item ────────────────────────────────────────────────────────────

/// The fitment-relevant slice of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
  pub id:            String,
  pub title:         String,
  /// Declared compatible with any vehicle; bypasses rule evaluation
  /// entirely, whatever `compatibility` contains.
  pub is_universal:  bool,
  #[serde(default)]
  pub compatibility: Vec<CompatibilityRule>,
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// The fitment verdict for an (item, vehicle) pair. Derived, never stored —
/// recomputed on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityStatus {
  ExactMatch,
  /// Reserved in the status vocabulary but never produced by the current
  /// rule set.
  PartialMatch,
  Universal,
  Incompatible,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Evaluate whether `item` fits `vehicle`.
///
/// With no vehicle context the item is shown but never flagged incompatible,
/// so the verdict is [`CompatibilityStatus::Universal`]. Universal items
/// short-circuit rule evaluation entirely. Otherwise the first rule that
/// admits the vehicle wins.
pub fn evaluate(item: &CatalogItem, vehicle: Option<&Vehicle>) -> CompatibilityStatus {
  let Some(vehicle) = vehicle else {
    return CompatibilityStatus::Universal;
  };

  if item.is_universal {
    return CompatibilityStatus::Universal;
  }

  if item.compatibility.iter().any(|rule| rule.matches(vehicle)) {
    CompatibilityStatus::ExactMatch
  } else {
    CompatibilityStatus::Incompatible
  }
}

/// Human-readable fitment line for a catalog card badge.
pub fn describe(status: CompatibilityStatus, vehicle: Option<&Vehicle>) -> String {
  match (status, vehicle) {
    (CompatibilityStatus::Universal, _) => "Universal fit".to_owned(),
    (CompatibilityStatus::ExactMatch, Some(v)) => {
      format!("Fits your {} {} {}", v.year, v.make, v.model)
    }
    (CompatibilityStatus::ExactMatch, None) => "Fits your vehicle".to_owned(),
    (CompatibilityStatus::PartialMatch, _) => "May fit your vehicle".to_owned(),
    (CompatibilityStatus::Incompatible, Some(v)) => {
      format!("Does not fit your {} {} {}", v.year, v.make, v.model)
    }
    (CompatibilityStatus::Incompatible, None) => "Not compatible".to_owned(),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
