//! Events, their resolved endpoints, and the window/filter applied before
//! aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{Identity, Properties};

// ─── Event ───────────────────────────────────────────────────────────────────

/// Entities an event was resolved to, keyed by relationship type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
  pub from: BTreeMap<String, Identity>,
  pub to:   BTreeMap<String, Identity>,
}

impl Endpoints {
  /// Both sides carry at least one resolved entity.
  pub fn is_resolved(&self) -> bool { !self.from.is_empty() && !self.to.is_empty() }

  /// Relationship types resolved on both sides, with their endpoints.
  pub fn pairs(&self) -> impl Iterator<Item = (&str, &Identity, &Identity)> {
    self.from.iter().filter_map(|(rel, from)| {
      self.to.get(rel).map(|to| (rel.as_str(), from, to))
    })
  }
}

/// An immutable fact observed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub id:         String,
  pub type_id:    String,
  pub timestamp:  DateTime<Utc>,
  #[serde(default)]
  pub properties: Properties,
  /// Set by endpoint resolution; `None` until then.
  #[serde(default)]
  pub endpoints:  Option<Endpoints>,
}

impl Event {
  pub fn new(
    id: impl Into<String>,
    type_id: impl Into<String>,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      id: id.into(),
      type_id: type_id.into(),
      timestamp,
      properties: Properties::new(),
      endpoints: None,
    }
  }

  pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
    self.properties.insert(key.into(), value);
    self
  }

  pub fn is_resolved(&self) -> bool {
    self.endpoints.as_ref().is_some_and(Endpoints::is_resolved)
  }
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl TimeWindow {
  pub fn contains(&self, at: DateTime<Utc>) -> bool { self.start <= at && at <= self.end }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPredicate {
  pub property: String,
  pub equals:   Value,
}

/// Per-event-type property predicates. Types without predicates pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFilter {
  by_type: BTreeMap<String, Vec<PropertyPredicate>>,
}

impl EventFilter {
  pub fn new() -> Self { Self::default() }

  pub fn with_predicate(
    mut self,
    event_type: impl Into<String>,
    property: impl Into<String>,
    equals: Value,
  ) -> Self {
    self
      .by_type
      .entry(event_type.into())
      .or_default()
      .push(PropertyPredicate { property: property.into(), equals });
    self
  }

  pub fn is_empty(&self) -> bool { self.by_type.is_empty() }

  pub fn admits(&self, event: &Event) -> bool {
    self.by_type.get(&event.type_id).is_none_or(|predicates| {
      predicates
        .iter()
        .all(|p| event.properties.get(&p.property) == Some(&p.equals))
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn at(h: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap() }

  #[test]
  fn window_is_inclusive() {
    let w = TimeWindow { start: at(1), end: at(3) };
    assert!(w.contains(at(1)));
    assert!(w.contains(at(3)));
    assert!(!w.contains(at(4)));
  }

  #[test]
  fn half_resolved_event_is_unresolved() {
    let mut e = Event::new("e1", "Call", at(1));
    assert!(!e.is_resolved());

    let mut endpoints = Endpoints::default();
    endpoints.from.insert("Called".into(), Identity::new("a", "Phone"));
    e.endpoints = Some(endpoints.clone());
    assert!(!e.is_resolved());

    endpoints.to.insert("Called".into(), Identity::new("b", "Phone"));
    e.endpoints = Some(endpoints);
    assert!(e.is_resolved());
  }

  #[test]
  fn filter_only_constrains_listed_types() {
    let filter = EventFilter::new().with_predicate("Call", "Kind", json!("voice"));
    let voice = Event::new("1", "Call", at(1)).with_property("Kind", json!("voice"));
    let sms = Event::new("2", "Call", at(1)).with_property("Kind", json!("sms"));
    let payment = Event::new("3", "Payment", at(1));

    assert!(filter.admits(&voice));
    assert!(!filter.admits(&sms));
    assert!(filter.admits(&payment));
  }
}
