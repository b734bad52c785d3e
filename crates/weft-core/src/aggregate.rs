//! Event aggregation: computed links derived from resolved events.
//!
//! Computed links are never stored. [`compute_links`] is pure; the workspace
//! calls it again whenever the event set, the window or the filter changes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
  config::{AggregateAction, GenerationRule, TypeResolver},
  event::{Event, EventFilter, TimeWindow},
  record::{Identity, value_text},
};

/// Separator used by [`AggregateAction::Join`].
pub const JOIN_SEPARATOR: &str = ", ";

// ─── Output ──────────────────────────────────────────────────────────────────

/// One aggregated property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateValue {
  /// `sum` or `average`; an average over nothing is NaN and serializes as
  /// JSON `null`.
  Number(f64),
  Count(usize),
  Text(String),
}

impl AggregateValue {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Count(c) => Some(*c as f64),
      Self::Text(_) => None,
    }
  }
}

/// A derived link between two entities, rebuilt on every recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedLink {
  /// `id` is a hash of the relationship type and both endpoints; `type_id`
  /// is the relationship type.
  pub identity:    Identity,
  pub from:        Identity,
  pub to:          Identity,
  pub properties:  BTreeMap<String, AggregateValue>,
  pub event_count: usize,
  pub first_seen:  DateTime<Utc>,
  pub last_seen:   DateTime<Utc>,
  /// Filled in by the workspace from the relationship type's config.
  pub label:       Option<String>,
}

/// Stable id of the computed link for `(relationship_type, from, to)`.
pub fn computed_link_id(relationship_type: &str, from: &Identity, to: &Identity) -> String {
  let mut hasher = Sha256::new();
  for part in [relationship_type, &from.id, &from.type_id, &to.id, &to.type_id] {
    hasher.update(part.as_bytes());
    hasher.update([0x1f]);
  }
  hex::encode(hasher.finalize())
}

// ─── Engine ──────────────────────────────────────────────────────────────────

type GroupKey<'e> = (&'e str, &'e Identity, &'e Identity);

/// Compute every link the events imply.
///
/// Unresolved events, events outside `window` and events rejected by
/// `filter` are ignored. Output is sorted by relationship type and endpoint
/// identities, so only `join` values depend on input order.
pub fn compute_links<R>(
  events: &[Event],
  resolver: &R,
  window: Option<&TimeWindow>,
  filter: &EventFilter,
) -> Vec<ComputedLink>
where
  R: TypeResolver + ?Sized,
{
  let mut groups: BTreeMap<GroupKey<'_>, Vec<&Event>> = BTreeMap::new();

  let admitted = events
    .iter()
    .filter(|e| e.is_resolved())
    .filter(|e| window.is_none_or(|w| w.contains(e.timestamp)))
    .filter(|e| filter.admits(e));

  for event in admitted {
    let Some(endpoints) = &event.endpoints else {
      continue;
    };
    for (rel, from, to) in endpoints.pairs() {
      groups.entry((rel, from, to)).or_default().push(event);
    }
  }

  groups
    .into_iter()
    .filter_map(|((rel, from, to), group)| {
      let Some(rule) = rule_for(rel, &group, resolver) else {
        tracing::debug!(relationship_type = rel, "no generation rule; dropping group");
        return None;
      };
      Some(build_link(rule, from, to, &group))
    })
    .collect()
}

/// The rule for `rel` from the first event type in the group (by name)
/// that has one.
fn rule_for<'r, R>(rel: &str, group: &[&Event], resolver: &'r R) -> Option<&'r GenerationRule>
where
  R: TypeResolver + ?Sized,
{
  let types: BTreeSet<&str> = group.iter().map(|e| e.type_id.as_str()).collect();
  types.into_iter().find_map(|type_id| {
    resolver
      .generation_rules(type_id)
      .iter()
      .find(|r| r.relationship_type == rel)
  })
}

fn build_link(rule: &GenerationRule, from: &Identity, to: &Identity, group: &[&Event]) -> ComputedLink {
  let properties = rule
    .target_properties
    .iter()
    .map(|target| {
      let values = group.iter().map(|e| e.properties.get(&target.property));
      let value = match target.action {
        AggregateAction::Sum => AggregateValue::Number(sum(values).0),
        AggregateAction::Average => {
          let (total, n) = sum(values);
          AggregateValue::Number(total / n as f64)
        }
        AggregateAction::Join => AggregateValue::Text(join_values(values.flatten())),
        AggregateAction::Count => AggregateValue::Count(group.len()),
      };
      (target.property.clone(), value)
    })
    .collect();

  let first_seen = group.iter().map(|e| e.timestamp).min();
  let last_seen = group.iter().map(|e| e.timestamp).max();
  let rel = &rule.relationship_type;

  ComputedLink {
    identity:    Identity::new(computed_link_id(rel, from, to), rel.clone()),
    from:        from.clone(),
    to:          to.clone(),
    properties,
    event_count: group.len(),
    // Groups are never empty.
    first_seen:  first_seen.unwrap_or_default(),
    last_seen:   last_seen.unwrap_or_default(),
    label:       None,
  }
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

fn numeric(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Sum of the numeric values and how many contributed. Nulls, absent keys
/// and non-numeric values are left out entirely rather than counted as zero.
fn sum<'a>(values: impl Iterator<Item = Option<&'a Value>>) -> (f64, usize) {
  values
    .flatten()
    .filter_map(numeric)
    .fold((0.0, 0), |(total, n), v| (total + v, n + 1))
}

/// Concatenate values left to right with [`JOIN_SEPARATOR`].
///
/// Each value is split on the separator and a fragment is appended only if
/// it is not already a substring of the text accumulated so far. Nulls are
/// skipped. The result depends on input order.
pub fn join_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
  let mut joined = String::new();
  for text in values.into_iter().filter_map(value_text) {
    for fragment in text.split(JOIN_SEPARATOR) {
      if fragment.is_empty() || joined.contains(fragment) {
        continue;
      }
      if !joined.is_empty() {
        joined.push_str(JOIN_SEPARATOR);
      }
      joined.push_str(fragment);
    }
  }
  joined
}
