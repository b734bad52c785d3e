//! Type configuration: how each entity, link and event type is treated.
//!
//! The store never hard-codes types. Everything type-specific (whether a
//! record is persisted, how duplicates are detected, how events turn into
//! computed links, how labels are built) is looked up through a
//! [`TypeResolver`]. [`TypeCatalog`] is the table-driven implementation,
//! deserialized from the application's config file.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{Properties, value_text},
};

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Looks up the configuration of a type id.
pub trait TypeResolver {
  fn resolve(&self, type_id: &str) -> Option<&TypeConfig>;

  /// Generation rules for an event type; empty when the type is unmapped.
  fn generation_rules(&self, event_type: &str) -> &[GenerationRule] {
    self
      .resolve(event_type)
      .map(|c| c.generation_rules.as_slice())
      .unwrap_or_default()
  }
}

// ─── Per-type configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
  /// Internal types are never persisted in the store.
  #[serde(default)]
  pub is_internal:      bool,
  /// Property names whose values, joined by a space, form the label.
  #[serde(default)]
  pub label:            Vec<String>,
  /// Rules that identify an incoming entity with an existing one.
  #[serde(default)]
  pub match_rules:      Vec<MatchRule>,
  /// For event types: how events become computed links.
  #[serde(default)]
  pub generation_rules: Vec<GenerationRule>,
}

impl TypeConfig {
  /// Build a label from the configured properties, falling back to `id`.
  pub fn label_for(&self, id: &str, properties: &Properties) -> String {
    let parts: Vec<String> = self
      .label
      .iter()
      .filter_map(|key| properties.get(key).and_then(value_text))
      .filter(|s| !s.is_empty())
      .collect();
    if parts.is_empty() { id.to_owned() } else { parts.join(" ") }
  }
}

/// Deduplication rule applied to incoming entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchRule {
  /// Property values are equal.
  Equals { property: String },
  /// Both property values yield the same first match of `pattern`.
  Regex { property: String, pattern: String },
}

impl MatchRule {
  pub fn property(&self) -> &str {
    match self {
      Self::Equals { property } | Self::Regex { property, .. } => property,
    }
  }
}

// ─── Generation rules ────────────────────────────────────────────────────────

/// Aggregate computed over one target property of an event group.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AggregateAction {
  Sum,
  Average,
  Join,
  Count,
}

/// How one side of an event is mapped onto an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTarget {
  pub entity_type:     String,
  /// Event property holding the value to resolve.
  pub source_property: String,
  /// When set, match entities whose property of this name equals the
  /// event value instead of matching on the entity id.
  #[serde(default)]
  pub entity_property: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProperty {
  pub property: String,
  pub action:   AggregateAction,
}

/// Maps an event type onto one relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRule {
  pub relationship_type: String,
  pub from:              EndpointTarget,
  pub to:                EndpointTarget,
  #[serde(default)]
  pub target_properties: Vec<TargetProperty>,
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// A [`TypeResolver`] backed by a map of type id to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeCatalog {
  types: BTreeMap<String, TypeConfig>,
}

impl TypeCatalog {
  pub fn new() -> Self { Self::default() }

  pub fn with_type(mut self, type_id: impl Into<String>, config: TypeConfig) -> Self {
    self.types.insert(type_id.into(), config);
    self
  }

  pub fn type_ids(&self) -> impl Iterator<Item = &str> {
    self.types.keys().map(String::as_str)
  }

  /// Compile every regex match rule so bad patterns fail at load time.
  pub fn validate(&self) -> Result<()> {
    for (type_id, config) in &self.types {
      for rule in &config.match_rules {
        if let MatchRule::Regex { pattern, .. } = rule {
          Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            type_id: type_id.clone(),
            pattern: pattern.clone(),
            source,
          })?;
        }
      }
    }
    Ok(())
  }
}

impl TypeResolver for TypeCatalog {
  fn resolve(&self, type_id: &str) -> Option<&TypeConfig> { self.types.get(type_id) }
}
