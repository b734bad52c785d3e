//! Identities, versions and the stored record shapes.
//!
//! An [`Identity`] is the time-independent key of an entity or link. Each
//! identity owns a list of [`Version`]s; a link version additionally carries
//! its two endpoint identities. Stored records are distinguished by the
//! explicit [`Element`] discriminant, never by which fields happen to be set.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Property bag shared by entities, links and events. `Value::Null` is a
/// present-but-null property and is treated differently from an absent key
/// by the aggregation engine.
pub type Properties = BTreeMap<String, Value>;

/// Namespace for deterministic version ids.
const VERSION_NAMESPACE: Uuid = Uuid::from_u128(0x2b0f_6c1e_93a4_4f57_a1d8_5e2c_7b90_4d13);

// ─── Identity ────────────────────────────────────────────────────────────────

/// Stable `(id, type)` key of an entity or link.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Identity {
  pub id:      String,
  pub type_id: String,
}

impl Identity {
  pub fn new(id: impl Into<String>, type_id: impl Into<String>) -> Self {
    Self { id: id.into(), type_id: type_id.into() }
  }
}

impl fmt::Display for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.id, self.type_id)
  }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Where a version came from.
#[derive(
  Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
  /// Created or edited by the user.
  #[default]
  User,
  /// Delivered by an import or remote query.
  Imported { source_name: String },
  /// Synthesized by endpoint resolution.
  System,
}

// ─── Version ─────────────────────────────────────────────────────────────────

/// One time-scoped snapshot of an identity's content.
///
/// A version is valid from `date_from` until the next version's `date_from`;
/// `None` on either bound means open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
  /// Derived by [`derive_version_id`] when left nil.
  pub version_id: Uuid,
  pub date_from:  Option<DateTime<Utc>>,
  pub date_to:    Option<DateTime<Utc>>,
  pub properties: Properties,
  /// Derived from the type's label properties; never persisted.
  pub label:      Option<String>,
  pub provenance: Provenance,
}

impl Version {
  /// A version with no properties and a nil id, valid from `date_from`.
  pub fn starting(date_from: Option<DateTime<Utc>>) -> Self {
    Self {
      version_id: Uuid::nil(),
      date_from,
      date_to: None,
      properties: Properties::new(),
      label: None,
      provenance: Provenance::default(),
    }
  }

  pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
    self.properties.insert(key.into(), value);
    self
  }

  pub fn with_date_to(mut self, date_to: DateTime<Utc>) -> Self {
    self.date_to = Some(date_to);
    self
  }

  /// Merge `incoming` into `self`: incoming properties win, absent keys keep
  /// their prior values, set bounds override.
  pub fn merge(&mut self, incoming: Version) {
    self.properties.extend(incoming.properties);
    if incoming.date_from.is_some() {
      self.date_from = incoming.date_from;
    }
    if incoming.date_to.is_some() {
      self.date_to = incoming.date_to;
    }
    if incoming.label.is_some() {
      self.label = incoming.label;
    }
    self.provenance = incoming.provenance;
  }

  /// Whether `other` covers the same interval.
  pub fn same_interval(&self, other: &Version) -> bool {
    self.date_from == other.date_from && self.date_to == other.date_to
  }
}

/// Deterministic version id for an identity's version starting at
/// `date_from`. Re-running it on load regenerates the ids stripped on save.
pub fn derive_version_id(
  identity: &Identity,
  date_from: Option<DateTime<Utc>>,
) -> Uuid {
  let start = date_from
    .map(|d| d.to_rfc3339())
    .unwrap_or_else(|| "open".to_owned());
  let name = format!("{}\u{1f}{}\u{1f}{start}", identity.type_id, identity.id);
  Uuid::new_v5(&VERSION_NAMESPACE, name.as_bytes())
}

/// Text form of a property value; `None` for null.
pub fn value_text(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    other => Some(other.to_string()),
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One version of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
  pub identity: Identity,
  pub version:  Version,
}

/// One version of a link; endpoints reference identities, not versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
  pub identity: Identity,
  pub from:     Identity,
  pub to:       Identity,
  pub version:  Version,
}

impl LinkRecord {
  pub fn touches(&self, entity: &Identity) -> bool {
    &self.from == entity || &self.to == entity
  }
}

/// Shared access to the versioned part of a stored record.
pub trait Versioned: Clone {
  fn identity(&self) -> &Identity;
  fn version(&self) -> &Version;
  fn version_mut(&mut self) -> &mut Version;
  /// Merge a record carrying the same version id into `self`.
  fn merge(&mut self, incoming: Self);
}

impl Versioned for EntityRecord {
  fn identity(&self) -> &Identity { &self.identity }

  fn version(&self) -> &Version { &self.version }

  fn version_mut(&mut self) -> &mut Version { &mut self.version }

  fn merge(&mut self, incoming: Self) { self.version.merge(incoming.version); }
}

impl Versioned for LinkRecord {
  fn identity(&self) -> &Identity { &self.identity }

  fn version(&self) -> &Version { &self.version }

  fn version_mut(&mut self) -> &mut Version { &mut self.version }

  fn merge(&mut self, incoming: Self) {
    self.from = incoming.from;
    self.to = incoming.to;
    self.version.merge(incoming.version);
  }
}

// ─── Element ─────────────────────────────────────────────────────────────────

/// Discriminant of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
  Entity,
  Link,
}

/// A stored record of either kind. This is the unit the mutation log
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
  Entity(EntityRecord),
  Link(LinkRecord),
}

impl Element {
  pub fn kind(&self) -> ElementKind {
    match self {
      Self::Entity(_) => ElementKind::Entity,
      Self::Link(_) => ElementKind::Link,
    }
  }

  pub fn identity(&self) -> &Identity {
    match self {
      Self::Entity(e) => &e.identity,
      Self::Link(l) => &l.identity,
    }
  }

  pub fn version(&self) -> &Version {
    match self {
      Self::Entity(e) => &e.version,
      Self::Link(l) => &l.version,
    }
  }

  pub fn version_mut(&mut self) -> &mut Version {
    match self {
      Self::Entity(e) => &mut e.version,
      Self::Link(l) => &mut l.version,
    }
  }
}

impl From<EntityRecord> for Element {
  fn from(record: EntityRecord) -> Self { Self::Entity(record) }
}

impl From<LinkRecord> for Element {
  fn from(record: LinkRecord) -> Self { Self::Link(record) }
}
