//! [`IdentityStore`]: versioned entities and links keyed by identity.
//!
//! Every method here is a non-logging primitive. Recording mutations in the
//! undo log is the job of [`crate::workspace::Workspace`]; the log itself
//! replays entries through [`IdentityStore::apply`] so undo and redo can
//! never create new log entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  bounds::Bounds,
  history::{History, Upsert},
  record::{
    Element, ElementKind, EntityRecord, Identity, LinkRecord, Versioned,
    derive_version_id,
  },
};

/// The stored state of an ingest call.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
  /// The version before the call, when an existing version was merged.
  pub prior:   Option<Element>,
  /// The version as stored after the call.
  pub current: Element,
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityStore {
  entities: BTreeMap<Identity, History<EntityRecord>>,
  links:    BTreeMap<Identity, History<LinkRecord>>,
  bounds:   Bounds,
}

impl IdentityStore {
  pub fn new() -> Self { Self::default() }

  pub fn bounds(&self) -> Bounds { self.bounds }

  pub fn entity_count(&self) -> usize { self.entities.len() }

  pub fn link_count(&self) -> usize { self.links.len() }

  pub fn is_empty(&self) -> bool { self.entities.is_empty() && self.links.is_empty() }

  pub fn entities(&self) -> impl Iterator<Item = (&Identity, &History<EntityRecord>)> {
    self.entities.iter()
  }

  pub fn links(&self) -> impl Iterator<Item = (&Identity, &History<LinkRecord>)> {
    self.links.iter()
  }

  pub fn contains_entity(&self, identity: &Identity) -> bool {
    self.entities.contains_key(identity)
  }

  pub fn contains_link(&self, identity: &Identity) -> bool { self.links.contains_key(identity) }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// All versions of an entity in `date_from` order.
  pub fn entity_history(&self, identity: &Identity) -> Option<&[EntityRecord]> {
    self.entities.get(identity).map(History::versions)
  }

  /// All versions of a link in `date_from` order.
  pub fn link_history(&self, identity: &Identity) -> Option<&[LinkRecord]> {
    self.links.get(identity).map(History::versions)
  }

  /// The entity version valid at `date`. See [`History::resolve_at`] for the
  /// fallback when `date` precedes every version.
  pub fn resolve_entity_at(
    &self,
    identity: &Identity,
    date: DateTime<Utc>,
  ) -> Option<&EntityRecord> {
    self.entities.get(identity)?.resolve_at(date)
  }

  pub fn resolve_link_at(&self, identity: &Identity, date: DateTime<Utc>) -> Option<&LinkRecord> {
    self.links.get(identity)?.resolve_at(date)
  }

  /// Every stored version, entities first, in identity then date order.
  pub fn elements(&self) -> Vec<Element> {
    let entities = self
      .entities
      .values()
      .flat_map(|h| h.versions().iter().cloned().map(Element::Entity));
    let links = self
      .links
      .values()
      .flat_map(|h| h.versions().iter().cloned().map(Element::Link));
    entities.chain(links).collect()
  }

  // ── Ingest ────────────────────────────────────────────────────────────────

  /// Insert a version, or merge it into the stored version with the same id.
  /// A nil version id is replaced by the derived one.
  pub fn ingest(&mut self, mut element: Element) -> Change {
    if element.version().version_id.is_nil() {
      let derived = derive_version_id(element.identity(), element.version().date_from);
      element.version_mut().version_id = derived;
    }
    self.bounds.widen(element.version());

    match element {
      Element::Entity(record) => {
        let (prior, current) = upsert_into(&mut self.entities, record);
        Change { prior: prior.map(Element::Entity), current: Element::Entity(current) }
      }
      Element::Link(record) => {
        let (prior, current) = upsert_into(&mut self.links, record);
        Change { prior: prior.map(Element::Link), current: Element::Link(current) }
      }
    }
  }

  // ── Removal ───────────────────────────────────────────────────────────────

  /// Remove one version. Deleting an entity's last version also removes
  /// every link that references it. Returns everything removed, the
  /// requested version first.
  pub fn remove_version(
    &mut self,
    kind: ElementKind,
    identity: &Identity,
    version_id: Uuid,
  ) -> Result<Vec<Element>> {
    let known = match kind {
      ElementKind::Entity => self.entities.get(identity).map(|h| h.get(version_id).is_some()),
      ElementKind::Link => self.links.get(identity).map(|h| h.get(version_id).is_some()),
    };
    match known {
      None => return Err(Error::IdentityNotFound(identity.clone())),
      Some(false) => {
        return Err(Error::VersionNotFound { identity: identity.clone(), version_id });
      }
      Some(true) => {}
    }

    let mut removed: Vec<Element> = self.take(kind, identity, version_id).into_iter().collect();
    if kind == ElementKind::Entity && !self.entities.contains_key(identity) {
      removed.extend(self.cascade(identity));
    }
    Ok(removed)
  }

  /// Remove every version of an identity, cascading as
  /// [`remove_version`](Self::remove_version) does.
  pub fn remove_identity(
    &mut self,
    kind: ElementKind,
    identity: &Identity,
  ) -> Result<Vec<Element>> {
    let mut removed: Vec<Element> = match kind {
      ElementKind::Entity => self
        .entities
        .remove(identity)
        .map(|h| h.versions().iter().cloned().map(Element::Entity).collect()),
      ElementKind::Link => self
        .links
        .remove(identity)
        .map(|h| h.versions().iter().cloned().map(Element::Link).collect()),
    }
    .ok_or_else(|| Error::IdentityNotFound(identity.clone()))?;

    if kind == ElementKind::Entity {
      removed.extend(self.cascade(identity));
    }
    Ok(removed)
  }

  // ── Replay primitive ──────────────────────────────────────────────────────

  /// Remove `remove` then store `put` exactly as given. Versions already
  /// absent count as removed. This never cascades: snapshots recorded in the
  /// log already contain any cascaded links.
  pub fn apply(&mut self, remove: &[Element], put: &[Element]) {
    for element in remove {
      self.take(element.kind(), element.identity(), element.version().version_id);
    }
    for element in put {
      self.bounds.widen(element.version());
      match element {
        Element::Entity(record) => put_into(&mut self.entities, record.clone()),
        Element::Link(record) => put_into(&mut self.links, record.clone()),
      }
    }
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  /// Remove one version, dropping the identity once it has none left.
  fn take(&mut self, kind: ElementKind, identity: &Identity, version_id: Uuid) -> Option<Element> {
    match kind {
      ElementKind::Entity => take_from(&mut self.entities, identity, version_id).map(Element::Entity),
      ElementKind::Link => take_from(&mut self.links, identity, version_id).map(Element::Link),
    }
  }

  /// Remove every link touching `entity`.
  fn cascade(&mut self, entity: &Identity) -> Vec<Element> {
    let doomed: Vec<Identity> = self
      .links
      .iter()
      .filter(|(_, h)| h.versions().iter().any(|l| l.touches(entity)))
      .map(|(id, _)| id.clone())
      .collect();

    let mut removed = Vec::new();
    for link in doomed {
      if let Some(history) = self.links.remove(&link) {
        tracing::debug!(%link, %entity, "cascading link removal");
        removed.extend(history.versions().iter().cloned().map(Element::Link));
      }
    }
    removed
  }
}

fn upsert_into<R: Versioned>(
  map: &mut BTreeMap<Identity, History<R>>,
  record: R,
) -> (Option<R>, R) {
  match map.get_mut(record.identity()) {
    Some(history) => {
      let Upsert { prior, current } = history.upsert(record);
      (prior, current)
    }
    None => {
      map.insert(record.identity().clone(), History::new(record.clone()));
      (None, record)
    }
  }
}

fn put_into<R: Versioned>(map: &mut BTreeMap<Identity, History<R>>, record: R) {
  match map.get_mut(record.identity()) {
    Some(history) => history.put(record),
    None => {
      map.insert(record.identity().clone(), History::new(record));
    }
  }
}

fn take_from<R: Versioned>(
  map: &mut BTreeMap<Identity, History<R>>,
  identity: &Identity,
  version_id: Uuid,
) -> Option<R> {
  let history = map.get_mut(identity)?;
  let removed = history.remove(version_id);
  if history.is_empty() {
    map.remove(identity);
  }
  removed
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;
  use crate::record::Version;

  fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  fn entity(id: &str, from: Option<DateTime<Utc>>) -> Element {
    Element::Entity(EntityRecord {
      identity: Identity::new(id, "Person"),
      version:  Version::starting(from),
    })
  }

  fn link(id: &str, from: &str, to: &str) -> Element {
    Element::Link(LinkRecord {
      identity: Identity::new(id, "Knows"),
      from:     Identity::new(from, "Person"),
      to:       Identity::new(to, "Person"),
      version:  Version::starting(None),
    })
  }

  #[test]
  fn ingest_derives_version_id() {
    let mut store = IdentityStore::new();
    let change = store.ingest(entity("P1", Some(day(2020, 1, 1))));
    assert!(change.prior.is_none());
    assert!(!change.current.version().version_id.is_nil());
  }

  #[test]
  fn ingest_same_start_merges() {
    let mut store = IdentityStore::new();
    let mut first = entity("P1", Some(day(2020, 1, 1)));
    first.version_mut().properties.insert("Name".into(), json!("Ann"));
    store.ingest(first);

    let mut second = entity("P1", Some(day(2020, 1, 1)));
    second.version_mut().properties.insert("City".into(), json!("Oslo"));
    let change = store.ingest(second);

    assert!(change.prior.is_some());
    let history = store.entity_history(&Identity::new("P1", "Person")).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version.properties["Name"], json!("Ann"));
    assert_eq!(history[0].version.properties["City"], json!("Oslo"));
  }

  #[test]
  fn unknown_identity_resolves_to_none() {
    let store = IdentityStore::new();
    assert!(store.resolve_entity_at(&Identity::new("X", "Person"), day(2020, 1, 1)).is_none());
  }

  #[test]
  fn removing_last_version_cascades_to_links() {
    let mut store = IdentityStore::new();
    let p1 = store.ingest(entity("P1", None)).current;
    store.ingest(entity("P2", None));
    store.ingest(link("L1", "P1", "P2"));
    store.ingest(link("L2", "P2", "P2"));

    let removed = store
      .remove_version(ElementKind::Entity, p1.identity(), p1.version().version_id)
      .unwrap();

    assert_eq!(removed.len(), 2);
    assert_eq!(removed[0].identity(), p1.identity());
    assert!(!store.contains_link(&Identity::new("L1", "Knows")));
    assert!(store.contains_link(&Identity::new("L2", "Knows")));
  }

  #[test]
  fn removing_one_of_two_versions_keeps_identity_and_links() {
    let mut store = IdentityStore::new();
    let first = store.ingest(entity("P1", Some(day(2020, 1, 1)))).current;
    store.ingest(entity("P1", Some(day(2021, 1, 1))));
    store.ingest(link("L1", "P1", "P1"));

    let removed = store
      .remove_version(ElementKind::Entity, first.identity(), first.version().version_id)
      .unwrap();

    assert_eq!(removed.len(), 1);
    assert_eq!(store.entity_history(first.identity()).unwrap().len(), 1);
    assert!(store.contains_link(&Identity::new("L1", "Knows")));
  }

  #[test]
  fn remove_unknown_is_an_error() {
    let mut store = IdentityStore::new();
    let err = store
      .remove_version(ElementKind::Entity, &Identity::new("X", "Person"), Uuid::new_v4())
      .unwrap_err();
    assert!(matches!(err, Error::IdentityNotFound(_)));

    let p1 = store.ingest(entity("P1", None)).current;
    let err = store
      .remove_version(ElementKind::Entity, p1.identity(), Uuid::new_v4())
      .unwrap_err();
    assert!(matches!(err, Error::VersionNotFound { .. }));
  }

  #[test]
  fn apply_ignores_already_absent_versions() {
    let mut store = IdentityStore::new();
    let gone = link("L9", "A", "B");
    store.apply(&[gone], &[]);
    assert!(store.is_empty());
  }

  #[test]
  fn bounds_widen_on_ingest_and_survive_removal() {
    let mut store = IdentityStore::new();
    let p1 = store.ingest(entity("P1", Some(day(2020, 6, 1)))).current;
    let bounds = store.bounds();
    assert_eq!(bounds.min, Some(day(2020, 6, 1)));

    store.remove_identity(ElementKind::Entity, p1.identity()).unwrap();
    assert_eq!(store.bounds(), bounds);
  }
}
