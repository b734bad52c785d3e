//! [`Workspace`]: the one owned aggregate callers talk to.
//!
//! It ties the identity store, the mutation log, the event set and the
//! computed links together behind a synchronous API. Structural changes made
//! through it are logged; undo and redo go straight to the store's replay
//! primitive. Computed links are recomputed whenever the events, the window
//! or the filter change, independently of the log.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  aggregate::{ComputedLink, compute_links},
  bounds::Bounds,
  config::{TypeCatalog, TypeConfig, TypeResolver},
  event::{Event, EventFilter, TimeWindow},
  layout::{LayoutConfig, Point, seed_positions},
  log::{Entry, MutationLog},
  matching::Matcher,
  record::{
    Element, ElementKind, EntityRecord, Identity, LinkRecord, Properties, derive_version_id,
  },
  resolution::resolve_endpoints,
  source::RecordBatch,
  store::{Change, IdentityStore},
};

/// What an [`Workspace::ingest`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
  /// Versions stored under a new version id.
  pub added:        usize,
  /// Versions merged into an existing version id.
  pub merged:       usize,
  /// Entities folded into an existing identity by a match rule.
  pub deduplicated: usize,
  /// Records skipped for missing configuration or internal types.
  pub skipped:      usize,
  pub events_added: usize,
  /// Entities created by endpoint resolution.
  pub synthesized:  usize,
}

/// The resolved state of the store at one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
  pub at:       DateTime<Utc>,
  pub entities: Vec<EntityRecord>,
  /// Links whose endpoints both exist.
  pub links:    Vec<LinkRecord>,
}

/// Fold repeated touches of one version into a single change: the state
/// before the first touch and the state after the last.
fn collapse(changes: Vec<Change>) -> Vec<Change> {
  let mut index: HashMap<(ElementKind, Identity, Uuid), usize> = HashMap::new();
  let mut collapsed: Vec<Change> = Vec::with_capacity(changes.len());
  for change in changes {
    let current = &change.current;
    let key = (current.kind(), current.identity().clone(), current.version().version_id);
    match index.get(&key) {
      Some(&idx) => collapsed[idx].current = change.current,
      None => {
        index.insert(key, collapsed.len());
        collapsed.push(change);
      }
    }
  }
  collapsed
}

// ─── Workspace ───────────────────────────────────────────────────────────────

pub struct Workspace<R = TypeCatalog> {
  resolver:  R,
  store:     IdentityStore,
  log:       MutationLog,
  events:    Vec<Event>,
  window:    Option<TimeWindow>,
  filter:    EventFilter,
  computed:  Vec<ComputedLink>,
  layout:    LayoutConfig,
  positions: BTreeMap<Identity, Point>,
}

impl<R: TypeResolver> Workspace<R> {
  pub fn new(resolver: R) -> Self {
    Self {
      resolver,
      store: IdentityStore::new(),
      log: MutationLog::new(),
      events: Vec::new(),
      window: None,
      filter: EventFilter::new(),
      computed: Vec::new(),
      layout: LayoutConfig::default(),
      positions: BTreeMap::new(),
    }
  }

  pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
    self.layout = layout;
    self
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub fn resolver(&self) -> &R { &self.resolver }

  pub fn store(&self) -> &IdentityStore { &self.store }

  pub fn log(&self) -> &MutationLog { &self.log }

  pub fn events(&self) -> &[Event] { &self.events }

  pub fn computed_links(&self) -> &[ComputedLink] { &self.computed }

  pub fn window(&self) -> Option<&TimeWindow> { self.window.as_ref() }

  pub fn filter(&self) -> &EventFilter { &self.filter }

  pub fn bounds(&self) -> Bounds { self.store.bounds() }

  pub fn positions(&self) -> &BTreeMap<Identity, Point> { &self.positions }

  /// Entity versions and connected link versions valid at `at`.
  pub fn snapshot_at(&self, at: DateTime<Utc>) -> Snapshot {
    let entities: Vec<EntityRecord> = self
      .store
      .entities()
      .filter_map(|(_, history)| history.resolve_at(at).cloned())
      .collect();
    let links = self
      .store
      .links()
      .filter_map(|(_, history)| history.resolve_at(at))
      .filter(|l| self.store.contains_entity(&l.from) && self.store.contains_entity(&l.to))
      .cloned()
      .collect();
    Snapshot { at, entities, links }
  }

  // ── Undo / redo ───────────────────────────────────────────────────────────

  pub fn can_undo(&self) -> bool { self.log.can_undo() }

  pub fn can_redo(&self) -> bool { self.log.can_redo() }

  /// Revert the latest change. No-op (returns `false`) when there is none.
  pub fn undo(&mut self) -> bool { self.log.undo(&mut self.store) }

  /// Re-apply the latest undone change. No-op (returns `false`) when there
  /// is none.
  pub fn redo(&mut self) -> bool { self.log.redo(&mut self.store) }

  // ── Logged mutations ──────────────────────────────────────────────────────

  /// Apply a batch of records: entities and links are stored under one log
  /// entry, events are resolved and trigger a recompute.
  ///
  /// Records with unmapped types are skipped with a warning. The only error
  /// is a computed link whose relationship type has no configuration.
  pub fn ingest(&mut self, batch: RecordBatch) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut remapped: BTreeMap<Identity, Identity> = BTreeMap::new();
    let mut changes: Vec<Change> = Vec::new();
    let mut matchers: BTreeMap<String, Matcher> = BTreeMap::new();

    for mut record in batch.entities {
      let Some(config) = self.persisted_config(&record.identity.type_id, &mut report) else {
        continue;
      };
      if !self.store.contains_entity(&record.identity) {
        let matcher = matchers
          .entry(record.identity.type_id.clone())
          .or_insert_with_key(|type_id| Matcher::new(type_id, &config.match_rules));
        if let Some(existing) = matcher.find_duplicate(&self.store, &record) {
          tracing::debug!(incoming = %record.identity, %existing, "matched existing entity");
          remapped.insert(record.identity.clone(), existing.clone());
          record.identity = existing.clone();
          record.version.version_id = Uuid::nil();
          report.deduplicated += 1;
        }
      }
      let mut element = Element::Entity(record);
      self.prepare(&mut element, &config);
      changes.push(self.store.ingest(element));
    }

    for mut record in batch.links {
      let Some(config) = self.persisted_config(&record.identity.type_id, &mut report) else {
        continue;
      };
      if let Some(to) = remapped.get(&record.from) {
        record.from = to.clone();
      }
      if let Some(to) = remapped.get(&record.to) {
        record.to = to.clone();
      }
      let mut element = Element::Link(record);
      self.prepare(&mut element, &config);
      changes.push(self.store.ingest(element));
    }

    let mut from = Vec::new();
    let mut to = Vec::new();
    let mut new_entities = Vec::new();
    for Change { prior, current } in collapse(changes) {
      match prior {
        Some(prior) => {
          report.merged += 1;
          from.push(prior);
        }
        None => {
          report.added += 1;
          if let Element::Entity(e) = &current {
            new_entities.push(e.identity.clone());
          }
        }
      }
      to.push(current);
    }
    if !to.is_empty() {
      let entry = if from.is_empty() { Entry::add(to) } else { Entry::update(from, to) };
      self.log.record(entry);
    }

    let (events_added, synthesized) = self.add_events(batch.events, &mut report);
    report.events_added = events_added;
    report.synthesized = synthesized.len();
    new_entities.extend(synthesized);

    self.place(&new_entities);

    tracing::info!(
      added = report.added,
      merged = report.merged,
      deduplicated = report.deduplicated,
      skipped = report.skipped,
      events = report.events_added,
      synthesized = report.synthesized,
      "ingested batch"
    );

    if events_added > 0 {
      self.recompute()?;
    }
    Ok(report)
  }

  pub fn add_entity(&mut self, record: EntityRecord) -> Result<IngestReport> {
    self.ingest(RecordBatch { entities: vec![record], ..RecordBatch::default() })
  }

  pub fn add_link(&mut self, record: LinkRecord) -> Result<IngestReport> {
    self.ingest(RecordBatch { links: vec![record], ..RecordBatch::default() })
  }

  /// Replace a stored version (matched by version id) with `element`.
  pub fn update(&mut self, mut element: Element) -> Result<()> {
    let identity = element.identity().clone();
    let version_id = element.version().version_id;
    let prior = match &element {
      Element::Entity(_) => self
        .store
        .entity_history(&identity)
        .map(|h| h.iter().find(|r| r.version.version_id == version_id).cloned().map(Element::Entity)),
      Element::Link(_) => self
        .store
        .link_history(&identity)
        .map(|h| h.iter().find(|r| r.version.version_id == version_id).cloned().map(Element::Link)),
    }
    .ok_or_else(|| Error::IdentityNotFound(identity.clone()))?
    .ok_or(Error::VersionNotFound { identity, version_id })?;

    if let Some(config) = self.resolver.resolve(&element.identity().type_id).cloned() {
      let label = config.label_for(&element.identity().id, &element.version().properties);
      element.version_mut().label = Some(label);
    }

    self
      .store
      .apply(std::slice::from_ref(&prior), std::slice::from_ref(&element));
    self.log.record(Entry::update(vec![prior], vec![element]));
    Ok(())
  }

  /// Remove one version; see [`IdentityStore::remove_version`] for the
  /// cascade. Everything removed lands in one log entry.
  pub fn remove_version(
    &mut self,
    kind: ElementKind,
    identity: &Identity,
    version_id: Uuid,
  ) -> Result<Vec<Element>> {
    let removed = self.store.remove_version(kind, identity, version_id)?;
    self.log.record(Entry::remove(removed.clone()));
    Ok(removed)
  }

  /// Remove every version of an entity, and every link referencing it.
  pub fn remove_entity(&mut self, identity: &Identity) -> Result<Vec<Element>> {
    let removed = self.store.remove_identity(ElementKind::Entity, identity)?;
    self.log.record(Entry::remove(removed.clone()));
    Ok(removed)
  }

  pub fn remove_link(&mut self, identity: &Identity) -> Result<Vec<Element>> {
    let removed = self.store.remove_identity(ElementKind::Link, identity)?;
    self.log.record(Entry::remove(removed.clone()));
    Ok(removed)
  }

  // ── Aggregation inputs ────────────────────────────────────────────────────

  pub fn set_window(&mut self, window: Option<TimeWindow>) -> Result<()> {
    self.window = window;
    self.recompute()
  }

  pub fn set_filter(&mut self, filter: EventFilter) -> Result<()> {
    self.filter = filter;
    self.recompute()
  }

  /// Rebuild the computed links from the current events, window and filter.
  pub fn recompute(&mut self) -> Result<()> {
    let mut links = compute_links(&self.events, &self.resolver, self.window.as_ref(), &self.filter);
    for link in &mut links {
      let rel = &link.identity.type_id;
      let config = self
        .resolver
        .resolve(rel)
        .ok_or_else(|| Error::UnknownType(rel.clone()))?;
      let mut properties = Properties::new();
      for (key, value) in &link.properties {
        properties.insert(key.clone(), serde_json::to_value(value)?);
      }
      link.label = Some(config.label_for(rel, &properties));
    }
    tracing::debug!(links = links.len(), "recomputed links");
    self.computed = links;
    Ok(())
  }

  /// Drop all records, events and history, keeping configuration.
  pub fn reset(&mut self) {
    self.store = IdentityStore::new();
    self.log.clear();
    self.events.clear();
    self.computed.clear();
    self.positions.clear();
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  /// The config of a type whose records are stored, counting skips.
  fn persisted_config(&self, type_id: &str, report: &mut IngestReport) -> Option<TypeConfig> {
    match self.resolver.resolve(type_id) {
      None => {
        tracing::warn!(type_id, "no type configuration; skipping record");
        report.skipped += 1;
        None
      }
      Some(config) if config.is_internal => {
        tracing::debug!(type_id, "internal type; not persisted");
        report.skipped += 1;
        None
      }
      Some(config) => Some(config.clone()),
    }
  }

  /// Derive the version id and the label the stored version will carry.
  fn prepare(&self, element: &mut Element, config: &TypeConfig) {
    if element.version().version_id.is_nil() {
      let derived = derive_version_id(element.identity(), element.version().date_from);
      element.version_mut().version_id = derived;
    }
    let version_id = element.version().version_id;
    let identity = element.identity();

    let stored = match element.kind() {
      ElementKind::Entity => self
        .store
        .entity_history(identity)
        .and_then(|h| h.iter().find(|r| r.version.version_id == version_id))
        .map(|r| &r.version.properties),
      ElementKind::Link => self
        .store
        .link_history(identity)
        .and_then(|h| h.iter().find(|r| r.version.version_id == version_id))
        .map(|r| &r.version.properties),
    };
    let mut merged = stored.cloned().unwrap_or_default();
    merged.extend(element.version().properties.clone());

    let label = config.label_for(&identity.id, &merged);
    element.version_mut().label = Some(label);
  }

  /// Add unseen events, resolve their endpoints and insert the synthesized
  /// entities in one unlogged batch.
  fn add_events(&mut self, events: Vec<Event>, report: &mut IngestReport) -> (usize, Vec<Identity>) {
    let mut seen: HashSet<String> = self.events.iter().map(|e| e.id.clone()).collect();
    let mut added = 0;
    for event in events {
      if self.resolver.resolve(&event.type_id).is_none() {
        tracing::warn!(type_id = %event.type_id, event = %event.id, "no type configuration; skipping event");
        report.skipped += 1;
        continue;
      }
      if !seen.insert(event.id.clone()) {
        tracing::debug!(event = %event.id, "duplicate event id; ignoring");
        continue;
      }
      self.events.push(event);
      added += 1;
    }
    if added == 0 {
      return (0, Vec::new());
    }

    let synthesized = resolve_endpoints(&mut self.events, &self.store, &self.resolver);
    let elements: Vec<Element> = synthesized
      .into_iter()
      .map(|mut record| {
        if let Some(config) = self.resolver.resolve(&record.identity.type_id) {
          record.version.label =
            Some(config.label_for(&record.identity.id, &record.version.properties));
        }
        Element::Entity(record)
      })
      .collect();
    let identities = elements.iter().map(|e| e.identity().clone()).collect();
    self.store.apply(&[], &elements);
    (added, identities)
  }

  /// Seed positions for entities that have none yet.
  fn place(&mut self, entities: &[Identity]) {
    let fresh: Vec<Identity> = entities
      .iter()
      .filter(|id| !self.positions.contains_key(*id))
      .cloned()
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    if fresh.is_empty() {
      return;
    }
    let edges: Vec<(Identity, Identity)> = self
      .store
      .links()
      .filter_map(|(_, h)| h.latest())
      .map(|l| (l.from.clone(), l.to.clone()))
      .collect();
    let placed = seed_positions(&self.layout, &self.positions, &fresh, &edges);
    self.positions.extend(placed);
  }
}
