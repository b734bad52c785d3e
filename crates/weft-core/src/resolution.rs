//! Endpoint resolution: map raw event properties onto entity identities.
//!
//! Each generation rule of an event's type names, per side, the entity type
//! to look in and the event property holding the key. In direct mode the key
//! is the entity id; in indirect mode it is compared against a property of
//! the entity. Keys that match nothing produce a minimal synthesized entity,
//! returned to the caller for one batch insertion.

use serde_json::Value;
use uuid::Uuid;

use crate::{
  config::{EndpointTarget, TypeResolver},
  event::{Endpoints, Event},
  record::{EntityRecord, Identity, Provenance, Version, derive_version_id, value_text},
  store::IdentityStore,
};

/// Resolve every event that does not carry endpoints yet. Returns the
/// entities synthesized along the way, in creation order.
pub fn resolve_endpoints<R>(
  events: &mut [Event],
  store: &IdentityStore,
  resolver: &R,
) -> Vec<EntityRecord>
where
  R: TypeResolver + ?Sized,
{
  let mut synthesized = Vec::new();
  let mut resolved = 0usize;

  for event in events.iter_mut().filter(|e| e.endpoints.is_none()) {
    let rules = resolver.generation_rules(&event.type_id);
    if rules.is_empty() {
      continue;
    }

    let mut endpoints = Endpoints::default();
    for rule in rules {
      let rel = &rule.relationship_type;
      if let Some(from) = resolve_side(&rule.from, event, store, &mut synthesized) {
        endpoints.from.insert(rel.clone(), from);
      }
      if let Some(to) = resolve_side(&rule.to, event, store, &mut synthesized) {
        endpoints.to.insert(rel.clone(), to);
      }
    }

    if endpoints.is_resolved() {
      resolved += 1;
    } else {
      tracing::debug!(event = %event.id, type_id = %event.type_id, "event left unresolved");
    }
    event.endpoints = Some(endpoints);
  }

  tracing::debug!(resolved, synthesized = synthesized.len(), "endpoint resolution finished");
  synthesized
}

fn resolve_side(
  target: &EndpointTarget,
  event: &Event,
  store: &IdentityStore,
  synthesized: &mut Vec<EntityRecord>,
) -> Option<Identity> {
  let value = event
    .properties
    .get(&target.source_property)
    .filter(|v| !v.is_null())?;
  let key = value_text(value)?;

  match &target.entity_property {
    Some(entity_property) => Some(resolve_indirect(
      target,
      entity_property,
      value,
      &key,
      store,
      synthesized,
    )),
    None => Some(resolve_direct(target, key, store, synthesized)),
  }
}

fn resolve_indirect(
  target: &EndpointTarget,
  entity_property: &str,
  value: &Value,
  key: &str,
  store: &IdentityStore,
  synthesized: &mut Vec<EntityRecord>,
) -> Identity {
  let has_key = |record: &EntityRecord| {
    record
      .version
      .properties
      .get(entity_property)
      .and_then(value_text)
      .is_some_and(|v| v == key)
  };

  let existing = store
    .entities()
    .filter(|(identity, _)| identity.type_id == target.entity_type)
    .find(|(_, history)| history.latest().is_some_and(has_key))
    .map(|(identity, _)| identity.clone());
  if let Some(identity) = existing {
    return identity;
  }
  if let Some(record) = synthesized
    .iter()
    .find(|r| r.identity.type_id == target.entity_type && has_key(r))
  {
    return record.identity.clone();
  }

  let identity = Identity::new(Uuid::new_v4().to_string(), target.entity_type.clone());
  let version = Version::starting(None).with_property(entity_property, value.clone());
  push_synthesized(synthesized, identity, version)
}

fn resolve_direct(
  target: &EndpointTarget,
  key: String,
  store: &IdentityStore,
  synthesized: &mut Vec<EntityRecord>,
) -> Identity {
  let identity = Identity::new(key, target.entity_type.clone());
  if store.contains_entity(&identity) || synthesized.iter().any(|r| r.identity == identity) {
    return identity;
  }
  push_synthesized(synthesized, identity, Version::starting(None))
}

fn push_synthesized(
  synthesized: &mut Vec<EntityRecord>,
  identity: Identity,
  mut version: Version,
) -> Identity {
  version.version_id = derive_version_id(&identity, None);
  version.provenance = Provenance::System;
  tracing::debug!(%identity, "synthesized endpoint entity");
  synthesized.push(EntityRecord { identity: identity.clone(), version });
  identity
}
