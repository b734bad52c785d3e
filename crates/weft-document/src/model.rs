//! On-disk shapes. Field names follow the document format, not Rust style.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{
  event::Event,
  record::{EntityRecord, Identity, LinkRecord, Properties, Provenance, Version},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdentityDoc {
  pub id:      String,
  pub type_id: String,
}

impl From<&Identity> for IdentityDoc {
  fn from(identity: &Identity) -> Self {
    Self { id: identity.id.clone(), type_id: identity.type_id.clone() }
  }
}

impl From<IdentityDoc> for Identity {
  fn from(doc: IdentityDoc) -> Self { Identity::new(doc.id, doc.type_id) }
}

/// One stored entity version. Version id and label are derived on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityDoc {
  pub id:         String,
  pub type_id:    String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_from:  Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_to:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub properties: Properties,
  #[serde(default)]
  pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkDoc {
  pub id:         String,
  pub type_id:    String,
  pub from:       IdentityDoc,
  pub to:         IdentityDoc,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_from:  Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_to:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub properties: Properties,
  #[serde(default)]
  pub provenance: Provenance,
}

/// A raw event. Endpoints are re-resolved on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventDoc {
  pub id:         String,
  pub type_id:    String,
  pub timestamp:  DateTime<Utc>,
  #[serde(default)]
  pub properties: Properties,
}

/// The whole persisted document.
///
/// `GeoFeatures`, `Drawings` and `context` are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Document {
  #[serde(default)]
  pub entities:     Vec<EntityDoc>,
  #[serde(default)]
  pub links:        Vec<LinkDoc>,
  #[serde(default, alias = "PhaseEvents")]
  pub events:       Vec<EventDoc>,
  #[serde(default)]
  pub geo_features: Vec<Value>,
  #[serde(default)]
  pub drawings:     Value,
  #[serde(default, rename = "context")]
  pub context:      String,
}

// ─── Conversions ─────────────────────────────────────────────────────────────

fn version(
  date_from: Option<DateTime<Utc>>,
  date_to: Option<DateTime<Utc>>,
  properties: Properties,
  provenance: Provenance,
) -> Version {
  Version { date_to, properties, provenance, ..Version::starting(date_from) }
}

impl From<EntityDoc> for EntityRecord {
  fn from(doc: EntityDoc) -> Self {
    EntityRecord {
      identity: Identity::new(doc.id, doc.type_id),
      version:  version(doc.date_from, doc.date_to, doc.properties, doc.provenance),
    }
  }
}

impl From<&EntityRecord> for EntityDoc {
  fn from(record: &EntityRecord) -> Self {
    EntityDoc {
      id:         record.identity.id.clone(),
      type_id:    record.identity.type_id.clone(),
      date_from:  record.version.date_from,
      date_to:    record.version.date_to,
      properties: record.version.properties.clone(),
      provenance: record.version.provenance.clone(),
    }
  }
}

impl From<LinkDoc> for LinkRecord {
  fn from(doc: LinkDoc) -> Self {
    LinkRecord {
      identity: Identity::new(doc.id, doc.type_id),
      from:     doc.from.into(),
      to:       doc.to.into(),
      version:  version(doc.date_from, doc.date_to, doc.properties, doc.provenance),
    }
  }
}

impl From<&LinkRecord> for LinkDoc {
  fn from(record: &LinkRecord) -> Self {
    LinkDoc {
      id:         record.identity.id.clone(),
      type_id:    record.identity.type_id.clone(),
      from:       (&record.from).into(),
      to:         (&record.to).into(),
      date_from:  record.version.date_from,
      date_to:    record.version.date_to,
      properties: record.version.properties.clone(),
      provenance: record.version.provenance.clone(),
    }
  }
}

impl From<EventDoc> for Event {
  fn from(doc: EventDoc) -> Self {
    Event { properties: doc.properties, ..Event::new(doc.id, doc.type_id, doc.timestamp) }
  }
}

impl From<&Event> for EventDoc {
  fn from(event: &Event) -> Self {
    EventDoc {
      id:         event.id.clone(),
      type_id:    event.type_id.clone(),
      timestamp:  event.timestamp,
      properties: event.properties.clone(),
    }
  }
}
