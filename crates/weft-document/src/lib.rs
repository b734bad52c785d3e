//! The persisted weft document.
//!
//! A document is a JSON object holding every entity and link version, the
//! raw events, and a few values the engine carries without reading
//! (`GeoFeatures`, `Drawings`, `context`). Version ids and labels are
//! derived data: they are left out on save and regenerated on load by the
//! same derivation [`weft_core::workspace::Workspace::ingest`] applies.
//!
//! # Quick start
//!
//! ```no_run
//! use weft_core::{config::TypeCatalog, workspace::Workspace};
//!
//! let text = r#"{ "Entities": [{ "Id": "P1", "TypeId": "Person" }] }"#;
//! let document = weft_document::parse(text).unwrap();
//! let mut workspace = Workspace::new(TypeCatalog::new());
//! workspace.ingest(document.batch()).unwrap();
//! ```

pub mod error;
mod model;
mod source;

pub use error::{Error, Result};
pub use model::{Document, EntityDoc, EventDoc, IdentityDoc, LinkDoc};
pub use source::{FileSource, load, save};
use weft_core::{config::TypeResolver, source::RecordBatch, workspace::Workspace};

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse a document. Events stored under the legacy `PhaseEvents` key are
/// accepted.
pub fn parse(input: &str) -> Result<Document> { Ok(serde_json::from_str(input)?) }

/// Pretty-printed JSON for `document`.
pub fn serialize(document: &Document) -> Result<String> {
  Ok(serde_json::to_string_pretty(document)?)
}

impl Document {
  /// The document's records as one batch for ingestion.
  pub fn batch(&self) -> RecordBatch {
    RecordBatch {
      entities: self.entities.iter().cloned().map(Into::into).collect(),
      links:    self.links.iter().cloned().map(Into::into).collect(),
      events:   self.events.iter().cloned().map(Into::into).collect(),
    }
  }

  /// Replace the records with the workspace's current contents, keeping the
  /// carried-through values.
  pub fn capture<R: TypeResolver>(&mut self, workspace: &Workspace<R>) {
    let store = workspace.store();
    self.entities = store
      .entities()
      .flat_map(|(_, history)| history.versions())
      .map(EntityDoc::from)
      .collect();
    self.links = store
      .links()
      .flat_map(|(_, history)| history.versions())
      .map(LinkDoc::from)
      .collect();
    self.events = workspace.events().iter().map(EventDoc::from).collect();
  }
}
