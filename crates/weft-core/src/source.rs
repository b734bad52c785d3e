//! The asynchronous boundary: anything that produces records.
//!
//! File reads and remote queries live outside the store. They resolve to a
//! plain [`RecordBatch`], which is then applied in one synchronous call to
//! [`crate::workspace::Workspace::ingest`]; the store never waits mid-mutation.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  event::Event,
  record::{EntityRecord, LinkRecord},
};

/// The three record shapes an import or query delivers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
  #[serde(default)]
  pub entities: Vec<EntityRecord>,
  #[serde(default)]
  pub links:    Vec<LinkRecord>,
  #[serde(default)]
  pub events:   Vec<Event>,
}

impl RecordBatch {
  pub fn is_empty(&self) -> bool {
    self.entities.is_empty() && self.links.is_empty() && self.events.is_empty()
  }

  pub fn len(&self) -> usize { self.entities.len() + self.links.len() + self.events.len() }
}

/// A producer of record batches (document reader, remote query, importer).
pub trait RecordSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch the next batch of records.
  fn fetch(&self) -> impl Future<Output = Result<RecordBatch, Self::Error>> + Send + '_;
}
