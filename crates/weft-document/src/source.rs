//! [`FileSource`]: a document on disk as a [`RecordSource`].

use std::path::{Path, PathBuf};

use weft_core::source::{RecordBatch, RecordSource};

use crate::{Document, Error, Result, parse};

/// Read `path` and parse it as a document.
pub async fn load(path: &Path) -> Result<Document> {
  let text = tokio::fs::read_to_string(path)
    .await
    .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
  let document = parse(&text)?;
  tracing::debug!(
    path = %path.display(),
    entities = document.entities.len(),
    links = document.links.len(),
    events = document.events.len(),
    "loaded document"
  );
  Ok(document)
}

/// Serialize `document` and write it to `path`, replacing any existing file.
pub async fn save(path: &Path, document: &Document) -> Result<()> {
  let text = crate::serialize(document)?;
  tokio::fs::write(path, text)
    .await
    .map_err(|source| Error::Write { path: path.to_path_buf(), source })?;
  tracing::info!(path = %path.display(), "saved document");
  Ok(())
}

/// A document file that yields its records on every fetch.
#[derive(Debug, Clone)]
pub struct FileSource {
  path: PathBuf,
}

impl FileSource {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }
}

impl RecordSource for FileSource {
  type Error = Error;

  async fn fetch(&self) -> Result<RecordBatch> { Ok(load(&self.path).await?.batch()) }
}
