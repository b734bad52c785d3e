//! [`History`]: the chronological version list of one identity.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::record::Versioned;

/// Outcome of [`History::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert<R> {
  /// The stored version before a merge; `None` when the id was new.
  pub prior:   Option<R>,
  /// The version as stored afterwards.
  pub current: R,
}

/// Versions of one identity, kept sorted ascending by `date_from`. An open
/// `date_from` sorts before every concrete date.
#[derive(Debug, Clone, PartialEq)]
pub struct History<R> {
  versions: Vec<R>,
}

impl<R: Versioned> History<R> {
  pub fn new(first: R) -> Self { Self { versions: vec![first] } }

  pub fn versions(&self) -> &[R] { &self.versions }

  pub fn len(&self) -> usize { self.versions.len() }

  pub fn is_empty(&self) -> bool { self.versions.is_empty() }

  /// The version with the latest `date_from`.
  pub fn latest(&self) -> Option<&R> { self.versions.last() }

  pub fn get(&self, version_id: Uuid) -> Option<&R> {
    self
      .versions
      .iter()
      .find(|r| r.version().version_id == version_id)
  }

  /// The last version whose `date_from` is at or before `date`.
  ///
  /// When `date` precedes every version the earliest version is returned
  /// rather than nothing.
  pub fn resolve_at(&self, date: DateTime<Utc>) -> Option<&R> {
    let after = self
      .versions
      .partition_point(|r| r.version().date_from.is_none_or(|d| d <= date));
    match after.checked_sub(1) {
      Some(idx) => self.versions.get(idx),
      None => self.versions.first(),
    }
  }

  /// Insert `record`, or merge it into the version with the same id.
  pub(crate) fn upsert(&mut self, record: R) -> Upsert<R> {
    let version_id = record.version().version_id;
    let upsert = match self.position(version_id) {
      Some(idx) => {
        let existing = &mut self.versions[idx];
        if !existing.version().same_interval(record.version()) {
          tracing::warn!(
            identity = %record.identity(),
            %version_id,
            "version collision with a different interval; merging"
          );
        }
        let prior = existing.clone();
        existing.merge(record);
        Upsert { prior: Some(prior), current: existing.clone() }
      }
      None => {
        self.versions.push(record.clone());
        Upsert { prior: None, current: record }
      }
    };
    self.sort();
    upsert
  }

  /// Store `record` exactly as given, replacing any version with the same
  /// id. Used when replaying log snapshots.
  pub(crate) fn put(&mut self, record: R) {
    match self.position(record.version().version_id) {
      Some(idx) => self.versions[idx] = record,
      None => self.versions.push(record),
    }
    self.sort();
  }

  pub(crate) fn remove(&mut self, version_id: Uuid) -> Option<R> {
    self
      .position(version_id)
      .map(|idx| self.versions.remove(idx))
  }

  fn position(&self, version_id: Uuid) -> Option<usize> {
    self
      .versions
      .iter()
      .position(|r| r.version().version_id == version_id)
  }

  fn sort(&mut self) {
    self
      .versions
      .sort_by(|a, b| a.version().date_from.cmp(&b.version().date_from));
  }
}
