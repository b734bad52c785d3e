//! The mutation log: a bounded, cursor-based undo/redo history.
//!
//! Entries are kept newest first. `position` counts how many entries have
//! been undone; everything before it is the redo branch. Recording a new
//! entry while `position > 0` discards that branch, so history stays linear.

use serde::{Deserialize, Serialize};

use crate::{record::Element, store::IdentityStore};

/// Maximum number of entries kept.
pub const LOG_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
  Add,
  Update,
  Remove,
}

/// One invertible structural change. `from` holds the touched versions as
/// they were before the change, `to` as they were after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
  pub action: Action,
  pub from:   Vec<Element>,
  pub to:     Vec<Element>,
}

impl Entry {
  pub fn add(to: Vec<Element>) -> Self { Self { action: Action::Add, from: Vec::new(), to } }

  pub fn update(from: Vec<Element>, to: Vec<Element>) -> Self {
    Self { action: Action::Update, from, to }
  }

  pub fn remove(from: Vec<Element>) -> Self {
    Self { action: Action::Remove, from, to: Vec::new() }
  }

  pub fn is_empty(&self) -> bool { self.from.is_empty() && self.to.is_empty() }

  /// Undo: drop what the change produced, restore what it replaced.
  fn revert(&self, store: &mut IdentityStore) { store.apply(&self.to, &self.from); }

  /// Redo: drop what the change replaced, restore what it produced.
  fn replay(&self, store: &mut IdentityStore) { store.apply(&self.from, &self.to); }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationLog {
  entries:  Vec<Entry>,
  position: usize,
}

impl MutationLog {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn position(&self) -> usize { self.position }

  /// Entries, newest first.
  pub fn entries(&self) -> &[Entry] { &self.entries }

  pub fn can_undo(&self) -> bool { self.position < self.entries.len() }

  pub fn can_redo(&self) -> bool { self.position > 0 }

  /// Push a new entry, truncating the redo branch.
  pub fn record(&mut self, entry: Entry) {
    if entry.is_empty() {
      return;
    }
    if self.position > 0 {
      self.entries.drain(..self.position);
      self.position = 0;
    }
    tracing::debug!(action = %entry.action, size = entry.from.len() + entry.to.len(), "logged mutation");
    self.entries.insert(0, entry);
    self.entries.truncate(LOG_CAPACITY);
  }

  /// Revert the entry at the cursor. Returns `false` when nothing is left
  /// to undo.
  pub fn undo(&mut self, store: &mut IdentityStore) -> bool {
    let Some(entry) = self.entries.get(self.position) else {
      return false;
    };
    entry.revert(store);
    self.position += 1;
    true
  }

  /// Re-apply the most recently undone entry. Returns `false` when nothing
  /// has been undone.
  pub fn redo(&mut self, store: &mut IdentityStore) -> bool {
    let Some(idx) = self.position.checked_sub(1) else {
      return false;
    };
    let Some(entry) = self.entries.get(idx) else {
      return false;
    };
    entry.replay(store);
    self.position = idx;
    true
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.position = 0;
  }
}
