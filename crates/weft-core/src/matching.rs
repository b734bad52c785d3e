//! Deduplication of incoming entities through configured match rules.

use regex::Regex;

use crate::{
  config::MatchRule,
  record::{EntityRecord, Identity, Properties, value_text},
  store::IdentityStore,
};

enum Compiled {
  Equals(String),
  Regex(String, Regex),
}

/// The match rules of one entity type, compiled once per batch.
pub struct Matcher {
  rules: Vec<Compiled>,
}

impl Matcher {
  /// Compile `rules`. A rule with an invalid pattern is skipped with a
  /// warning; [`crate::config::TypeCatalog::validate`] reports it up front.
  pub fn new(type_id: &str, rules: &[MatchRule]) -> Self {
    let rules = rules
      .iter()
      .filter_map(|rule| match rule {
        MatchRule::Equals { property } => Some(Compiled::Equals(property.clone())),
        MatchRule::Regex { property, pattern } => match Regex::new(pattern) {
          Ok(re) => Some(Compiled::Regex(property.clone(), re)),
          Err(e) => {
            tracing::warn!(type_id, pattern = %pattern, error = %e, "skipping invalid match rule");
            None
          }
        },
      })
      .collect();
    Self { rules }
  }

  pub fn is_empty(&self) -> bool { self.rules.is_empty() }

  /// True when any rule identifies `a` with `b`.
  pub fn is_match(&self, a: &Properties, b: &Properties) -> bool {
    self.rules.iter().any(|rule| match rule {
      Compiled::Equals(property) => match (a.get(property), b.get(property)) {
        (Some(x), Some(y)) => !x.is_null() && x == y,
        _ => false,
      },
      Compiled::Regex(property, re) => {
        let found = |props: &Properties| {
          props
            .get(property)
            .and_then(value_text)
            .and_then(|text| re.find(&text).map(|m| m.as_str().to_owned()))
        };
        matches!((found(a), found(b)), (Some(x), Some(y)) if x == y)
      }
    })
  }

  /// An existing entity of the same type that `record` duplicates, compared
  /// against each candidate's latest version.
  pub fn find_duplicate<'s>(
    &self,
    store: &'s IdentityStore,
    record: &EntityRecord,
  ) -> Option<&'s Identity> {
    if self.is_empty() {
      return None;
    }
    store
      .entities()
      .filter(|(identity, _)| {
        identity.type_id == record.identity.type_id && **identity != record.identity
      })
      .find(|(_, history)| {
        history
          .latest()
          .is_some_and(|latest| self.is_match(&latest.version.properties, &record.version.properties))
      })
      .map(|(identity, _)| identity)
  }
}
