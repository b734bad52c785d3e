//! Global date bounds across every stored version interval.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Version;

/// Running min/max over all version bounds, clamped to whole days. Bounds
/// only ever widen; removals never narrow them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
  pub min: Option<DateTime<Utc>>,
  pub max: Option<DateTime<Utc>>,
}

impl Bounds {
  /// Widen to cover both bounds of `version`.
  pub fn widen(&mut self, version: &Version) {
    for date in [version.date_from, version.date_to].into_iter().flatten() {
      self.include(date);
    }
  }

  pub fn include(&mut self, date: DateTime<Utc>) {
    let start = start_of_day(date);
    let end = end_of_day(date);
    self.min = Some(self.min.map_or(start, |m| m.min(start)));
    self.max = Some(self.max.map_or(end, |m| m.max(end)));
  }

  pub fn is_empty(&self) -> bool { self.min.is_none() && self.max.is_none() }
}

pub fn start_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
  date.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Last millisecond of the day containing `date`.
pub fn end_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
  let start = start_of_day(date);
  start
    .checked_add_signed(TimeDelta::days(1))
    .and_then(|next| next.checked_sub_signed(TimeDelta::milliseconds(1)))
    .unwrap_or(start)
}
