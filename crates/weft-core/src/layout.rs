//! Initial positions for newly ingested entities.
//!
//! A bounded force approximation: already-placed entities stay fixed, new
//! ones start near a placed neighbour (or at random) and are relaxed for at
//! most `max_iterations` rounds. The random source is seeded, so the same
//! input always yields the same positions.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::record::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
  pub seed:           u64,
  pub max_iterations: usize,
  /// Ideal edge length.
  pub spacing:        f64,
}

const DEFAULT_SPACING: f64 = 80.0;
const MAX_SPACING: f64 = 1.0e6;

impl Default for LayoutConfig {
  fn default() -> Self { Self { seed: 0x5eed, max_iterations: 60, spacing: DEFAULT_SPACING } }
}

impl LayoutConfig {
  /// `spacing` clamped to `[1, 1e6]`; non-finite values fall back to the
  /// default.
  pub fn effective_spacing(&self) -> f64 {
    if self.spacing.is_finite() {
      self.spacing.clamp(1.0, MAX_SPACING)
    } else {
      DEFAULT_SPACING
    }
  }
}

/// Positions for `new_nodes`, given the fixed positions in `placed` and the
/// links between entities.
pub fn seed_positions(
  config: &LayoutConfig,
  placed: &BTreeMap<Identity, Point>,
  new_nodes: &[Identity],
  edges: &[(Identity, Identity)],
) -> BTreeMap<Identity, Point> {
  let mut rng = StdRng::seed_from_u64(config.seed);
  let k = config.effective_spacing();
  let spread = k * (new_nodes.len().max(1) as f64).sqrt();

  let mut positions: BTreeMap<Identity, Point> = BTreeMap::new();
  for node in new_nodes {
    let anchor = edges.iter().find_map(|(a, b)| {
      if a == node {
        placed.get(b)
      } else if b == node {
        placed.get(a)
      } else {
        None
      }
    });
    let start = match anchor {
      Some(p) => Point {
        x: p.x + rng.random_range(-k..k),
        y: p.y + rng.random_range(-k..k),
      },
      None => Point {
        x: rng.random_range(-spread..spread),
        y: rng.random_range(-spread..spread),
      },
    };
    positions.insert(node.clone(), start);
  }

  let position_of = |id: &Identity, moving: &BTreeMap<Identity, Point>| {
    moving.get(id).or_else(|| placed.get(id)).copied()
  };

  let mut temperature = k;
  let cooling = k / config.max_iterations.max(1) as f64;

  for _ in 0..config.max_iterations {
    let mut shift: BTreeMap<&Identity, Point> = BTreeMap::new();

    for node in new_nodes {
      let Some(p) = positions.get(node).copied() else { continue };
      let mut d = Point::default();

      for other in positions.keys().chain(placed.keys()) {
        if other == node {
          continue;
        }
        let Some(q) = position_of(other, &positions) else { continue };
        let (dx, dy, dist) = delta(p, q);
        let force = k * k / dist;
        d.x += dx / dist * force;
        d.y += dy / dist * force;
      }

      for (a, b) in edges {
        let other = if a == node {
          b
        } else if b == node {
          a
        } else {
          continue;
        };
        let Some(q) = position_of(other, &positions) else { continue };
        let (dx, dy, dist) = delta(p, q);
        let force = dist * dist / k;
        d.x -= dx / dist * force;
        d.y -= dy / dist * force;
      }
      shift.insert(node, d);
    }

    let mut moved = 0.0_f64;
    for (node, d) in shift {
      let len = (d.x * d.x + d.y * d.y).sqrt();
      if len <= f64::EPSILON {
        continue;
      }
      let step = len.min(temperature);
      if let Some(p) = positions.get_mut(node) {
        p.x += d.x / len * step;
        p.y += d.y / len * step;
      }
      moved = moved.max(step);
    }

    temperature = (temperature - cooling).max(0.0);
    if moved < 0.01 {
      break;
    }
  }

  positions
}

/// Vector from `q` to `p` and its length, never zero.
fn delta(p: Point, q: Point) -> (f64, f64, f64) {
  let dx = p.x - q.x;
  let dy = p.y - q.y;
  let dist = (dx * dx + dy * dy).sqrt().max(0.01);
  (dx, dy, dist)
}
