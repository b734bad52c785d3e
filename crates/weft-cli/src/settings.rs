//! Runtime configuration for the `weft` binary.

use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;
use weft_core::{config::TypeCatalog, event::TimeWindow, layout::LayoutConfig};

/// Everything read from the config file and `WEFT_*` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
  /// Type configuration keyed by type id.
  #[serde(default)]
  pub types:  TypeCatalog,
  #[serde(default)]
  pub layout: LayoutConfig,
  /// Initial aggregation window; unbounded when absent.
  #[serde(default)]
  pub window: Option<TimeWindow>,
}

impl CliConfig {
  /// Read `path` (optional) layered under the environment, and validate the
  /// type catalog.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("WEFT").separator("__"))
      .build()
      .context("failed to read config file")?;

    let cfg: CliConfig = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.types.validate().context("invalid type configuration")?;
    Ok(cfg)
  }
}
