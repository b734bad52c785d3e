//! weft command-line tool.
//!
//! Loads a weft document into a workspace using the type configuration from
//! `weft.toml` (or the path given with `--config`) and reports on it.

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use weft_core::{
  aggregate::ComputedLink,
  bounds::Bounds,
  workspace::{IngestReport, Workspace},
};
use weft_document::Document;

use crate::settings::CliConfig;

#[derive(Parser)]
#[command(author, version, about = "Inspect and rewrite weft documents")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "weft.toml")]
  config: PathBuf,

  /// The document to load.
  document: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Print record counts, bounds and computed links as JSON.
  Summary,
  /// Print the entities and links valid at a date as JSON.
  Snapshot {
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    #[arg(long, value_parser = parse_date)]
    at: DateTime<Utc>,
  },
  /// Load the document and write it back with derived fields regenerated.
  Resave {
    /// Output path.
    out: PathBuf,
  },
}

#[derive(Serialize)]
struct Summary<'a> {
  report:         IngestReport,
  entities:       usize,
  links:          usize,
  events:         usize,
  bounds:         Bounds,
  computed_links: &'a [ComputedLink],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config)?;

  let mut document = weft_document::load(&cli.document)
    .await
    .with_context(|| format!("failed to load document {:?}", cli.document))?;

  let mut workspace = Workspace::new(cfg.types).with_layout(cfg.layout);
  let report = workspace
    .ingest(document.batch())
    .context("failed to ingest document")?;
  tracing::info!(
    entities = workspace.store().entity_count(),
    links = workspace.store().link_count(),
    computed = workspace.computed_links().len(),
    "workspace ready"
  );
  if cfg.window.is_some() {
    workspace
      .set_window(cfg.window)
      .context("failed to apply configured window")?;
  }

  match cli.command {
    Command::Summary => {
      let summary = Summary {
        report,
        entities: workspace.store().entity_count(),
        links: workspace.store().link_count(),
        events: workspace.events().len(),
        bounds: workspace.bounds(),
        computed_links: workspace.computed_links(),
      };
      print_json(&summary)?;
    }
    Command::Snapshot { at } => print_json(&workspace.snapshot_at(at))?,
    Command::Resave { out } => resave(&mut document, &workspace, out).await?,
  }

  Ok(())
}

async fn resave(
  document: &mut Document,
  workspace: &Workspace,
  out: PathBuf,
) -> anyhow::Result<()> {
  document.capture(workspace);
  weft_document::save(&out, document)
    .await
    .with_context(|| format!("failed to write {out:?}"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let text = serde_json::to_string_pretty(value).context("failed to serialise output")?;
  println!("{text}");
  Ok(())
}

/// Accept a full timestamp or a bare date (midnight UTC).
fn parse_date(input: &str) -> anyhow::Result<DateTime<Utc>> {
  if let Ok(at) = DateTime::parse_from_rfc3339(input) {
    return Ok(at.with_timezone(&Utc));
  }
  let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
    .with_context(|| format!("invalid date {input:?}"))?;
  date
    .and_hms_opt(0, 0, 0)
    .map(|naive| naive.and_utc())
    .context("invalid date")
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn parses_bare_dates_and_timestamps() {
    assert_eq!(parse_date("2024-03-01").unwrap(), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    assert_eq!(
      parse_date("2024-03-01T12:30:00+02:00").unwrap(),
      Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
    );
    assert!(parse_date("yesterday").is_err());
  }

  #[test]
  fn cli_requires_a_subcommand() {
    assert!(Cli::try_parse_from(["weft", "doc.json"]).is_err());
    let cli = Cli::try_parse_from(["weft", "doc.json", "snapshot", "--at", "2020-01-01"]).unwrap();
    assert!(matches!(cli.command, Command::Snapshot { .. }));
  }
}
