//! Error types for `weft-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::record::Identity;

#[derive(Debug, Error)]
pub enum Error {
  #[error("no type configuration for {0:?}")]
  UnknownType(String),

  #[error("identity not found: {0}")]
  IdentityNotFound(Identity),

  #[error("version {version_id} not found on {identity}")]
  VersionNotFound { identity: Identity, version_id: Uuid },

  #[error("invalid match pattern {pattern:?} for {type_id}: {source}")]
  InvalidPattern {
    type_id: String,
    pattern: String,
    #[source]
    source:  regex::Error,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
