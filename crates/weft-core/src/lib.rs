//! Core types and engines for the Weft entity/relationship store.
//!
//! This crate is deliberately free of I/O. It owns the versioned identity
//! store, the undo/redo log, endpoint resolution and event aggregation. The
//! persisted document format lives in `weft-document`; anything that fetches
//! records asynchronously implements [`source::RecordSource`] and hands the
//! resulting batch to [`workspace::Workspace::ingest`].

pub mod aggregate;
pub mod bounds;
pub mod config;
pub mod error;
pub mod event;
pub mod history;
pub mod layout;
pub mod log;
pub mod matching;
pub mod record;
pub mod resolution;
pub mod source;
pub mod store;
pub mod workspace;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
