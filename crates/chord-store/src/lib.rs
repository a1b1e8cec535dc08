//! On-disk state for CHORD containers: layout, config documents, secrets.
//!
//! This crate provides the storage layer: `ChordLayout` for the container
//! directory structure, the `ConfigDocument` abstraction over the two
//! artifact-keyed JSON documents (static config and runtime secrets) with a
//! file-backed and an in-memory implementation, the derived static config
//! template, `SecretGenerator`, and the owner-only environment file writer.
//!
//! Single-writer assumption: documents are rewritten whole, with no file
//! locking. Two processes racing to create the same artifact's entry resolve
//! as last-writer-wins. Callers that can run concurrently must serialize at
//! the process level.

pub mod document;
pub mod envfile;
pub mod layout;
pub mod secrets;
pub mod static_config;

pub use document::{
    load_or_empty, save, ConfigDocument, Document, DocumentKind, JsonDocumentStore,
    MemoryDocumentStore,
};
pub use envfile::{write_environment_file, EnvFileStyle};
pub use layout::ChordLayout;
pub use secrets::{SecretGenerator, SECRET_ALPHABET, SECRET_LENGTH};
pub use static_config::static_template;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("entry for '{0}' already exists and is never overwritten")]
    EntryExists(String),
    #[error("invalid environment entry '{key}': {reason}")]
    InvalidEnvironment { key: String, reason: &'static str },
    #[error("in-memory store poisoned: {0}")]
    Poisoned(String),
}
