//! Core orchestration for CHORD container services.
//!
//! This crate ties schema, store and runtime together: the `ConfigResolver`
//! that layers shared instance config, static config and runtime secrets; the
//! `Orchestrator` that drives every service through the lifecycle phases;
//! the build-time `SetupJob` and `TemplateRenderer`; tool configuration; the
//! container-context guard; and the process-level invocation lock.

pub mod concurrency;
pub mod config;
pub mod context;
pub mod database;
pub mod lifecycle;
pub mod orchestrator;
pub mod render;
pub mod resolver;
pub mod setup;

pub use concurrency::InvocationLock;
pub use config::{PathsConfig, SharedConfig, ShellConfig, StopConfig, ToolConfig, CONFIG_ENV};
pub use context::{ensure_container_context, ensure_container_context_with, fresh_database_requested, JobKind};
pub use database::bootstrap_commands;
pub use lifecycle::{validate_sequence, Phase};
pub use orchestrator::{Orchestrator, PhaseReport, ServiceOutcome};
pub use render::{write_new_file, ProxyPolicy, RenderedService, TemplateRenderer};
pub use resolver::{merge_layers, ConfigResolver, SharedConfigFiles};
pub use setup::SetupJob;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] chord_schema::ManifestError),
    #[error("store error: {0}")]
    Store(#[from] chord_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] chord_runtime::RuntimeError),
    #[error("invalid config file {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
    #[error("cannot run outside of a container ({job} job requires one of: {vars})")]
    OutsideContainer { job: JobKind, vars: String },
    #[error("required shared config key '{0}' is missing or empty")]
    MissingSharedKey(String),
    #[error("no static config for '{0}'; it is generated when the image is built")]
    MissingStaticConfig(String),
    #[error("refusing to overwrite existing file {}", .0.display())]
    TargetExists(PathBuf),
    #[error("invalid phase order: {from} -> {to}")]
    InvalidPhaseOrder { from: Phase, to: Phase },
    #[error("setup step '{step}' failed: {reason}")]
    SetupFailed { step: &'static str, reason: String },
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
