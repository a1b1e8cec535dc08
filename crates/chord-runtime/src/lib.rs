//! Command rendering and process execution for CHORD container services.
//!
//! This crate implements the execution layer: `{KEY}` placeholder formatting,
//! the shell command renderer (single-quote escaping, inline environment
//! assignments, per-variant preamble, interpreter wrapping), the pluggable
//! `ServiceRuntime` trait with host and mock implementations, PID files,
//! signal delivery with a bounded termination wait, and prerequisite checks.

pub mod backend;
pub mod host;
pub mod mock;
pub mod placeholder;
pub mod prereq;
pub mod process;
pub mod shell;

pub use backend::{select_runtime, CommandStatus, ServiceRuntime, SignalDelivery};
pub use host::HostRuntime;
pub use mock::{Invocation, MockRuntime};
pub use placeholder::format_template;
pub use prereq::{check_database_prereqs, check_shell_prereqs, format_missing, MissingPrereq};
pub use process::{
    process_alive, read_pid_file, terminate, wait_for_exit, Signal, StopOutcome, StopPolicy,
};
pub use shell::{
    escape_single_quotes, format_env_pair, render_environment_assignments,
    resolve_run_environment, shell_quote, ShellCommandRenderer, DEFAULT_INTERPRETER,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime '{0}' is not available")]
    RuntimeUnavailable(String),
    #[error("execution failed: {0}")]
    ExecFailed(String),
    #[error("unknown placeholder '{{{placeholder}}}' in '{template}'")]
    UnknownPlaceholder { placeholder: String, template: String },
    #[error("malformed template '{template}': {reason}")]
    MalformedTemplate {
        template: String,
        reason: &'static str,
    },
    #[error("config variable '{0}' is not set")]
    MissingVar(String),
    #[error("invalid PID file {}: '{content}'", path.display())]
    InvalidPid { path: PathBuf, content: String },
    #[error("failed to signal pid {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}
