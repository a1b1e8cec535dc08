//! Guard shared by every entry point: refuse to run outside a container.

use crate::CoreError;
use std::fmt;

const DOCKER_BUILD_VAR: &str = "CHORD_DOCKER_BUILD";
const NEW_DATABASE_VAR: &str = "NEW_DATABASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Image build: the setup job.
    Build,
    /// Container launch: every lifecycle phase.
    Runtime,
}

impl JobKind {
    /// Variables, any one of which proves the expected context.
    pub fn context_vars(self) -> [&'static str; 2] {
        match self {
            JobKind::Build => ["SINGULARITY_ENVIRONMENT", DOCKER_BUILD_VAR],
            JobKind::Runtime => ["SINGULARITY_CONTAINER", DOCKER_BUILD_VAR],
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Build => write!(f, "build"),
            JobKind::Runtime => write!(f, "runtime"),
        }
    }
}

/// Check the process environment for a container marker.
pub fn ensure_container_context(job: JobKind) -> Result<(), CoreError> {
    ensure_container_context_with(job, |var| {
        std::env::var_os(var).is_some_and(|v| !v.is_empty())
    })
}

pub fn ensure_container_context_with(
    job: JobKind,
    is_set: impl Fn(&str) -> bool,
) -> Result<(), CoreError> {
    let vars = job.context_vars();
    if vars.iter().any(|v| is_set(v)) {
        Ok(())
    } else {
        Err(CoreError::OutsideContainer {
            job,
            vars: vars.join(", "),
        })
    }
}

/// Whether this launch is against a freshly initialised database volume.
///
/// Only an explicit `True`, `true` or `1` in `NEW_DATABASE` counts.
pub fn fresh_database_requested(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup(NEW_DATABASE_VAR).is_some_and(|v| matches!(v.trim(), "True" | "true" | "1"))
}
