pub mod config;
pub mod lifecycle;
pub mod setup;

use chord_core::{ensure_container_context, CoreError, InvocationLock, JobKind, ToolConfig};
use chord_runtime::{select_runtime, ServiceRuntime};
use chord_schema::{load_services, ServiceDescriptor};
use std::path::PathBuf;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_TARGET_EXISTS: u8 = 4;

/// Options shared by every subcommand.
#[derive(Debug)]
pub struct GlobalOpts {
    pub root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub runtime: String,
    pub json: bool,
}

pub fn exit_code(err: &CoreError) -> u8 {
    match err {
        CoreError::Manifest(_) => EXIT_MANIFEST_ERROR,
        CoreError::Store(_) => EXIT_STORE_ERROR,
        CoreError::TargetExists(_) => EXIT_TARGET_EXISTS,
        _ => EXIT_FAILURE,
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CoreError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Everything a job needs once the guard has passed and the lock is held.
pub struct Session {
    pub config: ToolConfig,
    pub services: Vec<ServiceDescriptor>,
    _lock: InvocationLock,
}

impl Session {
    /// Guard, load config, take the invocation lock, then load the manifest.
    pub fn open(opts: &GlobalOpts, job: JobKind) -> Result<Self, CoreError> {
        ensure_container_context(job)?;
        let mut config = ToolConfig::locate(opts.config.as_deref())?;
        if let Some(root) = &opts.root {
            config = config.with_root(root);
        }
        let layout = config.layout();
        let lock = InvocationLock::acquire(&layout.lock_file())?;
        let manifest = layout.services_manifest();
        let services = load_services(&manifest)?;
        debug!("{} service(s) from {}", services.len(), manifest.display());
        Ok(Self {
            config,
            services,
            _lock: lock,
        })
    }

    pub fn runtime(opts: &GlobalOpts) -> Result<Box<dyn ServiceRuntime>, CoreError> {
        Ok(select_runtime(&opts.runtime)?)
    }
}
