use crate::kind::{ServiceKind, ServiceMode};
use crate::types::{Artifact, PackageName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read service manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse service manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid artifact '{0}': must be 1-64 characters of [a-zA-Z0-9_-]")]
    InvalidArtifact(String),
    #[error("artifact '{0}' is declared more than once")]
    DuplicateArtifact(String),
    #[error("service '{artifact}' is missing required field '{field}'")]
    MissingField {
        artifact: String,
        field: &'static str,
    },
    #[error("service '{artifact}': {kind} services are not supported")]
    UnsupportedKind { artifact: String, kind: ServiceKind },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Interpreted, with a managed virtualenv per service.
    Python,
    /// Script-invoked; installed globally and started by its runnable.
    Javascript,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Javascript => write!(f, "javascript"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceType {
    pub artifact: Artifact,
    pub language: Language,
}

/// One entry of `chord_services.json`.
///
/// Unknown fields are tolerated: the manifest is owned and validated by an
/// external loader and carries fields this tool has no use for.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default = "default_wsgi")]
    pub wsgi: bool,
    #[serde(default)]
    pub python_module: Option<String>,
    #[serde(default)]
    pub python_callable: Option<String>,
    #[serde(default)]
    pub python_args: Option<Vec<String>>,
    #[serde(default)]
    pub service_runnable: Option<String>,
    #[serde(default)]
    pub apt_dependencies: Vec<PackageName>,
    #[serde(default, alias = "pre_install")]
    pub pre_install_commands: Vec<String>,
    #[serde(default, alias = "pre_start")]
    pub pre_start_commands: Vec<String>,
    #[serde(default, alias = "post_start")]
    pub post_start_commands: Vec<String>,
    #[serde(default, alias = "post_stop")]
    pub post_stop_commands: Vec<String>,
    #[serde(default)]
    pub run_environment: BTreeMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
}

fn default_wsgi() -> bool {
    true
}

/// Command lists a descriptor may declare, keyed by the phase that runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandHook {
    PreInstall,
    PreStart,
    PostStart,
    PostStop,
}

impl fmt::Display for CommandHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandHook::PreInstall => write!(f, "pre_install"),
            CommandHook::PreStart => write!(f, "pre_start"),
            CommandHook::PostStart => write!(f, "post_start"),
            CommandHook::PostStop => write!(f, "post_stop"),
        }
    }
}

impl ServiceDescriptor {
    #[inline]
    pub fn artifact(&self) -> &Artifact {
        &self.service_type.artifact
    }

    #[inline]
    pub fn language(&self) -> Language {
        self.service_type.language
    }

    pub fn kind(&self) -> ServiceKind {
        let mode = if self.wsgi {
            ServiceMode::Embedded
        } else {
            ServiceMode::Daemon
        };
        ServiceKind::new(self.language(), mode)
    }

    pub fn commands(&self, hook: CommandHook) -> &[String] {
        match hook {
            CommandHook::PreInstall => &self.pre_install_commands,
            CommandHook::PreStart => &self.pre_start_commands,
            CommandHook::PostStart => &self.post_start_commands,
            CommandHook::PostStop => &self.post_stop_commands,
        }
    }

    /// Check the fields the selected [`ServiceKind`] depends on.
    pub fn validate(&self) -> Result<(), ManifestError> {
        validate_artifact(self.artifact())?;
        let kind = self.kind();
        let missing = |field: &'static str| ManifestError::MissingField {
            artifact: self.artifact().to_string(),
            field,
        };
        match (kind.language, kind.mode) {
            (Language::Python, ServiceMode::Embedded) => {
                if self.python_module.is_none() {
                    return Err(missing("python_module"));
                }
                if self.python_callable.is_none() {
                    return Err(missing("python_callable"));
                }
            }
            (_, ServiceMode::Daemon) => {
                if self.service_runnable.is_none() {
                    return Err(missing("service_runnable"));
                }
            }
            (Language::Javascript, ServiceMode::Embedded) => {
                return Err(ManifestError::UnsupportedKind {
                    artifact: self.artifact().to_string(),
                    kind,
                });
            }
        }
        Ok(())
    }
}

/// Artifacts end up in file names, socket paths and shell lines, so they are
/// restricted to a conservative slug alphabet.
pub fn validate_artifact(artifact: &str) -> Result<(), ManifestError> {
    let valid = !artifact.is_empty()
        && artifact.len() <= 64
        && artifact
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidArtifact(artifact.to_owned()))
    }
}

/// Parse a manifest, dropping disabled services and validating the rest.
pub fn parse_services_str(input: &str) -> Result<Vec<ServiceDescriptor>, ManifestError> {
    let all: Vec<ServiceDescriptor> = serde_json::from_str(input)?;
    let services: Vec<ServiceDescriptor> = all.into_iter().filter(|s| !s.disabled).collect();

    let mut seen = HashSet::new();
    for service in &services {
        service.validate()?;
        if !seen.insert(service.artifact().as_str()) {
            return Err(ManifestError::DuplicateArtifact(service.artifact().to_string()));
        }
    }
    Ok(services)
}

pub fn load_services(path: impl AsRef<Path>) -> Result<Vec<ServiceDescriptor>, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_services_str(&content)
}

/// Union of every service's OS package dependencies, de-duplicated.
pub fn apt_dependencies(services: &[ServiceDescriptor]) -> BTreeSet<PackageName> {
    services
        .iter()
        .flat_map(|s| s.apt_dependencies.iter().cloned())
        .collect()
}
