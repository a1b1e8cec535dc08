use crate::render::ProxyPolicy;
use crate::CoreError;
use chord_runtime::{ShellCommandRenderer, Signal, StopPolicy, DEFAULT_INTERPRETER};
use chord_schema::keys;
use chord_store::layout::DEFAULT_ROOT;
use chord_store::ChordLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the tool config file when `--config` is absent.
pub const CONFIG_ENV: &str = "CHORD_CONTAINER_CONFIG";

const DEFAULT_NGINX_CONF_DIR: &str = "/usr/local/openresty/nginx/conf";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub nginx_conf_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            nginx_conf_dir: PathBuf::from(DEFAULT_NGINX_CONF_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    /// Interpreter every rendered command chain runs under.
    pub interpreter: String,
    /// Python used to create service virtualenvs at build time.
    pub python: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_owned(),
            python: "python3".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StopConfig {
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
    pub signal: Signal,
}

impl Default for StopConfig {
    fn default() -> Self {
        let policy = StopPolicy::default();
        Self {
            poll_interval_ms: millis(policy.poll_interval),
            max_wait_ms: millis(policy.max_wait),
            signal: policy.signal,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SharedConfig {
    /// Keys that must be present and non-empty in the shared instance config.
    pub required_keys: Vec<String>,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            required_keys: vec![keys::OIDC_DISCOVERY_URI.to_owned()],
        }
    }
}

/// Tool configuration, read from an optional TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub paths: PathsConfig,
    pub shell: ShellConfig,
    pub stop: StopConfig,
    pub proxy: ProxyPolicy,
    pub shared: SharedConfig,
}

impl ToolConfig {
    pub fn parse_str(content: &str, origin: &Path) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(content).map_err(|e| CoreError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse_str(&content, path)
    }

    /// Load from `explicit`, else from [`CONFIG_ENV`], else defaults.
    ///
    /// A path that was named but cannot be read is an error, not a fallback.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, CoreError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self, origin: &Path) -> Result<(), CoreError> {
        let invalid = |message: &str| {
            Err(CoreError::Config {
                path: origin.to_path_buf(),
                message: message.to_owned(),
            })
        };
        if self.stop.poll_interval_ms == 0 {
            return invalid("stop.poll_interval_ms must be positive");
        }
        if self.stop.max_wait_ms < self.stop.poll_interval_ms {
            return invalid("stop.max_wait_ms must not be shorter than stop.poll_interval_ms");
        }
        if self.shell.interpreter.is_empty() {
            return invalid("shell.interpreter must not be empty");
        }
        Ok(())
    }

    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths.root = root.into();
        self
    }

    pub fn layout(&self) -> ChordLayout {
        ChordLayout::new(&self.paths.root)
    }

    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            signal: self.stop.signal,
            poll_interval: Duration::from_millis(self.stop.poll_interval_ms),
            max_wait: Duration::from_millis(self.stop.max_wait_ms),
        }
    }

    pub fn command_renderer(&self) -> ShellCommandRenderer {
        ShellCommandRenderer::new(&self.shell.interpreter)
    }
}
