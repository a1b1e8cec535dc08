use std::path::{Path, PathBuf};

/// Default container root that every other path derives from.
pub const DEFAULT_ROOT: &str = "/chord";

/// Directory layout of a CHORD container.
///
/// `data/` lives on the persistent volume (secrets, service data); `tmp/`
/// holds sockets, logs and PID files and may be wiped between launches.
#[derive(Debug, Clone)]
pub struct ChordLayout {
    root: PathBuf,
}

impl Default for ChordLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl ChordLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The service manifest, `chord_services.json`.
    #[inline]
    pub fn services_manifest(&self) -> PathBuf {
        self.root.join("chord_services.json")
    }

    /// Static per-artifact config, generated at image build time.
    #[inline]
    pub fn static_config(&self) -> PathBuf {
        self.root.join("chord_services_config.json")
    }

    #[inline]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    #[inline]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    #[inline]
    pub fn services_dir(&self) -> PathBuf {
        self.root.join("services")
    }

    #[inline]
    pub fn service_install_dir(&self, artifact: &str) -> PathBuf {
        self.services_dir().join(artifact)
    }

    #[inline]
    pub fn vassals_dir(&self) -> PathBuf {
        self.root.join("vassals")
    }

    #[inline]
    pub fn vassal_path(&self, artifact: &str) -> PathBuf {
        self.vassals_dir().join(format!("{artifact}.ini"))
    }

    #[inline]
    pub fn auth_config(&self) -> PathBuf {
        self.data_dir().join(".auth_config.json")
    }

    #[inline]
    pub fn instance_config(&self) -> PathBuf {
        self.data_dir().join(".instance_config.json")
    }

    /// Runtime secrets, generated on first launch. Owner-only.
    #[inline]
    pub fn runtime_config(&self) -> PathBuf {
        self.data_dir().join(".runtime_config.json")
    }

    /// Instance-wide environment file shared by every service.
    #[inline]
    pub fn common_environment(&self) -> PathBuf {
        self.data_dir().join(".environment")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.tmp_dir().join(".chord-container.lock")
    }
}
