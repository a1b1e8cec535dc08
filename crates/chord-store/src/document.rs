use crate::{fsync_dir, StoreError};
use chord_schema::{Artifact, ConfigVars};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// A whole on-disk document: artifact -> flat string map.
pub type Document = BTreeMap<String, ConfigVars>;

/// Which of the two documents is being written; decides the file mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Derived paths, readable by everyone, writable by no one.
    Static,
    /// Generated secrets, owner read/write only.
    Secret,
}

impl DocumentKind {
    pub fn mode(self) -> u32 {
        match self {
            DocumentKind::Static => 0o644,
            DocumentKind::Secret => 0o600,
        }
    }
}

/// Load a document, treating a missing file as an empty document (first run).
pub fn load_or_empty(path: &Path) -> Result<Document, StoreError> {
    if !path.exists() {
        return Ok(Document::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Overwrite the whole document, then tighten its permissions.
///
/// The content lands through a temp file and `rename()`. The temp file is
/// created owner-only, so between the rename and the chmod the file is at
/// worst more restrictive than intended, never less.
pub fn save(path: &Path, document: &Document, kind: DocumentKind) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let content = serde_json::to_string_pretty(document)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(&dir)?;

    fs::set_permissions(path, fs::Permissions::from_mode(kind.mode()))?;
    Ok(())
}

/// Narrow repository interface over an artifact-keyed config document.
///
/// Entries are write-once: `get_or_create` only calls its generator when the
/// artifact is absent, and `persist` refuses to replace an existing entry
/// with different content.
pub trait ConfigDocument {
    fn get(&self, artifact: &Artifact) -> Result<Option<ConfigVars>, StoreError>;

    fn persist(&self, artifact: &Artifact, vars: &ConfigVars) -> Result<(), StoreError>;

    fn get_or_create(
        &self,
        artifact: &Artifact,
        create: &mut dyn FnMut() -> ConfigVars,
    ) -> Result<ConfigVars, StoreError> {
        if let Some(existing) = self.get(artifact)? {
            return Ok(existing);
        }
        let vars = create();
        self.persist(artifact, &vars)?;
        Ok(vars)
    }
}

fn insert_once(
    document: &mut Document,
    artifact: &Artifact,
    vars: &ConfigVars,
) -> Result<bool, StoreError> {
    match document.get(artifact.as_str()) {
        Some(existing) if existing == vars => Ok(false),
        Some(_) => Err(StoreError::EntryExists(artifact.to_string())),
        None => {
            document.insert(artifact.to_string(), vars.clone());
            Ok(true)
        }
    }
}

/// A [`ConfigDocument`] backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonDocumentStore {
    path: PathBuf,
    kind: DocumentKind,
}

impl JsonDocumentStore {
    pub fn new(path: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(&self) -> Result<Document, StoreError> {
        load_or_empty(&self.path)
    }
}

impl ConfigDocument for JsonDocumentStore {
    fn get(&self, artifact: &Artifact) -> Result<Option<ConfigVars>, StoreError> {
        let mut document = self.read_all()?;
        Ok(document.remove(artifact.as_str()))
    }

    fn persist(&self, artifact: &Artifact, vars: &ConfigVars) -> Result<(), StoreError> {
        let mut document = self.read_all()?;
        if insert_once(&mut document, artifact, vars)? {
            debug!(
                "writing entry for {artifact} to {} ({:?})",
                self.path.display(),
                self.kind
            );
            save(&self.path, &document, self.kind)?;
        }
        Ok(())
    }
}

/// In-memory [`ConfigDocument`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    entries: Mutex<Document>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Document) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn snapshot(&self) -> Result<Document, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(entries.clone())
    }
}

impl ConfigDocument for MemoryDocumentStore {
    fn get(&self, artifact: &Artifact) -> Result<Option<ConfigVars>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(entries.get(artifact.as_str()).cloned())
    }

    fn persist(&self, artifact: &Artifact, vars: &ConfigVars) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        insert_once(&mut entries, artifact, vars)?;
        Ok(())
    }
}
