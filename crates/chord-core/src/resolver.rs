//! Layered config resolution.
//!
//! A service's [`ConfigVars`] is the union of three layers, lowest to
//! highest precedence: shared instance config, static per-artifact config,
//! and runtime secrets. It is recomputed on every call; only the static and
//! secret layers are persisted, each by its own [`ConfigDocument`].

use crate::CoreError;
use chord_schema::{keys, Artifact, ConfigVars, ServiceDescriptor};
use chord_store::{
    static_template, ChordLayout, ConfigDocument, DocumentKind, JsonDocumentStore, SecretGenerator,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The two instance-wide documents the shared layer is read from.
#[derive(Debug, Clone)]
pub struct SharedConfigFiles {
    pub auth: PathBuf,
    pub instance: PathBuf,
}

impl SharedConfigFiles {
    pub fn from_layout(layout: &ChordLayout) -> Self {
        Self {
            auth: layout.auth_config(),
            instance: layout.instance_config(),
        }
    }

    /// Discovery endpoint from the auth config, overlaid by every key of the
    /// instance config. Missing files read as empty.
    pub fn load(&self) -> Result<ConfigVars, CoreError> {
        let mut vars = ConfigVars::new();
        let auth = read_object(&self.auth)?;
        if let Some(uri) = auth.get(keys::OIDC_DISCOVERY_URI) {
            if let Some(value) = scalar_text(uri) {
                vars.insert(keys::OIDC_DISCOVERY_URI.to_owned(), value);
            }
        }
        for (key, value) in &read_object(&self.instance)? {
            if let Some(value) = scalar_text(value) {
                vars.insert(key.clone(), value);
            }
        }
        Ok(vars)
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>, CoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

/// Strings verbatim, other values as their JSON text, `null` dropped.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `shared ∪ static ∪ secrets`, later layers winning on collisions.
pub fn merge_layers(shared: &ConfigVars, static_vars: &ConfigVars, secrets: &ConfigVars) -> ConfigVars {
    let mut merged = shared.clone();
    merged.extend(static_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(secrets.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

pub struct ConfigResolver {
    layout: ChordLayout,
    shared: SharedConfigFiles,
    static_store: Box<dyn ConfigDocument>,
    secret_store: Box<dyn ConfigDocument>,
    generator: SecretGenerator,
    required_shared_keys: Vec<String>,
}

impl ConfigResolver {
    pub fn new(
        layout: ChordLayout,
        shared: SharedConfigFiles,
        static_store: Box<dyn ConfigDocument>,
        secret_store: Box<dyn ConfigDocument>,
        generator: SecretGenerator,
    ) -> Self {
        Self {
            layout,
            shared,
            static_store,
            secret_store,
            generator,
            required_shared_keys: vec![keys::OIDC_DISCOVERY_URI.to_owned()],
        }
    }

    /// Resolver over the JSON documents at their standard locations.
    pub fn for_layout(layout: &ChordLayout) -> Self {
        Self::new(
            layout.clone(),
            SharedConfigFiles::from_layout(layout),
            Box::new(JsonDocumentStore::new(layout.static_config(), DocumentKind::Static)),
            Box::new(JsonDocumentStore::new(layout.runtime_config(), DocumentKind::Secret)),
            SecretGenerator::new(),
        )
    }

    #[must_use]
    pub fn with_required_shared_keys(mut self, keys: Vec<String>) -> Self {
        self.required_shared_keys = keys;
        self
    }

    #[inline]
    pub fn layout(&self) -> &ChordLayout {
        &self.layout
    }

    /// The shared instance layer, read fresh from disk.
    ///
    /// Every required key must be present and non-empty.
    pub fn shared_config(&self) -> Result<ConfigVars, CoreError> {
        let vars = self.shared.load()?;
        if let Some(missing) = self
            .required_shared_keys
            .iter()
            .find(|k| vars.get(k.as_str()).map_or(true, String::is_empty))
        {
            return Err(CoreError::MissingSharedKey(missing.clone()));
        }
        Ok(vars)
    }

    /// Static config for `descriptor`, generating and persisting the derived
    /// template the first time the artifact is seen. Build time only.
    pub fn static_config(&self, descriptor: &ServiceDescriptor) -> Result<ConfigVars, CoreError> {
        let artifact = descriptor.artifact();
        Ok(self.static_store.get_or_create(artifact, &mut || {
            info!("generating static config for {artifact}");
            static_template(&self.layout, artifact)
        })?)
    }

    /// Static config that must already exist; runtime never creates it.
    pub fn existing_static_config(&self, artifact: &Artifact) -> Result<ConfigVars, CoreError> {
        self.static_store
            .get(artifact)?
            .ok_or_else(|| CoreError::MissingStaticConfig(artifact.to_string()))
    }

    /// Secrets for `descriptor`, generated and persisted on first reference.
    pub fn runtime_secrets(&self, descriptor: &ServiceDescriptor) -> Result<ConfigVars, CoreError> {
        let artifact = descriptor.artifact();
        Ok(self.secret_store.get_or_create(artifact, &mut || {
            info!("generating runtime secrets for {artifact}");
            self.generator.secret_record()
        })?)
    }

    /// Full runtime view, given an already loaded shared layer.
    pub fn resolve_with(
        &self,
        shared: &ConfigVars,
        descriptor: &ServiceDescriptor,
    ) -> Result<ConfigVars, CoreError> {
        let static_vars = self.existing_static_config(descriptor.artifact())?;
        let secrets = self.runtime_secrets(descriptor)?;
        debug!(
            "resolved {} keys for {}",
            shared.len() + static_vars.len() + secrets.len(),
            descriptor.artifact()
        );
        Ok(merge_layers(shared, &static_vars, &secrets))
    }

    /// Full runtime view, reading the shared layer fresh.
    pub fn resolve(&self, descriptor: &ServiceDescriptor) -> Result<ConfigVars, CoreError> {
        let shared = self.shared_config()?;
        self.resolve_with(&shared, descriptor)
    }
}
