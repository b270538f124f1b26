//! Plugin registry — durable CRUD store with metadata snapshots, history
//! and dynamic dispatch.
//!
//! One `.rhai` backing file per entry plus a JSON index under a root
//! directory. The registry never calls the gate: callers are expected to
//! have gated the source already (or to be exercising the operator
//! override), keeping durability and policy independently testable.
//!
//! The store is single-writer. `invoke`, `get_source` and `load` always
//! re-read the backing file, so an external edit is picked up on the next
//! call without an explicit reload.

use crate::error::{LoadError, RegistryError};
use crate::loader::{LoadedPlugin, ModuleLoader};
use crate::types::{now, ParamSchemaItem, PluginOutput, ProgramKind, ProgramMetadata, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_runtime::{harness_engine, CapabilityError, CapabilityProvider};

const INDEX_FILE: &str = "registry.json";

/// One appended history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryNote {
    pub at: Timestamp,
    pub note: String,
}

/// One registered plugin.
///
/// The id derives from creation time and never changes; overwrites
/// re-snapshot the metadata and append to `history` in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub file: PathBuf,
    pub source_hash: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub kind: ProgramKind,
    pub params: Vec<ParamSchemaItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    pub created_at: Timestamp,
    pub history: Vec<HistoryNote>,
}

impl RegistryEntry {
    fn snapshot(&mut self, metadata: &ProgramMetadata, source_hash: &str) {
        self.name = metadata.name.clone();
        self.version = metadata.version.clone();
        self.description = metadata.description.clone();
        self.kind = metadata.kind;
        self.params = metadata.params.clone();
        self.source_hash = source_hash.to_string();
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: Vec<RegistryEntry>,
}

/// Durable plugin store rooted at one directory.
#[derive(Clone)]
pub struct PluginRegistry {
    root: PathBuf,
    loader: ModuleLoader,
    provider: Arc<dyn CapabilityProvider>,
}

impl PluginRegistry {
    /// Open (or create) a registry under `root`. Invocations resolve
    /// capability calls against `provider`, extended with plugin-to-plugin
    /// dispatch backed by this registry.
    pub fn open(
        root: impl Into<PathBuf>,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Result<Self, RegistryError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| RegistryError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            loader: ModuleLoader::new(provider.clone()),
            provider,
            root,
        })
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn load_index(&self) -> Result<Index, RegistryError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Index::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| RegistryError::CorruptIndex {
            path,
            detail: e.to_string(),
        })
    }

    fn save_index(&self, index: &Index) -> Result<(), RegistryError> {
        let path = self.index_path();
        let text = serde_json::to_string_pretty(index).expect("index serializes");
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|source| RegistryError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| RegistryError::Io { path, source })
    }

    fn next_id(index: &Index) -> String {
        let base = format!("plugin_{}", now().timestamp_millis());
        if !index.entries.iter().any(|e| e.id == base) {
            return base;
        }
        let mut bump = 1usize;
        loop {
            let candidate = format!("{base}_{bump}");
            if !index.entries.iter().any(|e| e.id == candidate) {
                return candidate;
            }
            bump += 1;
        }
    }

    /// Register a new plugin. Metadata is snapshotted from the source at
    /// this instant; no gating happens here.
    pub fn register(
        &self,
        source: &str,
        spec: Option<&str>,
    ) -> Result<RegistryEntry, RegistryError> {
        let (metadata, source_hash) = self.snapshot_metadata("<candidate>", source)?;

        let mut index = self.load_index()?;
        let id = Self::next_id(&index);
        let file = self.root.join(format!("{id}.rhai"));
        fs::write(&file, source).map_err(|source| RegistryError::Io {
            path: file.clone(),
            source,
        })?;

        let entry = RegistryEntry {
            id: id.clone(),
            file,
            source_hash,
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            description: metadata.description.clone(),
            kind: metadata.kind,
            params: metadata.params.clone(),
            spec: spec.map(str::to_string),
            created_at: now(),
            history: vec![HistoryNote {
                at: now(),
                note: "registered".to_string(),
            }],
        };
        index.entries.push(entry.clone());
        self.save_index(&index)?;

        info!(id = %entry.id, name = %entry.name, "plugin registered");
        Ok(entry)
    }

    /// All entries, in registration order.
    pub fn list(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        Ok(self.load_index()?.entries)
    }

    /// Entry by id.
    pub fn get(&self, id: &str) -> Result<RegistryEntry, RegistryError> {
        self.load_index()?
            .entries
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| RegistryError::UnknownId(id.to_string()))
    }

    /// Current source of an entry, re-read from the backing file.
    pub fn get_source(&self, id: &str) -> Result<String, RegistryError> {
        let entry = self.get(id)?;
        fs::read_to_string(&entry.file).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RegistryError::MissingSource {
                    id: id.to_string(),
                    path: entry.file.clone(),
                }
            } else {
                RegistryError::Io {
                    path: entry.file.clone(),
                    source,
                }
            }
        })
    }

    /// Replace an entry's source in place. Entry identity is preserved;
    /// metadata is re-snapshotted from the new source and history appended.
    pub fn overwrite(
        &self,
        id: &str,
        new_source: &str,
        note: Option<&str>,
    ) -> Result<RegistryEntry, RegistryError> {
        let (metadata, source_hash) = self.snapshot_metadata(id, new_source)?;

        let mut index = self.load_index()?;
        let entry = index
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RegistryError::UnknownId(id.to_string()))?;

        fs::write(&entry.file, new_source).map_err(|source| RegistryError::Io {
            path: entry.file.clone(),
            source,
        })?;
        entry.snapshot(&metadata, &source_hash);
        entry.history.push(HistoryNote {
            at: now(),
            note: note.unwrap_or("overwritten").to_string(),
        });

        let updated = entry.clone();
        self.save_index(&index)?;
        info!(id = %updated.id, version = %updated.version, "plugin overwritten");
        Ok(updated)
    }

    /// Delete an entry and its backing source.
    ///
    /// Ordered so a crash in between cannot leave a phantom runnable entry:
    /// the record is removed first, then the file best-effort. A leftover
    /// file without a record is inert; a record without a file would not be.
    pub fn delete(&self, id: &str) -> Result<RegistryEntry, RegistryError> {
        let mut index = self.load_index()?;
        let position = index
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| RegistryError::UnknownId(id.to_string()))?;
        let entry = index.entries.remove(position);
        self.save_index(&index)?;

        if let Err(e) = fs::remove_file(&entry.file) {
            warn!(id = %entry.id, path = %entry.file.display(), error = %e,
                  "backing source removal failed; record already gone");
        }
        info!(id = %entry.id, "plugin deleted");
        Ok(entry)
    }

    /// Load an entry's current on-disk source into its capability interface.
    pub fn load(&self, id: &str) -> Result<LoadedPlugin, RegistryError> {
        let source = self.get_source(id)?;
        self.loader
            .load(&source)
            .map_err(|e| RegistryError::Load {
                id: id.to_string(),
                source: e,
            })
    }

    /// Invoke an entry with a parameter mapping.
    ///
    /// Always re-loads the current on-disk source, coerces the parameters
    /// against the declared schema, and runs the entry point with
    /// plugin-to-plugin dispatch available.
    pub fn invoke(
        &self,
        id: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<PluginOutput, RegistryError> {
        let plugin = self.load(id)?;
        let metadata = plugin.metadata().map_err(|e| RegistryError::Load {
            id: id.to_string(),
            source: e,
        })?;
        let coerced = metadata
            .coerce_params(params)
            .map_err(|details| RegistryError::InvalidParams {
                id: id.to_string(),
                details,
            })?;

        debug!(id, name = %metadata.name, "invoking plugin");
        let engine = harness_engine(self.dispatch_provider());
        let value = plugin
            .invoke(&engine, &coerced)
            .map_err(|e| RegistryError::Invoke {
                id: id.to_string(),
                detail: e.to_string(),
            })?;
        Ok(PluginOutput::classify(&value, metadata.kind))
    }

    /// Invoke an entry by its snapshotted name.
    pub fn invoke_by_name(
        &self,
        name: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<PluginOutput, RegistryError> {
        let entry = self
            .list()?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))?;
        self.invoke(&entry.id, params)
    }

    /// The provider plugin invocations see: the registry's base provider
    /// plus `call_plugin` dispatch into this registry.
    fn dispatch_provider(&self) -> Arc<dyn CapabilityProvider> {
        Arc::new(RegistryProvider {
            registry: self.clone(),
        })
    }

    fn snapshot_metadata(
        &self,
        id: &str,
        source: &str,
    ) -> Result<(ProgramMetadata, String), RegistryError> {
        let loaded = self.loader.load(source).map_err(|e| RegistryError::Load {
            id: id.to_string(),
            source: e,
        })?;
        let metadata = loaded.metadata().map_err(|e| RegistryError::Load {
            id: id.to_string(),
            source: e,
        })?;
        Ok((metadata, loaded.source_hash().to_string()))
    }
}

/// Capability provider that adds plugin-to-plugin dispatch on top of the
/// registry's base provider.
struct RegistryProvider {
    registry: PluginRegistry,
}

impl CapabilityProvider for RegistryProvider {
    fn get_secret(&self, name: &str) -> warden_runtime::Result<String> {
        self.registry.provider.get_secret(name)
    }

    fn read_text(&self, key: &str) -> warden_runtime::Result<String> {
        self.registry.provider.read_text(key)
    }

    fn write_text(&self, key: &str, content: &str) -> warden_runtime::Result<()> {
        self.registry.provider.write_text(key, content)
    }

    fn http_get_json(&self, url: &str, query: &Value) -> warden_runtime::Result<Value> {
        self.registry.provider.http_get_json(url, query)
    }

    fn http_post_json(&self, url: &str, body: &Value) -> warden_runtime::Result<Value> {
        self.registry.provider.http_post_json(url, body)
    }

    fn call_plugin(&self, name: &str, params: &Value) -> warden_runtime::Result<Value> {
        let params: BTreeMap<String, Value> = match params {
            Value::Object(map) => map.clone().into_iter().collect(),
            Value::Null => BTreeMap::new(),
            other => {
                return Err(CapabilityError::Payload(format!(
                    "call_plugin params must be a map, got {other}"
                )))
            }
        };
        // Callees resolve by snapshotted name first, then by entry id.
        let result = match self.registry.invoke_by_name(name, &params) {
            Err(RegistryError::UnknownName(_)) => self.registry.invoke(name, &params),
            other => other,
        };
        result
            .map(|output| output.to_value())
            .map_err(|e| CapabilityError::PluginCall(e.to_string()))
    }
}
