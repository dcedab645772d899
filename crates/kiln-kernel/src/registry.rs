//! Process-wide plugin registry.
//!
//! Maps stable plugin identifiers to their [`PluginInfo`] descriptors. The
//! registry is created explicitly at host startup and handed to the reload
//! engine as a cloneable handle; the engine is its only writer, the rest of
//! the host reads from it.
//!
//! Registration uses overwrite semantics: reloading a module whose entry
//! declares an already-known identifier replaces the previous descriptor;
//! last reload wins. Entries are never removed during normal operation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Type-level descriptor stored per registered identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Stable identifier the registry is keyed by
    pub id: String,
    /// Display name
    pub name: String,
    /// Version string
    pub version: String,
    /// Fully-qualified name of the entry-point type
    pub qualified_name: String,
    /// Rewritten identity of the loaded module copy this entry came from
    pub module_identity: String,
    /// On-disk path the module was loaded from
    pub source_path: PathBuf,
    /// Content hash of the source binary
    pub file_hash: Option<String>,
    /// First registration timestamp (unix seconds)
    pub loaded_at: Option<u64>,
    /// Number of times this identifier has been overwritten by a reload
    pub reload_count: u32,
}

impl PluginInfo {
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            qualified_name: String::new(),
            module_identity: String::new(),
            source_path: PathBuf::new(),
            file_hash: None,
            loaded_at: None,
            reload_count: 0,
        }
    }

    pub fn with_qualified_name(mut self, qualified_name: &str) -> Self {
        self.qualified_name = qualified_name.to_string();
        self
    }

    pub fn with_module_identity(mut self, identity: &str) -> Self {
        self.module_identity = identity.to_string();
        self
    }

    pub fn with_source_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source_path = path.into();
        self
    }

    pub fn with_file_hash(mut self, hash: &str) -> Self {
        self.file_hash = Some(hash.to_string());
        self
    }

    /// Stamps the load timestamp.
    pub fn mark_loaded(&mut self) {
        self.loaded_at = Some(now_unix_secs());
    }
}

/// Cloneable handle to the process-wide identifier → [`PluginInfo`] map.
///
/// The interior lock only guards the shared handle; all mutation happens
/// from the host's main update tick.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Arc<RwLock<HashMap<String, PluginInfo>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin descriptor, overwriting any previous entry with
    /// the same identifier. Returns the replaced descriptor, if any.
    pub fn register(&self, mut info: PluginInfo) -> Option<PluginInfo> {
        let mut plugins = self.plugins.write();

        match plugins.remove(&info.id) {
            Some(previous) => {
                debug!(id = %info.id, "overwriting existing registration");
                info.loaded_at = previous.loaded_at;
                info.reload_count = previous.reload_count + 1;
                if info.loaded_at.is_none() {
                    info.mark_loaded();
                }
                plugins.insert(info.id.clone(), info);
                Some(previous)
            }
            None => {
                info!(id = %info.id, name = %info.name, version = %info.version, "registering plugin");
                info.mark_loaded();
                plugins.insert(info.id.clone(), info);
                None
            }
        }
    }

    /// Looks up a descriptor by identifier.
    pub fn get(&self, id: &str) -> Option<PluginInfo> {
        self.plugins.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.read().contains_key(id)
    }

    /// All registered descriptors, in no particular order.
    pub fn list(&self) -> Vec<PluginInfo> {
        self.plugins.read().values().cloned().collect()
    }

    /// All registered identifiers.
    pub fn ids(&self) -> Vec<String> {
        self.plugins.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// Drops every registration. Host shutdown / test helper.
    pub fn clear(&self) {
        self.plugins.write().clear();
    }
}
