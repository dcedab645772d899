//! ABI contract between the Kiln host and its extension modules.
//!
//! Extension modules are native dynamic libraries (`cdylib`) built against
//! this crate. A conforming module exports three things:
//!
//! - [`ABI_VERSION_SYMBOL`](manifest::ABI_VERSION_SYMBOL): reports the ABI
//!   revision the module was built against
//! - [`MANIFEST_SYMBOL`](manifest::MANIFEST_SYMBOL): returns the module's
//!   entry-point manifest, a C-ABI table of [`RawEntryDescriptor`] records
//! - one constructor symbol per entry point, named by its descriptor
//!
//! The [`declare_plugins!`] macro generates all of these for plugin authors.
//! The host and the module must be built against the same version of this
//! crate: constructors hand a `Box<dyn PluginComponent>` across the library
//! boundary, so trait and layout compatibility is part of the contract.

mod macros;
pub mod manifest;

use serde::{Deserialize, Serialize};

pub use manifest::{
    ABI_VERSION_SYMBOL, KILN_ABI_VERSION, MANIFEST_SYMBOL, RawEntryDescriptor, RawManifest,
};

/// Declared metadata for one entry point: the stable identifier the host
/// keys its plugin registry by, plus a human-facing name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Stable unique identifier (reverse-domain style, e.g. `com.example.hud`)
    pub id: String,
    /// Display name
    pub name: String,
    /// Version string
    pub version: String,
    /// Optional free-form description
    #[serde(default)]
    pub description: String,
}

impl PluginMetadata {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Errors an entry-point instance can raise during its scene lifecycle.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ComponentError {
    /// The instance failed its own initialization when attached.
    #[error("component initialization failed: {0}")]
    Init(String),

    /// Catch-all for component-defined failures.
    #[error("{0}")]
    Other(String),
}

/// The pluggable-component capability.
///
/// Entry-point types implement this trait; the host attaches live instances
/// as children of the current reload container and drives them once per
/// frame. `on_attach` runs on the frame the instance lands in the scene;
/// an `Err` there is caught per instance and does not affect siblings.
pub trait PluginComponent {
    /// Called once when the instance is attached to its container node.
    fn on_attach(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Called once per host frame while the instance is alive.
    fn on_update(&mut self, _frame: u64) {}

    /// Called when the owning node is destroyed.
    fn on_detach(&mut self) {}
}
