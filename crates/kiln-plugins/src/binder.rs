//! Instantiation binder.
//!
//! For each entry-point type enumerated from a loaded unit: query the
//! capability predicate, register the type in the process-wide registry
//! (overwrite, last reload wins), and schedule attachment of a live
//! instance onto the reload container for the next frame, never
//! synchronously during the enumeration pass, so scene mutation stays off
//! the enumeration loop and on the host's designated frames.
//!
//! Every failure is isolated to the type (or the instance) it came from.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info};

use kiln_kernel::{FrameScheduler, NodeId, PluginInfo, PluginRegistry};
use kiln_plugin_api::PluginMetadata;

use crate::loader::TypeDescriptor;
use crate::probe::matches_symbol;

/// Answer of the capability predicate for one type descriptor.
#[derive(Debug, Clone)]
pub enum Capability {
    /// Not a real entry point (helper/abstract declaration); skipped
    /// silently.
    NotAnEntryPoint,
    /// A registrable entry point with its declared metadata.
    EntryPoint(PluginMetadata),
}

/// Decides whether a type descriptor is a registrable entry point.
pub type CapabilityPredicate = Box<dyn Fn(&TypeDescriptor) -> Capability>;

/// Default predicate: a descriptor is an entry point iff it declares
/// metadata (a non-empty identifier).
pub fn declared_entry_point(descriptor: &TypeDescriptor) -> Capability {
    match &descriptor.metadata {
        Some(metadata) => Capability::EntryPoint(metadata.clone()),
        None => Capability::NotAnEntryPoint,
    }
}

/// Per-type binding errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BindError {
    /// The descriptor's constructor symbol is absent from the rewritten
    /// structural view the module was loaded from.
    #[error("type definition `{0}` not found in the rewritten module view")]
    MissingTypeDefinition(String),
}

/// What one load pass hands to the binder: identity and structural-view
/// data of the rewritten module plus the descriptors enumerated from the
/// executing unit.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub identity: String,
    pub source_path: PathBuf,
    pub file_hash: String,
    /// Export-name table of the rewritten structural view
    pub exports: Vec<String>,
    pub descriptors: Vec<TypeDescriptor>,
}

impl LoadedModule {
    fn exports_contain(&self, symbol: &str) -> bool {
        self.exports
            .iter()
            .any(|name| matches_symbol(name.as_bytes(), symbol))
    }
}

/// Registers entry points and schedules their attachment.
pub struct InstantiationBinder {
    registry: PluginRegistry,
    predicate: CapabilityPredicate,
}

impl InstantiationBinder {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            predicate: Box::new(declared_entry_point),
        }
    }

    /// Replaces the capability predicate.
    pub fn with_predicate(mut self, predicate: CapabilityPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Binds every descriptor of a loaded module. A failure for one type
    /// is logged with its name and never stops the remaining types.
    pub fn bind_module(
        &self,
        module: &LoadedModule,
        container: NodeId,
        scheduler: &mut FrameScheduler,
    ) {
        for descriptor in &module.descriptors {
            if let Err(err) = self.bind(descriptor, module, container, scheduler) {
                error!(
                    type_name = %descriptor.qualified_name,
                    %err,
                    "failed to bind entry point"
                );
            }
        }
    }

    fn bind(
        &self,
        descriptor: &TypeDescriptor,
        module: &LoadedModule,
        container: NodeId,
        scheduler: &mut FrameScheduler,
    ) -> Result<(), BindError> {
        let metadata = match (self.predicate)(descriptor) {
            Capability::NotAnEntryPoint => return Ok(()),
            Capability::EntryPoint(metadata) => metadata,
        };

        if !module.exports_contain(&descriptor.ctor_symbol) {
            return Err(BindError::MissingTypeDefinition(
                descriptor.qualified_name.clone(),
            ));
        }

        let info = PluginInfo::new(&metadata.id, &metadata.name, &metadata.version)
            .with_qualified_name(&descriptor.qualified_name)
            .with_module_identity(&module.identity)
            .with_source_path(module.source_path.clone())
            .with_file_hash(&module.file_hash);
        self.registry.register(info);

        info!(id = %metadata.id, "loading plugin");

        let ctor = descriptor.ctor.clone();
        let id = metadata.id;
        scheduler.defer(move |scene| {
            let Some(component) = ctor() else {
                error!(%id, "plugin constructor returned no instance");
                return;
            };
            if let Err(err) = scene.attach_component(container, &id, component) {
                error!(%id, %err, "failed to attach plugin instance");
            }
        });

        Ok(())
    }
}
