//! Hot-reload engine for the Kiln plugin host.
//!
//! Reload runs as a pipeline over the scripts directory:
//! - structural probing filters candidate binaries without executing them
//! - the rewriter gives each accepted module a fresh `<stem>-<ticks>`
//!   identity so no cache can hand back a stale in-memory copy
//! - the loader stages the buffer, opens it in-process and enumerates its
//!   entry points, tolerating partially resolvable manifests
//! - the binder registers each entry point (overwrite, last reload wins)
//!   and schedules instance attachment for the next frame
//! - the orchestrator isolates every per-module and per-type failure so a
//!   broken module can never abort the batch
//!
//! Loaded units are never unloaded; each reload leaks one staged copy for
//! the process lifetime, by design.

mod binder;
mod engine;
mod identity;
mod loader;
mod probe;
mod rewrite;

pub use binder::{
    BindError, Capability, CapabilityPredicate, InstantiationBinder, LoadedModule,
    declared_entry_point,
};
pub use engine::{
    ModuleError, ModuleHost, NativeModuleHost, ReloadEngine, ReloadOutcome, ReloadPhase,
};
pub use identity::{IdentityGenerator, rewritten_identity};
pub use loader::{ComponentCtor, LoadedUnit, ModuleLoader, PluginLoadError, TypeDescriptor};
pub use probe::{is_extension_module, probe};
pub use rewrite::{
    DependencyResolver, ModuleRewriter, ResolvedDependency, RewriteError, RewrittenModule,
};

// Re-export the ABI surface plugin authors and hosts share.
pub use kiln_plugin_api::{ComponentError, PluginComponent, PluginMetadata};
