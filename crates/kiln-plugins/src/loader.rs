//! Dynamic loader.
//!
//! Stages a rewritten byte buffer to disk under its fresh identity, opens
//! it in the running process, and enumerates its entry-point descriptors.
//! Loaded units are pushed into a process-lifetime arena and never
//! unloaded: the host cannot guarantee no code from an old copy is still
//! referenced, so eviction is not offered at all. The leak is bounded by
//! how often a user reloads and is accepted by design.
//!
//! Enumeration is tolerant: a descriptor whose constructor symbol fails to
//! resolve is skipped, every underlying failure is reported once per
//! module, and the resolvable subset still loads.

use std::ffi::{CStr, c_char};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use kiln_plugin_api::{
    ABI_VERSION_SYMBOL, KILN_ABI_VERSION, MANIFEST_SYMBOL, PluginComponent, PluginMetadata,
    RawEntryDescriptor, RawManifest,
};

use crate::rewrite::RewrittenModule;

/// Loader errors. Isolated per module by the orchestrator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load library: {0}")]
    LibraryLoad(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("ABI version mismatch: host {host}, module {module}")]
    AbiMismatch { host: u32, module: u32 },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

type RawCtor = unsafe extern "C" fn() -> *mut dyn PluginComponent;

/// Shared constructor for one entry-point type. Returns `None` when the
/// module's constructor reports failure (null).
pub type ComponentCtor = Arc<dyn Fn() -> Option<Box<dyn PluginComponent>> + Send + Sync>;

/// One enumerated entry-point type of a loaded unit.
#[derive(Clone)]
pub struct TypeDescriptor {
    /// Fully-qualified type path declared by the module
    pub qualified_name: String,
    /// Constructor symbol the descriptor resolved from
    pub ctor_symbol: String,
    /// Declared metadata; `None` marks a helper/abstract declaration that
    /// must not be registered
    pub metadata: Option<PluginMetadata>,
    /// Live-instance constructor
    pub ctor: ComponentCtor,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("qualified_name", &self.qualified_name)
            .field("ctor_symbol", &self.ctor_symbol)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// An executing module copy: the staged file, the open library handle and
/// the descriptors enumerated from it. Lives until process exit.
pub struct LoadedUnit {
    identity: String,
    source_path: PathBuf,
    staged_path: PathBuf,
    descriptors: Vec<TypeDescriptor>,
    // the handle must outlive every constructor pointer handed out above;
    // the staging directory must outlive the handle
    _library: Library,
    _staging: TempDir,
}

impl LoadedUnit {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    pub fn descriptors(&self) -> &[TypeDescriptor] {
        &self.descriptors
    }
}

impl fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("identity", &self.identity)
            .field("source_path", &self.source_path)
            .field("staged_path", &self.staged_path)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

/// Arena of loaded units, keyed by rewritten identity. Insert-only.
#[derive(Default)]
pub struct ModuleLoader {
    units: Vec<LoadedUnit>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unit loaded so far, oldest first.
    pub fn units(&self) -> &[LoadedUnit] {
        &self.units
    }

    /// Looks up a unit by its rewritten identity.
    pub fn get(&self, identity: &str) -> Option<&LoadedUnit> {
        self.units.iter().find(|unit| unit.identity == identity)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Stages and loads a rewritten module, enumerates its entry points
    /// and adds the unit to the arena.
    pub fn load(&mut self, module: &RewrittenModule) -> Result<&LoadedUnit, PluginLoadError> {
        let staging = tempfile::Builder::new().prefix("kiln-unit-").tempdir()?;
        let staged_path = staging.path().join(staged_file_name(&module.identity));
        fs::write(&staged_path, &module.bytes)?;
        self.stage_private_dependencies(module, staging.path());

        debug!(identity = %module.identity, staged = %staged_path.display(), "loading staged module");

        // SAFETY: loading foreign library code is inherently unsafe; the
        // module was structurally probed and is staged read-only for us.
        let library = unsafe { Library::new(&staged_path) }
            .map_err(|err| PluginLoadError::LibraryLoad(err.to_string()))?;

        let module_abi = unsafe {
            // SAFETY: symbol type matches the ABI contract in kiln-plugin-api.
            let abi_version = library
                .get::<unsafe extern "C" fn() -> u32>(ABI_VERSION_SYMBOL.as_bytes())
                .map_err(|_| PluginLoadError::SymbolNotFound(ABI_VERSION_SYMBOL.to_string()))?;
            abi_version()
        };
        if module_abi != KILN_ABI_VERSION {
            return Err(PluginLoadError::AbiMismatch {
                host: KILN_ABI_VERSION,
                module: module_abi,
            });
        }

        let manifest_ptr = unsafe {
            // SAFETY: symbol type matches the ABI contract.
            let manifest = library
                .get::<unsafe extern "C" fn() -> *const RawManifest>(MANIFEST_SYMBOL.as_bytes())
                .map_err(|_| PluginLoadError::SymbolNotFound(MANIFEST_SYMBOL.to_string()))?;
            manifest()
        };
        if manifest_ptr.is_null() {
            return Err(PluginLoadError::InvalidManifest(
                "module returned a null manifest".to_string(),
            ));
        }
        // SAFETY: non-null, points at 'static data inside the module image
        // which stays mapped for the unit's (process) lifetime.
        let manifest = unsafe { &*manifest_ptr };
        if manifest.abi_version != KILN_ABI_VERSION {
            return Err(PluginLoadError::AbiMismatch {
                host: KILN_ABI_VERSION,
                module: manifest.abi_version,
            });
        }

        let descriptors = enumerate_descriptors(&module.identity, &library, manifest);

        info!(
            identity = %module.identity,
            entries = descriptors.len(),
            "module loaded"
        );

        self.units.push(LoadedUnit {
            identity: module.identity.clone(),
            source_path: module.source_path.clone(),
            staged_path,
            descriptors,
            _library: library,
            _staging: staging,
        });
        Ok(self.units.last().expect("unit just pushed"))
    }

    /// Copies module-private dependency libraries next to the staged
    /// module so they shadow host-provided copies, per the rewriter's
    /// search-path order. Best-effort: a failed copy downgrades to the
    /// host-provided library.
    fn stage_private_dependencies(&self, module: &RewrittenModule, staging: &Path) {
        let module_dir = module.source_path.parent();
        for dep in &module.dependencies {
            let Some(source) = &dep.path else { continue };
            if source.parent() != module_dir {
                continue;
            }
            let target = staging.join(&dep.name);
            match fs::copy(source, &target) {
                Ok(_) => debug!(library = %dep.name, "staged private dependency"),
                Err(err) => {
                    warn!(library = %dep.name, %err, "failed to stage private dependency")
                }
            }
        }
    }
}

fn staged_file_name(identity: &str) -> String {
    let ext = std::env::consts::DLL_EXTENSION;
    if ext.is_empty() {
        identity.to_string()
    } else {
        format!("{identity}.{ext}")
    }
}

/// Walks the manifest and resolves each entry's constructor symbol,
/// collecting the subset that resolves. All failures are reported in one
/// consolidated diagnostic per module.
fn enumerate_descriptors(
    identity: &str,
    library: &Library,
    manifest: &RawManifest,
) -> Vec<TypeDescriptor> {
    let entries: &[RawEntryDescriptor] = if manifest.entry_count == 0 || manifest.entries.is_null()
    {
        &[]
    } else {
        // SAFETY: the manifest declares entry_count records behind entries,
        // all 'static inside the module image.
        unsafe { std::slice::from_raw_parts(manifest.entries, manifest.entry_count) }
    };

    let mut descriptors = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        match resolve_descriptor(library, entry) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(reason) => failures.push(format!("entry {index}: {reason}")),
        }
    }

    if !failures.is_empty() {
        error!(
            module = %identity,
            resolved = descriptors.len(),
            failed = failures.len(),
            "some entries failed to resolve; loading the resolvable subset:\n  {}",
            failures.join("\n  ")
        );
    }

    descriptors
}

fn resolve_descriptor(
    library: &Library,
    entry: &RawEntryDescriptor,
) -> Result<TypeDescriptor, String> {
    let qualified_name = read_manifest_str(entry.qualified_name, "qualified_name")?;
    let id = read_manifest_str(entry.id, "id")?;
    let name = read_manifest_str(entry.name, "name")?;
    let version = read_manifest_str(entry.version, "version")?;
    let ctor_symbol = read_manifest_str(entry.ctor_symbol, "ctor_symbol")?;

    // SAFETY: symbol type matches the ABI contract; the raw fn pointer
    // stays valid because the library handle is never dropped.
    let raw_ctor: RawCtor = unsafe {
        *library
            .get::<RawCtor>(ctor_symbol.as_bytes())
            .map_err(|err| format!("constructor symbol `{ctor_symbol}` not found: {err}"))?
    };

    let ctor: ComponentCtor = Arc::new(move || {
        // SAFETY: contract: returns a heap-allocated PluginComponent or null.
        let raw = unsafe { raw_ctor() };
        if raw.is_null() {
            None
        } else {
            // SAFETY: non-null pointers from the constructor are owned Boxes.
            Some(unsafe { Box::from_raw(raw) })
        }
    });

    let metadata = if id.is_empty() {
        None
    } else {
        let mut metadata = PluginMetadata::new(&id, &name);
        metadata.version = version;
        Some(metadata)
    };

    Ok(TypeDescriptor {
        qualified_name,
        ctor_symbol,
        metadata,
        ctor,
    })
}

fn read_manifest_str(ptr: *const c_char, field: &str) -> Result<String, String> {
    if ptr.is_null() {
        return Err(format!("manifest field `{field}` is null"));
    }
    // SAFETY: manifest strings are NUL-terminated 'static data per contract.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_owned)
        .map_err(|_| format!("manifest field `{field}` is not valid UTF-8"))
}
