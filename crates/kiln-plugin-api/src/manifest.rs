//! C-ABI records a module exposes to the host's loader.
//!
//! The loader never executes module code to decide whether a library is a
//! Kiln module: it checks the export-name table for the two well-known
//! symbols below. Only after a library has been probed, rewritten and
//! loaded does the host call through these records.

use std::ffi::c_char;

/// Current ABI revision. Bumped whenever the manifest layout or the
/// [`PluginComponent`](crate::PluginComponent) contract changes.
pub const KILN_ABI_VERSION: u32 = 1;

/// Name of the exported `extern "C" fn() -> u32` reporting the ABI revision.
///
/// Its presence in a library's export table is what marks the binary as
/// referencing the Kiln framework at all.
pub const ABI_VERSION_SYMBOL: &str = "kiln_abi_version";

/// Name of the exported `extern "C" fn() -> *const RawManifest`.
///
/// Its presence marks the binary as declaring Kiln entry points.
pub const MANIFEST_SYMBOL: &str = "kiln_plugin_manifest";

/// One entry point declared by a module.
///
/// All strings are NUL-terminated UTF-8 with `'static` lifetime inside the
/// module image. `ctor_symbol` names an exported
/// `extern "C" fn() -> *mut dyn PluginComponent` in the same library; the
/// host resolves it by name and treats a null return as a failed
/// construction.
#[repr(C)]
#[derive(Debug)]
pub struct RawEntryDescriptor {
    /// Fully-qualified type path (e.g. `my_plugin::HudOverlay`)
    pub qualified_name: *const c_char,
    /// Stable identifier, empty for helper/abstract entries that must not
    /// be registered
    pub id: *const c_char,
    /// Display name
    pub name: *const c_char,
    /// Version string
    pub version: *const c_char,
    /// Exported constructor symbol name
    pub ctor_symbol: *const c_char,
}

/// The table returned by [`MANIFEST_SYMBOL`].
#[repr(C)]
#[derive(Debug)]
pub struct RawManifest {
    /// ABI revision the module was compiled against
    pub abi_version: u32,
    /// Number of records behind `entries`
    pub entry_count: usize,
    /// Pointer to the first of `entry_count` descriptors
    pub entries: *const RawEntryDescriptor,
}

// The pointers only ever reference 'static data baked into the module
// image, so sharing the records between threads is sound.
unsafe impl Sync for RawEntryDescriptor {}
unsafe impl Sync for RawManifest {}
