//! Binary prober.
//!
//! Decides whether a candidate file is a Kiln extension module by parsing
//! it with a structural (non-executing) reader and checking its export
//! table for the two well-known symbols; no code from the candidate ever
//! runs. The parsed view lives only for the duration of one call.

use std::fs;
use std::path::Path;

use object::{Object, read::File as ObjectFile};
use tracing::{debug, error};

use kiln_plugin_api::{ABI_VERSION_SYMBOL, MANIFEST_SYMBOL};

/// Matches an export-table name against a well-known symbol. Mach-O
/// exports carry a leading underscore; everything else is exact equality.
pub(crate) fn matches_symbol(name: &[u8], symbol: &str) -> bool {
    name == symbol.as_bytes()
        || (name.first() == Some(&b'_') && &name[1..] == symbol.as_bytes())
}

/// The probe decision over an export-name table: a module must export both
/// the ABI-version symbol (the framework reference) and the manifest
/// symbol (the entry-point declaration).
pub fn is_extension_module<'a>(export_names: impl IntoIterator<Item = &'a [u8]>) -> bool {
    let mut has_abi = false;
    let mut has_manifest = false;

    for name in export_names {
        has_abi |= matches_symbol(name, ABI_VERSION_SYMBOL);
        has_manifest |= matches_symbol(name, MANIFEST_SYMBOL);
        if has_abi && has_manifest {
            return true;
        }
    }
    false
}

/// Probes one candidate path. Returns `true` iff the file is a loadable
/// binary whose export table passes [`is_extension_module`].
///
/// Never escalates: a file that is not a loadable binary at all is
/// silently skipped; any other failure is logged and the candidate is
/// dropped. Probing one file can never abort the batch.
pub fn probe(path: &Path) -> bool {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(path = %path.display(), %err, "failed to read candidate");
            return false;
        }
    };

    let view = match ObjectFile::parse(&*bytes) {
        Ok(view) => view,
        Err(err) => {
            // not a loadable binary at all: not a candidate, no noise
            debug!(path = %path.display(), %err, "skipping: not a loadable binary");
            return false;
        }
    };

    match view.exports() {
        Ok(exports) => is_extension_module(exports.iter().map(|export| export.name())),
        Err(err) => {
            error!(path = %path.display(), %err, "failed to read export table");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn accepts_exports_carrying_both_symbols() {
        let names: Vec<&[u8]> = vec![b"some_helper", b"kiln_abi_version", b"kiln_plugin_manifest"];
        assert!(is_extension_module(names));
    }

    #[test]
    fn accepts_mach_o_underscore_prefixed_exports() {
        let names: Vec<&[u8]> = vec![b"_kiln_abi_version", b"_kiln_plugin_manifest"];
        assert!(is_extension_module(names));
    }

    #[test]
    fn rejects_when_framework_reference_is_missing() {
        let names: Vec<&[u8]> = vec![b"kiln_plugin_manifest", b"unrelated"];
        assert!(!is_extension_module(names));
    }

    #[test]
    fn rejects_when_manifest_declaration_is_missing() {
        let names: Vec<&[u8]> = vec![b"kiln_abi_version"];
        assert!(!is_extension_module(names));
    }

    #[test]
    fn rejects_near_miss_names() {
        let names: Vec<&[u8]> = vec![b"kiln_abi_version2", b"my_kiln_plugin_manifest"];
        assert!(!is_extension_module(names));
    }

    #[test]
    fn zero_byte_file_is_silently_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.so");
        std::fs::File::create(&path).unwrap();

        assert!(!probe(&path));
    }

    #[test]
    fn garbage_file_is_not_a_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.so");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"definitely not an executable image").unwrap();

        assert!(!probe(&path));
    }

    #[test]
    fn missing_file_is_not_a_candidate() {
        assert!(!probe(Path::new("/nonexistent/never/was.so")));
    }

    #[test]
    fn real_binary_without_kiln_exports_is_rejected() {
        // the test runner itself parses as a real binary but exports no
        // kiln symbols
        let exe = std::env::current_exe().unwrap();
        assert!(!probe(&exe));
    }
}
