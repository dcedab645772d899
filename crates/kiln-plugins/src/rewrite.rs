//! Module rewriter.
//!
//! Takes a confirmed candidate path, parses it structurally, resolves its
//! on-disk library references against the host search path, and produces an
//! in-memory byte buffer under a fresh identity for the loader to stage.
//! The structural view is scoped to the call; nothing here executes module
//! code.

use std::fs;
use std::path::{Path, PathBuf};

use object::{Object, read::File as ObjectFile};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::identity::{IdentityGenerator, rewritten_identity};
use crate::probe::matches_symbol;

/// Rewrite errors. Isolated per module by the orchestrator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RewriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file stopped being a parseable binary between probe and rewrite
    /// (or the probe was bypassed).
    #[error("malformed module: {0}")]
    Malformed(String),
}

/// Where the rewriter looks for a module's library references, in priority
/// order. A module may ship private copies of its dependencies next to
/// itself; those must shadow host-provided ones, so the module's own
/// directory is always consulted first (the rewriter prepends it).
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    search_dirs: Vec<PathBuf>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a search directory with lower priority than those already
    /// present.
    pub fn push_dir<P: Into<PathBuf>>(&mut self, dir: P) {
        self.search_dirs.push(dir.into());
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Returns the first directory containing a file named `library_name`.
    pub fn resolve(&self, library_name: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(library_name))
            .find(|candidate| candidate.is_file())
    }
}

/// One library reference of a module and where it resolved, if anywhere.
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub name: String,
    pub path: Option<PathBuf>,
}

/// A module prepared for loading: the original bytes under a fresh
/// identity, plus what the structural pass learned about the binary.
#[derive(Debug, Clone)]
pub struct RewrittenModule {
    /// `<stem>-<ticks>`, unique per load attempt
    pub identity: String,
    /// Path the module was read from
    pub source_path: PathBuf,
    /// The serialized module image
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, hex-encoded
    pub file_hash: String,
    /// Export-name table from the structural view
    pub exports: Vec<String>,
    /// Library references and their resolution results
    pub dependencies: Vec<ResolvedDependency>,
}

impl RewrittenModule {
    /// Whether the structural export table carries `symbol` (tolerating the
    /// Mach-O underscore prefix).
    pub fn exports_contain(&self, symbol: &str) -> bool {
        self.exports
            .iter()
            .any(|name| matches_symbol(name.as_bytes(), symbol))
    }
}

/// Rewrites confirmed candidates into loadable buffers.
#[derive(Debug, Default)]
pub struct ModuleRewriter {
    resolver: DependencyResolver,
}

impl ModuleRewriter {
    pub fn new(resolver: DependencyResolver) -> Self {
        Self { resolver }
    }

    /// Reads `path`, parses it structurally, resolves its references and
    /// returns the byte buffer under a fresh `<stem>-<ticks>` identity.
    pub fn rewrite(
        &self,
        path: &Path,
        ids: &IdentityGenerator,
    ) -> Result<RewrittenModule, RewriteError> {
        let bytes = fs::read(path)?;

        let (exports, dependencies) = {
            let view = ObjectFile::parse(&*bytes)
                .map_err(|err| RewriteError::Malformed(err.to_string()))?;

            let exports = view
                .exports()
                .map_err(|err| RewriteError::Malformed(err.to_string()))?
                .iter()
                .map(|export| String::from_utf8_lossy(export.name()).into_owned())
                .collect::<Vec<_>>();

            let dependencies = self.resolve_references(path, &view);
            (exports, dependencies)
            // view (and its borrow of the buffer) ends here
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());
        let identity = rewritten_identity(&stem, ids.next_ticks());

        let file_hash = format!("{:x}", Sha256::digest(&bytes));

        debug!(
            source = %path.display(),
            %identity,
            exports = exports.len(),
            "module rewritten"
        );

        Ok(RewrittenModule {
            identity,
            source_path: path.to_path_buf(),
            bytes,
            file_hash,
            exports,
            dependencies,
        })
    }

    /// Resolves the module's imported-library names against the module's
    /// own directory first, then the configured host directories.
    ///
    /// Not every binary format names libraries in its generic import table
    /// (ELF undefined symbols carry no library), so the list may be empty.
    fn resolve_references(&self, path: &Path, view: &ObjectFile<'_>) -> Vec<ResolvedDependency> {
        let mut effective = DependencyResolver::new();
        if let Some(parent) = path.parent() {
            effective.push_dir(parent);
        }
        for dir in self.resolver.search_dirs() {
            effective.push_dir(dir);
        }

        let mut names: Vec<String> = match view.imports() {
            Ok(imports) => imports
                .iter()
                .map(|import| String::from_utf8_lossy(import.library()).into_owned())
                .filter(|name| !name.is_empty())
                .collect(),
            Err(err) => {
                warn!(source = %path.display(), %err, "failed to read import table");
                Vec::new()
            }
        };
        names.sort();
        names.dedup();

        names
            .into_iter()
            .map(|name| {
                let resolved = effective.resolve(&name);
                match &resolved {
                    Some(found) => {
                        debug!(library = %name, path = %found.display(), "reference resolved")
                    }
                    None => {
                        debug!(library = %name, "reference not on search path; assuming host-provided")
                    }
                }
                ResolvedDependency {
                    name,
                    path: resolved,
                }
            })
            .collect()
    }
}
