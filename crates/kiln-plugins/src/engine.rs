//! Reload orchestrator.
//!
//! Drives one reload pass through its states:
//! `Idle → Unloading → Scanning → PerModuleLoad* → Idle`. A pass is
//! triggered at most once per frame, either by `load_on_start` on the
//! host's first update or by the configured reload key. Input is polled
//! once per frame and is edge-triggered: a held key fires once.
//!
//! Failure at any stage is caught and logged at that stage; the
//! orchestrator always proceeds to the next candidate. The only observable
//! end states are "nothing to reload" and "reload complete".

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use kiln_kernel::{FrameContext, HostConfig, NodeId, PluginRegistry, ReloadSettings};

use crate::binder::{InstantiationBinder, LoadedModule};
use crate::identity::IdentityGenerator;
use crate::loader::{LoadedUnit, ModuleLoader, PluginLoadError};
use crate::probe;
use crate::rewrite::{DependencyResolver, ModuleRewriter, RewriteError};

/// Failure anywhere in one module's rewrite → load chain.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModuleError {
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Load(#[from] PluginLoadError),
}

/// Seam between the orchestrator and the probing/loading machinery.
///
/// Production uses [`NativeModuleHost`]; tests substitute a scripted host
/// to exercise orchestration without compiled modules.
pub trait ModuleHost {
    /// Structural probe: is this file a loadable extension module?
    fn probe(&self, path: &Path) -> bool;

    /// Rewrites and loads one module, returning what the binder needs.
    fn load_module(&mut self, path: &Path) -> Result<LoadedModule, ModuleError>;
}

/// The real probe/rewrite/load pipeline over native libraries.
pub struct NativeModuleHost {
    rewriter: ModuleRewriter,
    loader: ModuleLoader,
    ids: IdentityGenerator,
}

impl NativeModuleHost {
    /// Builds the host search path from the configuration: scripts root,
    /// managed libraries, framework libraries. The rewriter prepends each
    /// module's own directory in front of these.
    pub fn new(config: &HostConfig) -> Self {
        let mut resolver = DependencyResolver::new();
        resolver.push_dir(config.scripts_dir());
        resolver.push_dir(config.managed_libs_dir());
        resolver.push_dir(config.framework_libs_dir());

        Self {
            rewriter: ModuleRewriter::new(resolver),
            loader: ModuleLoader::new(),
            ids: IdentityGenerator::new(),
        }
    }

    /// Units loaded so far (process-lifetime arena).
    pub fn units(&self) -> &[LoadedUnit] {
        self.loader.units()
    }
}

impl ModuleHost for NativeModuleHost {
    fn probe(&self, path: &Path) -> bool {
        probe::probe(path)
    }

    fn load_module(&mut self, path: &Path) -> Result<LoadedModule, ModuleError> {
        let rewritten = self.rewriter.rewrite(path, &self.ids)?;
        let unit = self.loader.load(&rewritten)?;
        Ok(LoadedModule {
            identity: unit.identity().to_string(),
            source_path: rewritten.source_path.clone(),
            file_hash: rewritten.file_hash.clone(),
            exports: rewritten.exports.clone(),
            descriptors: unit.descriptors().to_vec(),
        })
    }
}

/// Observable orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPhase {
    #[default]
    Idle,
    Unloading,
    Scanning,
    PerModuleLoad,
}

/// Terminal outcome of one reload pass. Per-module failures do not change
/// the outcome; they are visible only in the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// No candidate modules were found.
    NothingToReload,
    /// Every candidate was processed (some may have failed individually).
    ReloadComplete,
}

/// The reload engine. Create once at host startup with an explicit
/// registry handle, then call [`update`](Self::update) every frame.
pub struct ReloadEngine<H = NativeModuleHost> {
    settings: ReloadSettings,
    scripts_dir: PathBuf,
    host: H,
    binder: InstantiationBinder,
    container: Option<NodeId>,
    phase: ReloadPhase,
    ids: IdentityGenerator,
    started: bool,
}

impl ReloadEngine<NativeModuleHost> {
    pub fn new(config: &HostConfig, registry: PluginRegistry) -> Self {
        let host = NativeModuleHost::new(config);
        Self::with_host(config.reload.clone(), config.scripts_dir(), registry, host)
    }
}

impl<H: ModuleHost> ReloadEngine<H> {
    /// Assembles an engine around any [`ModuleHost`].
    pub fn with_host(
        settings: ReloadSettings,
        scripts_dir: PathBuf,
        registry: PluginRegistry,
        host: H,
    ) -> Self {
        Self {
            settings,
            scripts_dir,
            host,
            binder: InstantiationBinder::new(registry),
            container: None,
            phase: ReloadPhase::default(),
            ids: IdentityGenerator::new(),
            started: false,
        }
    }

    pub fn phase(&self) -> ReloadPhase {
        self.phase
    }

    /// The current reload container, if a pass has run.
    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Per-frame entry point: applies the startup trigger on the first
    /// update and polls the reload key after that.
    pub fn update(&mut self, ctx: &mut FrameContext<'_>) -> Option<ReloadOutcome> {
        let startup = !self.started && self.settings.load_on_start;
        self.started = true;

        if startup || ctx.input.was_pressed_this_frame(self.settings.reload_key) {
            Some(self.reload_all(ctx))
        } else {
            None
        }
    }

    /// Runs one full reload pass. Public so hosts can wire their own
    /// triggers; [`update`](Self::update) is the standard path.
    pub fn reload_all(&mut self, ctx: &mut FrameContext<'_>) -> ReloadOutcome {
        self.unload(ctx);

        self.phase = ReloadPhase::Scanning;
        info!(dir = %self.scripts_dir.display(), "looking for modules");
        let candidates = self.scan();

        if candidates.is_empty() {
            info!("nothing to reload");
            self.phase = ReloadPhase::Idle;
            return ReloadOutcome::NothingToReload;
        }

        let container = self
            .container
            .expect("container exists: unload() just created it");

        self.phase = ReloadPhase::PerModuleLoad;
        for path in &candidates {
            info!(path = %path.display(), "loading plugins from module");
            match self.host.load_module(path) {
                Ok(module) => self.binder.bind_module(&module, container, ctx.scheduler),
                Err(err) => {
                    error!(path = %path.display(), %err, "failed to load module")
                }
            }
        }

        info!(modules = candidates.len(), "reload complete");
        self.phase = ReloadPhase::Idle;
        ReloadOutcome::ReloadComplete
    }

    /// Tears down the previous container (host-deferred destroy) and
    /// creates the fresh one for this generation, persistent across scene
    /// transitions.
    fn unload(&mut self, ctx: &mut FrameContext<'_>) {
        self.phase = ReloadPhase::Unloading;
        info!("unloading old plugin instances");

        if let Some(previous) = self.container.take() {
            ctx.scene.destroy_deferred(previous);
        }

        let name = format!("scripts-{}", self.ids.next_ticks());
        let container = ctx.scene.spawn_persistent(name);
        self.container = Some(container);
    }

    /// Enumerates the scripts root plus its immediate subdirectories
    /// (depth exactly one) for platform dynamic libraries, probing each.
    fn scan(&self) -> Vec<PathBuf> {
        let mut search_dirs = vec![self.scripts_dir.clone()];
        match fs::read_dir(&self.scripts_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        search_dirs.push(path);
                    }
                }
            }
            Err(err) => {
                warn!(dir = %self.scripts_dir.display(), %err, "scripts directory not readable");
                return Vec::new();
            }
        }

        let mut accepted = Vec::new();
        for dir in &search_dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && is_dynamic_library_file(&path) && self.host.probe(&path) {
                    accepted.push(path);
                }
            }
        }
        accepted.sort();
        accepted
    }
}

fn is_dynamic_library_file(path: &Path) -> bool {
    let ext = std::env::consts::DLL_EXTENSION;
    if ext.is_empty() {
        return false;
    }
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::Arc;

    use kiln_kernel::{FrameScheduler, InputState, Key, Scene};
    use kiln_plugin_api::{PluginComponent, PluginMetadata};

    use crate::loader::TypeDescriptor;

    struct Dummy;

    impl PluginComponent for Dummy {}

    /// Scripted behavior per candidate file stem.
    #[derive(Clone)]
    enum Script {
        /// probe() rejects the file
        NotACandidate,
        /// probe() accepts, load succeeds with one entry of this id
        Entry(&'static str),
        /// probe() accepts, load fails
        Broken,
    }

    #[derive(Default)]
    struct FakeHost {
        scripts: HashMap<String, Script>,
        probed: RefCell<Vec<PathBuf>>,
        loads: u64,
    }

    impl FakeHost {
        fn with(mut self, stem: &str, script: Script) -> Self {
            self.scripts.insert(stem.to_string(), script);
            self
        }

        fn stem(path: &Path) -> String {
            path.file_stem().unwrap().to_string_lossy().into_owned()
        }
    }

    impl ModuleHost for FakeHost {
        fn probe(&self, path: &Path) -> bool {
            self.probed.borrow_mut().push(path.to_path_buf());
            !matches!(
                self.scripts.get(&Self::stem(path)),
                Some(Script::NotACandidate) | None
            )
        }

        fn load_module(&mut self, path: &Path) -> Result<LoadedModule, ModuleError> {
            self.loads += 1;
            match self.scripts.get(&Self::stem(path)) {
                Some(Script::Entry(id)) => {
                    let descriptor = TypeDescriptor {
                        qualified_name: format!("{}::Entry", Self::stem(path)),
                        ctor_symbol: "entry_ctor".to_string(),
                        metadata: Some(PluginMetadata::new(id, "Entry")),
                        ctor: Arc::new(|| Some(Box::new(Dummy) as Box<dyn PluginComponent>)),
                    };
                    Ok(LoadedModule {
                        identity: format!("{}-{}", Self::stem(path), self.loads),
                        source_path: path.to_path_buf(),
                        file_hash: "0".repeat(64),
                        exports: vec!["entry_ctor".to_string()],
                        descriptors: vec![descriptor],
                    })
                }
                _ => Err(ModuleError::Load(PluginLoadError::LibraryLoad(
                    "scripted failure".to_string(),
                ))),
            }
        }
    }

    fn lib_file(dir: &Path, stem: &str) -> PathBuf {
        let path = dir.join(format!("{stem}.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"stub").unwrap();
        path
    }

    struct Rig {
        scene: Scene,
        scheduler: FrameScheduler,
        input: InputState,
        registry: PluginRegistry,
        engine: ReloadEngine<FakeHost>,
        _scripts: tempfile::TempDir,
    }

    impl Rig {
        fn new(settings: ReloadSettings, host: FakeHost) -> Self {
            let scripts = tempfile::tempdir().unwrap();
            let registry = PluginRegistry::new();
            let engine = ReloadEngine::with_host(
                settings,
                scripts.path().to_path_buf(),
                registry.clone(),
                host,
            );
            Self {
                scene: Scene::new(),
                scheduler: FrameScheduler::new(),
                input: InputState::new(),
                registry,
                engine,
                _scripts: scripts,
            }
        }

        fn scripts_dir(&self) -> PathBuf {
            self._scripts.path().to_path_buf()
        }

        /// One host tick: drain the previous frame's deferred work, then
        /// run game logic. Work deferred during update lands next tick.
        fn tick(&mut self) -> Option<ReloadOutcome> {
            self.scheduler.run_frame(&mut self.scene);
            let mut ctx = FrameContext {
                scene: &mut self.scene,
                scheduler: &mut self.scheduler,
                input: &self.input,
            };
            let outcome = self.engine.update(&mut ctx);
            self.input.clear();
            outcome
        }
    }

    #[test]
    fn empty_scripts_root_reports_nothing_to_reload() {
        let mut rig = Rig::new(
            ReloadSettings {
                load_on_start: true,
                ..ReloadSettings::default()
            },
            FakeHost::default(),
        );

        let outcome = rig.tick();
        assert_eq!(outcome, Some(ReloadOutcome::NothingToReload));
        assert!(rig.registry.is_empty());

        // the standard unload-before-scan step still ran
        let container = rig.engine.container().expect("container created");
        assert!(rig.scene.contains(container));
        assert!(rig.scene.node(container).unwrap().persistent());
        assert_eq!(rig.engine.phase(), ReloadPhase::Idle);
    }

    #[test]
    fn no_trigger_without_key_or_startup_setting() {
        let mut rig = Rig::new(ReloadSettings::default(), FakeHost::default());

        assert_eq!(rig.tick(), None);
        assert_eq!(rig.tick(), None);
        assert!(rig.engine.container().is_none());
    }

    #[test]
    fn reload_key_is_edge_triggered() {
        let mut rig = Rig::new(ReloadSettings::default(), FakeHost::default());

        rig.input.press(Key::F6);
        assert!(rig.tick().is_some());

        // key still held, no new press event: nothing fires
        assert_eq!(rig.tick(), None);
    }

    #[test]
    fn valid_and_invalid_files_yield_reload_complete_and_one_registration() {
        let host = FakeHost::default()
            .with("alpha", Script::Entry("com.test.a"))
            .with("broken", Script::NotACandidate);
        let mut rig = Rig::new(
            ReloadSettings {
                load_on_start: true,
                ..ReloadSettings::default()
            },
            host,
        );
        lib_file(&rig.scripts_dir(), "alpha");
        lib_file(&rig.scripts_dir(), "broken");

        let outcome = rig.tick();
        assert_eq!(outcome, Some(ReloadOutcome::ReloadComplete));
        assert!(rig.registry.contains("com.test.a"));
        assert_eq!(rig.registry.len(), 1);

        // attachment lands on the following frame
        let container = rig.engine.container().unwrap();
        assert_eq!(rig.scene.node(container).unwrap().component_count(), 0);
        rig.tick();
        assert_eq!(rig.scene.node(container).unwrap().component_count(), 1);
    }

    #[test]
    fn one_malformed_module_never_stops_the_batch() {
        let host = FakeHost::default()
            .with("alpha", Script::Entry("com.test.a"))
            .with("beta", Script::Broken)
            .with("gamma", Script::Entry("com.test.c"));
        let mut rig = Rig::new(ReloadSettings::default(), host);
        lib_file(&rig.scripts_dir(), "alpha");
        lib_file(&rig.scripts_dir(), "beta");
        lib_file(&rig.scripts_dir(), "gamma");

        rig.input.press(Key::F6);
        let outcome = rig.tick();

        assert_eq!(outcome, Some(ReloadOutcome::ReloadComplete));
        assert!(rig.registry.contains("com.test.a"));
        assert!(rig.registry.contains("com.test.c"));
        assert_eq!(rig.registry.len(), 2);
    }

    #[test]
    fn scan_covers_root_and_immediate_subdirectories_only() {
        let host = FakeHost::default();
        let mut rig = Rig::new(
            ReloadSettings {
                load_on_start: true,
                ..ReloadSettings::default()
            },
            host,
        );
        let root = rig.scripts_dir();
        let child = root.join("bundle");
        let grandchild = child.join("nested");
        std::fs::create_dir_all(&grandchild).unwrap();

        let at_root = lib_file(&root, "root_mod");
        let at_depth1 = lib_file(&child, "child_mod");
        let at_depth2 = lib_file(&grandchild, "hidden_mod");
        // non-library files are never probed
        std::fs::write(root.join("readme.txt"), b"hi").unwrap();

        rig.tick();

        let probed = rig.engine.host().probed.borrow().clone();
        assert!(probed.contains(&at_root));
        assert!(probed.contains(&at_depth1));
        assert!(!probed.contains(&at_depth2), "depth-2 files are invisible");
        assert_eq!(probed.len(), 2);
    }

    #[test]
    fn reloading_twice_overwrites_the_registration() {
        let host = FakeHost::default().with("alpha", Script::Entry("com.test.x"));
        let mut rig = Rig::new(ReloadSettings::default(), host);
        lib_file(&rig.scripts_dir(), "alpha");

        rig.input.press(Key::F6);
        rig.tick();
        let first = rig.registry.get("com.test.x").unwrap();

        rig.input.press(Key::F6);
        rig.tick();
        let second = rig.registry.get("com.test.x").unwrap();

        assert_eq!(rig.registry.len(), 1);
        assert_ne!(first.module_identity, second.module_identity);
        assert_eq!(second.reload_count, 1);
    }

    #[test]
    fn each_pass_replaces_the_container_with_a_fresh_persistent_one() {
        let host = FakeHost::default();
        let mut rig = Rig::new(ReloadSettings::default(), host);

        rig.input.press(Key::F6);
        rig.tick();
        let first = rig.engine.container().unwrap();
        let first_name = rig.scene.node(first).unwrap().name().to_string();

        rig.input.press(Key::F6);
        rig.tick();
        let second = rig.engine.container().unwrap();
        let second_name = rig.scene.node(second).unwrap().name().to_string();

        assert_ne!(first, second);
        assert_ne!(first_name, second_name, "container names are unique");
        assert!(
            rig.scene.contains(first),
            "destroy of the old container is deferred, not immediate"
        );
        rig.tick();
        assert!(!rig.scene.contains(first), "old container destroyed at frame end");

        // the live container survives a scene transition
        rig.scene.transition();
        assert!(rig.scene.contains(second));
    }

    #[test]
    fn startup_trigger_fires_exactly_once() {
        let host = FakeHost::default();
        let mut rig = Rig::new(
            ReloadSettings {
                load_on_start: true,
                ..ReloadSettings::default()
            },
            host,
        );

        assert!(rig.tick().is_some());
        assert_eq!(rig.tick(), None);
    }
}
