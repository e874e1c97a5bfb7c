//! Isolation contexts: independent homes for loaded native libraries.
//!
//! Each context owns its resource roots, the libraries already bound into it,
//! and (where the platform supports it) its own dynamic-linker namespace. The
//! same library can therefore be loaded into two contexts of one process
//! without either seeing the other's copy.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::config::ENV_RESOURCE_PATH;
use crate::library::LoadedLibrary;
use crate::resource::{DirectoryRoot, ResourceRoot};

pub struct IsolationContext {
    name:      String,
    global:    bool,
    roots:     RwLock<Vec<Arc<dyn ResourceRoot>>>,
    libraries: Mutex<HashMap<String, Arc<LoadedLibrary>>>,
    /// Link-map namespace id, assigned by the first isolated load.
    pub(crate) namespace: Mutex<Option<i64>>,
}

impl IsolationContext {
    /// A fresh, empty context.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), false, Vec::new()))
    }

    /// A fresh context searching the given roots.
    pub fn with_roots(name: impl Into<String>, roots: Vec<Arc<dyn ResourceRoot>>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), false, roots))
    }

    /// The process-wide context used when the caller supplies none.
    ///
    /// Initially searches every directory in `TDLIGHT_NATIVE_RESOURCE_PATH`
    /// followed by the directory containing the running executable.
    pub fn global() -> &'static Arc<IsolationContext> {
        static GLOBAL: OnceLock<Arc<IsolationContext>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::build("global".into(), true, default_global_roots())))
    }

    fn build(name: String, global: bool, roots: Vec<Arc<dyn ResourceRoot>>) -> Self {
        Self {
            name,
            global,
            roots:     RwLock::new(roots),
            libraries: Mutex::new(HashMap::new()),
            namespace: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    /// `true` for [`Self::global`]; the global context can't host a
    /// context-local helper, so isolated binding never applies to it.
    pub fn is_global(&self) -> bool { self.global }

    pub fn add_root(&self, root: Arc<dyn ResourceRoot>) {
        self.roots.write().unwrap_or_else(|p| p.into_inner()).push(root);
    }

    /// Snapshot of the roots, in search order.
    pub fn roots(&self) -> Vec<Arc<dyn ResourceRoot>> {
        self.roots.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// The library previously loaded under `name` in this context, if any.
    pub fn library(&self, name: &str) -> Option<Arc<LoadedLibrary>> {
        self.libraries.lock().unwrap_or_else(|p| p.into_inner()).get(name).cloned()
    }

    /// Names of every library bound into this context.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.libraries.lock().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect();
        names.sort();
        names
    }

    /// Records `lib`. If another thread won the race for the same name the
    /// earlier entry is kept and returned.
    pub(crate) fn register(&self, lib: LoadedLibrary) -> Arc<LoadedLibrary> {
        let mut map = self.libraries.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(map.entry(lib.name().to_string()).or_insert_with(|| Arc::new(lib)))
    }
}

impl fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationContext")
            .field("name", &self.name)
            .field("global", &self.global)
            .field("loaded", &self.loaded_names())
            .finish()
    }
}

fn default_global_roots() -> Vec<Arc<dyn ResourceRoot>> {
    let mut roots: Vec<Arc<dyn ResourceRoot>> = Vec::new();
    if let Some(paths) = std::env::var_os(ENV_RESOURCE_PATH) {
        for dir in std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()) {
            log::debug!("{ENV_RESOURCE_PATH}: {}", dir.display());
            roots.push(Arc::new(DirectoryRoot::new(dir)));
        }
    }
    if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.to_path_buf())) {
        roots.push(Arc::new(DirectoryRoot::new(dir)));
    }
    roots
}
