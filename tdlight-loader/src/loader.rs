//! Orchestrates one load: search path, resource resolution, extraction,
//! patching, binding, cleanup.

use std::io;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::binder::{DlBinder, LoadTarget, NativeBinder};
use crate::config::{LoaderConfig, WorkDir};
use crate::context::IsolationContext;
use crate::errors::{BindError, LinkError, LoadError};
use crate::extract;
use crate::library::{Binding, LoadedLibrary, NativeModule, Origin};
use crate::platform::Os;
use crate::resource::{CandidateResource, NATIVE_RESOURCE_HOME};
use crate::{noexec, patch, resolver, shading};

// ─── Attempt ──────────────────────────────────────────────────────────────────

/// Names tried so far and why each failed.
#[derive(Debug, Default)]
pub struct Attempt {
    tried:      Vec<String>,
    suppressed: Vec<LoadError>,
}

impl Attempt {
    pub fn record(&mut self, name: &str, error: LoadError) {
        log::debug!("Unable to load library '{name}': {error}");
        self.tried.push(name.to_string());
        self.suppressed.push(error);
    }

    pub fn tried(&self) -> &[String] { &self.tried }

    /// The aggregate failure once every candidate is exhausted.
    pub fn exhausted(self) -> LoadError {
        LoadError::Exhausted { names: self.tried, suppressed: self.suppressed }
    }
}

// ─── Loader ───────────────────────────────────────────────────────────────────

pub struct Loader {
    config:           LoaderConfig,
    workdir:          Arc<WorkDir>,
    binder:           Arc<dyn NativeBinder>,
    os:               Os,
    identity:         Option<String>,
    required_symbols: Vec<String>,
}

impl Loader {
    /// A loader with its own working directory taken from `config`.
    pub fn new(config: LoaderConfig) -> Self {
        let workdir = Arc::new(WorkDir::new(config.workdir.clone()));
        Self {
            config,
            workdir,
            binder:           Arc::new(DlBinder),
            os:               Os::current(),
            identity:         None,
            required_symbols: Vec::new(),
        }
    }

    /// A loader using the environment configuration and the shared
    /// process-wide working directory.
    pub fn from_env() -> Self {
        Self {
            workdir: Arc::clone(WorkDir::global()),
            ..Self::new(LoaderConfig::global().clone())
        }
    }

    /// The loader behind [`crate::load`] and [`crate::load_first_available`].
    pub fn global() -> &'static Loader {
        static GLOBAL: OnceLock<Loader> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }

    pub fn with_binder(mut self, binder: impl NativeBinder + 'static) -> Self {
        self.binder = Arc::new(binder);
        self
    }

    /// Overrides OS naming conventions (tests, cross-packaging tools).
    pub fn with_os(mut self, os: Os) -> Self {
        self.os = os;
        self
    }

    /// Pretends this crate's runtime identity is `identity` (`.`-separated).
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Entry points every bound module must export (unprefixed names).
    pub fn with_required_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn config(&self) -> &LoaderConfig { &self.config }

    pub fn os(&self) -> Os { self.os }

    /// The working directory, created on first call.
    pub fn workdir(&self) -> Result<&Path, LoadError> {
        self.workdir.get()
    }

    pub fn mangled_prefix(&self) -> Result<String, LoadError> {
        match &self.identity {
            Some(id) => shading::mangled_prefix_for(id),
            None     => shading::mangled_prefix(),
        }
    }

    /// Loads the first of `names` that succeeds.
    ///
    /// Failures of earlier names are discarded on success. If all fail the
    /// result is [`LoadError::Exhausted`] carrying each failure. Packaging
    /// defects (see [`LoadError::is_fatal`]) stop the scan immediately; the
    /// `Exhausted` then ends with that defect, see [`LoadError::fatal_cause`].
    pub fn load_first_available(
        &self,
        ctx:   Option<&IsolationContext>,
        names: &[&str],
    ) -> Result<Arc<LoadedLibrary>, LoadError> {
        let mut attempt = Attempt::default();
        for name in names {
            match self.load(name, ctx) {
                Ok(lib) => {
                    log::debug!("Loaded library with name '{name}'");
                    return Ok(lib);
                }
                Err(e) if e.is_fatal() => {
                    log::warn!("Giving up on the remaining libraries after '{name}': {e}");
                    attempt.record(name, e);
                    return Err(attempt.exhausted());
                }
                Err(e) => attempt.record(name, e),
            }
        }
        Err(attempt.exhausted())
    }

    /// Loads `original_name` into `ctx` (the global context when `None`).
    ///
    /// Tries the platform search path first and falls back to extracting the
    /// packaged resource. A name already loaded in `ctx` is returned as is.
    pub fn load(
        &self,
        original_name: &str,
        ctx:           Option<&IsolationContext>,
    ) -> Result<Arc<LoadedLibrary>, LoadError> {
        let ctx: &IsolationContext = ctx.unwrap_or_else(|| Arc::as_ref(IsolationContext::global()));
        let prefix = self.mangled_prefix()?;
        let name = format!("{prefix}{original_name}");

        if let Some(lib) = ctx.library(&name) {
            log::debug!("'{name}' already loaded in context '{}'", ctx.name());
            return Ok(lib);
        }

        let mut suppressed = Vec::new();
        match self.bind(ctx, LoadTarget::Name(&name), &name, &prefix) {
            Ok((module, binding)) => {
                return Ok(self.register(ctx, original_name, &prefix, binding, Origin::SearchPath, module));
            }
            Err(e) => suppressed.push(e),
        }

        let resource = match self.locate(ctx, &name) {
            Ok(Ok(resource)) => resource,
            Ok(Err(path)) => return Err(LoadError::NotFound { path, suppressed }),
            Err(mut e) => {
                e.add_suppressed(&mut suppressed);
                return Err(e);
            }
        };

        let workdir = match self.workdir.get() {
            Ok(dir) => dir,
            Err(mut e) => {
                e.add_suppressed(&mut suppressed);
                return Err(e);
            }
        };
        let extracted = match extract::materialize(&resource, workdir) {
            Ok(f) => f,
            Err(e) => {
                let mut link = LinkError::new(&name, format!("could not load a native library: {e}"));
                link.suppressed = suppressed;
                return Err(link.into());
            }
        };

        if patch::should_patch(self.config.try_patch_shaded_id, self.os, &prefix) {
            let outcome = patch::patch_shaded_library_id(extracted.path(), original_name);
            log::debug!("patching {} for relocation: {outcome:?}", extracted.path().display());
        }

        let label = extracted.path().display().to_string();
        let bound = match self.bind(ctx, LoadTarget::Path(extracted.path()), &label, &prefix) {
            Ok(ok) => Ok(ok),
            Err(mut e) => {
                if let LoadError::Link(link) = &mut e {
                    diagnose_noexec(extracted.path(), link, &mut suppressed, noexec::can_execute);
                }
                e.add_suppressed(&mut suppressed);
                Err(e)
            }
        };
        extracted.cleanup(self.config.delete_after_loading);

        let (module, binding) = bound?;
        Ok(self.register(ctx, original_name, &prefix, binding, Origin::Resource(resource.origin()), module))
    }

    /// Resolves the packaged resource for `name`. The inner `Err` carries the
    /// last path looked up when nothing was found.
    fn locate(
        &self,
        ctx:  &IsolationContext,
        name: &str,
    ) -> Result<Result<CandidateResource, String>, LoadError> {
        let roots = ctx.roots();
        let file_name = self.os.library_file_name(name);
        let path = format!("{NATIVE_RESOURCE_HOME}{file_name}");
        if let Some(found) = resolver::resolve(&roots, &path, self.config.detect_duplicates)? {
            return Ok(Ok(found));
        }
        let Some(alternate) = self.os.alternate_file_name(&file_name) else {
            return Ok(Err(path));
        };
        let path = format!("{NATIVE_RESOURCE_HOME}{alternate}");
        Ok(resolver::resolve(&roots, &path, self.config.detect_duplicates)?.ok_or(path))
    }

    /// Isolated binding first, global binding when isolation is unavailable.
    fn bind(
        &self,
        ctx:    &IsolationContext,
        target: LoadTarget<'_>,
        label:  &str,
        prefix: &str,
    ) -> Result<(Box<dyn NativeModule>, Binding), LoadError> {
        let isolated = if ctx.is_global() {
            Err(BindError::Unavailable("the global context has no context-local helper".into()))
        } else {
            self.binder.bind_isolated(ctx, target)
        };

        let mut suppressed = Vec::new();
        let (module, binding) = match isolated {
            Ok(module) => (module, Binding::Isolated),
            Err(BindError::Link(msg)) => return Err(LinkError::new(label, msg).into()),
            Err(BindError::Unavailable(reason)) => {
                log::debug!(
                    "isolated load of {label} in context '{}' unavailable ({reason}); binding globally",
                    ctx.name()
                );
                suppressed.push(LinkError::new(label, format!("isolated binding unavailable: {reason}")).into());
                match self.binder.bind_global(target) {
                    Ok(module) => (module, Binding::Global),
                    Err(BindError::Link(msg) | BindError::Unavailable(msg)) => {
                        let mut link = LinkError::new(label, msg);
                        link.suppressed = suppressed;
                        return Err(link.into());
                    }
                }
            }
        };

        if let Some(missing) = self
            .required_symbols
            .iter()
            .find(|s| module.symbol(&format!("{prefix}{s}")).is_none())
        {
            return Err(LoadError::IncompatibleCopies {
                name:   label.to_string(),
                symbol: format!("{prefix}{missing}"),
                suppressed,
            });
        }
        log::debug!("Successfully loaded the library {label}");
        Ok((module, binding))
    }

    fn register(
        &self,
        ctx:           &IsolationContext,
        original_name: &str,
        prefix:        &str,
        binding:       Binding,
        origin:        Origin,
        module:        Box<dyn NativeModule>,
    ) -> Arc<LoadedLibrary> {
        ctx.register(LoadedLibrary::new(original_name, prefix, binding, origin, module))
    }
}

/// After a link failure, checks whether the extracted file sits on a volume
/// that forbids execution and, if so, marks `link` with a hint.
fn diagnose_noexec(
    path:        &Path,
    link:        &mut LinkError,
    suppressed:  &mut Vec<LoadError>,
    can_execute: fn(&Path) -> io::Result<bool>,
) {
    if !noexec::worth_checking(path) {
        return;
    }
    match can_execute(path) {
        Ok(true) => {}
        Ok(false) => {
            log::info!(
                "{} exists but cannot be executed even when execute permissions set; \
                 check volume for \"noexec\" flag; use {}=[path] \
                 to set native working directory separately.",
                path.display(),
                crate::config::ENV_WORKDIR,
            );
            link.noexec = Some(path.to_path_buf());
        }
        Err(e) => {
            log::debug!("Error checking if {} is on a file store mounted with noexec: {e}", path.display());
            suppressed.push(LoadError::io("noexec check failed", e));
        }
    }
}
