//! Process-wide loader configuration and the native working directory.
//!
//! Both are read/created once. The first caller wins; every later caller
//! (on any thread) observes the same values.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::errors::LoadError;

pub const ENV_WORKDIR:           &str = "TDLIGHT_NATIVE_WORKDIR";
pub const ENV_DELETE_AFTER_LOAD: &str = "TDLIGHT_NATIVE_DELETE_LIB_AFTER_LOADING";
pub const ENV_TRY_PATCH_ID:      &str = "TDLIGHT_NATIVE_TRY_PATCH_SHADED_ID";
pub const ENV_DETECT_DUPLICATES: &str = "TDLIGHT_NATIVE_DETECT_NATIVE_LIBRARY_DUPLICATES";
pub const ENV_RESOURCE_PATH:     &str = "TDLIGHT_NATIVE_RESOURCE_PATH";

const WORKDIR_PREFIX: &str = "tdlight-natives";

// ─── LoaderConfig ─────────────────────────────────────────────────────────────

/// Knobs controlling extraction and duplicate handling.
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfig {
    /// Where extracted libraries go. `None` creates a fresh temp directory.
    pub workdir:              Option<PathBuf>,
    /// Delete the extracted copy once the load attempt is over.
    pub delete_after_loading: bool,
    /// Rewrite the install name and re-sign on macOS when relocated.
    pub try_patch_shaded_id:  bool,
    /// Fail when duplicate resources have different content.
    pub detect_duplicates:    bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workdir:              None,
            delete_after_loading: true,
            try_patch_shaded_id:  true,
            detect_duplicates:    true,
        }
    }
}

impl LoaderConfig {
    /// Reads the `TDLIGHT_NATIVE_*` variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let cfg = Self {
            workdir:              lookup(ENV_WORKDIR).filter(|v| !v.is_empty()).map(PathBuf::from),
            delete_after_loading: parse_bool(lookup(ENV_DELETE_AFTER_LOAD), defaults.delete_after_loading),
            try_patch_shaded_id:  parse_bool(lookup(ENV_TRY_PATCH_ID), defaults.try_patch_shaded_id),
            detect_duplicates:    parse_bool(lookup(ENV_DETECT_DUPLICATES), defaults.detect_duplicates),
        };
        log::debug!("{ENV_DELETE_AFTER_LOAD}: {}", cfg.delete_after_loading);
        log::debug!("{ENV_TRY_PATCH_ID}: {}", cfg.try_patch_shaded_id);
        log::debug!("{ENV_DETECT_DUPLICATES}: {}", cfg.detect_duplicates);
        cfg
    }

    /// The configuration read from the environment on first use.
    pub fn global() -> &'static LoaderConfig {
        static GLOBAL: OnceLock<LoaderConfig> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }
}

/// Only a case-insensitive `true` is true; unset keeps the default.
fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => v.trim().eq_ignore_ascii_case("true"),
        None    => default,
    }
}

// ─── WorkDir ──────────────────────────────────────────────────────────────────

/// The lazily-created directory libraries are extracted into.
///
/// Never deleted: it lives as long as the process. A creation failure is
/// remembered, so every later extraction fails the same way.
#[derive(Debug)]
pub struct WorkDir {
    requested: Option<PathBuf>,
    resolved:  OnceLock<Result<PathBuf, String>>,
}

impl WorkDir {
    pub fn new(requested: Option<PathBuf>) -> Self {
        Self { requested, resolved: OnceLock::new() }
    }

    /// The process-wide directory, honouring `TDLIGHT_NATIVE_WORKDIR`.
    pub fn global() -> &'static Arc<WorkDir> {
        static GLOBAL: OnceLock<Arc<WorkDir>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(WorkDir::new(LoaderConfig::global().workdir.clone())))
    }

    /// Returns the directory, creating it on the first call.
    pub fn get(&self) -> Result<&Path, LoadError> {
        self.resolved
            .get_or_init(|| create_workdir(self.requested.as_deref()))
            .as_deref()
            .map_err(|msg| LoadError::WorkDir { message: msg.clone(), suppressed: Vec::new() })
    }
}

fn create_workdir(requested: Option<&Path>) -> Result<PathBuf, String> {
    match requested {
        Some(dir) => {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
            }
            // Absolute is nicer in diagnostics, but a relative path still works.
            let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
            log::debug!("{ENV_WORKDIR}: {}", dir.display());
            Ok(dir)
        }
        None => {
            let dir = tempfile::Builder::new()
                .prefix(WORKDIR_PREFIX)
                .tempdir()
                .map_err(|e| format!("cannot create temporary directory: {e}"))?
                .keep();
            log::debug!("{ENV_WORKDIR}: {} (temporary)", dir.display());
            Ok(dir)
        }
    }
}
