//! # tdlight-loader
//!
//! Bootstraps the prebuilt TDLight native engine into the current process.
//!
//! A load goes through three stages:
//!
//! | Stage      | Module                  | Job                                             |
//! |------------|-------------------------|-------------------------------------------------|
//! | Resolve    | [`resolver`]            | find packaged copies, settle duplicates by SHA-256 |
//! | Extract    | [`extract`], [`patch`]  | copy to a unique temp file, fix the macOS id    |
//! | Bind       | [`binder`], [`context`] | `dlmopen` into an isolation context, or `dlopen` globally |
//!
//! The platform search path is always tried first, so a system-wide install
//! of the library skips extraction entirely.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! let lib = tdlight_loader::load_first_available(None, &["tdjni", "tdjni-legacy"])?;
//! println!("loaded {} ({:?})", lib.name(), lib.binding());
//! # Ok::<(), tdlight_loader::LoadError>(())
//! ```
//!
//! ## Configuration
//!
//! Read once from the environment, see [`config`]:
//! `TDLIGHT_NATIVE_WORKDIR`, `TDLIGHT_NATIVE_DELETE_LIB_AFTER_LOADING`,
//! `TDLIGHT_NATIVE_TRY_PATCH_SHADED_ID`,
//! `TDLIGHT_NATIVE_DETECT_NATIVE_LIBRARY_DUPLICATES`,
//! `TDLIGHT_NATIVE_RESOURCE_PATH`.

#![deny(unsafe_code)]

pub mod binder;
pub mod config;
pub mod context;
mod errors;
pub mod extract;
mod library;
mod loader;
pub mod noexec;
pub mod patch;
pub mod platform;
pub mod resolver;
pub mod resource;
pub mod shading;

pub use binder::{DlBinder, LoadTarget, NativeBinder};
pub use config::{LoaderConfig, WorkDir};
pub use context::IsolationContext;
pub use errors::{BindError, LinkError, LoadError};
pub use library::{Binding, LoadedLibrary, NativeModule, Origin};
pub use loader::{Attempt, Loader};
pub use platform::Os;
pub use resource::{CandidateResource, DirectoryRoot, EmbeddedRoot, NATIVE_RESOURCE_HOME, ResourceRoot};

use std::sync::Arc;

/// Loads `name` with the process-wide [`Loader`].
pub fn load(name: &str, ctx: Option<&IsolationContext>) -> Result<Arc<LoadedLibrary>, LoadError> {
    Loader::global().load(name, ctx)
}

/// Loads the first of `names` that succeeds with the process-wide [`Loader`].
pub fn load_first_available(
    ctx:   Option<&IsolationContext>,
    names: &[&str],
) -> Result<Arc<LoadedLibrary>, LoadError> {
    Loader::global().load_first_available(ctx, names)
}
