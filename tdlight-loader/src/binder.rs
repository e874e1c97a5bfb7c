//! The platform primitive that maps a library into the process.
//!
//! [`NativeBinder`] has two entry points mirroring the two load strategies:
//! binding into an isolation context's own namespace, and binding globally.
//! [`DlBinder`] is the real implementation; tests substitute their own.

#![allow(unsafe_code)]

use std::ffi::{OsString, c_void};
use std::path::Path;
use std::ptr::NonNull;

use crate::context::IsolationContext;
use crate::errors::BindError;
use crate::library::NativeModule;

/// What to hand the platform loader.
#[derive(Clone, Copy, Debug)]
pub enum LoadTarget<'a> {
    /// A bare name resolved through the platform's library search path.
    Name(&'a str),
    /// An absolute path to an extracted file.
    Path(&'a Path),
}

impl LoadTarget<'_> {
    /// What is actually passed to `dlopen` / `LoadLibrary`.
    pub fn file(&self) -> OsString {
        match self {
            Self::Name(name) => libloading::library_filename(name),
            Self::Path(path) => path.as_os_str().to_owned(),
        }
    }
}

pub trait NativeBinder: Send + Sync {
    /// Binds the library into `ctx`'s own namespace.
    ///
    /// Return [`BindError::Unavailable`] when isolation is impossible here;
    /// the loader then falls back to [`Self::bind_global`].
    fn bind_isolated(
        &self,
        ctx:    &IsolationContext,
        target: LoadTarget<'_>,
    ) -> Result<Box<dyn NativeModule>, BindError>;

    /// Binds the library into the process-wide namespace.
    fn bind_global(&self, target: LoadTarget<'_>) -> Result<Box<dyn NativeModule>, BindError>;
}

// ─── DlBinder ─────────────────────────────────────────────────────────────────

/// Binder backed by `libloading`, with `dlmopen` namespaces on glibc.
#[derive(Clone, Copy, Debug, Default)]
pub struct DlBinder;

impl NativeBinder for DlBinder {
    fn bind_isolated(
        &self,
        ctx:    &IsolationContext,
        target: LoadTarget<'_>,
    ) -> Result<Box<dyn NativeModule>, BindError> {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        {
            let mut ns = ctx.namespace.lock().unwrap_or_else(|p| p.into_inner());
            let lib = namespace::open(&mut ns, &target.file())?;
            log::debug!("bound {:?} into namespace {:?} of context '{}'", target.file(), *ns, ctx.name());
            Ok(Box::new(lib))
        }
        #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
        {
            let _ = (ctx, target);
            Err(BindError::Unavailable("link-map namespaces are not supported on this platform".into()))
        }
    }

    fn bind_global(&self, target: LoadTarget<'_>) -> Result<Box<dyn NativeModule>, BindError> {
        // SAFETY: running the library's initialisers is the whole point of
        // loading it; the engine's constructors have no preconditions.
        let lib = unsafe { libloading::Library::new(target.file()) }
            .map_err(|e| BindError::Link(e.to_string()))?;
        Ok(Box::new(lib))
    }
}

impl NativeModule for libloading::Library {
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        // SAFETY: only the address is read, never called through here.
        let sym = unsafe { self.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*sym)
    }
}

// ─── glibc link-map namespaces ────────────────────────────────────────────────

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod namespace {
    use std::ffi::{CStr, CString, OsStr, c_char, c_int, c_long, c_void};
    use std::os::unix::ffi::OsStrExt;

    use crate::errors::BindError;

    const LM_ID_NEWLM:  c_long = -1;
    const RTLD_DI_LMID: c_int  = 1;

    unsafe extern "C" {
        fn dlmopen(lmid: c_long, filename: *const c_char, flags: c_int) -> *mut c_void;
        fn dlinfo(handle: *mut c_void, request: c_int, info: *mut c_void) -> c_int;
    }

    /// Opens `file` in namespace `ns`, creating the namespace on first use.
    pub(super) fn open(ns: &mut Option<i64>, file: &OsStr) -> Result<libloading::Library, BindError> {
        let path = CString::new(file.as_bytes())
            .map_err(|_| BindError::Link(format!("{file:?} contains a NUL byte")))?;
        let lmid = ns.map(|id| id as c_long).unwrap_or(LM_ID_NEWLM);

        // SAFETY: `path` is a valid C string for the duration of the call.
        let handle = unsafe { dlmopen(lmid, path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            let msg = last_error();
            // glibc caps the number of namespaces; running out says nothing
            // about the library itself.
            if ns.is_none() && msg.contains("namespace") {
                return Err(BindError::Unavailable(msg));
            }
            return Err(BindError::Link(msg));
        }

        if ns.is_none() {
            let mut id: c_long = 0;
            // SAFETY: `handle` came from a successful dlmopen and `id` has the
            // Lmid_t layout RTLD_DI_LMID writes.
            let rc = unsafe { dlinfo(handle, RTLD_DI_LMID, (&mut id as *mut c_long).cast()) };
            if rc == 0 {
                *ns = Some(id as i64);
            } else {
                log::debug!("dlinfo(RTLD_DI_LMID) failed: {}", last_error());
            }
        }

        // SAFETY: `handle` is a live dlopen handle we exclusively own.
        Ok(unsafe { libloading::os::unix::Library::from_raw(handle) }.into())
    }

    fn last_error() -> String {
        // SAFETY: dlerror returns NULL or a thread-local C string.
        let err = unsafe { libc::dlerror() };
        if err.is_null() {
            "unknown dlmopen failure".into()
        } else {
            // SAFETY: non-null dlerror results are NUL terminated.
            unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
        }
    }
}
