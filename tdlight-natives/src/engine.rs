//! The engine's C entry points, resolved once and wrapped in safe methods.

#![allow(unsafe_code)]

use std::ffi::{CStr, CString, c_char, c_double, c_int, c_void};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use tdlight_loader::{IsolationContext, LoadedLibrary, Loader};

use crate::errors::EngineError;

/// Entry points every ABI v1 engine exports, before prefixing.
pub const ABI_V1: [&str; 5] = [
    "td_create_client_id",
    "td_send",
    "td_receive",
    "td_execute",
    "td_destroy_client_id",
];

type CreateClientIdFn  = unsafe extern "C" fn() -> c_int;
type SendFn            = unsafe extern "C" fn(c_int, *const c_char);
type ReceiveFn         = unsafe extern "C" fn(c_double) -> *const c_char;
type ExecuteFn         = unsafe extern "C" fn(*const c_char) -> *const c_char;
type DestroyClientIdFn = unsafe extern "C" fn(c_int);

/// Identifier of one engine client instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub i32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A loaded engine with its entry points bound.
///
/// Holds the library alive for as long as the engine exists.
pub struct NativeEngine {
    library:           Arc<LoadedLibrary>,
    create_client_id:  CreateClientIdFn,
    send:              SendFn,
    receive:           ReceiveFn,
    execute:           ExecuteFn,
    destroy_client_id: DestroyClientIdFn,
}

impl NativeEngine {
    /// Loads the first of `names` that exports ABI v1 and binds it.
    ///
    /// Uses the environment configuration and the global isolation context.
    pub fn load(names: &[&str]) -> Result<Self, EngineError> {
        let loader = Loader::from_env().with_required_symbols(ABI_V1);
        Self::load_with(&loader, None, names)
    }

    /// Like [`load`](Self::load) with an explicit loader and context.
    pub fn load_with(
        loader: &Loader,
        ctx:    Option<&IsolationContext>,
        names:  &[&str],
    ) -> Result<Self, EngineError> {
        let library = loader.load_first_available(ctx, names)?;
        log::info!("native engine '{}' loaded ({:?})", library.name(), library.binding());
        Self::from_library(library)
    }

    /// Binds the ABI v1 entry points of an already loaded library.
    pub fn from_library(library: Arc<LoadedLibrary>) -> Result<Self, EngineError> {
        let lookup = |symbol: &str| -> Result<NonNull<c_void>, EngineError> {
            library.symbol(symbol).ok_or_else(|| EngineError::MissingSymbol {
                library: library.name().to_string(),
                symbol:  library.symbol_name(symbol),
            })
        };
        let [create, send, receive, execute, destroy] = ABI_V1.map(lookup);

        // SAFETY: each pointer was exported under its ABI v1 name, whose C
        // signature the matching fn type reproduces. `library` keeps the
        // code mapped for as long as `Self` lives.
        unsafe {
            Ok(Self {
                create_client_id:  std::mem::transmute::<*mut c_void, CreateClientIdFn>(create?.as_ptr()),
                send:              std::mem::transmute::<*mut c_void, SendFn>(send?.as_ptr()),
                receive:           std::mem::transmute::<*mut c_void, ReceiveFn>(receive?.as_ptr()),
                execute:           std::mem::transmute::<*mut c_void, ExecuteFn>(execute?.as_ptr()),
                destroy_client_id: std::mem::transmute::<*mut c_void, DestroyClientIdFn>(destroy?.as_ptr()),
                library,
            })
        }
    }

    pub fn library(&self) -> &Arc<LoadedLibrary> { &self.library }

    /// Allocates a new client instance.
    pub fn create_client_id(&self) -> ClientId {
        // SAFETY: no arguments, returns by value.
        ClientId(unsafe { (self.create_client_id)() })
    }

    /// Queues a JSON request for `client`. Responses arrive via [`receive`](Self::receive).
    pub fn send(&self, client: ClientId, request: &str) -> Result<(), EngineError> {
        let request = CString::new(request)?;
        // SAFETY: `request` is NUL-terminated and outlives the call; the
        // engine copies it before returning.
        unsafe { (self.send)(client.0, request.as_ptr()) };
        Ok(())
    }

    /// Waits up to `timeout` for the next response or update of any client.
    ///
    /// Must not be called from more than one thread at a time.
    pub fn receive(&self, timeout: Duration) -> Result<Option<String>, EngineError> {
        // SAFETY: the returned buffer stays valid until the next receive call,
        // and it is copied out right away.
        unsafe { owned((self.receive)(timeout.as_secs_f64())) }
    }

    /// Runs a request that the engine can answer synchronously.
    pub fn execute(&self, request: &str) -> Result<Option<String>, EngineError> {
        let request = CString::new(request)?;
        // SAFETY: as in `send`; the result lives until the next execute call
        // on this thread and is copied out right away.
        unsafe { owned((self.execute)(request.as_ptr())) }
    }

    /// Releases `client`. The id must not be used afterwards.
    pub fn destroy_client_id(&self, client: ClientId) {
        log::debug!("destroying client {client}");
        // SAFETY: plain integer argument.
        unsafe { (self.destroy_client_id)(client.0) }
    }
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEngine").field("library", &self.library).finish_non_exhaustive()
    }
}

/// Copies an engine-owned C string. NULL means "nothing".
///
/// # Safety
/// `ptr` is NULL or points to a NUL-terminated buffer valid for this call.
unsafe fn owned(ptr: *const c_char) -> Result<Option<String>, EngineError> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: guaranteed by the caller.
    let text = unsafe { CStr::from_ptr(ptr) };
    text.to_str()
        .map(|s| Some(s.to_owned()))
        .map_err(|e| EngineError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_no_response() {
        assert!(unsafe { owned(std::ptr::null()) }.unwrap().is_none());
    }

    #[test]
    fn response_is_copied() {
        let got = unsafe { owned(c"{\"@type\":\"ok\"}".as_ptr()) }.unwrap();
        assert_eq!(got.as_deref(), Some("{\"@type\":\"ok\"}"));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let bytes = b"\xff\xfe\0";
        let err = unsafe { owned(bytes.as_ptr().cast()) }.unwrap_err();
        assert!(matches!(err, EngineError::InvalidResponse(_)));
    }
}
