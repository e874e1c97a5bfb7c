//! Handles to successfully loaded native libraries.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

/// A module the platform loader has mapped into the process.
///
/// Dropping it may unmap the module; [`crate::IsolationContext`] keeps every
/// loaded module alive for the life of its context.
pub trait NativeModule: Send + Sync {
    /// Address of the exported symbol `name`, if present.
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>>;
}

/// Which strategy ended up binding the library.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Bound inside the isolation context's own namespace.
    Isolated,
    /// Bound into the process-wide namespace.
    Global,
}

/// Where the loaded bytes came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Found by the platform's library search path; nothing was extracted.
    SearchPath,
    /// Extracted from a packaged resource (its locator).
    Resource(String),
}

pub struct LoadedLibrary {
    name:          String,
    logical_name:  String,
    prefix:        String,
    binding:       Binding,
    origin:        Origin,
    module:        Box<dyn NativeModule>,
}

impl LoadedLibrary {
    pub(crate) fn new(
        logical_name: &str,
        prefix:       &str,
        binding:      Binding,
        origin:       Origin,
        module:       Box<dyn NativeModule>,
    ) -> Self {
        Self {
            name:         format!("{prefix}{logical_name}"),
            logical_name: logical_name.to_string(),
            prefix:       prefix.to_string(),
            binding,
            origin,
            module,
        }
    }

    /// Effective name: mangled prefix + logical name.
    pub fn name(&self) -> &str { &self.name }

    /// The name the caller asked for.
    pub fn logical_name(&self) -> &str { &self.logical_name }

    /// Mangled relocation prefix; empty when not relocated.
    pub fn prefix(&self) -> &str { &self.prefix }

    pub fn binding(&self) -> Binding { self.binding }

    pub fn origin(&self) -> &Origin { &self.origin }

    /// Looks up `symbol` with the mangled prefix applied.
    pub fn symbol(&self, symbol: &str) -> Option<NonNull<c_void>> {
        self.module.symbol(&self.symbol_name(symbol))
    }

    /// `symbol` as it is exported by a library built for this prefix.
    pub fn symbol_name(&self, symbol: &str) -> String {
        format!("{}{symbol}", self.prefix)
    }
}

impl fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("name", &self.name)
            .field("binding", &self.binding)
            .field("origin", &self.origin)
            .finish()
    }
}
