//! Error types for tdlight-natives.

use std::ffi::NulError;
use std::fmt;

use tdlight_loader::LoadError;

/// Errors from loading the engine or calling into it.
#[derive(Debug)]
pub enum EngineError {
    /// No candidate library could be loaded.
    Load(LoadError),
    /// The library loaded but lacks an ABI v1 entry point.
    MissingSymbol {
        library: String,
        symbol:  String,
    },
    /// A request contained an interior NUL byte.
    InvalidRequest(NulError),
    /// The engine returned text that is not valid UTF-8.
    InvalidResponse(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "{e}"),
            Self::MissingSymbol { library, symbol } => {
                write!(f, "native library '{library}' does not export '{symbol}'")
            }
            Self::InvalidRequest(e) => write!(f, "request is not a valid C string: {e}"),
            Self::InvalidResponse(e) => write!(f, "engine response is not UTF-8: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e)           => Some(e),
            Self::InvalidRequest(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LoadError> for EngineError {
    fn from(e: LoadError) -> Self { Self::Load(e) }
}

impl From<NulError> for EngineError {
    fn from(e: NulError) -> Self { Self::InvalidRequest(e) }
}
