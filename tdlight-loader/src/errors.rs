//! Error types for tdlight-loader.
//!
//! Every failure a load attempt can run into is a [`LoadError`]. Failures that
//! were recovered from along the way (the search-path attempt, a candidate
//! name that did not load, a noexec check that itself failed) are not thrown
//! away: they ride along as *suppressed* causes on the error that is finally
//! returned, so an operator can see every path that was tried.

use std::{fmt, io};
use std::path::PathBuf;

// ─── LinkError ────────────────────────────────────────────────────────────────

/// The dynamic linker refused to load a library.
#[derive(Debug)]
pub struct LinkError {
    /// Effective (prefixed) library name or the extracted file path.
    pub name:       String,
    /// Message reported by the platform loader.
    pub message:    String,
    /// Set when the extracted file sits on a volume that forbids execution.
    pub noexec:     Option<PathBuf>,
    /// Earlier failures of the same attempt.
    pub suppressed: Vec<LoadError>,
}

impl LinkError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), message: message.into(), noexec: None, suppressed: Vec::new() }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not load native library '{}': {}", self.name, self.message)?;
        if let Some(path) = &self.noexec {
            write!(
                f,
                " ({} cannot be executed; its volume is probably mounted noexec, \
                 set {}=<path> to extract elsewhere)",
                path.display(),
                crate::config::ENV_WORKDIR,
            )?;
        }
        Ok(())
    }
}

// ─── LoadError ────────────────────────────────────────────────────────────────

/// The error type returned from every loading operation.
#[derive(Debug)]
pub enum LoadError {
    /// No packaged resource exists at `path` in any visible root.
    NotFound {
        path:       String,
        suppressed: Vec<LoadError>,
    },
    /// Several resources exist at `path` and their contents differ.
    DuplicateMismatch {
        path:       String,
        origins:    Vec<String>,
        suppressed: Vec<LoadError>,
    },
    /// The platform loader rejected the library.
    Link(LinkError),
    /// A required entry point is missing from the bound module, which almost
    /// always means another, incompatible copy was picked up first.
    IncompatibleCopies {
        name:       String,
        symbol:     String,
        suppressed: Vec<LoadError>,
    },
    /// This crate was relocated in a way the prefix mangling can't express.
    RelocationFormat {
        expected: String,
        actual:   String,
    },
    /// The working directory could not be created. Fatal for the process.
    WorkDir {
        message:    String,
        suppressed: Vec<LoadError>,
    },
    /// Reading a resource or writing the extracted copy failed.
    Io {
        context: String,
        source:  io::Error,
    },
    /// Every candidate name failed, or the scan stopped at a fatal error,
    /// which is then the last suppressed cause.
    Exhausted {
        names:      Vec<String>,
        suppressed: Vec<LoadError>,
    },
}

impl LoadError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Failures collected on the way to this one, oldest first.
    pub fn suppressed(&self) -> &[LoadError] {
        match self {
            Self::NotFound { suppressed, .. }
            | Self::DuplicateMismatch { suppressed, .. }
            | Self::IncompatibleCopies { suppressed, .. }
            | Self::WorkDir { suppressed, .. }
            | Self::Exhausted { suppressed, .. } => suppressed,
            Self::Link(e) => &e.suppressed,
            _ => &[],
        }
    }

    /// Appends `more` to this error's suppressed causes, draining it.
    ///
    /// Errors that can't carry suppressed causes keep `more` untouched.
    pub(crate) fn add_suppressed(&mut self, more: &mut Vec<LoadError>) {
        match self {
            Self::NotFound { suppressed, .. }
            | Self::DuplicateMismatch { suppressed, .. }
            | Self::IncompatibleCopies { suppressed, .. }
            | Self::WorkDir { suppressed, .. }
            | Self::Exhausted { suppressed, .. } => suppressed.append(more),
            Self::Link(e) => e.suppressed.append(more),
            _ => {}
        }
    }

    /// Returns `true` for errors a caller may recover from by trying the next name.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Packaging or environment defects no other candidate name can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateMismatch { .. } | Self::RelocationFormat { .. } | Self::WorkDir { .. })
    }

    /// The fatal error that ended a scan: `self` if fatal, or the last cause
    /// of an [`LoadError::Exhausted`] that was cut short.
    pub fn fatal_cause(&self) -> Option<&LoadError> {
        match self {
            Self::Exhausted { suppressed, .. } => suppressed.last().filter(|e| e.is_fatal()),
            e if e.is_fatal() => Some(e),
            _ => None,
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for cause in self.suppressed() {
            write!(f, "\n{:indent$}suppressed: {cause}", "", indent = depth * 2)?;
            cause.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path, .. } => write!(f, "native resource not found: {path}")?,
            Self::DuplicateMismatch { path, origins, .. } => write!(
                f,
                "multiple resources found for '{path}' with different content: {origins:?}"
            )?,
            Self::Link(e) => write!(f, "{e}")?,
            Self::IncompatibleCopies { name, symbol, .. } => write!(
                f,
                "possible multiple incompatible native libraries on the search path for '{name}'? \
                 (missing entry point '{symbol}')"
            )?,
            Self::RelocationFormat { expected, actual } => write!(
                f,
                "could not find prefix added to {expected} to get {actual}; \
                 when relocating, only adding a prefix is supported"
            )?,
            Self::WorkDir { message, .. } => write!(f, "native working directory unavailable: {message}")?,
            Self::Io { context, source } => write!(f, "{context}: {source}")?,
            Self::Exhausted { names, .. } => {
                write!(f, "failed to load any of the given libraries: {names:?}")?;
                if let Some(fatal) = self.fatal_cause() {
                    write!(f, "; stopped at: {fatal}")?;
                }
            }
        }
        // `{:#}` prints the whole suppressed-cause tree.
        if f.alternate() {
            self.fmt_tree(f, 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<LinkError> for LoadError {
    fn from(e: LinkError) -> Self { Self::Link(e) }
}

// ─── BindError ────────────────────────────────────────────────────────────────

/// Outcome of a single bind call on a [`crate::binder::NativeBinder`].
#[derive(Clone, Debug, PartialEq)]
pub enum BindError {
    /// The platform loader ran and rejected the library.
    Link(String),
    /// The strategy can't be used here (no namespaces, global context, ...).
    /// The loader falls back to the next strategy.
    Unavailable(String),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(msg)        => write!(f, "link error: {msg}"),
            Self::Unavailable(msg) => write!(f, "strategy unavailable: {msg}"),
        }
    }
}

impl std::error::Error for BindError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_lists_every_name() {
        let e = LoadError::Exhausted { names: vec!["x".into(), "y".into()], suppressed: vec![] };
        let msg = e.to_string();
        assert!(msg.contains("\"x\"") && msg.contains("\"y\""), "{msg}");
    }

    #[test]
    fn alternate_renders_suppressed_tree() {
        let inner = LoadError::NotFound { path: "META-INF/tdlight-native/libx.so".into(), suppressed: vec![] };
        let e = LoadError::Exhausted { names: vec!["x".into()], suppressed: vec![inner] };
        let tree = format!("{e:#}");
        assert!(tree.contains("suppressed: native resource not found"), "{tree}");
        assert!(!e.to_string().contains("suppressed"));
    }

    #[test]
    fn cut_short_scan_reports_its_fatal_cause() {
        let missing = LoadError::NotFound { path: "META-INF/tdlight-native/liba.so".into(), suppressed: vec![] };
        let fatal = LoadError::DuplicateMismatch {
            path:       "META-INF/tdlight-native/libb.so".into(),
            origins:    vec!["file:/one".into(), "file:/two".into()],
            suppressed: vec![],
        };
        let e = LoadError::Exhausted { names: vec!["a".into(), "b".into()], suppressed: vec![missing, fatal] };
        assert!(matches!(e.fatal_cause(), Some(LoadError::DuplicateMismatch { .. })));
        let msg = e.to_string();
        assert!(msg.contains("\"a\"") && msg.contains("stopped at: multiple resources"), "{msg}");
    }

    #[test]
    fn exhausted_without_fatal_cause() {
        let e = LoadError::Exhausted { names: vec!["x".into()], suppressed: vec![] };
        assert!(e.fatal_cause().is_none());
        assert!(!e.to_string().contains("stopped at"));
    }

    #[test]
    fn noexec_hint_names_the_variable() {
        let mut link = LinkError::new("libtdjni.so", "failed to map segment");
        link.noexec = Some(PathBuf::from("/tmp/libtdjni123.so"));
        assert!(link.to_string().contains(crate::config::ENV_WORKDIR));
    }
}
