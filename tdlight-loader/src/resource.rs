//! Places packaged native binaries can be found in.
//!
//! A [`ResourceRoot`] is a container that may or may not hold a file at a
//! given logical path: a directory, a table compiled into the binary. Roots
//! are enumerated in order and every hit becomes a [`CandidateResource`].

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

/// Logical namespace every native binary lives under.
pub const NATIVE_RESOURCE_HOME: &str = "META-INF/tdlight-native/";

// ─── Trait ────────────────────────────────────────────────────────────────────

/// A container of packaged resources.
pub trait ResourceRoot: Send + Sync {
    /// Human-readable origin used in diagnostics (like a URL).
    fn locator(&self, path: &str) -> String;

    /// Returns `true` if a resource exists at `path`.
    fn contains(&self, path: &str) -> bool;

    /// Opens the resource at `path` for streaming.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;
}

// ─── DirectoryRoot ────────────────────────────────────────────────────────────

/// Resources laid out as plain files below a directory.
#[derive(Clone, Debug)]
pub struct DirectoryRoot {
    base: PathBuf,
}

impl DirectoryRoot {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/').filter(|s| !s.is_empty()).fold(self.base.clone(), |p, s| p.join(s))
    }
}

impl ResourceRoot for DirectoryRoot {
    fn locator(&self, path: &str) -> String {
        format!("file:{}", self.resolve(path).display())
    }

    fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.resolve(path))?))
    }
}

// ─── EmbeddedRoot ─────────────────────────────────────────────────────────────

/// Resources compiled into the binary, usually with `include_bytes!`.
///
/// ```rust
/// use tdlight_loader::resource::EmbeddedRoot;
///
/// static NATIVES: &[(&str, &[u8])] = &[
///     ("META-INF/tdlight-native/libtdjni.so", b"\x7fELF..."),
/// ];
/// let root = EmbeddedRoot::new("tdlight-natives-linux-amd64", NATIVES);
/// ```
#[derive(Clone)]
pub struct EmbeddedRoot {
    label:   String,
    entries: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedRoot {
    pub fn new(label: impl Into<String>, entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { label: label.into(), entries }
    }

    fn find(&self, path: &str) -> Option<&'static [u8]> {
        self.entries.iter().find(|(p, _)| *p == path).map(|(_, bytes)| *bytes)
    }
}

impl fmt::Debug for EmbeddedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EmbeddedRoot {{ label: {:?}, entries: {} }}", self.label, self.entries.len())
    }
}

impl ResourceRoot for EmbeddedRoot {
    fn locator(&self, path: &str) -> String {
        format!("embedded:{}!/{path}", self.label)
    }

    fn contains(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.find(path) {
            Some(bytes) => Ok(Box::new(bytes)),
            None        => Err(io::Error::new(io::ErrorKind::NotFound, self.locator(path))),
        }
    }
}

// ─── CandidateResource ────────────────────────────────────────────────────────

/// One located copy of a native binary. Bytes are read only on demand.
#[derive(Clone)]
pub struct CandidateResource {
    root: Arc<dyn ResourceRoot>,
    path: String,
}

impl CandidateResource {
    pub fn new(root: Arc<dyn ResourceRoot>, path: impl Into<String>) -> Self {
        Self { root, path: path.into() }
    }

    /// Logical path, e.g. `META-INF/tdlight-native/libtdjni.so`.
    pub fn path(&self) -> &str { &self.path }

    /// File name part of [`Self::path`].
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn origin(&self) -> String { self.root.locator(&self.path) }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        self.root.open(&self.path)
    }
}

impl fmt::Debug for CandidateResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin())
    }
}
