//! Copies a packaged library into the working directory so the platform
//! loader can open it, and removes the copy afterwards.

#![allow(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use crate::errors::LoadError;
use crate::platform::split_extension;
use crate::resource::CandidateResource;

/// A copy of a native library owned by exactly one load attempt.
#[derive(Debug)]
pub struct ExtractedFile {
    path: PathBuf,
}

impl ExtractedFile {
    pub fn path(&self) -> &Path { &self.path }

    /// Removes the file now if `delete` is set, deferring to process exit
    /// when the OS won't let go of it yet. Returns `true` if it is gone.
    pub fn cleanup(self, delete: bool) -> bool {
        if !delete {
            log::debug!("keeping extracted library {}", self.path.display());
            return false;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                log::debug!("deferring deletion of {} to exit: {e}", self.path.display());
                delete_on_exit(self.path);
                false
            }
        }
    }
}

/// Streams `resource` into a new uniquely named file inside `workdir`.
///
/// The name keeps the resource's base name and extension with a random part
/// in between (`libtdjni` + `a8Xk2p` + `.so`). The file is flushed and closed
/// before this returns.
pub fn materialize(resource: &CandidateResource, workdir: &Path) -> Result<ExtractedFile, LoadError> {
    let (stem, ext) = split_extension(resource.file_name());
    let tmp = tempfile::Builder::new()
        .prefix(stem)
        .suffix(ext)
        .tempfile_in(workdir)
        .map_err(|e| LoadError::io(format!("cannot create temp file in {}", workdir.display()), e))?;
    let (mut out, path) = tmp
        .keep()
        .map_err(|e| LoadError::io("cannot keep extracted library", e.error))?;
    let extracted = ExtractedFile { path };

    let copied = resource.open().and_then(|mut input| {
        io::copy(&mut input, &mut out)?;
        out.flush()
    });
    drop(out);
    if let Err(e) = copied {
        let context = format!("cannot extract {} to {}", resource.origin(), extracted.path.display());
        extracted.cleanup(true);
        return Err(LoadError::io(context, e));
    }
    log::debug!("extracted {} to {}", resource.origin(), extracted.path.display());
    Ok(extracted)
}

// ─── Deferred deletion ────────────────────────────────────────────────────────

static DEFERRED: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
static HOOK: Once = Once::new();

/// Deletes `path` when the process exits normally.
pub fn delete_on_exit(path: PathBuf) {
    HOOK.call_once(|| {
        // SAFETY: `run_at_exit` is a plain extern "C" fn with no
        // captured state, valid for the whole process lifetime.
        if unsafe { libc::atexit(run_at_exit) } != 0 {
            log::debug!("atexit registration failed; deferred deletions need an explicit call");
        }
    });
    DEFERRED.lock().unwrap_or_else(|p| p.into_inner()).push(path);
}

/// Paths still waiting for [`run_deferred_deletions`].
pub fn pending_deletions() -> Vec<PathBuf> {
    DEFERRED.lock().unwrap_or_else(|p| p.into_inner()).clone()
}

/// Deletes every deferred path now. Runs automatically at exit.
pub fn run_deferred_deletions() {
    let paths = std::mem::take(&mut *DEFERRED.lock().unwrap_or_else(|p| p.into_inner()));
    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::debug!("deferred deletion of {} failed: {e}", path.display()),
        }
    }
}

extern "C" fn run_at_exit() {
    run_deferred_deletions();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{EmbeddedRoot, ResourceRoot};
    use std::sync::Arc;

    static ENTRIES: &[(&str, &[u8])] = &[("META-INF/tdlight-native/libtdjni.so", b"native-bytes")];

    fn candidate() -> CandidateResource {
        let root: Arc<dyn ResourceRoot> = Arc::new(EmbeddedRoot::new("t", ENTRIES));
        CandidateResource::new(root, "META-INF/tdlight-native/libtdjni.so")
    }

    #[test]
    fn keeps_stem_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let f = materialize(&candidate(), dir.path()).unwrap();
        let name = f.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("libtdjni") && name.ends_with(".so"), "{name}");
        assert_ne!(name, "libtdjni.so");
        assert_eq!(fs::read(f.path()).unwrap(), b"native-bytes");
    }

    #[test]
    fn cleanup_honours_flag() {
        let dir = tempfile::tempdir().unwrap();
        let kept = materialize(&candidate(), dir.path()).unwrap();
        let kept_path = kept.path().to_path_buf();
        assert!(!kept.cleanup(false));
        assert!(kept_path.exists());

        let gone = materialize(&candidate(), dir.path()).unwrap();
        let gone_path = gone.path().to_path_buf();
        assert!(gone.cleanup(true));
        assert!(!gone_path.exists());
    }

    #[test]
    fn deferred_paths_are_removed_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.so");
        fs::write(&path, b"x").unwrap();
        delete_on_exit(path.clone());
        assert!(pending_deletions().contains(&path));
        run_deferred_deletions();
        assert!(!path.exists());
    }

    #[test]
    fn failed_deferred_deletion_is_dropped_from_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        // remove_file refuses directories.
        let stubborn = dir.path().join("still-mapped.so");
        fs::create_dir(&stubborn).unwrap();
        delete_on_exit(stubborn.clone());
        run_deferred_deletions();
        assert!(stubborn.exists());
        assert!(!pending_deletions().contains(&stubborn));
    }
}
