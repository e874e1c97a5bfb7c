//! Locates packaged copies of a native library and settles duplicates.

use std::io::Read;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::errors::LoadError;
use crate::resource::{CandidateResource, ResourceRoot};

/// Every resource at `path` across `roots`, in root order.
pub fn find_candidates(roots: &[Arc<dyn ResourceRoot>], path: &str) -> Vec<CandidateResource> {
    roots
        .iter()
        .filter(|root| root.contains(path))
        .map(|root| CandidateResource::new(Arc::clone(root), path))
        .collect()
}

/// Picks the single resource to extract for `path`.
///
/// * none → `Ok(None)`
/// * one → that one, unhashed
/// * several → with `detect_duplicates`, the first if every SHA-256 matches,
///   otherwise [`LoadError::DuplicateMismatch`]; without it, the first one
///   plus a warning
pub fn resolve(
    roots:             &[Arc<dyn ResourceRoot>],
    path:              &str,
    detect_duplicates: bool,
) -> Result<Option<CandidateResource>, LoadError> {
    let mut candidates = find_candidates(roots, path);
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        _ => {
            let origins = || candidates.iter().map(CandidateResource::origin).collect::<Vec<_>>();
            if !detect_duplicates {
                log::warn!(
                    "Multiple resources found for '{path}': {:?}. Duplicate detection is \
                     disabled, using the first one. Please fix your dependency graph.",
                    origins()
                );
                return Ok(Some(candidates.swap_remove(0)));
            }
            if all_same_content(&candidates) {
                return Ok(Some(candidates.swap_remove(0)));
            }
            Err(LoadError::DuplicateMismatch { path: path.to_string(), origins: origins(), suppressed: Vec::new() })
        }
    }
}

fn all_same_content(candidates: &[CandidateResource]) -> bool {
    let Some(first) = digest(&candidates[0]) else {
        return false;
    };
    candidates[1..].iter().all(|c| digest(c).is_some_and(|d| d == first))
}

/// SHA-256 of a resource, streamed. `None` if it can't be read.
pub fn digest(resource: &CandidateResource) -> Option<[u8; 32]> {
    let mut hash = Sha256::new();
    let read = resource.open().and_then(|mut input| {
        let mut buf = [0u8; 8192];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            hash.update(&buf[..n]);
        }
    });
    match read {
        Ok(()) => Some(hash.finalize().into()),
        Err(e) => {
            log::debug!("Can't read resource {}: {e}", resource.origin());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::EmbeddedRoot;
    use std::io;

    const PATH: &str = "META-INF/tdlight-native/libx.so";

    fn root(label: &str, bytes: &'static [u8]) -> Arc<dyn ResourceRoot> {
        let entries: &'static [(&'static str, &'static [u8])] = Box::leak(vec![(PATH, bytes)].into_boxed_slice());
        Arc::new(EmbeddedRoot::new(label, entries))
    }

    /// Claims to hold everything, fails every read.
    struct Unreadable;

    impl ResourceRoot for Unreadable {
        fn locator(&self, path: &str) -> String { format!("broken:{path}") }
        fn contains(&self, _: &str) -> bool { true }
        fn open(&self, _: &str) -> io::Result<Box<dyn Read + Send>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn nothing_found() {
        assert!(resolve(&[], PATH, true).unwrap().is_none());
    }

    #[test]
    fn single_candidate_is_not_hashed() {
        let roots: Vec<Arc<dyn ResourceRoot>> = vec![Arc::new(Unreadable)];
        let c = resolve(&roots, PATH, true).unwrap().unwrap();
        assert_eq!(c.origin(), "broken:META-INF/tdlight-native/libx.so");
    }

    #[test]
    fn identical_duplicates_resolve_to_first() {
        let roots = vec![root("a", b"same"), root("b", b"same"), root("c", b"same")];
        let c = resolve(&roots, PATH, true).unwrap().unwrap();
        assert!(c.origin().starts_with("embedded:a!"));
    }

    #[test]
    fn differing_duplicates_fail_when_detecting() {
        let roots = vec![root("a", b"one"), root("b", b"two")];
        match resolve(&roots, PATH, true) {
            Err(LoadError::DuplicateMismatch { origins, .. }) => assert_eq!(origins.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn differing_duplicates_pick_first_when_not_detecting() {
        let roots = vec![root("a", b"one"), root("b", b"two")];
        let c = resolve(&roots, PATH, false).unwrap().unwrap();
        assert!(c.origin().starts_with("embedded:a!"));
    }

    #[test]
    fn unreadable_duplicate_counts_as_mismatch() {
        let roots: Vec<Arc<dyn ResourceRoot>> = vec![root("a", b"one"), Arc::new(Unreadable)];
        assert!(matches!(resolve(&roots, PATH, true), Err(LoadError::DuplicateMismatch { .. })));
    }
}
