use std::collections::HashSet;
use std::sync::Arc;

use tdlight_loader::extract::materialize;
use tdlight_loader::{CandidateResource, EmbeddedRoot, ResourceRoot};

static JAR: &[(&str, &[u8])] = &[("META-INF/tdlight-native/libtdjni.so", b"\x7fELF fake payload")];

fn candidate() -> CandidateResource {
    let root: Arc<dyn ResourceRoot> = Arc::new(EmbeddedRoot::new("tdlight.jar", JAR));
    CandidateResource::new(root, "META-INF/tdlight-native/libtdjni.so")
}

#[test]
fn concurrent_extractions_never_share_a_file() {
    let workdir = tempfile::tempdir().unwrap();
    let resource = candidate();

    let paths: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..50)
            .map(|_| s.spawn(|| materialize(&resource, workdir.path()).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<_> = paths.iter().map(|f| f.path().to_path_buf()).collect();
    assert_eq!(unique.len(), 50);
    for f in &paths {
        assert_eq!(std::fs::read(f.path()).unwrap(), b"\x7fELF fake payload");
    }
    for f in paths {
        assert!(f.cleanup(true));
    }
    assert_eq!(std::fs::read_dir(workdir.path()).unwrap().count(), 0);
}

#[test]
fn extraction_into_missing_directory_fails() {
    let scratch = tempfile::tempdir().unwrap();
    let err = materialize(&candidate(), &scratch.path().join("gone")).unwrap_err();
    assert!(err.to_string().contains("cannot create temp file"), "{err}");
}
