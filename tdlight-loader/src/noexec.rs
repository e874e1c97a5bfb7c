//! Detects extracted libraries that land on a `noexec` volume.

#![allow(unsafe_code)]

use std::io;
use std::path::Path;

/// Returns `Ok(true)` if `file` can be executed, adding missing u/g/o execute
/// bits first. `Ok(false)` after that means the volume refuses execution.
#[cfg(unix)]
pub fn can_execute(file: &Path) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    const EXEC_BITS: u32 = 0o111;

    if is_executable(file)? {
        return Ok(true);
    }
    // On a noexec mount even a file with every execute bit fails access(X_OK),
    // so confirm (or add) the bits and ask again.
    let mut perms = std::fs::metadata(file)?.permissions();
    if perms.mode() & EXEC_BITS == EXEC_BITS {
        return Ok(false);
    }
    perms.set_mode(perms.mode() | EXEC_BITS);
    std::fs::set_permissions(file, perms)?;
    is_executable(file)
}

#[cfg(not(unix))]
pub fn can_execute(_file: &Path) -> io::Result<bool> {
    Ok(true)
}

#[cfg(unix)]
fn is_executable(file: &Path) -> io::Result<bool> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c = CString::new(file.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c` is a valid NUL-terminated path for the duration of the call.
    Ok(unsafe { libc::access(c.as_ptr(), libc::X_OK) } == 0)
}

/// A readable regular file: the only kind worth checking after a link failure.
pub fn worth_checking(file: &Path) -> bool {
    file.is_file() && std::fs::File::open(file).is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn adds_missing_execute_bits() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("libx.so");
        std::fs::write(&f, b"x").unwrap();
        std::fs::set_permissions(&f, std::fs::Permissions::from_mode(0o600)).unwrap();

        can_execute(&f).unwrap();
        let mode = std::fs::metadata(&f).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn missing_file_is_not_worth_checking() {
        assert!(!worth_checking(Path::new("/definitely/not/here.so")));
    }
}
