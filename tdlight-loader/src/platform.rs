//! Operating-system naming conventions for native libraries.

/// The operating system family a library is being loaded on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    /// Any other Unix (BSDs, illumos, Android, ...). Uses ELF naming.
    OtherUnix,
}

impl Os {
    /// The OS this binary was compiled for.
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") || cfg!(target_os = "ios") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::OtherUnix
        }
    }

    pub fn is_macos(self) -> bool { self == Self::MacOs }

    /// Maps a logical name to a platform file name.
    ///
    /// `tdjni` → `libtdjni.so` / `libtdjni.dylib` / `tdjni.dll`
    pub fn library_file_name(self, name: &str) -> String {
        match self {
            Self::Linux | Self::OtherUnix => format!("lib{name}.so"),
            Self::MacOs                   => format!("lib{name}.dylib"),
            Self::Windows                 => format!("{name}.dll"),
        }
    }

    /// macOS ships the same library as either `.dylib` or `.jnilib`; returns
    /// the other spelling for `file_name`, or `None` on every other OS.
    pub fn alternate_file_name(self, file_name: &str) -> Option<String> {
        if !self.is_macos() {
            return None;
        }
        if let Some(stem) = file_name.strip_suffix(".jnilib") {
            Some(format!("{stem}.dylib"))
        } else {
            file_name.strip_suffix(".dylib").map(|stem| format!("{stem}.jnilib"))
        }
    }
}

/// Splits `libtdjni.so` into (`libtdjni`, `.so`) at the last dot.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) => file_name.split_at(idx),
        None      => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_per_os() {
        assert_eq!(Os::Linux.library_file_name("tdjni"), "libtdjni.so");
        assert_eq!(Os::MacOs.library_file_name("tdjni"), "libtdjni.dylib");
        assert_eq!(Os::Windows.library_file_name("tdjni"), "tdjni.dll");
    }

    #[test]
    fn macos_alternates_both_ways() {
        assert_eq!(Os::MacOs.alternate_file_name("libtdjni.dylib").as_deref(), Some("libtdjni.jnilib"));
        assert_eq!(Os::MacOs.alternate_file_name("libtdjni.jnilib").as_deref(), Some("libtdjni.dylib"));
        assert_eq!(Os::Linux.alternate_file_name("libtdjni.so"), None);
    }

    #[test]
    fn split_at_last_dot() {
        assert_eq!(split_extension("libfoo_bar.so"), ("libfoo_bar", ".so"));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }
}
