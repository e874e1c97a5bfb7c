//! Detects whether this crate was relocated under an extra module prefix and
//! mangles that prefix the same way symbol names of a matching native build
//! were mangled.
//!
//! Mangling rules:
//! * `_` → `_1`
//! * `.` → `_`

use crate::errors::LoadError;

/// Identity of this module when nobody relocated it, `.`-separated.
///
/// Written with `!` so relocation tooling doing textual rewrites of the
/// dotted name leaves it alone.
fn expected_identity() -> String {
    "tdlight_loader!shading".replace('!', ".")
}

/// Runtime identity of this module, `.`-separated.
pub fn runtime_identity() -> String {
    module_path!().replace("::", ".")
}

/// Mangled prefix for the current build. Empty unless relocated.
pub fn mangled_prefix() -> Result<String, LoadError> {
    mangled_prefix_for(&runtime_identity())
}

/// Mangled prefix for an arbitrary runtime `identity`.
///
/// Fails with [`LoadError::RelocationFormat`] when `identity` does not end
/// with the expected identity, i.e. the relocation did more than prepend.
pub fn mangled_prefix_for(identity: &str) -> Result<String, LoadError> {
    let expected = expected_identity();
    match identity.strip_suffix(expected.as_str()) {
        Some(prefix) => Ok(mangle(prefix)),
        None => Err(LoadError::RelocationFormat { expected, actual: identity.to_string() }),
    }
}

/// Applies the escape-then-substitute rule to a raw dotted prefix.
pub fn mangle(prefix: &str) -> String {
    prefix.replace('_', "_1").replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrelocated_build_has_empty_prefix() {
        assert_eq!(mangled_prefix().unwrap(), "");
    }

    #[test]
    fn relocated_prefix_is_mangled() {
        let identity = format!("foo.bar_baz.{}", expected_identity());
        assert_eq!(mangled_prefix_for(&identity).unwrap(), "foo_bar_1baz_");
    }

    #[test]
    fn escape_happens_before_substitution() {
        // A literal `_1` must not be confused with an escaped `_`.
        assert_eq!(mangle("a_1.b."), "a_11_b_");
    }

    #[test]
    fn foreign_identity_is_rejected() {
        let err = mangled_prefix_for("vendored.loader.shading").unwrap_err();
        match err {
            LoadError::RelocationFormat { expected, actual } => {
                assert_eq!(expected, "tdlight_loader.shading");
                assert_eq!(actual, "vendored.loader.shading");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
