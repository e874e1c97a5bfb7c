//! Best-effort rewrite of a relocated macOS library's install name.
//!
//! When several relocated copies of the engine are loaded into one process,
//! dyld dedupes them by install name. Giving each extracted copy a fresh id
//! (and re-signing, since the id is covered by the signature) keeps them
//! apart. Nothing here is required for loading to work, so every failure is
//! logged and reported as a [`PatchOutcome`], never as an error.

use std::path::Path;
use std::process::Command;

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::platform::Os;

const COMMAND_LINE_TOOLS: &str = "/Library/Developer/CommandLineTools";

/// What happened to a patch attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Not attempted: disabled, not macOS, or not relocated.
    Skipped,
    /// Developer tools are missing.
    ToolsMissing,
    /// `install_name_tool` failed; the file is untouched.
    IdNotPatched,
    /// Id rewritten but `codesign` failed.
    NotResigned,
    /// Id rewritten and re-signed.
    Patched { id: String },
}

/// Whether an extracted library should get a fresh id.
pub fn should_patch(enabled: bool, os: Os, mangled_prefix: &str) -> bool {
    enabled && os.is_macos() && !mangled_prefix.is_empty()
}

/// Rewrites `library`'s id to a random token as long as `original_name`, then
/// ad-hoc signs it.
pub fn patch_shaded_library_id(library: &Path, original_name: &str) -> PatchOutcome {
    if !Path::new(COMMAND_LINE_TOOLS).exists() {
        log::debug!(
            "Can't patch shaded library id as CommandLineTools are not installed. \
             Consider installing CommandLineTools with 'xcode-select --install'"
        );
        return PatchOutcome::ToolsMissing;
    }
    let id = generate_unique_id(original_name.len());
    if !try_exec(Command::new("install_name_tool").arg("-id").arg(&id).arg(library)) {
        return PatchOutcome::IdNotPatched;
    }
    if !try_exec(Command::new("codesign").args(["-s", "-"]).arg(library)) {
        return PatchOutcome::NotResigned;
    }
    PatchOutcome::Patched { id }
}

/// Random `[0-9a-zA-Z]` token of `len` characters.
pub fn generate_unique_id(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// Runs `cmd` to completion. No timeout: a hung tool blocks this thread.
fn try_exec(cmd: &mut Command) -> bool {
    match cmd.status() {
        Ok(status) if status.success() => {
            log::debug!("Execution of '{cmd:?}' succeeded: {status}");
            true
        }
        Ok(status) => {
            log::debug!("Execution of '{cmd:?}' failed: {status}");
            false
        }
        Err(e) => {
            log::info!("Execution of '{cmd:?}' failed: {e}");
            false
        }
    }
}
