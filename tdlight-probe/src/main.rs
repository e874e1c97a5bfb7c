//! tdlight-probe: load the native engine and report every step.
//!
//! ```text
//! cargo run -p tdlight-probe -- tdjni tdjni-legacy
//! RUST_LOG=tdlight_loader=debug cargo run -p tdlight-probe
//! ```
//!
//! Exits non-zero when no candidate could be loaded.

use tdlight_loader::{Loader, Origin};
use tdlight_natives::{ABI_V1, NativeEngine};

const DEFAULT_NAMES: &[&str] = &["tdjni"];

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { std::env::set_var("RUST_LOG", "tdlight_loader=info,tdlight_probe=info"); }
    }
    env_logger::init();

    if let Err(e) = run() {
        // `{:#}` prints the suppressed-cause tree as well.
        eprintln!("✗ {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let names: Vec<&str> = if args.is_empty() {
        DEFAULT_NAMES.to_vec()
    } else {
        args.iter().map(String::as_str).collect()
    };

    log::debug!("probing {names:?}");
    let loader = Loader::from_env();
    let cfg = loader.config();
    println!("── Configuration ──────────────────────────────────────────");
    println!("  workdir              : {}", cfg.workdir.as_ref().map_or("(temporary)".into(), |p| p.display().to_string()));
    println!("  delete after loading : {}", cfg.delete_after_loading);
    println!("  patch shaded id      : {}", cfg.try_patch_shaded_id);
    println!("  detect duplicates    : {}", cfg.detect_duplicates);
    println!("  platform             : {:?}", loader.os());
    println!("  mangled prefix       : {:?}", loader.mangled_prefix()?);
    println!("  candidates           : {names:?}");
    println!();

    let lib = loader.load_first_available(None, &names)?;
    println!("✅ Loaded {} ({:?})", lib.name(), lib.binding());
    match lib.origin() {
        Origin::SearchPath       => println!("   from the platform search path"),
        Origin::Resource(origin) => println!("   extracted from {origin}"),
    }

    let missing: Vec<String> = ABI_V1
        .iter()
        .filter(|s| lib.symbol(s).is_none())
        .map(|s| lib.symbol_name(s))
        .collect();
    if !missing.is_empty() {
        println!("⚠  Not an ABI v1 engine, missing: {missing:?}");
        return Ok(());
    }

    let engine = NativeEngine::from_library(lib)?;
    let reply = engine.execute(r#"{"@type":"getOption","name":"version"}"#)?;
    println!("   engine version reply: {}", reply.as_deref().unwrap_or("(none)"));
    Ok(())
}
