//! # tdlight-natives
//!
//! Safe access to the TDLight engine's JSON interface on top of
//! [`tdlight_loader`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tdlight_natives::NativeEngine;
//!
//! let engine = NativeEngine::load(&["tdjni"])?;
//! let client = engine.create_client_id();
//! engine.send(client, r#"{"@type":"getOption","name":"version"}"#)?;
//! while let Some(update) = engine.receive(Duration::from_secs(1))? {
//!     println!("{update}");
//! }
//! # Ok::<(), tdlight_natives::EngineError>(())
//! ```

#![deny(unsafe_code)]

pub mod engine;
mod errors;

pub use engine::{ABI_V1, ClientId, NativeEngine};
pub use errors::EngineError;
pub use tdlight_loader::{IsolationContext, LoadError, LoadedLibrary, Loader, LoaderConfig};
