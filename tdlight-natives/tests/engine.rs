use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_double, c_int, c_void};
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tdlight_loader::{BindError, IsolationContext, LoadError, LoadTarget, Loader, LoaderConfig, NativeBinder, NativeModule};
use tdlight_natives::{ABI_V1, ClientId, EngineError, NativeEngine};

// ── A fake engine living in this test binary ──────────────────────────────────

static NEXT_ID: AtomicI32 = AtomicI32::new(1);
static SENT: Mutex<Vec<(i32, String)>> = Mutex::new(Vec::new());
static DESTROYED: Mutex<Vec<i32>> = Mutex::new(Vec::new());

extern "C" fn fake_create_client_id() -> c_int {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

extern "C" fn fake_send(client: c_int, request: *const c_char) {
    let text = unsafe { CStr::from_ptr(request) }.to_string_lossy().into_owned();
    SENT.lock().unwrap().push((client, text));
}

extern "C" fn fake_receive(timeout: c_double) -> *const c_char {
    if timeout > 0.0 { c"{\"@type\":\"updateOption\"}".as_ptr() } else { std::ptr::null() }
}

extern "C" fn fake_execute(_request: *const c_char) -> *const c_char {
    c"{\"@type\":\"text\",\"text\":\"pong\"}".as_ptr()
}

extern "C" fn fake_destroy_client_id(client: c_int) {
    DESTROYED.lock().unwrap().push(client);
}

struct FakeModule(HashMap<&'static str, NonNull<c_void>>);

// SAFETY: the pointers are addresses of plain functions.
unsafe impl Send for FakeModule {}
unsafe impl Sync for FakeModule {}

impl NativeModule for FakeModule {
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        self.0.get(name).copied()
    }
}

fn entry(f: *const ()) -> NonNull<c_void> {
    NonNull::new(f as *mut c_void).unwrap()
}

fn full_engine() -> FakeModule {
    FakeModule(HashMap::from([
        ("td_create_client_id", entry(fake_create_client_id as *const ())),
        ("td_send", entry(fake_send as *const ())),
        ("td_receive", entry(fake_receive as *const ())),
        ("td_execute", entry(fake_execute as *const ())),
        ("td_destroy_client_id", entry(fake_destroy_client_id as *const ())),
    ]))
}

/// "fake_engine" is a complete engine, "old_engine" lacks `td_execute`.
struct FakeBinder;

impl NativeBinder for FakeBinder {
    fn bind_isolated(
        &self,
        _ctx:    &IsolationContext,
        _target: LoadTarget<'_>,
    ) -> Result<Box<dyn NativeModule>, BindError> {
        Err(BindError::Unavailable("test".into()))
    }

    fn bind_global(&self, target: LoadTarget<'_>) -> Result<Box<dyn NativeModule>, BindError> {
        match target {
            LoadTarget::Name("fake_engine") => Ok(Box::new(full_engine())),
            LoadTarget::Name("old_engine") => {
                let mut module = full_engine();
                module.0.remove("td_execute");
                Ok(Box::new(module))
            }
            other => Err(BindError::Link(format!("cannot open {other:?}"))),
        }
    }
}

fn loader() -> Loader {
    Loader::new(LoaderConfig::default()).with_binder(FakeBinder)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn round_trip_through_entry_points() {
    let ctx = IsolationContext::new("engine-round-trip");
    let engine = NativeEngine::load_with(&loader(), Some(&ctx), &["fake_engine"]).unwrap();

    let client = engine.create_client_id();
    engine.send(client, r#"{"@type":"getOption","name":"version"}"#).unwrap();
    assert!(SENT.lock().unwrap().contains(&(client.0, r#"{"@type":"getOption","name":"version"}"#.to_string())));

    assert_eq!(engine.receive(Duration::from_millis(500)).unwrap().as_deref(), Some(r#"{"@type":"updateOption"}"#));
    assert_eq!(engine.receive(Duration::ZERO).unwrap(), None);

    let pong = engine.execute(r#"{"@type":"testCallEmpty"}"#).unwrap().unwrap();
    assert!(pong.contains("pong"));

    engine.destroy_client_id(client);
    assert!(DESTROYED.lock().unwrap().contains(&client.0));
}

#[test]
fn client_ids_are_distinct() {
    let ctx = IsolationContext::new("engine-ids");
    let engine = NativeEngine::load_with(&loader(), Some(&ctx), &["fake_engine"]).unwrap();
    let a: ClientId = engine.create_client_id();
    let b: ClientId = engine.create_client_id();
    assert_ne!(a, b);
}

#[test]
fn interior_nul_is_rejected_before_the_call() {
    let ctx = IsolationContext::new("engine-nul");
    let engine = NativeEngine::load_with(&loader(), Some(&ctx), &["fake_engine"]).unwrap();
    assert!(matches!(engine.send(ClientId(1), "bad\0request"), Err(EngineError::InvalidRequest(_))));
    assert!(!SENT.lock().unwrap().iter().any(|(_, r)| r.starts_with("bad")));
}

#[test]
fn incomplete_engine_is_skipped_when_symbols_are_required() {
    let ctx = IsolationContext::new("engine-required");
    let loader = loader().with_required_symbols(ABI_V1);
    let engine = NativeEngine::load_with(&loader, Some(&ctx), &["old_engine", "fake_engine"]).unwrap();
    assert_eq!(engine.library().logical_name(), "fake_engine");
}

#[test]
fn incomplete_engine_fails_binding() {
    let ctx = IsolationContext::new("engine-missing");
    let lib = loader().load("old_engine", Some(&ctx)).unwrap();
    match NativeEngine::from_library(lib) {
        Err(EngineError::MissingSymbol { symbol, .. }) => assert_eq!(symbol, "td_execute"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn nothing_loadable_surfaces_the_aggregate() {
    let ctx = IsolationContext::new("engine-none");
    let err = NativeEngine::load_with(&loader(), Some(&ctx), &["nope"]).unwrap_err();
    assert!(matches!(err, EngineError::Load(LoadError::Exhausted { .. })), "{err}");
}
