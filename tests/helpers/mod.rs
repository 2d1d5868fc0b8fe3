//! Shared test helpers: engine harness, quiescence polling, event capture.

// Each test binary includes this module; not every binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use cogent::{Assertion, Engine, EngineConfig, KbEvent, Term};

/// Default deadline for asynchronous expectations.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Build and start an engine with the given config.
pub fn start_engine(config: EngineConfig) -> Arc<Engine> {
    let engine = Engine::new(config);
    engine.start();
    engine
}

/// Parse a single term from source.
pub fn term(source: &str) -> Term {
    let mut terms = cogent::parse(source).expect("test term must parse");
    assert_eq!(terms.len(), 1, "expected exactly one term in {source:?}");
    terms.pop().unwrap()
}

/// Poll until `check` passes or the deadline expires.
pub fn wait_until(deadline: Duration, check: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

/// Wait for an assertion whose effective term is an instance of `pattern`.
pub fn wait_for_fact(engine: &Engine, pattern: &str) -> Option<Arc<Assertion>> {
    let query = term(pattern);
    let found = wait_until(DEADLINE, || !engine.kb().find_instances(&query).is_empty());
    if !found {
        return None;
    }
    engine.kb().find_instances(&query).into_iter().next()
}

/// Wait until no assertion matches `pattern` any more.
pub fn wait_for_absence(engine: &Engine, pattern: &str) -> bool {
    let query = term(pattern);
    wait_until(DEADLINE, || engine.kb().find_instances(&query).is_empty())
}

/// Captures the wire-formatted event stream.
#[derive(Clone, Default)]
pub struct EventRecorder {
    lines: Arc<Mutex<Vec<String>>>,
}

impl EventRecorder {
    pub fn attach(engine: &Engine) -> Self {
        let recorder = Self::default();
        let lines = Arc::clone(&recorder.lines);
        engine.events().register_listener(move |event: &KbEvent| {
            lines.lock().push(event.to_string());
        });
        recorder
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}
