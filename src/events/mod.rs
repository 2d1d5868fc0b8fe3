//! Knowledge-base event dispatch.
//!
//! Four event kinds flow out of the store: `assert-input` (pre-commit echo),
//! `assert-added`, `assert-retracted`, and `evict`. The dispatcher:
//! - fans every event out to registered listeners (external transports)
//! - evaluates pattern callbacks against `assert-added` events only
//! - maintains the `note id → assertion ids` reverse map behind
//!   retract-by-note
//!
//! Callback failures are isolated: they are logged and never propagate.
//! Delivery is best-effort and non-reentrant; a callback must not call back
//! into the dispatcher synchronously.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tracing::warn;

use crate::kb::Assertion;
use crate::term::Term;
use crate::unify::{Bindings, match_pattern};

/// An event emitted by the knowledge base.
#[derive(Debug, Clone)]
pub enum KbEvent {
    /// A user submission echoed before commit.
    Input {
        kif: Term,
        priority: f64,
        note_id: Option<SmolStr>,
    },
    /// An assertion committed to the KB.
    Added(Arc<Assertion>),
    /// An assertion removed by retraction (direct or cascading).
    Retracted(Arc<Assertion>),
    /// An assertion removed by capacity eviction.
    Evicted(Arc<Assertion>),
}

impl std::fmt::Display for KbEvent {
    /// The wire line format used by external transports.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KbEvent::Input {
                kif,
                priority,
                note_id,
            } => match note_id {
                Some(id) => write!(f, "assert-input {priority:.4} {kif} [{id}]"),
                None => write!(f, "assert-input {priority:.4} {kif}"),
            },
            KbEvent::Added(a) => {
                write!(f, "assert-added {:.4} {} [{}]", a.priority, a.kif, a.id)
            }
            KbEvent::Retracted(a) => write!(f, "retract {}", a.id),
            KbEvent::Evicted(a) => write!(f, "evict {}", a.id),
        }
    }
}

/// Outcome of a pattern callback; failures are logged and contained.
pub type CallbackResult = Result<(), String>;

/// A pattern callback invoked on matching `assert-added` events.
pub type CallbackFn = dyn Fn(&KbEvent, &Arc<Assertion>, &Bindings) -> CallbackResult + Send + Sync;

/// A plain listener receiving every event.
pub type ListenerFn = dyn Fn(&KbEvent) + Send + Sync;

struct PatternCallback {
    pattern: Term,
    handler: Box<CallbackFn>,
}

/// Thread-safe dispatcher for KB events.
#[derive(Default)]
pub struct EventDispatcher {
    callbacks: RwLock<Vec<PatternCallback>>,
    listeners: RwLock<Vec<Box<ListenerFn>>>,
    by_note: Mutex<FxHashMap<SmolStr, FxHashSet<SmolStr>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern callback, matched one-way against the kif of every
    /// added assertion.
    pub fn register_callback(
        &self,
        pattern: Term,
        handler: impl Fn(&KbEvent, &Arc<Assertion>, &Bindings) -> CallbackResult + Send + Sync + 'static,
    ) {
        self.callbacks.write().push(PatternCallback {
            pattern,
            handler: Box::new(handler),
        });
    }

    /// Register a listener receiving every event.
    pub fn register_listener(&self, listener: impl Fn(&KbEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Assertion ids currently associated with a note.
    pub fn assertions_for_note(&self, note_id: &str) -> Vec<SmolStr> {
        self.by_note
            .lock()
            .get(note_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver an event: update the note map, notify listeners, and for
    /// additions evaluate pattern callbacks.
    pub fn emit(&self, event: &KbEvent) {
        self.track_note(event);

        for listener in self.listeners.read().iter() {
            listener(event);
        }

        if let KbEvent::Added(assertion) = event {
            for callback in self.callbacks.read().iter() {
                let Some(bindings) =
                    match_pattern(&callback.pattern, &assertion.kif, &Bindings::default())
                else {
                    continue;
                };
                if let Err(message) = (callback.handler)(event, assertion, &bindings) {
                    warn!(
                        "callback for pattern {} failed on {}: {message}",
                        callback.pattern, assertion.id
                    );
                }
            }
        }
    }

    fn track_note(&self, event: &KbEvent) {
        match event {
            KbEvent::Added(a) => {
                if let Some(note_id) = &a.source_note_id {
                    self.by_note
                        .lock()
                        .entry(note_id.clone())
                        .or_default()
                        .insert(a.id.clone());
                }
            }
            KbEvent::Retracted(a) | KbEvent::Evicted(a) => {
                if let Some(note_id) = &a.source_note_id {
                    let mut map = self.by_note.lock();
                    if let Some(set) = map.get_mut(note_id) {
                        set.remove(&a.id);
                        if set.is_empty() {
                            map.remove(note_id);
                        }
                    }
                }
            }
            KbEvent::Input { .. } => {}
        }
    }
}
