//! Knowledge base: the locked assertion store.
//!
//! Owns the assertion map, the path index, the eviction heap, and the
//! dependency graph (supporter → dependents). All externally visible
//! operations take a reader–writer lock: queries share the read side,
//! commit/retract/clear take the write side.
//!
//! Events are emitted through the shared [`EventDispatcher`] after the
//! write lock is released, so callbacks can query the KB without
//! deadlocking.

mod assertion;

pub use assertion::{Assertion, PotentialAssertion, TermFlags};

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tracing::{debug, trace, warn};

use crate::base::Priority;
use crate::events::{EventDispatcher, KbEvent};
use crate::index::PathIndex;
use crate::term::{Term, is_trivial};
use crate::unify::{Bindings, match_pattern};

/// Entry in the eviction heap; the heap pops the lowest priority first and
/// skips ids that have already left the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EvictionEntry {
    priority: Priority,
    id: SmolStr,
}

#[derive(Default)]
struct KbInner {
    assertions: FxHashMap<SmolStr, Arc<Assertion>>,
    index: PathIndex,
    /// supporter id → ids of assertions it directly supports
    dependents: FxHashMap<SmolStr, FxHashSet<SmolStr>>,
    eviction: BinaryHeap<Reverse<EvictionEntry>>,
}

/// The bounded assertion store.
pub struct KnowledgeBase {
    capacity: usize,
    events: Arc<EventDispatcher>,
    inner: RwLock<KbInner>,
}

impl KnowledgeBase {
    pub fn new(capacity: usize, events: Arc<EventDispatcher>) -> Self {
        Self {
            capacity,
            events,
            inner: RwLock::new(KbInner::default()),
        }
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.read().assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().assertions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Assertion>> {
        self.inner.read().assertions.get(id).cloned()
    }

    /// Snapshot of all stored ids.
    pub fn iter_ids(&self) -> Vec<SmolStr> {
        self.inner.read().assertions.keys().cloned().collect()
    }

    /// Snapshot of all stored assertions.
    pub fn snapshot(&self) -> Vec<Arc<Assertion>> {
        self.inner.read().assertions.values().cloned().collect()
    }

    // ========================================================================
    // COMMIT
    // ========================================================================

    /// Atomically commit a candidate under a fresh id.
    ///
    /// Rejects trivial, duplicate, and subsumed candidates, and candidates
    /// whose direct supporters have already left the KB. At capacity, evicts
    /// lowest-priority assertions until space frees up; if eviction cannot
    /// free space the commit is rejected.
    pub fn commit(
        &self,
        pa: PotentialAssertion,
        id: SmolStr,
        timestamp: u64,
    ) -> Option<Arc<Assertion>> {
        if is_trivial(&pa.kif) {
            trace!("[KB] rejecting trivial candidate {}", pa.kif);
            return None;
        }
        if !pa.kif.is_ground() {
            warn!("[KB] rejecting non-ground candidate {}", pa.kif);
            return None;
        }
        if pa.flags.is_negated
            && !matches!(pa.kif.items(), Some([_, inner]) if inner.is_list())
        {
            warn!("[KB] rejecting malformed negation {}", pa.kif);
            return None;
        }

        let mut pending = Vec::new();
        let committed = {
            let mut inner = self.inner.write();

            if inner.find_exact(&pa.kif).is_some() {
                trace!("[KB] duplicate candidate {}", pa.kif);
                None
            } else if inner.is_subsumed(&pa) {
                trace!("[KB] subsumed candidate {}", pa.kif);
                None
            } else if pa.support.iter().any(|s| !inner.assertions.contains_key(s)) {
                debug!("[KB] candidate {} lost a supporter before commit", pa.kif);
                None
            } else if inner.assertions.contains_key(&id) {
                warn!("[KB] id collision on commit: {id}");
                None
            } else if !inner.make_room(self.capacity, &mut pending) {
                warn!("[KB] at capacity and eviction freed no space; rejecting {}", pa.kif);
                None
            } else if pa.support.iter().any(|s| !inner.assertions.contains_key(s)) {
                // Eviction can cascade into the candidate's own supporters;
                // inserting now would leave an edge no retraction can follow.
                debug!("[KB] candidate {} lost a supporter to eviction", pa.kif);
                None
            } else {
                let assertion = Arc::new(Assertion::from_potential(pa, id, timestamp));
                inner
                    .index
                    .add(&assertion.id, assertion.effective_term());
                inner.eviction.push(Reverse(EvictionEntry {
                    priority: Priority(assertion.priority),
                    id: assertion.id.clone(),
                }));
                for supporter in &assertion.support {
                    inner
                        .dependents
                        .entry(supporter.clone())
                        .or_default()
                        .insert(assertion.id.clone());
                }
                inner
                    .assertions
                    .insert(assertion.id.clone(), Arc::clone(&assertion));
                Some(assertion)
            }
        };

        for event in &pending {
            self.events.emit(event);
        }
        if let Some(assertion) = &committed {
            debug!("[KB] committed {} as {}", assertion.kif, assertion.id);
            self.events.emit(&KbEvent::Added(Arc::clone(assertion)));
        }
        committed
    }

    // ========================================================================
    // RETRACTION
    // ========================================================================

    /// Cascade-retract an assertion and every transitive dependent.
    ///
    /// Idempotent: retracting an absent id returns `None`.
    pub fn retract(&self, id: &str) -> Option<Arc<Assertion>> {
        let removed = {
            let mut inner = self.inner.write();
            inner.remove_cascading(id)
        };
        let root = removed.first().cloned();
        for assertion in removed {
            self.events.emit(&KbEvent::Retracted(assertion));
        }
        root
    }

    /// Remove all assertions, edges, and index content. No events are
    /// emitted; callers tearing down the KB notify collaborators themselves.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = KbInner::default();
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Assertions that may unify with `query`, filtered by polarity.
    ///
    /// Candidates come from the index and still require unification by the
    /// caller; polarity (negated status) is already agreed.
    pub fn find_unifiable(&self, query: &Term) -> Vec<Arc<Assertion>> {
        let negated = query.is_negation();
        let effective = query.effective();
        let inner = self.inner.read();
        inner
            .resolve(inner.index.find_unifiable(effective))
            .filter(|a| a.is_negated == negated)
            .collect()
    }

    /// Assertions whose effective term is an instance of the pattern
    /// `query`, polarity agreeing. Verified with one-way matching.
    pub fn find_instances(&self, query: &Term) -> Vec<Arc<Assertion>> {
        let negated = query.is_negation();
        let effective = query.effective();
        let inner = self.inner.read();
        inner
            .resolve(inner.index.find_instances(effective))
            .filter(|a| {
                a.is_negated == negated
                    && match_pattern(effective, a.effective_term(), &Bindings::default()).is_some()
            })
            .collect()
    }

    /// Assertions whose effective term generalizes `query`, polarity
    /// agreeing. Verified with one-way matching.
    pub fn find_generalizations(&self, query: &Term) -> Vec<Arc<Assertion>> {
        let negated = query.is_negation();
        let effective = query.effective();
        let inner = self.inner.read();
        inner
            .resolve(inner.index.find_generalizations(effective))
            .filter(|a| {
                a.is_negated == negated
                    && match_pattern(a.effective_term(), effective, &Bindings::default()).is_some()
            })
            .collect()
    }

    /// The stored assertion structurally equal to `kif` (polarity included),
    /// if any.
    pub fn find_exact_match(&self, kif: &Term) -> Option<Arc<Assertion>> {
        self.inner.read().find_exact(kif)
    }

    /// True iff some stored assertion with matching polarity generalizes the
    /// candidate.
    pub fn is_subsumed(&self, pa: &PotentialAssertion) -> bool {
        self.inner.read().is_subsumed(pa)
    }
}

impl KbInner {
    fn resolve(
        &self,
        ids: FxHashSet<SmolStr>,
    ) -> impl Iterator<Item = Arc<Assertion>> + '_ {
        ids.into_iter()
            .filter_map(|id| self.assertions.get(&id).cloned())
    }

    fn find_exact(&self, kif: &Term) -> Option<Arc<Assertion>> {
        self.index
            .find_instances(kif.effective())
            .into_iter()
            .filter_map(|id| self.assertions.get(&id))
            .find(|a| a.kif == *kif)
            .cloned()
    }

    fn is_subsumed(&self, pa: &PotentialAssertion) -> bool {
        let effective = pa.effective_term();
        self.index
            .find_generalizations(effective)
            .into_iter()
            .filter_map(|id| self.assertions.get(&id))
            .any(|a| {
                a.is_negated == pa.flags.is_negated
                    && match_pattern(a.effective_term(), effective, &Bindings::default()).is_some()
            })
    }

    /// Evict lowest-priority assertions until below capacity. Returns false
    /// when the KB is still full and nothing is left to evict.
    fn make_room(&mut self, capacity: usize, pending: &mut Vec<KbEvent>) -> bool {
        while self.assertions.len() >= capacity {
            // Lazy deletion: heap entries may reference already-removed ids.
            let Some(Reverse(entry)) = self.eviction.pop() else {
                return false;
            };
            if !self.assertions.contains_key(&entry.id) {
                continue;
            }
            let mut removed = self.remove_cascading(&entry.id).into_iter();
            if let Some(root) = removed.next() {
                debug!("[KB] evicting {} (priority {})", root.id, entry.priority);
                pending.push(KbEvent::Evicted(root));
            }
            pending.extend(removed.map(KbEvent::Retracted));
        }
        true
    }

    /// Remove an assertion and, transitively, everything it supports.
    /// Returns the removed assertions, root first.
    fn remove_cascading(&mut self, id: &str) -> Vec<Arc<Assertion>> {
        let mut removed = Vec::new();
        let mut queue = vec![SmolStr::new(id)];
        while let Some(current) = queue.pop() {
            let Some(assertion) = self.assertions.remove(&current) else {
                continue;
            };
            self.index.remove(&assertion.id, assertion.effective_term());
            for supporter in &assertion.support {
                if let Some(set) = self.dependents.get_mut(supporter) {
                    set.remove(&assertion.id);
                    if set.is_empty() {
                        self.dependents.remove(supporter);
                    }
                }
            }
            if let Some(dependents) = self.dependents.remove(&assertion.id) {
                queue.extend(dependents);
            }
            removed.push(assertion);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn term(source: &str) -> Term {
        parse(source).unwrap().pop().unwrap()
    }

    fn kb(capacity: usize) -> KnowledgeBase {
        KnowledgeBase::new(capacity, Arc::new(EventDispatcher::new()))
    }

    fn pa(source: &str, priority: f64) -> PotentialAssertion {
        PotentialAssertion::new(term(source), priority, Default::default(), "test", None)
    }

    fn pa_with_support(source: &str, priority: f64, support: &[&str]) -> PotentialAssertion {
        PotentialAssertion::new(
            term(source),
            priority,
            support.iter().map(|s| SmolStr::new(s)).collect(),
            "test",
            None,
        )
    }

    fn commit(kb: &KnowledgeBase, pa: PotentialAssertion, id: &str) -> Option<Arc<Assertion>> {
        kb.commit(pa, SmolStr::new(id), 0)
    }

    #[test]
    fn test_commit_and_exact_match() {
        let kb = kb(16);
        let a = commit(&kb, pa("(human socrates)", 1.0), "a1").unwrap();
        assert_eq!(a.id, "a1");
        assert_eq!(kb.len(), 1);
        assert!(kb.find_exact_match(&term("(human socrates)")).is_some());
        assert!(kb.find_exact_match(&term("(human plato)")).is_none());
    }

    #[test]
    fn test_duplicate_commit_rejected() {
        let kb = kb(16);
        assert!(commit(&kb, pa("(p a)", 1.0), "a1").is_some());
        assert!(commit(&kb, pa("(p a)", 2.0), "a2").is_none());
        assert_eq!(kb.len(), 1);
    }

    #[test]
    fn test_polarity_distinguishes_duplicates() {
        let kb = kb(16);
        assert!(commit(&kb, pa("(color red)", 1.0), "a1").is_some());
        assert!(commit(&kb, pa("(not (color red))", 1.0), "a2").is_some());
        assert_eq!(kb.len(), 2);
    }

    #[test]
    fn test_trivial_rejected() {
        let kb = kb(16);
        assert!(commit(&kb, pa("(= x x)", 1.0), "a1").is_none());
        assert!(commit(&kb, pa("(instance foo foo)", 1.0), "a2").is_none());
        assert!(commit(&kb, pa("(not (= y y))", 1.0), "a3").is_none());
        assert!(kb.is_empty());
    }

    #[test]
    fn test_subsumption_rejects_instances() {
        let kb = kb(16);
        // A stored generalization subsumes later instances... except the
        // general form must be ground to be stored, so test via negation
        // polarity: matching polarity required for subsumption.
        assert!(commit(&kb, pa("(color red)", 1.0), "a1").is_some());
        assert!(kb.is_subsumed(&pa("(color red)", 0.5)));
        assert!(!kb.is_subsumed(&pa("(not (color red))", 0.5)));
    }

    #[test]
    fn test_malformed_negation_rejected() {
        let kb = kb(16);
        assert!(commit(&kb, pa("(not foo)", 1.0), "a1").is_none());
        assert!(commit(&kb, pa("(not (p a) (q b))", 1.0), "a2").is_none());
        assert!(kb.is_empty());
    }

    #[test]
    fn test_id_collision_rejected() {
        let kb = kb(16);
        assert!(commit(&kb, pa("(p a)", 1.0), "a1").is_some());
        assert!(commit(&kb, pa("(p b)", 1.0), "a1").is_none());
    }

    #[test]
    fn test_retract_is_idempotent() {
        let kb = kb(16);
        commit(&kb, pa("(p a)", 1.0), "a1").unwrap();
        assert!(kb.retract("a1").is_some());
        assert!(kb.retract("a1").is_none());
        assert!(kb.is_empty());
    }

    #[test]
    fn test_retract_cascades_through_support() {
        let kb = kb(16);
        commit(&kb, pa("(p a)", 1.0), "a1").unwrap();
        commit(&kb, pa_with_support("(q a)", 1.0, &["a1"]), "a2").unwrap();
        commit(&kb, pa_with_support("(r a)", 1.0, &["a2"]), "a3").unwrap();
        kb.retract("a1");
        assert!(kb.is_empty());
    }

    #[test]
    fn test_commit_rejected_when_supporter_gone() {
        let kb = kb(16);
        commit(&kb, pa("(p a)", 1.0), "a1").unwrap();
        kb.retract("a1");
        assert!(commit(&kb, pa_with_support("(q a)", 1.0, &["a1"]), "a2").is_none());
    }

    #[test]
    fn test_commit_rejected_when_eviction_takes_supporter() {
        // A derived candidate decays below its supporter, so a full KB can
        // evict the supporter while making room for the derivation. The
        // commit must then be rejected instead of leaving a dependency edge
        // pointing at a removed id.
        let kb = kb(2);
        commit(&kb, pa("(p a)", 1.0), "a1").unwrap();
        commit(&kb, pa("(p b)", 5.0), "a2").unwrap();
        assert!(commit(&kb, pa_with_support("(q a)", 0.95, &["a1"]), "a3").is_none());
        assert!(kb.get("a1").is_none(), "lowest-priority supporter was evicted");
        assert!(kb.find_exact_match(&term("(q a)")).is_none());
        assert_eq!(kb.len(), 1);
    }

    #[test]
    fn test_eviction_pops_lowest_priority() {
        let events = Arc::new(EventDispatcher::new());
        let evicted: Arc<parking_lot::Mutex<Vec<SmolStr>>> = Default::default();
        let evicted_in = Arc::clone(&evicted);
        events.register_listener(move |event| {
            if let KbEvent::Evicted(a) = event {
                evicted_in.lock().push(a.id.clone());
            }
        });
        let kb = KnowledgeBase::new(3, events);
        commit(&kb, pa("(p a)", 1.0), "a1").unwrap();
        commit(&kb, pa("(p b)", 2.0), "a2").unwrap();
        commit(&kb, pa("(p c)", 3.0), "a3").unwrap();
        commit(&kb, pa("(p d)", 4.0), "a4").unwrap();
        assert_eq!(kb.len(), 3);
        assert!(kb.get("a1").is_none());
        assert_eq!(evicted.lock().as_slice(), &[SmolStr::new("a1")]);
    }

    #[test]
    fn test_queries_filter_polarity() {
        let kb = kb(16);
        commit(&kb, pa("(color red)", 1.0), "a1").unwrap();
        commit(&kb, pa("(not (color red))", 1.0), "a2").unwrap();
        let positive = kb.find_instances(&term("(color ?x)"));
        assert_eq!(positive.len(), 1);
        assert_eq!(positive[0].id, "a1");
        let negative = kb.find_instances(&term("(not (color ?x))"));
        assert_eq!(negative.len(), 1);
        assert_eq!(negative[0].id, "a2");
    }

    #[test]
    fn test_clear_empties_everything() {
        let kb = kb(16);
        commit(&kb, pa("(p a)", 1.0), "a1").unwrap();
        commit(&kb, pa_with_support("(q a)", 1.0, &["a1"]), "a2").unwrap();
        kb.clear();
        assert!(kb.is_empty());
        assert!(kb.find_unifiable(&term("(p ?x)")).is_empty());
    }
}
