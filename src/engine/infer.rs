//! Inference kernel: antecedent completion and oriented rewriting.
//!
//! Workers land here with a popped task. Both paths end at the same place:
//! a derived [`PotentialAssertion`] handed to a [`DerivationSink`] (the
//! engine's commit queue in production, a plain buffer in tests).

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::kb::{Assertion, KnowledgeBase, PotentialAssertion};
use crate::term::{OP_AND, OP_NOT, OP_OR, Term, is_trivial};
use crate::unify::{Bindings, rewrite, subst_fully, unify};

use super::EngineConfig;
use super::rules::Rule;

/// Hard bound on the simplification fixed-point loop.
pub const MAX_SIMPLIFICATION_DEPTH: usize = 5;

/// Receiver of derived candidates. Workers are polymorphic over the sink so
/// the kernel can be exercised without a running engine.
pub trait DerivationSink {
    fn submit_potential_assertion(&self, pa: PotentialAssertion);
}

// ============================================================================
// ANTECEDENT MATCHING
// ============================================================================

/// Complete a rule antecedent starting from the clause consumed by the
/// trigger, then derive and submit the consequent for every full solution.
pub fn run_match(
    kb: &KnowledgeBase,
    config: &EngineConfig,
    sink: &dyn DerivationSink,
    rule: &Arc<Rule>,
    trigger: &Arc<Assertion>,
    clause_index: usize,
    bindings: &Bindings,
) {
    let remaining: Vec<&Term> = rule
        .antecedent_clauses
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != clause_index)
        .map(|(_, c)| c)
        .collect();
    let mut support = FxHashSet::default();
    support.insert(trigger.id.clone());
    satisfy(
        kb,
        config,
        sink,
        rule,
        &remaining,
        bindings,
        &support,
        trigger.priority,
    );
}

/// Recursively satisfy the remaining clauses against the KB.
///
/// Each step substitutes the next clause with the current bindings, pulls
/// polarity-matching candidates from the index, and extends the bindings by
/// unification. Support accumulates every candidate used.
#[allow(clippy::too_many_arguments)]
fn satisfy(
    kb: &KnowledgeBase,
    config: &EngineConfig,
    sink: &dyn DerivationSink,
    rule: &Arc<Rule>,
    remaining: &[&Term],
    bindings: &Bindings,
    support: &FxHashSet<SmolStr>,
    min_priority: f64,
) {
    let Some((&clause, rest)) = remaining.split_first() else {
        derive_consequent(kb, config, sink, rule, bindings, support, min_priority);
        return;
    };
    let substituted = subst_fully(clause, bindings);
    let pattern = substituted.effective().clone();
    for candidate in kb.find_unifiable(&substituted) {
        let Some(extended) = unify(&pattern, candidate.effective_term(), bindings) else {
            continue;
        };
        let mut next_support = support.clone();
        next_support.insert(candidate.id.clone());
        satisfy(
            kb,
            config,
            sink,
            rule,
            rest,
            &extended,
            &next_support,
            min_priority.min(candidate.priority),
        );
    }
}

fn derive_consequent(
    kb: &KnowledgeBase,
    config: &EngineConfig,
    sink: &dyn DerivationSink,
    rule: &Arc<Rule>,
    bindings: &Bindings,
    support: &FxHashSet<SmolStr>,
    min_priority: f64,
) {
    let consequent = subst_fully(&rule.consequent, bindings);
    let simplified = simplify(&consequent);
    if simplified.operator() == Some(OP_AND) {
        if let Some(items) = simplified.items() {
            for conjunct in &items[1..] {
                process_derived(kb, config, sink, &rule.id, conjunct, support, min_priority);
            }
        }
    } else {
        process_derived(kb, config, sink, &rule.id, &simplified, support, min_priority);
    }
}

/// Vet a derived term and submit it as a candidate.
fn process_derived(
    kb: &KnowledgeBase,
    config: &EngineConfig,
    sink: &dyn DerivationSink,
    source_id: &SmolStr,
    term: &Term,
    support: &FxHashSet<SmolStr>,
    min_priority: f64,
) {
    if !term.is_list() {
        trace!("[INFER] discarding non-list derivation {term}");
        return;
    }
    if !term.is_ground() {
        warn!("[INFER] discarding non-ground derivation {term}");
        return;
    }
    if is_trivial(term) {
        trace!("[INFER] discarding trivial derivation {term}");
        return;
    }
    let weight = term.weight();
    if weight > config.derived_weight_cap {
        warn!(
            "[INFER] derivation weight {weight} exceeds cap {}: {term}",
            config.derived_weight_cap
        );
        return;
    }
    let priority = min_priority * config.priority_decay;
    let note = common_source_note(kb, support);
    sink.submit_potential_assertion(
        PotentialAssertion::new(term.clone(), priority, support.clone(), source_id.clone(), note),
    );
}

// ============================================================================
// ORIENTED REWRITING
// ============================================================================

/// Apply an oriented equality to a target assertion.
///
/// The rule-assertion must be a positive oriented equality of arity 3;
/// anything else drops the task.
pub fn run_rewrite(
    kb: &KnowledgeBase,
    config: &EngineConfig,
    sink: &dyn DerivationSink,
    rewrite_rule: &Arc<Assertion>,
    target: &Arc<Assertion>,
) {
    if !rewrite_rule.is_oriented_equality
        || rewrite_rule.is_negated
        || rewrite_rule.kif.arity() != 3
    {
        trace!("[INFER] dropping rewrite task with unusable rule {}", rewrite_rule.id);
        return;
    }
    let Some([_, lhs, rhs]) = rewrite_rule.kif.items() else {
        return;
    };
    let Some(result) = rewrite(&target.kif, lhs, rhs) else {
        return;
    };
    if result == target.kif || !result.is_list() || is_trivial(&result) {
        return;
    }
    let mut support = target.support.clone();
    support.insert(target.id.clone());
    support.insert(rewrite_rule.id.clone());
    let priority = target.priority.min(rewrite_rule.priority) * config.priority_decay;
    let note = common_source_note(kb, &support);
    sink.submit_potential_assertion(PotentialAssertion::new(
        result,
        priority,
        support,
        rewrite_rule.id.clone(),
        note,
    ));
}

// ============================================================================
// SIMPLIFICATION
// ============================================================================

/// Defensive simplification of derived terms, iterated to a bounded fixed
/// point:
/// - `(and X X)` / `(or X X)` collapse when both arguments simplify to the
///   same list
/// - `(not (not X))` collapses when the inner term is a list
pub fn simplify(term: &Term) -> Term {
    let mut current = term.clone();
    for _ in 0..MAX_SIMPLIFICATION_DEPTH {
        let next = simplify_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
    warn!("simplification fixed point not reached for {term}");
    current
}

fn simplify_once(term: &Term) -> Term {
    let Some(items) = term.items() else {
        return term.clone();
    };
    let simplified: Vec<Term> = items.iter().map(simplify_once).collect();
    if let Some(collapsed) = collapse(&simplified) {
        return collapsed;
    }
    Term::list(simplified)
}

fn collapse(items: &[Term]) -> Option<Term> {
    match items {
        [Term::Atom(op), a, b]
            if (op.as_str() == OP_AND || op.as_str() == OP_OR) && a == b && a.is_list() =>
        {
            Some(a.clone())
        }
        [Term::Atom(op), inner] if op.as_str() == OP_NOT => match inner.items() {
            Some([Term::Atom(inner_op), doubly])
                if inner_op.as_str() == OP_NOT && doubly.is_list() =>
            {
                Some(doubly.clone())
            }
            _ => None,
        },
        _ => None,
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

/// The unique source-note id common to a support set, found by breadth-first
/// search over transitive support. `None` when zero or several distinct
/// notes are reachable.
pub fn common_source_note(kb: &KnowledgeBase, support: &FxHashSet<SmolStr>) -> Option<SmolStr> {
    let mut notes: FxHashSet<SmolStr> = FxHashSet::default();
    let mut seen = support.clone();
    let mut queue: Vec<SmolStr> = support.iter().cloned().collect();
    while let Some(id) = queue.pop() {
        let Some(assertion) = kb.get(&id) else {
            continue;
        };
        if let Some(note) = &assertion.source_note_id {
            notes.insert(note.clone());
        }
        for supporter in &assertion.support {
            if seen.insert(supporter.clone()) {
                queue.push(supporter.clone());
            }
        }
    }
    if notes.len() == 1 {
        notes.into_iter().next()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::base::IdGenerator;
    use crate::events::EventDispatcher;
    use crate::parser::parse;

    #[derive(Default)]
    struct BufferSink {
        derived: Mutex<Vec<PotentialAssertion>>,
    }

    impl DerivationSink for BufferSink {
        fn submit_potential_assertion(&self, pa: PotentialAssertion) {
            self.derived.lock().push(pa);
        }
    }

    fn term(source: &str) -> Term {
        parse(source).unwrap().pop().unwrap()
    }

    fn kb_with(facts: &[(&str, &str, f64)]) -> KnowledgeBase {
        let kb = KnowledgeBase::new(64, Arc::new(EventDispatcher::new()));
        for (id, source, priority) in facts {
            let pa = PotentialAssertion::new(term(source), *priority, Default::default(), "test", None);
            kb.commit(pa, SmolStr::new(id), 0).unwrap();
        }
        kb
    }

    fn rule(source: &str) -> Arc<Rule> {
        Arc::new(
            Rule::parse(&term(source), &IdGenerator::new(), 1.0)
                .unwrap()
                .remove(0),
        )
    }

    #[test]
    fn test_single_clause_rule_derives_consequent() {
        let kb = kb_with(&[("a1", "(human socrates)", 10.0)]);
        let config = EngineConfig::default();
        let sink = BufferSink::default();
        let r = rule("(=> (human ?x) (mortal ?x))");
        let trigger = kb.get("a1").unwrap();
        let bindings = unify(
            r.antecedent_clauses[0].effective(),
            trigger.effective_term(),
            &Bindings::default(),
        )
        .unwrap();
        run_match(&kb, &config, &sink, &r, &trigger, 0, &bindings);

        let derived = sink.derived.lock();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].kif, term("(mortal socrates)"));
        assert!((derived[0].priority - 9.5).abs() < 1e-9);
        assert!(derived[0].support.contains("a1"));
    }

    #[test]
    fn test_multi_clause_rule_joins_against_kb() {
        let kb = kb_with(&[
            ("a1", "(parent tom bob)", 8.0),
            ("a2", "(parent bob ann)", 6.0),
        ]);
        let config = EngineConfig::default();
        let sink = BufferSink::default();
        let r = rule("(=> (and (parent ?x ?y) (parent ?y ?z)) (grandparent ?x ?z))");
        let trigger = kb.get("a1").unwrap();
        let bindings = unify(
            r.antecedent_clauses[0].effective(),
            trigger.effective_term(),
            &Bindings::default(),
        )
        .unwrap();
        run_match(&kb, &config, &sink, &r, &trigger, 0, &bindings);

        let derived = sink.derived.lock();
        let grandparent: Vec<_> = derived
            .iter()
            .filter(|pa| pa.kif == term("(grandparent tom ann)"))
            .collect();
        assert_eq!(grandparent.len(), 1);
        assert!(grandparent[0].support.contains("a1"));
        assert!(grandparent[0].support.contains("a2"));
        // min(8.0, 6.0) * 0.95
        assert!((grandparent[0].priority - 5.7).abs() < 1e-9);
    }

    #[test]
    fn test_negative_clause_matches_negated_assertions() {
        let kb = kb_with(&[
            ("a1", "(bird tweety)", 5.0),
            ("a2", "(not (flies tweety))", 5.0),
        ]);
        let config = EngineConfig::default();
        let sink = BufferSink::default();
        let r = rule("(=> (and (bird ?x) (not (flies ?x))) (grounded ?x))");
        let trigger = kb.get("a1").unwrap();
        let bindings = unify(
            r.antecedent_clauses[0].effective(),
            trigger.effective_term(),
            &Bindings::default(),
        )
        .unwrap();
        run_match(&kb, &config, &sink, &r, &trigger, 0, &bindings);

        let derived = sink.derived.lock();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].kif, term("(grounded tweety)"));
    }

    #[test]
    fn test_conjunctive_consequent_splits() {
        let kb = kb_with(&[("a1", "(p a)", 4.0)]);
        let config = EngineConfig::default();
        let sink = BufferSink::default();
        let r = rule("(=> (p ?x) (and (q ?x) (r ?x)))");
        let trigger = kb.get("a1").unwrap();
        let bindings = unify(
            r.antecedent_clauses[0].effective(),
            trigger.effective_term(),
            &Bindings::default(),
        )
        .unwrap();
        run_match(&kb, &config, &sink, &r, &trigger, 0, &bindings);

        let derived = sink.derived.lock();
        let kifs: Vec<String> = derived.iter().map(|pa| pa.kif.to_string()).collect();
        assert!(kifs.contains(&"(q a)".to_string()));
        assert!(kifs.contains(&"(r a)".to_string()));
    }

    #[test]
    fn test_non_ground_derivation_discarded() {
        let kb = kb_with(&[("a1", "(p a)", 4.0)]);
        let config = EngineConfig::default();
        let sink = BufferSink::default();
        // ?y never binds.
        let r = rule("(=> (p ?x) (q ?x ?y))");
        let trigger = kb.get("a1").unwrap();
        let bindings = unify(
            r.antecedent_clauses[0].effective(),
            trigger.effective_term(),
            &Bindings::default(),
        )
        .unwrap();
        run_match(&kb, &config, &sink, &r, &trigger, 0, &bindings);
        assert!(sink.derived.lock().is_empty());
    }

    #[test]
    fn test_rewrite_replaces_subterm() {
        let kb = kb_with(&[("eq1", "(= (f a) b)", 5.0), ("t1", "(P (f a))", 4.0)]);
        let config = EngineConfig::default();
        let sink = BufferSink::default();
        run_rewrite(
            &kb,
            &config,
            &sink,
            &kb.get("eq1").unwrap(),
            &kb.get("t1").unwrap(),
        );
        let derived = sink.derived.lock();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].kif, term("(P b)"));
        assert!(derived[0].support.contains("eq1"));
        assert!(derived[0].support.contains("t1"));
        assert!((derived[0].priority - 3.8).abs() < 1e-9);
    }

    #[test]
    fn test_rewrite_dropped_for_unoriented_rule() {
        let kb = kb_with(&[("eq1", "(= a (f b))", 5.0), ("t1", "(P a)", 4.0)]);
        let config = EngineConfig::default();
        let sink = BufferSink::default();
        run_rewrite(
            &kb,
            &config,
            &sink,
            &kb.get("eq1").unwrap(),
            &kb.get("t1").unwrap(),
        );
        assert!(sink.derived.lock().is_empty());
    }

    #[test]
    fn test_simplify_collapses_duplicate_conjuncts() {
        let t = term("(and (p a) (p a))");
        assert_eq!(simplify(&t), term("(p a)"));
        // Equal atoms do not collapse.
        let atoms = term("(and a a)");
        assert_eq!(simplify(&atoms), atoms);
    }

    #[test]
    fn test_simplify_double_negation() {
        assert_eq!(simplify(&term("(not (not (p a)))")), term("(p a)"));
        // Single negation untouched.
        let single = term("(not (p a))");
        assert_eq!(simplify(&single), single);
    }

    #[test]
    fn test_simplify_recurses_into_children() {
        let t = term("(q (not (not (p a))))");
        assert_eq!(simplify(&t), term("(q (p a))"));
    }

    #[test]
    fn test_common_note_unique_and_ambiguous() {
        let events = Arc::new(EventDispatcher::new());
        let kb = KnowledgeBase::new(64, events);
        let with_note = |kif: &str, note: &str| {
            PotentialAssertion::new(term(kif), 1.0, Default::default(), "test", None)
                .with_note(Some(SmolStr::new(note)))
        };
        kb.commit(with_note("(p a)", "note-1"), "a1".into(), 0).unwrap();
        kb.commit(with_note("(p b)", "note-1"), "a2".into(), 0).unwrap();
        kb.commit(with_note("(p c)", "note-2"), "a3".into(), 0).unwrap();

        let support: FxHashSet<SmolStr> = ["a1", "a2"].iter().map(|s| SmolStr::new(s)).collect();
        assert_eq!(common_source_note(&kb, &support), Some(SmolStr::new("note-1")));

        let mixed: FxHashSet<SmolStr> = ["a1", "a3"].iter().map(|s| SmolStr::new(s)).collect();
        assert_eq!(common_source_note(&kb, &mixed), None);
    }
}
