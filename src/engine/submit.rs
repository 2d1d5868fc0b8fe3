//! Submission surface: the operational contract for external producers.
//!
//! Source text is parsed and each top-level term routed:
//! - `(=> ...)` / `(<=> ...)` register as rules
//! - `(forall vars (=> ...))` is reinterpreted as the inner rule
//! - `(exists vars body)` is skolemized and re-queued
//! - ground lists become candidate assertions
//! - anything else (non-ground, non-list) is dropped with a diagnostic
//!
//! Retraction is offered by assertion id, by source-note id, and by rule
//! form.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::warn;

use crate::base::{FACT_PREFIX, RULE_PREFIX};
use crate::events::{CallbackResult, KbEvent};
use crate::kb::{Assertion, PotentialAssertion};
use crate::parser::{ParseError, parse};
use crate::term::{
    OP_BICONDITIONAL, OP_EXISTS, OP_FORALL, OP_IMPLIES, Term, is_trivial,
};
use crate::unify::{Bindings, subst_fully};

use super::Engine;
use super::infer::DerivationSink;

/// Source tag attached to direct user submissions.
const USER_SOURCE: &str = "user";

/// Submission-surface failures surfaced to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The source text failed to parse; the KB is unaffected.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl Engine {
    /// Parse `text` and route every top-level term. Returns the number of
    /// terms accepted (queued as candidates or registered as rules);
    /// rejected terms are logged and skipped.
    pub fn submit_source(
        &self,
        text: &str,
        priority: f64,
        note_id: Option<&str>,
    ) -> Result<usize, SubmitError> {
        let terms = parse(text)?;
        let note = note_id.map(SmolStr::new);
        let accepted = terms
            .into_iter()
            .filter(|term| self.route_input(term.clone(), priority, note.as_ref()))
            .count();
        Ok(accepted)
    }

    fn route_input(&self, term: Term, priority: f64, note: Option<&SmolStr>) -> bool {
        match term.operator() {
            Some(OP_IMPLIES | OP_BICONDITIONAL) => match self.add_rule(&term, priority) {
                Ok(added) => !added.is_empty(),
                Err(error) => {
                    warn!("rejecting rule {term}: {error}");
                    false
                }
            },
            Some(OP_FORALL) => self.route_forall(&term, priority, note),
            Some(OP_EXISTS) => self.route_exists(&term, priority, note),
            _ => self.submit_assertion(term, priority, FxHashSet::default(), USER_SOURCE, note),
        }
    }

    /// `(forall vars (=> ant con))` is the inner rule; other shapes are
    /// ignored with a diagnostic.
    fn route_forall(&self, term: &Term, priority: f64, note: Option<&SmolStr>) -> bool {
        if let Some([_, _, body]) = term.items() {
            if matches!(body.operator(), Some(OP_IMPLIES | OP_BICONDITIONAL)) {
                return self.route_input(body.clone(), priority, note);
            }
        }
        warn!("ignoring universally quantified non-rule {term}");
        false
    }

    /// `(exists (vars...|var) body)`: each bound variable becomes a fresh
    /// skolem constant, and the grounded body is re-queued from the same
    /// source.
    fn route_exists(&self, term: &Term, priority: f64, note: Option<&SmolStr>) -> bool {
        let Some([_, spec, body]) = term.items() else {
            warn!("ignoring malformed existential {term}");
            return false;
        };
        let Some(bound) = quantified_variables(spec) else {
            warn!("ignoring existential with malformed variable list {term}");
            return false;
        };
        let mut bindings = Bindings::default();
        for name in bound {
            bindings.insert(name.clone(), Term::Atom(self.id_generator().skolem_constant(&name)));
        }
        self.route_input(subst_fully(body, &bindings), priority, note)
    }

    /// Queue a candidate assertion. `submit_source` is the text entry point;
    /// collaborators with pre-built terms land here.
    ///
    /// Trivial candidates are silently dropped. The `assert-input` echo is
    /// emitted for user-like sources when a note is attached or input
    /// broadcast is enabled.
    pub fn submit_assertion(
        &self,
        kif: Term,
        priority: f64,
        support: FxHashSet<SmolStr>,
        source_id: &str,
        note: Option<&SmolStr>,
    ) -> bool {
        let user_like =
            !source_id.starts_with(RULE_PREFIX) && !source_id.starts_with(FACT_PREFIX);
        if user_like && (note.is_some() || self.config().broadcast_input) {
            self.events().emit(&KbEvent::Input {
                kif: kif.clone(),
                priority,
                note_id: note.cloned(),
            });
        }
        if is_trivial(&kif) {
            return false;
        }
        if !kif.is_list() {
            warn!("ignoring non-list input {kif}");
            return false;
        }
        if !kif.is_ground() {
            warn!("ignoring non-ground input {kif}");
            return false;
        }
        self.submit_potential_assertion(
            PotentialAssertion::new(kif, priority, support, source_id, note.cloned()),
        );
        true
    }

    // ========================================================================
    // RETRACTION
    // ========================================================================

    /// Cascade-retract a single assertion.
    pub fn retract_assertion(&self, id: &str) -> Option<Arc<Assertion>> {
        self.kb().retract(id)
    }

    /// Retract every assertion associated with a note. Returns how many
    /// roots were retracted (cascades not counted).
    pub fn retract_note(&self, note_id: &str) -> usize {
        self.events()
            .assertions_for_note(note_id)
            .into_iter()
            .filter(|id| self.kb().retract(id).is_some())
            .count()
    }

    /// Remove every rule whose form equals the supplied list.
    pub fn retract_rule_form(&self, form: &Term) -> bool {
        self.remove_rule_by_form(form)
    }

    /// Register a pattern callback fired on matching additions.
    pub fn register_callback(
        &self,
        pattern: Term,
        handler: impl Fn(&KbEvent, &Arc<Assertion>, &Bindings) -> CallbackResult
        + Send
        + Sync
        + 'static,
    ) {
        self.events().register_callback(pattern, handler);
    }
}

/// Variable names bound by a quantifier spec: a single variable or a list
/// of variables. `None` for anything else.
fn quantified_variables(spec: &Term) -> Option<Vec<SmolStr>> {
    match spec {
        Term::Var(name) => Some(vec![name.clone()]),
        Term::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                match item {
                    Term::Var(name) => out.push(name.clone()),
                    _ => return None,
                }
            }
            Some(out)
        }
        Term::Atom(_) => None,
    }
}
