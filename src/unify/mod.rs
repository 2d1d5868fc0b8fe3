//! Unification, one-way matching, substitution, and oriented rewriting.
//!
//! Two matching modes:
//! - [`unify`] - variables on both sides may bind; occurs-check enforced
//! - [`match_pattern`] - one-way: only variables in the pattern bind, the
//!   right-hand term is treated as ground structure
//!
//! Bindings map bare variable names to terms. Binding a variable that is
//! already bound recurses on its current image; list unification requires
//! equal arity and proceeds left-to-right, short-circuiting on failure.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::warn;

use crate::term::Term;

/// Variable bindings produced by unification and matching.
pub type Bindings = FxHashMap<SmolStr, Term>;

/// Hard bound on fixed-point substitution, defending against degenerate
/// binding chains.
pub const MAX_SUBSTITUTION_DEPTH: usize = 50;

/// Full unification with occurs-check.
///
/// Returns the extended bindings, or `None` on occurs-check failure or
/// structural mismatch. The input bindings are never mutated.
pub fn unify(x: &Term, y: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut out = bindings.clone();
    unify_in(x, y, &mut out).then_some(out)
}

fn unify_in(x: &Term, y: &Term, bindings: &mut Bindings) -> bool {
    match (x, y) {
        (Term::Var(name), _) => {
            if let Some(image) = bindings.get(name).cloned() {
                return unify_in(&image, y, bindings);
            }
            bind(name, y, bindings)
        }
        (_, Term::Var(name)) => {
            if let Some(image) = bindings.get(name).cloned() {
                return unify_in(x, &image, bindings);
            }
            bind(name, x, bindings)
        }
        (Term::Atom(a), Term::Atom(b)) => a == b,
        (Term::List(xs), Term::List(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(xc, yc)| unify_in(xc, yc, bindings))
        }
        _ => false,
    }
}

fn bind(name: &SmolStr, term: &Term, bindings: &mut Bindings) -> bool {
    if let Term::Var(other) = term {
        if other == name {
            return true;
        }
    }
    if occurs(name, term, bindings) {
        return false;
    }
    bindings.insert(name.clone(), term.clone());
    true
}

/// True when `name` occurs in `term`, chasing bound variables.
fn occurs(name: &SmolStr, term: &Term, bindings: &Bindings) -> bool {
    match term {
        Term::Atom(_) => false,
        Term::Var(v) => {
            if v == name {
                return true;
            }
            bindings
                .get(v)
                .is_some_and(|image| occurs(name, image, bindings))
        }
        Term::List(items) => items.iter().any(|t| occurs(name, t, bindings)),
    }
}

/// One-way matching: only variables in `pattern` may bind.
///
/// Atoms and lists on the right are treated as ground structure; a variable
/// on the right matches only a pattern variable.
pub fn match_pattern(pattern: &Term, term: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut out = bindings.clone();
    match_in(pattern, term, &mut out).then_some(out)
}

fn match_in(pattern: &Term, term: &Term, bindings: &mut Bindings) -> bool {
    match (pattern, term) {
        (Term::Var(name), _) => {
            if let Some(image) = bindings.get(name).cloned() {
                return match_in(&image, term, bindings);
            }
            bindings.insert(name.clone(), term.clone());
            true
        }
        (Term::Atom(a), Term::Atom(b)) => a == b,
        (Term::List(ps), Term::List(ts)) => {
            ps.len() == ts.len()
                && ps
                    .iter()
                    .zip(ts.iter())
                    .all(|(pc, tc)| match_in(pc, tc, bindings))
        }
        _ => false,
    }
}

/// Single-pass substitution: replace bound variables by their images.
pub fn substitute(term: &Term, bindings: &Bindings) -> Term {
    if bindings.is_empty() {
        return term.clone();
    }
    match term {
        Term::Atom(_) => term.clone(),
        Term::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| term.clone()),
        Term::List(items) => Term::list(items.iter().map(|t| substitute(t, bindings)).collect()),
    }
}

/// Fixed-point substitution with a hard depth bound.
///
/// On bound hit, returns the current term and emits a diagnostic.
pub fn subst_fully(term: &Term, bindings: &Bindings) -> Term {
    let mut current = term.clone();
    for _ in 0..MAX_SUBSTITUTION_DEPTH {
        let next = substitute(&current, bindings);
        if next == current {
            return current;
        }
        current = next;
    }
    warn!(
        "substitution depth bound ({MAX_SUBSTITUTION_DEPTH}) hit for {term}; returning partial result"
    );
    current
}

/// Rewrite the leftmost subterm of `target` matching `lhs` with `rhs`.
///
/// Pre-order descent: the whole term is tried before its children, children
/// left-to-right. Exactly one occurrence is replaced. Returns `None` when
/// `lhs` matches nowhere.
pub fn rewrite(target: &Term, lhs: &Term, rhs: &Term) -> Option<Term> {
    if let Some(bindings) = match_pattern(lhs, target, &Bindings::default()) {
        return Some(subst_fully(rhs, &bindings));
    }
    if let Term::List(items) = target {
        for (i, child) in items.iter().enumerate() {
            if let Some(rewritten) = rewrite(child, lhs, rhs) {
                let mut out = items.as_ref().clone();
                out[i] = rewritten;
                return Some(Term::list(out));
            }
        }
    }
    None
}
