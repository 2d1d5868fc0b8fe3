//! Triviality predicate.
//!
//! A list is trivial when it asserts a reflexive relation of a term with
//! itself: `(op x x)` with `op` in the reflexive set or `=`, or the negation
//! of one. Trivial candidates are rejected at every submission point.

use super::{OP_EQUAL, Term};

/// Relations that hold reflexively, making `(op x x)` uninformative.
pub const REFLEXIVE_PREDICATES: &[&str] = &[
    "instance",
    "subclass",
    "subrelation",
    "equivalent",
    "same",
    "equal",
    "domain",
    "range",
];

fn is_reflexive_op(op: &str) -> bool {
    op == OP_EQUAL || REFLEXIVE_PREDICATES.contains(&op)
}

/// True for `(op x x)` with a reflexive `op`, or `(not (op x x))`.
pub fn is_trivial(term: &Term) -> bool {
    let inner = term.effective();
    match inner.items() {
        Some([Term::Atom(op), a, b]) => is_reflexive_op(op) && a == b,
        _ => false,
    }
}
