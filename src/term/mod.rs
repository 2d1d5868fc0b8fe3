//! Term algebra for the S-expression dialect.
//!
//! Terms are immutable:
//! - [`Term::Atom`] - a string symbol, equality by value
//! - [`Term::Var`] - a `?`-prefixed variable (the name is stored bare)
//! - [`Term::List`] - an ordered sequence of terms, structural equality
//!
//! Lists share their element vectors behind `Arc`, so cloning a term is a
//! reference-count bump. Weight, variable set, and string form are pure
//! functions of content.

mod display;
mod trivial;

pub use trivial::{REFLEXIVE_PREDICATES, is_trivial};

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

/// Operator atom of implication rules.
pub const OP_IMPLIES: &str = "=>";
/// Operator atom of biconditional rules.
pub const OP_BICONDITIONAL: &str = "<=>";
/// Operator atom of conjunctions.
pub const OP_AND: &str = "and";
/// Operator atom of disjunctions.
pub const OP_OR: &str = "or";
/// Operator atom of negations.
pub const OP_NOT: &str = "not";
/// Operator atom of equalities.
pub const OP_EQUAL: &str = "=";
/// Operator atom of existential quantification.
pub const OP_EXISTS: &str = "exists";
/// Operator atom of universal quantification.
pub const OP_FORALL: &str = "forall";

/// An immutable symbolic term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// A string symbol; weight 1.
    Atom(SmolStr),
    /// A variable; the stored name excludes the `?` sigil. Weight 1.
    Var(SmolStr),
    /// An ordered sequence of terms; weight 1 + sum of child weights.
    List(Arc<Vec<Term>>),
}

impl Term {
    pub fn atom(name: impl Into<SmolStr>) -> Self {
        Self::Atom(name.into())
    }

    pub fn var(name: impl Into<SmolStr>) -> Self {
        Self::Var(name.into())
    }

    pub fn list(items: Vec<Term>) -> Self {
        Self::List(Arc::new(items))
    }

    /// Structural size: atoms and variables weigh 1, a list weighs 1 plus
    /// the sum of its children's weights.
    pub fn weight(&self) -> usize {
        match self {
            Term::Atom(_) | Term::Var(_) => 1,
            Term::List(items) => 1 + items.iter().map(Term::weight).sum::<usize>(),
        }
    }

    /// The set of variable names occurring anywhere in the term.
    pub fn variables(&self) -> FxHashSet<SmolStr> {
        let mut out = FxHashSet::default();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut FxHashSet<SmolStr>) {
        match self {
            Term::Atom(_) => {}
            Term::Var(name) => {
                out.insert(name.clone());
            }
            Term::List(items) => {
                for item in items.iter() {
                    item.collect_variables(out);
                }
            }
        }
    }

    /// True when the term contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Atom(_) => true,
            Term::Var(_) => false,
            Term::List(items) => items.iter().all(Term::is_ground),
        }
    }

    /// True when the named variable occurs anywhere in the term.
    pub fn contains_variable(&self, name: &str) -> bool {
        match self {
            Term::Atom(_) => false,
            Term::Var(v) => v == name,
            Term::List(items) => items.iter().any(|t| t.contains_variable(name)),
        }
    }

    /// A list's operator: its first element, if that element is an atom.
    pub fn operator(&self) -> Option<&str> {
        match self {
            Term::List(items) => match items.first() {
                Some(Term::Atom(op)) => Some(op.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// List elements, or `None` for atoms and variables.
    pub fn items(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// List arity (element count including the operator position).
    pub fn arity(&self) -> usize {
        self.items().map_or(0, <[Term]>::len)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Term::List(_))
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Term::Atom(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// True for `(not <list>)`.
    pub fn is_negation(&self) -> bool {
        self.operator() == Some(OP_NOT)
    }

    /// The inner list of a negation, or the term itself otherwise.
    ///
    /// Pattern matching that ignores polarity works on this form.
    pub fn effective(&self) -> &Term {
        if self.is_negation() {
            if let Some([_, inner]) = self.items() {
                return inner;
            }
        }
        self
    }
}
