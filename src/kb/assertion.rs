//! Assertion records.
//!
//! An [`Assertion`] is a stored, ground term with metadata; a
//! [`PotentialAssertion`] is the transient candidate form that exists
//! between derivation and commit. Polarity/equality flags are derived from
//! term structure, never supplied independently of it:
//! - `is_negated` iff the operator is `not`
//! - `is_equality` iff the operator is `=` with arity 3 (positive only)
//! - `is_oriented_equality` additionally requires `weight(lhs) > weight(rhs)`

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use crate::term::{OP_EQUAL, Term};

/// Structure-derived flags shared by assertions and candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermFlags {
    pub is_equality: bool,
    pub is_oriented_equality: bool,
    pub is_negated: bool,
}

impl TermFlags {
    /// Derive the flags from a term's structure.
    pub fn of(kif: &Term) -> Self {
        let is_negated = kif.is_negation();
        let is_equality =
            !is_negated && kif.operator() == Some(OP_EQUAL) && kif.arity() == 3;
        let is_oriented_equality = is_equality
            && match kif.items() {
                Some([_, lhs, rhs]) => lhs.weight() > rhs.weight(),
                _ => false,
            };
        Self {
            is_equality,
            is_oriented_equality,
            is_negated,
        }
    }
}

/// A candidate assertion awaiting commit. Equality is by `kif`.
#[derive(Debug, Clone)]
pub struct PotentialAssertion {
    pub kif: Term,
    pub priority: f64,
    /// Ids of the assertions directly used to derive this one; empty for
    /// inputs.
    pub support: FxHashSet<SmolStr>,
    /// Id of the producing rule, or a submitter tag for inputs.
    pub source_id: SmolStr,
    pub source_note_id: Option<SmolStr>,
    pub flags: TermFlags,
}

impl PotentialAssertion {
    pub fn new(
        kif: Term,
        priority: f64,
        support: FxHashSet<SmolStr>,
        source_id: impl Into<SmolStr>,
        source_note_id: Option<SmolStr>,
    ) -> Self {
        let flags = TermFlags::of(&kif);
        Self {
            kif,
            priority,
            support,
            source_id: source_id.into(),
            source_note_id,
            flags,
        }
    }

    pub fn with_note(mut self, source_note_id: Option<SmolStr>) -> Self {
        self.source_note_id = source_note_id;
        self
    }

    /// The inner list of a negation, or `kif` itself.
    pub fn effective_term(&self) -> &Term {
        self.kif.effective()
    }
}

impl PartialEq for PotentialAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.kif == other.kif
    }
}

impl Eq for PotentialAssertion {}

/// A stored, ground assertion. Created only by the commit worker; never
/// mutated after creation.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub id: SmolStr,
    pub kif: Term,
    pub priority: f64,
    /// Milliseconds since the Unix epoch at commit time.
    pub timestamp: u64,
    pub source_id: SmolStr,
    pub source_note_id: Option<SmolStr>,
    pub support: FxHashSet<SmolStr>,
    pub is_equality: bool,
    pub is_oriented_equality: bool,
    pub is_negated: bool,
}

impl Assertion {
    pub fn from_potential(pa: PotentialAssertion, id: SmolStr, timestamp: u64) -> Self {
        Self {
            id,
            kif: pa.kif,
            priority: pa.priority,
            timestamp,
            source_id: pa.source_id,
            source_note_id: pa.source_note_id,
            support: pa.support,
            is_equality: pa.flags.is_equality,
            is_oriented_equality: pa.flags.is_oriented_equality,
            is_negated: pa.flags.is_negated,
        }
    }

    /// The inner list of a negation, or `kif` itself. Pattern matching that
    /// ignores polarity works on this form.
    pub fn effective_term(&self) -> &Term {
        self.kif.effective()
    }
}
