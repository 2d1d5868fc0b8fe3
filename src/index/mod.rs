//! Path index: a discrimination trie over term structure.
//!
//! Each node holds the set of assertion ids whose walk reaches it, plus a
//! map from index key to child. Keys per position:
//! - the atom value, for atoms
//! - a wildcard token, for variables (variable positions are preserved so
//!   unifiability queries can meet them)
//! - the operator atom for lists with an atom head, otherwise a generic
//!   list marker
//!
//! Adding an assertion walks its term recursively, recording its id at every
//! visited node; removal mirrors the walk and prunes empty subtrees.
//!
//! The three candidate queries return superset id sets; callers verify every
//! candidate with `match`/`unify` against current KB state before use.

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tracing::trace;

use crate::term::Term;

/// Key under which a child node is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IndexKey {
    /// An atom at this position.
    Atom(SmolStr),
    /// A variable at this position.
    Wildcard,
    /// A list whose head is an atom; the head is consumed by the key.
    Op(SmolStr),
    /// A list without an atom head.
    List,
}

#[derive(Debug, Default)]
struct IndexNode {
    ids: FxHashSet<SmolStr>,
    children: FxHashMap<IndexKey, IndexNode>,
}

impl IndexNode {
    fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.children.is_empty()
    }
}

/// Discrimination trie over assertion terms.
#[derive(Debug, Default)]
pub struct PathIndex {
    root: IndexNode,
}

/// The key for a term at the current position, and the elements that remain
/// to be walked beneath that key.
fn key_of(term: &Term) -> (IndexKey, &[Term]) {
    match term {
        Term::Atom(name) => (IndexKey::Atom(name.clone()), &[]),
        Term::Var(_) => (IndexKey::Wildcard, &[]),
        Term::List(items) => match items.first() {
            Some(Term::Atom(op)) => (IndexKey::Op(op.clone()), &items[1..]),
            _ => (IndexKey::List, items.as_slice()),
        },
    }
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` along the walk of `term`.
    pub fn add(&mut self, id: &SmolStr, term: &Term) {
        insert_at(&mut self.root, &[term], id);
    }

    /// Remove `id` along the walk of `term`, pruning empty subtrees.
    pub fn remove(&mut self, id: &SmolStr, term: &Term) {
        remove_at(&mut self.root, &[term], id);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.root = IndexNode::default();
    }

    /// Candidate ids whose terms may unify with `query`.
    ///
    /// Both wildcard children and key-matching children contribute; where
    /// both sides may unify structurally, all such subtrees contribute.
    pub fn find_unifiable(&self, query: &Term) -> FxHashSet<SmolStr> {
        let out = collect(&self.root, &[query]);
        trace!("[PATH_INDEX] find_unifiable {query}: {} candidates", out.len());
        out
    }

    /// Candidate ids for entries that `query` (a pattern) may generalize.
    ///
    /// Wildcards in the index match; a wildcard in the query collects
    /// everything from the current node.
    pub fn find_instances(&self, query: &Term) -> FxHashSet<SmolStr> {
        let out = collect(&self.root, &[query]);
        trace!("[PATH_INDEX] find_instances {query}: {} candidates", out.len());
        out
    }

    /// Candidate ids for entries that may generalize `query` (the dual of
    /// [`find_instances`](Self::find_instances); used for subsumption).
    pub fn find_generalizations(&self, query: &Term) -> FxHashSet<SmolStr> {
        let out = collect(&self.root, &[query]);
        trace!(
            "[PATH_INDEX] find_generalizations {query}: {} candidates",
            out.len()
        );
        out
    }
}

fn insert_at(node: &mut IndexNode, terms: &[&Term], id: &SmolStr) {
    node.ids.insert(id.clone());
    let Some((&term, rest)) = terms.split_first() else {
        return;
    };
    let (key, tail) = key_of(term);
    let child = node.children.entry(key).or_default();
    let mut next: Vec<&Term> = tail.iter().collect();
    next.extend_from_slice(rest);
    insert_at(child, &next, id);
}

fn remove_at(node: &mut IndexNode, terms: &[&Term], id: &SmolStr) {
    node.ids.remove(id);
    let Some((&term, rest)) = terms.split_first() else {
        return;
    };
    let (key, tail) = key_of(term);
    if let Some(child) = node.children.get_mut(&key) {
        let mut next: Vec<&Term> = tail.iter().collect();
        next.extend_from_slice(rest);
        remove_at(child, &next, id);
        if child.is_empty() {
            node.children.remove(&key);
        }
    }
}

/// Shared superset walk behind the three queries.
///
/// The walk stops at query wildcards (everything reaching the node is a
/// candidate) and fans out over wildcard children and structurally
/// compatible list keys. Precision is the caller's verification step, not
/// the trie's.
fn collect(node: &IndexNode, terms: &[&Term]) -> FxHashSet<SmolStr> {
    let Some((&term, rest)) = terms.split_first() else {
        return node.ids.clone();
    };
    let mut out = FxHashSet::default();
    match term {
        // A query variable admits any subterm here.
        Term::Var(_) => return node.ids.clone(),
        Term::Atom(name) => {
            if let Some(child) = node.children.get(&IndexKey::Atom(name.clone())) {
                out.extend(collect(child, rest));
            }
            if let Some(child) = node.children.get(&IndexKey::Wildcard) {
                out.extend(collect(child, rest));
            }
        }
        Term::List(items) => {
            match items.first() {
                Some(Term::Atom(op)) => {
                    if let Some(child) = node.children.get(&IndexKey::Op(op.clone())) {
                        let mut next: Vec<&Term> = items[1..].iter().collect();
                        next.extend_from_slice(rest);
                        out.extend(collect(child, &next));
                    }
                }
                Some(Term::Var(_)) => {
                    // A variable head can match any indexed operator.
                    for (key, child) in &node.children {
                        if matches!(key, IndexKey::Op(_)) {
                            let mut next: Vec<&Term> = items[1..].iter().collect();
                            next.extend_from_slice(rest);
                            out.extend(collect(child, &next));
                        }
                    }
                }
                _ => {}
            }
            if let Some(child) = node.children.get(&IndexKey::List) {
                let mut next: Vec<&Term> = items.iter().collect();
                next.extend_from_slice(rest);
                out.extend(collect(child, &next));
            }
            if let Some(child) = node.children.get(&IndexKey::Wildcard) {
                out.extend(collect(child, rest));
            }
        }
    }
    out
}
