//! # cogent-base
//!
//! Core library for forward-chaining inference over S-expression knowledge bases.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! engine    → rules, task queues, commit/inference workers
//!   ↓
//! kb        → assertion store, subsumption, eviction, dependency cascade
//!   ↓
//! events    → KB event dispatch, pattern callbacks, note tracking
//!   ↓
//! index     → path index (discrimination trie) for candidate retrieval
//!   ↓
//! unify     → unification, one-way matching, substitution, rewriting
//!   ↓
//! parser    → Logos lexer, recursive-descent S-expression reader
//!   ↓
//! term      → term algebra (atoms, variables, lists)
//!   ↓
//! base      → primitives (ids, priorities, source positions)
//! ```

// ============================================================================
// MODULES (dependency order: base → term → parser → unify → index → kb → engine)
// ============================================================================

/// Foundation types: id generation, priority ordering, source positions
pub mod base;

/// Term algebra: atoms, variables, lists; weight, variables, triviality
pub mod term;

/// Parser: Logos lexer, recursive-descent S-expression reader
pub mod parser;

/// Unification, one-way matching, substitution, oriented rewriting
pub mod unify;

/// Path index: discrimination trie for candidate retrieval
pub mod index;

/// Knowledge-base event dispatch: listeners, pattern callbacks, note map
pub mod events;

/// Knowledge base: assertions, subsumption, eviction, dependency cascade
pub mod kb;

/// Reasoner engine: rules, queues, commit and inference workers
pub mod engine;

// Re-export foundation types
pub use base::{IdGenerator, Position, Priority};
pub use engine::{Engine, EngineConfig, Rule};
pub use events::KbEvent;
pub use kb::{Assertion, KnowledgeBase, PotentialAssertion};
pub use parser::{ParseError, parse};
pub use term::Term;
pub use unify::Bindings;
