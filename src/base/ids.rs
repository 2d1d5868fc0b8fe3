//! Prefixed monotonic id generation.
//!
//! Every assertion and rule carries a stable string id. The prefix encodes
//! provenance (`input-`, `fact-`, `rule-`), derived equalities and negations
//! carry an infix (`fact-eq-`, `fact-not-`), and skolem/entity constants get
//! their own prefixes so downstream collaborators can recognize them.

use std::sync::atomic::{AtomicU64, Ordering};

use smol_str::SmolStr;

/// Prefix for user-submitted ground assertions.
pub const INPUT_PREFIX: &str = "input-";

/// Prefix for derived assertions.
pub const FACT_PREFIX: &str = "fact-";

/// Prefix for rules.
pub const RULE_PREFIX: &str = "rule-";

/// Prefix for skolem constants introduced by existential elimination.
pub const SKOLEM_PREFIX: &str = "skolem_";

/// Prefix for entity constants grounding user-provided variables.
pub const ENTITY_PREFIX: &str = "entity_";

/// Monotonic id generator shared by all producers of ids.
///
/// A single counter backs every id kind, so ids are unique across kinds
/// and totally ordered by creation time.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Id for a user-submitted assertion.
    pub fn input_id(&self) -> SmolStr {
        SmolStr::new(format!("{INPUT_PREFIX}{}", self.bump()))
    }

    /// Id for a derived assertion. Equality and negation flags select the
    /// `fact-eq-` / `fact-not-` infixed forms.
    pub fn fact_id(&self, is_equality: bool, is_negated: bool) -> SmolStr {
        let n = self.bump();
        if is_equality {
            SmolStr::new(format!("{FACT_PREFIX}eq-{n}"))
        } else if is_negated {
            SmolStr::new(format!("{FACT_PREFIX}not-{n}"))
        } else {
            SmolStr::new(format!("{FACT_PREFIX}{n}"))
        }
    }

    /// Id for a rule.
    pub fn rule_id(&self) -> SmolStr {
        SmolStr::new(format!("{RULE_PREFIX}{}", self.bump()))
    }

    /// Fresh skolem constant for an existentially bound variable name.
    pub fn skolem_constant(&self, var_name: &str) -> SmolStr {
        SmolStr::new(format!("{SKOLEM_PREFIX}{var_name}_{}", self.bump()))
    }

    /// Fresh entity constant for grounding a user-provided variable name.
    pub fn entity_constant(&self, var_name: &str) -> SmolStr {
        SmolStr::new(format!("{ENTITY_PREFIX}{var_name}_{}", self.bump()))
    }
}
