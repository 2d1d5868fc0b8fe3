//! Rule records and validation.
//!
//! A rule form is `(=> ant con)` or `(<=> ant con)`. The antecedent is a
//! single clause, a negated clause, or `(and c1 ... cn)` where every `ci`
//! is a clause; a clause is a list, and a negated clause wraps a list.
//!
//! `<=>` registers as two `=>`-shaped rules (one per direction) that both
//! carry the original form, so retraction by form removes the pair.

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::warn;

use crate::base::IdGenerator;
use crate::term::{OP_AND, OP_BICONDITIONAL, OP_EXISTS, OP_FORALL, OP_IMPLIES, OP_NOT, Term};

/// A forward-chaining rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: SmolStr,
    /// The submitted form; shared by both directions of a biconditional.
    pub form: Term,
    pub antecedent: Term,
    pub consequent: Term,
    pub priority: f64,
    /// The antecedent broken into clauses (singleton unless `and`).
    pub antecedent_clauses: Vec<Term>,
}

/// Rule validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The form's operator is not `=>` or `<=>`.
    #[error("not a rule form: {0}")]
    NotARule(String),

    /// The form does not have exactly an antecedent and a consequent.
    #[error("rule form must have arity 3: {0}")]
    WrongArity(String),

    /// An antecedent clause is not a list.
    #[error("antecedent clause must be a list: {0}")]
    ClauseNotList(String),

    /// A negated clause does not wrap a single list.
    #[error("negated clause must wrap a list: {0}")]
    MalformedNegation(String),
}

impl Rule {
    /// Parse and validate a rule form, yielding one rule for `=>` and two
    /// for `<=>`.
    ///
    /// Unbound consequent variables (not appearing in the antecedent and not
    /// bound by a local `exists`/`forall`) produce a diagnostic for `=>`
    /// rules; the rule is still registered.
    pub fn parse(form: &Term, ids: &IdGenerator, priority: f64) -> Result<Vec<Rule>, RuleError> {
        let Some([Term::Atom(op), ant, con]) = form.items() else {
            return match form.operator() {
                Some(OP_IMPLIES | OP_BICONDITIONAL) => {
                    Err(RuleError::WrongArity(form.to_string()))
                }
                _ => Err(RuleError::NotARule(form.to_string())),
            };
        };
        match op.as_str() {
            OP_IMPLIES => {
                let rule = Self::direction(form, ant, con, ids, priority)?;
                warn_unbound_consequent_vars(&rule);
                Ok(vec![rule])
            }
            OP_BICONDITIONAL => Ok(vec![
                Self::direction(form, ant, con, ids, priority)?,
                Self::direction(form, con, ant, ids, priority)?,
            ]),
            _ => Err(RuleError::NotARule(form.to_string())),
        }
    }

    fn direction(
        form: &Term,
        antecedent: &Term,
        consequent: &Term,
        ids: &IdGenerator,
        priority: f64,
    ) -> Result<Rule, RuleError> {
        let antecedent_clauses = clauses_of(antecedent)?;
        Ok(Rule {
            id: ids.rule_id(),
            form: form.clone(),
            antecedent: antecedent.clone(),
            consequent: consequent.clone(),
            priority,
            antecedent_clauses,
        })
    }
}

/// Split an antecedent into its clauses and validate each.
fn clauses_of(antecedent: &Term) -> Result<Vec<Term>, RuleError> {
    let clauses: Vec<Term> = match (antecedent.operator(), antecedent.items()) {
        (Some(OP_AND), Some(items)) => items[1..].to_vec(),
        _ => vec![antecedent.clone()],
    };
    for clause in &clauses {
        validate_clause(clause)?;
    }
    Ok(clauses)
}

fn validate_clause(clause: &Term) -> Result<(), RuleError> {
    if !clause.is_list() {
        return Err(RuleError::ClauseNotList(clause.to_string()));
    }
    if clause.operator() == Some(OP_NOT) {
        match clause.items() {
            Some([_, inner]) if inner.is_list() => {}
            _ => return Err(RuleError::MalformedNegation(clause.to_string())),
        }
    }
    Ok(())
}

/// Variables bound by a quantifier anywhere inside `term`.
fn locally_quantified_vars(term: &Term, out: &mut FxHashSet<SmolStr>) {
    let Some(items) = term.items() else { return };
    if matches!(term.operator(), Some(OP_EXISTS | OP_FORALL)) && items.len() == 3 {
        match &items[1] {
            Term::Var(name) => {
                out.insert(name.clone());
            }
            Term::List(vars) => {
                for v in vars.iter() {
                    if let Term::Var(name) = v {
                        out.insert(name.clone());
                    }
                }
            }
            _ => {}
        }
    }
    for item in items {
        locally_quantified_vars(item, out);
    }
}

fn warn_unbound_consequent_vars(rule: &Rule) {
    let bound = rule.antecedent.variables();
    let mut quantified = FxHashSet::default();
    locally_quantified_vars(&rule.consequent, &mut quantified);
    let unbound: Vec<String> = rule
        .consequent
        .variables()
        .into_iter()
        .filter(|v| !bound.contains(v) && !quantified.contains(v))
        .map(|v| format!("?{v}"))
        .collect();
    if !unbound.is_empty() {
        warn!(
            "rule {} has consequent variables unbound by its antecedent: {}",
            rule.form,
            unbound.join(", ")
        );
    }
}
