//! Reasoner engine: rules, queues, and workers.
//!
//! The engine owns the rule set, a bounded commit queue of candidate
//! assertions, and a bounded priority queue of inference tasks. One commit
//! worker serializes KB writes; `max(2, cpus/2)` inference workers consume
//! tasks concurrently. Every successful commit fans out new tasks:
//! antecedent matches for every rule clause with agreeing polarity, and
//! rewrite pairings with oriented equalities.
//!
//! Stop is cooperative (a cancellation token checked at every blocking
//! point); pause parks both loops at the top of their iterations.

mod infer;
mod queue;
mod rules;
mod submit;
mod tasks;

pub use infer::{DerivationSink, MAX_SIMPLIFICATION_DEPTH, simplify};
pub use queue::{PauseGate, TaskQueue};
pub use rules::{Rule, RuleError};
pub use submit::SubmitError;
pub use tasks::{InferenceTask, PrioritizedTask};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::base::{IdGenerator, Priority};
use crate::events::{EventDispatcher, KbEvent};
use crate::kb::{Assertion, KnowledgeBase, PotentialAssertion};
use crate::term::Term;
use crate::unify::{Bindings, match_pattern, unify};

/// How long the commit worker sleeps between cancellation checks.
const WORKER_WAIT: Duration = Duration::from_millis(100);

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Engine tunables. Every knob the scheduler and derivation paths consult
/// lives here; depth bounds are module constants
/// ([`crate::unify::MAX_SUBSTITUTION_DEPTH`], [`MAX_SIMPLIFICATION_DEPTH`]).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum stored assertions before eviction kicks in.
    pub kb_capacity: usize,
    /// Bounded commit queue size.
    pub commit_queue_capacity: usize,
    /// Bounded inference task queue size.
    pub task_queue_capacity: usize,
    /// Inference worker count; 0 selects `max(2, available_parallelism/2)`.
    pub worker_threads: usize,
    /// How long producers wait on a full commit queue before dropping.
    pub commit_enqueue_timeout: Duration,
    /// Derived terms heavier than this are discarded.
    pub derived_weight_cap: usize,
    /// Factor applied to the minimum supporter priority on derivation.
    pub priority_decay: f64,
    /// Emit `assert-input` echoes even without a source note.
    pub broadcast_input: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kb_capacity: 65_536,
            commit_queue_capacity: 10_000,
            task_queue_capacity: 10_000,
            worker_threads: 0,
            commit_enqueue_timeout: Duration::from_millis(100),
            derived_weight_cap: 150,
            priority_decay: 0.95,
            broadcast_input: false,
        }
    }
}

impl EngineConfig {
    fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        let cpus = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(2);
        (cpus / 2).max(2)
    }
}

/// Monotonic engine counters, readable at any time.
#[derive(Debug, Default)]
pub struct EngineCounters {
    pub commits: AtomicU64,
    pub rejections: AtomicU64,
    pub evictions: AtomicU64,
    pub tasks_executed: AtomicU64,
    pub dropped_candidates: AtomicU64,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The forward-chaining reasoner.
pub struct Engine {
    config: EngineConfig,
    kb: Arc<KnowledgeBase>,
    events: Arc<EventDispatcher>,
    ids: Arc<IdGenerator>,
    rules: RwLock<IndexMap<SmolStr, Arc<Rule>>>,
    commit_tx: Sender<PotentialAssertion>,
    commit_rx: Receiver<PotentialAssertion>,
    tasks: Arc<TaskQueue>,
    pause: PauseGate,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<EngineCounters>,
}

impl Engine {
    /// Build an engine (workers not yet running; see [`Engine::start`]).
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let events = Arc::new(EventDispatcher::new());
        let kb = Arc::new(KnowledgeBase::new(config.kb_capacity, Arc::clone(&events)));
        let (commit_tx, commit_rx) = bounded(config.commit_queue_capacity);
        let tasks = Arc::new(TaskQueue::new(config.task_queue_capacity));
        let counters = Arc::new(EngineCounters::default());

        let evictions = Arc::clone(&counters);
        events.register_listener(move |event| {
            if matches!(event, KbEvent::Evicted(_)) {
                evictions.evictions.fetch_add(1, Ordering::Relaxed);
            }
        });

        Arc::new(Self {
            config,
            kb,
            events,
            ids: Arc::new(IdGenerator::new()),
            rules: RwLock::new(IndexMap::new()),
            commit_tx,
            commit_rx,
            tasks,
            pause: PauseGate::new(),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            counters,
        })
    }

    pub fn kb(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    pub fn id_generator(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Spawn the commit worker and the inference pool.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        let commit = Arc::clone(self);
        workers.push(
            std::thread::Builder::new()
                .name("cogent-commit".into())
                .spawn(move || commit.commit_loop())
                .expect("failed to spawn commit worker"),
        );
        for i in 0..self.config.effective_worker_threads() {
            let engine = Arc::clone(self);
            workers.push(
                std::thread::Builder::new()
                    .name(format!("cogent-infer-{i}"))
                    .spawn(move || engine.infer_loop())
                    .expect("failed to spawn inference worker"),
            );
        }
        debug!("engine started with {} workers", workers.len());
    }

    /// Cooperative shutdown: cancel, wake blocked waits, join workers.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.tasks.wake_all();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("engine worker panicked during shutdown");
            }
        }
        debug!("engine stopped");
    }

    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// One-line operational summary.
    pub fn status(&self) -> String {
        format!(
            "kb {}/{} rules {} commit-queue {} task-queue {} commits {} rejections {} evictions {} tasks {}{}",
            self.kb.len(),
            self.kb.capacity(),
            self.rules.read().len(),
            self.commit_tx.len(),
            self.tasks.len(),
            self.counters.commits.load(Ordering::Relaxed),
            self.counters.rejections.load(Ordering::Relaxed),
            self.counters.evictions.load(Ordering::Relaxed),
            self.counters.tasks_executed.load(Ordering::Relaxed),
            if self.is_paused() { " [paused]" } else { "" },
        )
    }

    // ========================================================================
    // RULES
    // ========================================================================

    /// Parse, validate, and register a rule form; `<=>` adds both
    /// directions. Each registered rule is matched against every existing
    /// assertion. Returns the ids of the rules actually added.
    pub fn add_rule(&self, form: &Term, priority: f64) -> Result<Vec<SmolStr>, RuleError> {
        let parsed = Rule::parse(form, &self.ids, priority)?;
        let mut added = Vec::new();
        for rule in parsed {
            let rule = Arc::new(rule);
            {
                let mut rules = self.rules.write();
                let duplicate = rules
                    .values()
                    .any(|r| r.form == rule.form && r.antecedent == rule.antecedent);
                if duplicate {
                    debug!("skipping duplicate rule {}", rule.form);
                    continue;
                }
                rules.insert(rule.id.clone(), Arc::clone(&rule));
            }
            debug!("registered rule {} as {}", rule.form, rule.id);
            self.match_rule_against_kb(&rule);
            added.push(rule.id.clone());
        }
        Ok(added)
    }

    /// Remove every rule whose form equals the supplied list.
    pub fn remove_rule_by_form(&self, form: &Term) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|_, rule| rule.form != *form);
        before != rules.len()
    }

    /// Snapshot of the registered rules.
    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.rules.read().values().cloned().collect()
    }

    // ========================================================================
    // WORKER LOOPS
    // ========================================================================

    fn commit_loop(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            self.pause.wait_while_paused(&self.cancel);
            match self.commit_rx.recv_timeout(WORKER_WAIT) {
                Ok(pa) => self.commit_candidate(pa),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn infer_loop(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            self.pause.wait_while_paused(&self.cancel);
            let Some(task) = self.tasks.pop(&self.cancel) else {
                return;
            };
            self.counters.tasks_executed.fetch_add(1, Ordering::Relaxed);
            match task {
                InferenceTask::MatchAntecedent {
                    rule,
                    trigger,
                    clause_index,
                    bindings,
                } => infer::run_match(
                    &self.kb,
                    &self.config,
                    self.as_ref(),
                    &rule,
                    &trigger,
                    clause_index,
                    &bindings,
                ),
                InferenceTask::ApplyOrderedRewrite {
                    rewrite_rule,
                    target,
                } => infer::run_rewrite(
                    &self.kb,
                    &self.config,
                    self.as_ref(),
                    &rewrite_rule,
                    &target,
                ),
            }
        }
    }

    fn commit_candidate(&self, pa: PotentialAssertion) {
        let id = if pa.support.is_empty() {
            self.ids.input_id()
        } else {
            self.ids.fact_id(pa.flags.is_equality, pa.flags.is_negated)
        };
        match self.kb.commit(pa, id, now_millis()) {
            Some(assertion) => {
                self.counters.commits.fetch_add(1, Ordering::Relaxed);
                self.generate_tasks(&assertion);
            }
            None => {
                self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    // ========================================================================
    // TASK GENERATION
    // ========================================================================

    /// Fan out derivation work for a freshly committed assertion.
    fn generate_tasks(&self, assertion: &Arc<Assertion>) {
        for rule in self.rules() {
            self.enqueue_clause_matches(&rule, assertion);
        }

        if assertion.is_oriented_equality {
            let Some([_, lhs, _]) = assertion.kif.items() else {
                return;
            };
            for target in self.kb.snapshot() {
                if target.id != assertion.id && contains_rewrite_site(&target.kif, lhs) {
                    self.tasks.push(
                        Priority((assertion.priority + target.priority) / 2.0),
                        InferenceTask::ApplyOrderedRewrite {
                            rewrite_rule: Arc::clone(assertion),
                            target,
                        },
                    );
                }
            }
        } else {
            for equality in self.kb.snapshot() {
                if !equality.is_oriented_equality {
                    continue;
                }
                let Some([_, lhs, _]) = equality.kif.items() else {
                    continue;
                };
                if contains_rewrite_site(&assertion.kif, lhs) {
                    self.tasks.push(
                        Priority((equality.priority + assertion.priority) / 2.0),
                        InferenceTask::ApplyOrderedRewrite {
                            rewrite_rule: equality,
                            target: Arc::clone(assertion),
                        },
                    );
                }
            }
        }
    }

    /// Antecedent-clause matching between one rule and one assertion.
    fn enqueue_clause_matches(&self, rule: &Arc<Rule>, assertion: &Arc<Assertion>) {
        for (clause_index, clause) in rule.antecedent_clauses.iter().enumerate() {
            if clause.is_negation() != assertion.is_negated {
                continue;
            }
            let Some(bindings) = unify(
                clause.effective(),
                assertion.effective_term(),
                &Bindings::default(),
            ) else {
                continue;
            };
            self.tasks.push(
                Priority((rule.priority + assertion.priority) / 2.0),
                InferenceTask::MatchAntecedent {
                    rule: Arc::clone(rule),
                    trigger: Arc::clone(assertion),
                    clause_index,
                    bindings,
                },
            );
        }
    }

    /// A freshly added rule is matched against every stored assertion.
    fn match_rule_against_kb(&self, rule: &Arc<Rule>) {
        for assertion in self.kb.snapshot() {
            self.enqueue_clause_matches(rule, &assertion);
        }
    }
}

impl DerivationSink for Engine {
    /// Hand a derived candidate to the commit queue; a full queue drops it
    /// after the configured bounded wait.
    fn submit_potential_assertion(&self, pa: PotentialAssertion) {
        if self
            .commit_tx
            .send_timeout(pa, self.config.commit_enqueue_timeout)
            .is_err()
        {
            warn!("commit queue full; dropping derived candidate");
            self.counters.dropped_candidates.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// True when `lhs` matches the term or any subterm, i.e. a rewrite would
/// find a site.
fn contains_rewrite_site(target: &Term, lhs: &Term) -> bool {
    if match_pattern(lhs, target, &Bindings::default()).is_some() {
        return true;
    }
    target
        .items()
        .is_some_and(|items| items.iter().any(|child| contains_rewrite_site(child, lhs)))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
