//! Worker-facing queues and the pause gate.
//!
//! The task queue is a bounded max-heap guarded by a mutex with a condvar
//! for blocking pops; waits are bounded so cancellation is observed
//! promptly. The pause gate parks both worker loops at the top of each
//! iteration and wakes them via broadcast.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::base::Priority;

use super::tasks::{InferenceTask, PrioritizedTask};

/// How long blocked waits sleep before re-checking cancellation.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Bounded priority queue of inference tasks; highest priority first.
pub struct TaskQueue {
    capacity: usize,
    heap: Mutex<BinaryHeap<PrioritizedTask>>,
    available: Condvar,
    seq: AtomicU64,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: Mutex::new(BinaryHeap::new()),
            available: Condvar::new(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Enqueue a task. A full queue drops the submission with a diagnostic.
    pub fn push(&self, priority: Priority, task: InferenceTask) -> bool {
        let mut heap = self.heap.lock();
        if heap.len() >= self.capacity {
            warn!("task queue full; dropping {}", task.describe());
            return false;
        }
        heap.push(PrioritizedTask {
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            task,
        });
        drop(heap);
        self.available.notify_one();
        true
    }

    /// Block until a task is available or the token is cancelled.
    pub fn pop(&self, cancel: &CancellationToken) -> Option<InferenceTask> {
        let mut heap = self.heap.lock();
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(entry) = heap.pop() {
                return Some(entry.task);
            }
            self.available.wait_for(&mut heap, WAIT_SLICE);
        }
    }

    /// Wake every blocked consumer (used at shutdown).
    pub fn wake_all(&self) {
        self.available.notify_all();
    }
}

/// Gate parking worker loops while the engine is paused.
#[derive(Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Park until resumed or cancelled. Called at the top of each worker
    /// iteration, making it the loops' quiescence point.
    pub fn wait_while_paused(&self, cancel: &CancellationToken) {
        let mut paused = self.paused.lock();
        while *paused && !cancel.is_cancelled() {
            self.resumed.wait_for(&mut paused, WAIT_SLICE);
        }
    }
}
