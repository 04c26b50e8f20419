//! Per-run traversal state
//!
//! A `Frontier` belongs to exactly one run and is passed into it explicitly.
//! It owns the pending queue, the visited set and the iteration budget.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Breadth-first work queue for a single run
#[derive(Debug, Clone)]
pub struct Frontier {
    queue: VecDeque<String>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    iterations: u32,
    max_iterations: u32,
    queue_cap: usize,
}

impl Frontier {
    pub fn new(max_iterations: u32, queue_cap: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            iterations: 0,
            max_iterations,
            queue_cap,
        }
    }

    /// Creates a frontier with `seeds` already offered, in order
    pub fn seeded<I, S>(seeds: I, max_iterations: u32, queue_cap: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut frontier = Self::new(max_iterations, queue_cap);
        for seed in seeds {
            frontier.offer(seed.as_ref());
        }
        frontier
    }

    /// Enqueues an identity if it is new to this run and the queue has room
    ///
    /// # Returns
    ///
    /// `true` if the identity was enqueued
    pub fn offer(&mut self, identity: &str) -> bool {
        let identity = identity.trim();
        if identity.is_empty()
            || self.visited.contains(identity)
            || self.queued.contains(identity)
            || self.queue.len() >= self.queue_cap
        {
            return false;
        }

        self.queued.insert(identity.to_string());
        self.queue.push_back(identity.to_string());
        true
    }

    /// Dequeues the next identity and marks it visited
    ///
    /// Returns `None` once the queue is empty or the iteration budget is spent.
    pub fn dequeue(&mut self) -> Option<String> {
        if self.budget_spent() {
            return None;
        }

        let identity = self.queue.pop_front()?;
        self.queued.remove(&identity);
        self.visited.insert(identity.clone());
        self.iterations += 1;
        Some(identity)
    }

    pub fn budget_spent(&self) -> bool {
        self.iterations >= self.max_iterations
    }

    pub fn is_visited(&self, identity: &str) -> bool {
        self.visited.contains(identity)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Cooperative cancellation flag shared by every task of a crawl
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every run holding this handle to stop at its next checkpoint
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
