//! Markov transition graph
//!
//! Crawls record the edges they walk (`login → owner/name`,
//! `owner/name → contributor`, `org → owner/name`). Each source state keeps
//! the multiset of its destinations, so sampling the next state is uniform
//! over recorded edges and repeated edges weigh more.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("no transitions recorded from state '{0}'")]
    NoTransition(String),
}

/// Graph shared between crawl tasks
pub type SharedGraph = Arc<Mutex<TransitionGraph>>;

/// Directed multigraph with seeded next-state sampling
#[derive(Debug)]
pub struct TransitionGraph {
    edges: HashMap<String, Vec<String>>,
    edge_count: usize,
    rng: StdRng,
}

impl TransitionGraph {
    /// Creates an empty graph
    ///
    /// A `seed` of 0 seeds the sampler from OS entropy; any other value makes
    /// sampling reproducible.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        Self {
            edges: HashMap::new(),
            edge_count: 0,
            rng,
        }
    }

    pub fn shared(seed: u64) -> SharedGraph {
        Arc::new(Mutex::new(Self::new(seed)))
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        self.edge_count += 1;
    }

    /// Removes one occurrence of `from → to`
    ///
    /// A state left without outgoing edges is dropped.
    ///
    /// # Returns
    ///
    /// `true` if an edge was removed
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let Some(targets) = self.edges.get_mut(from) else {
            return false;
        };
        let Some(position) = targets.iter().position(|t| t == to) else {
            return false;
        };

        targets.remove(position);
        if targets.is_empty() {
            self.edges.remove(from);
        }
        self.edge_count -= 1;
        true
    }

    /// Samples a successor of `from`, uniformly over its recorded edges
    pub fn next_state(&mut self, from: &str) -> Result<String, GraphError> {
        self.edges
            .get(from)
            .and_then(|targets| targets.choose(&mut self.rng))
            .cloned()
            .ok_or_else(|| GraphError::NoTransition(from.to_string()))
    }

    /// Destinations recorded from `from`, duplicates included
    pub fn transitions(&self, from: &str) -> &[String] {
        self.edges.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of states with at least one outgoing edge
    pub fn state_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.edge_count = 0;
    }
}

/// Records an edge on a shared graph, recovering a poisoned lock
pub fn record_edge(graph: &SharedGraph, from: &str, to: &str) {
    let mut guard = graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.add_edge(from, to);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_count() {
        let mut graph = TransitionGraph::new(1);
        graph.add_edge("alice", "alice/proj");
        graph.add_edge("alice", "alice/tool");
        graph.add_edge("alice/proj", "bob");

        assert_eq!(graph.state_count(), 2);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.transitions("alice"), ["alice/proj", "alice/tool"]);
        assert!(graph.transitions("nobody").is_empty());
    }

    #[test]
    fn test_remove_edge_drops_empty_state() {
        let mut graph = TransitionGraph::new(1);
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");

        assert!(graph.remove_edge("a", "b"));
        assert_eq!(graph.transitions("a"), ["b"]);
        assert!(graph.remove_edge("a", "b"));
        assert_eq!(graph.state_count(), 0);
        assert_eq!(graph.edge_count(), 0);

        assert!(!graph.remove_edge("a", "b"));
    }

    #[test]
    fn test_next_state_unknown() {
        let mut graph = TransitionGraph::new(1);
        assert_eq!(
            graph.next_state("x"),
            Err(GraphError::NoTransition("x".to_string()))
        );
    }

    #[test]
    fn test_next_state_single_edge() {
        let mut graph = TransitionGraph::new(0);
        graph.add_edge("a", "b");
        assert_eq!(graph.next_state("a").unwrap(), "b");
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let build = || {
            let mut graph = TransitionGraph::new(42);
            for target in ["b", "c", "d", "e"] {
                graph.add_edge("a", target);
            }
            graph
        };
        let mut first = build();
        let mut second = build();

        let walk_a: Vec<_> = (0..20).map(|_| first.next_state("a").unwrap()).collect();
        let walk_b: Vec<_> = (0..20).map(|_| second.next_state("a").unwrap()).collect();
        assert_eq!(walk_a, walk_b);
        assert!(walk_a.iter().all(|s| ["b", "c", "d", "e"].contains(&s.as_str())));
    }

    #[test]
    fn test_clear() {
        let mut graph = TransitionGraph::new(7);
        graph.add_edge("a", "b");
        graph.clear();
        assert_eq!(graph.state_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_record_edge_on_shared_graph() {
        let graph = TransitionGraph::shared(3);
        record_edge(&graph, "org", "org/repo");
        assert_eq!(graph.lock().unwrap().edge_count(), 1);
    }
}
