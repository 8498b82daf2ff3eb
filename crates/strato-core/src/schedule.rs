//! Topological scheduling of a dependency graph into apply batches.
//!
//! Kahn's algorithm with level tracking: batch `i` holds every node whose
//! dependencies all sit in batches `0..i`. Nodes within a batch share no
//! dependency edge and may be applied concurrently.
//!
//! Batch *membership* is deterministic for a given graph. Ordering within
//! a batch is an artifact of name sorting done for stable display and
//! carries no meaning — nothing may rely on it.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::error::{ReconcileError, ReconcileResult};
use crate::graph::DependencyGraph;

/// An ordered sequence of apply batches, computed once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    batches: Vec<Vec<String>>,
}

impl RunPlan {
    /// The batches, in apply order.
    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    /// Index of the batch containing `name`, if scheduled.
    pub fn batch_of(&self, name: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|n| n == name))
    }

    /// Total node count across all batches.
    pub fn node_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Order a graph into frontier batches.
///
/// The graph has already been cycle-checked at build time; a cycle here
/// would mean the graph was mutated out from under us, and still fails
/// loudly rather than producing a truncated plan.
pub fn schedule(graph: &DependencyGraph) -> ReconcileResult<RunPlan> {
    if graph.is_empty() {
        return Ok(RunPlan { batches: Vec::new() });
    }

    let mut in_degree: HashMap<&str, usize> = graph
        .nodes()
        .map(|n| (n, graph.dependencies_of(n).count()))
        .collect();

    let mut queue: VecDeque<(&str, usize)> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&n, _)| (n, 0usize))
        .collect();

    let mut levels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut scheduled = 0usize;

    while let Some((node, level)) = queue.pop_front() {
        levels.entry(level).or_default().push(node.to_string());
        scheduled += 1;

        for dep in graph.dependents_of(node) {
            let deg = in_degree
                .get_mut(dep)
                .ok_or_else(|| ReconcileError::Worker(format!("unknown node in graph: {dep}")))?;
            *deg -= 1;
            if *deg == 0 {
                queue.push_back((dep, level + 1));
            }
        }
    }

    if scheduled != graph.len() {
        return Err(ReconcileError::Cycle {
            path: graph.nodes().map(String::from).collect(),
        });
    }

    let batches = levels
        .into_values()
        .map(|mut batch| {
            batch.sort_unstable();
            batch
        })
        .collect();

    Ok(RunPlan { batches })
}
