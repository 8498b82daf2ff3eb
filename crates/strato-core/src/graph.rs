//! Dependency graph construction over declared resources.
//!
//! An edge `A → B` means "B depends on A" — A must be applied before B.
//! Edges come from each descriptor's explicit `depends_on` set (property
//! references are validated against that set in `model::validate_set`, so
//! they never add edges of their own).
//!
//! Cycles are rejected at build time via DFS with recursion-stack
//! tracking; the error names the full node sequence of the cycle.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{validate_set, ResourceDescriptor};

/// Directed acyclic dependency graph over logical resource names.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// `dependency → {dependent, ...}` (downstream adjacency)
    downstream: BTreeMap<String, BTreeSet<String>>,
    /// `dependent → {dependency, ...}` (upstream adjacency)
    upstream: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build and validate a graph from a descriptor set.
    ///
    /// Runs the full set validation first (unique names, no dangling
    /// references, route-key uniqueness), then the cycle check. No silent
    /// cycle-breaking: any cycle fails the build.
    pub fn build(descriptors: &[ResourceDescriptor]) -> ReconcileResult<Self> {
        validate_set(descriptors)?;

        let mut graph = Self::default();
        for desc in descriptors {
            graph.nodes.insert(desc.logical_name.clone());
            graph.downstream.entry(desc.logical_name.clone()).or_default();
            graph.upstream.entry(desc.logical_name.clone()).or_default();
        }
        for desc in descriptors {
            for dep in &desc.depends_on {
                graph
                    .downstream
                    .entry(dep.clone())
                    .or_default()
                    .insert(desc.logical_name.clone());
                graph
                    .upstream
                    .entry(desc.logical_name.clone())
                    .or_default()
                    .insert(dep.clone());
            }
        }

        if let Some(path) = graph.find_cycle() {
            return Err(ReconcileError::Cycle { path });
        }
        Ok(graph)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over node names in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// Direct dependencies of `name` (resources it must wait for).
    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.upstream
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Direct dependents of `name` (resources that wait for it).
    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.downstream
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// All transitive dependents of `name` (BFS over downstream edges).
    ///
    /// Used by the reconciler to mark everything below a failed node as
    /// skipped.
    pub fn transitive_dependents_of(&self, name: &str) -> BTreeSet<String> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            if let Some(deps) = self.downstream.get(current) {
                for dep in deps {
                    if visited.insert(dep.clone()) {
                        queue.push_back(dep);
                    }
                }
            }
        }
        visited
    }

    /// DFS over every node, tracking the recursion stack. Returns the node
    /// sequence of the first cycle found, closed on the repeated node.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        for node in &self.nodes {
            if self.dfs_cycle(node, &mut visited, &mut path) {
                // Trim the lead-in so the path starts at the cycle entry.
                let entry = path.last().cloned()?;
                let start = path.iter().position(|n| *n == entry)?;
                return Some(path[start..].to_vec());
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<String>,
    ) -> bool {
        if path.iter().any(|n| n == node) {
            path.push(node.to_string());
            return true;
        }
        if visited.contains(node) {
            return false;
        }
        visited.insert(node);
        path.push(node.to_string());

        if let Some(dependents) = self.downstream.get(node) {
            for dep in dependents {
                if self.dfs_cycle(dep, visited, path) {
                    return true;
                }
            }
        }

        path.pop();
        false
    }
}
