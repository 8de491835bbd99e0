//! Role descendant graph
//!
//! Edges point from a parent role to a child role ("grants all of"). The
//! graph answers descendant-closure queries with a visited-set guarded
//! breadth-first traversal, so diamond shapes are walked once and a cycle in
//! upstream data cannot cause unbounded traversal.
//!
//! Graphs assembled through [`RoleGraphBuilder`] are verified to be acyclic;
//! graphs loaded from a store with [`RoleGraph::load`] are only checked and
//! a cycle is logged, since resolution stays bounded either way.

use crate::error::Result;
use crate::store::AssignmentStore;
use crate::types::RoleId;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

/// Graph-related errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Circular dependency detected in the role graph
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// Role added twice
    #[error("Duplicate role: {0}")]
    DuplicateRole(RoleId),

    /// Edge references a role that was never added
    #[error("Unknown role: {0}")]
    UnknownRole(RoleId),
}

/// In-memory role descendant graph
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    /// parent -> direct children, in insertion order
    children: HashMap<RoleId, Vec<RoleId>>,
}

impl RoleGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_node(&mut self, role: RoleId) {
        self.children.entry(role).or_default();
    }

    pub(crate) fn insert_edge(&mut self, parent: RoleId, child: RoleId) {
        self.insert_node(child);
        let edges = self.children.entry(parent).or_default();
        if !edges.contains(&child) {
            edges.push(child);
        }
    }

    /// Load the part of the graph reachable from `roots` out of a store
    ///
    /// Children are fetched breadth first; each role is fetched once.
    pub async fn load<S>(store: &S, roots: impl IntoIterator<Item = RoleId>) -> Result<Self>
    where
        S: AssignmentStore + ?Sized,
    {
        let mut graph = Self::new();
        let mut visited: HashSet<RoleId> = HashSet::new();
        let mut queue: VecDeque<RoleId> = roots.into_iter().collect();

        while let Some(role) = queue.pop_front() {
            if !visited.insert(role) {
                continue;
            }
            graph.insert_node(role);

            for child in store.role_children(role).await? {
                graph.insert_edge(role, child);
                if !visited.contains(&child) {
                    queue.push_back(child);
                }
            }
        }

        if let Err(e) = graph.detect_cycles() {
            warn!("Role graph loaded from store is cyclic, traversal stays bounded: {}", e);
        }

        debug!("Loaded role graph with {} roles", graph.len());
        Ok(graph)
    }

    /// Number of roles in the graph
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn contains(&self, role: RoleId) -> bool {
        self.children.contains_key(&role)
    }

    /// Direct children of a role
    pub fn children(&self, role: RoleId) -> &[RoleId] {
        self.children.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transitive closure of descendants, excluding `role` itself
    pub fn descendants(&self, role: RoleId) -> HashSet<RoleId> {
        let mut visited: HashSet<RoleId> = HashSet::new();
        let mut queue: VecDeque<RoleId> = self.children(role).iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if current == role || !visited.insert(current) {
                continue;
            }
            queue.extend(self.children(current).iter().copied());
        }

        visited
    }

    /// The given roles together with all of their descendants
    pub fn closure(&self, roles: impl IntoIterator<Item = RoleId>) -> HashSet<RoleId> {
        let mut out = HashSet::new();
        for role in roles {
            out.insert(role);
            out.extend(self.descendants(role));
        }
        out
    }

    /// Whether adding `parent -> child` would close a cycle
    pub fn would_cycle(&self, parent: RoleId, child: RoleId) -> bool {
        parent == child || self.descendants(child).contains(&parent)
    }

    /// Detect a cycle using DFS
    ///
    /// Uses three states per node:
    /// - White (0): Unvisited
    /// - Gray (1): On the current DFS path
    /// - Black (2): Fully visited
    ///
    /// Reaching a gray node means the path from it back to itself is a cycle.
    pub fn detect_cycles(&self) -> std::result::Result<(), GraphError> {
        let mut state: HashMap<RoleId, u8> = HashMap::new();

        // Sorted for a deterministic error message
        let starts: BTreeSet<RoleId> = self.children.keys().copied().collect();
        for start in starts {
            if state.get(&start).copied().unwrap_or(0) == 0 {
                let mut path = Vec::new();
                self.dfs_cycle_detect(start, &mut state, &mut path)?;
            }
        }

        Ok(())
    }

    fn dfs_cycle_detect(
        &self,
        node: RoleId,
        state: &mut HashMap<RoleId, u8>,
        path: &mut Vec<RoleId>,
    ) -> std::result::Result<(), GraphError> {
        match state.get(&node) {
            Some(1) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let cycle: Vec<String> = path[start..]
                    .iter()
                    .chain(std::iter::once(&node))
                    .map(|n| n.to_string())
                    .collect();
                return Err(GraphError::CircularDependency(cycle.join(" -> ")));
            }
            Some(2) => return Ok(()),
            _ => {}
        }

        state.insert(node, 1);
        path.push(node);

        for child in self.children(node) {
            self.dfs_cycle_detect(*child, state, path)?;
        }

        state.insert(node, 2);
        path.pop();

        Ok(())
    }

    /// Parents-before-children ordering using Kahn's algorithm
    ///
    /// Ties are broken by role id so the order is stable.
    pub fn topological_order(&self) -> std::result::Result<Vec<RoleId>, GraphError> {
        let mut in_degree: HashMap<RoleId, usize> =
            self.children.keys().map(|role| (*role, 0)).collect();

        for edges in self.children.values() {
            for child in edges {
                *in_degree.entry(*child).or_insert(0) += 1;
            }
        }

        let mut ready: BTreeSet<RoleId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(role, _)| *role)
            .collect();

        let mut sorted = Vec::with_capacity(in_degree.len());
        while let Some(current) = ready.pop_first() {
            sorted.push(current);
            for child in self.children(current) {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }

        if sorted.len() != in_degree.len() {
            self.detect_cycles()?;
            return Err(GraphError::CircularDependency(
                "Unknown cycle detected".to_string(),
            ));
        }

        Ok(sorted)
    }
}

/// Builder for a verified, acyclic role graph
#[derive(Debug, Clone, Default)]
pub struct RoleGraphBuilder {
    roles: Vec<RoleId>,
    edges: Vec<(RoleId, RoleId)>,
}

impl RoleGraphBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role
    pub fn add_role(&mut self, role: RoleId) -> std::result::Result<&mut Self, GraphError> {
        if self.roles.contains(&role) {
            return Err(GraphError::DuplicateRole(role));
        }
        self.roles.push(role);
        Ok(self)
    }

    /// Register a parent -> child edge between two registered roles
    pub fn add_child(
        &mut self,
        parent: RoleId,
        child: RoleId,
    ) -> std::result::Result<&mut Self, GraphError> {
        for role in [parent, child] {
            if !self.roles.contains(&role) {
                return Err(GraphError::UnknownRole(role));
            }
        }
        self.edges.push((parent, child));
        Ok(self)
    }

    /// Build the graph, rejecting cycles
    pub fn build(&self) -> std::result::Result<RoleGraph, GraphError> {
        let mut graph = RoleGraph::new();
        for role in &self.roles {
            graph.insert_node(*role);
        }
        for (parent, child) in &self.edges {
            graph.insert_edge(*parent, *child);
        }

        graph.detect_cycles()?;
        Ok(graph)
    }
}
