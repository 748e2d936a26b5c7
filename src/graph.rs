//! Formula dependency graph.
//!
//! Provides `DependencyGraph`, a petgraph-backed DAG of stat names. An edge
//! `A -> B` means "A depends on B": B must be evaluated before A.
//!
//! Sorting uses an explicit-stack depth-first search with three marks
//! (unvisited, in progress, done), so very deep formula chains cannot
//! overflow the call stack. Reaching a node that is still in progress is a
//! cycle. Roots are visited in insertion order and dependencies in declared
//! order, so the resulting order is deterministic.

use crate::dimension::Dimension;
use crate::error::StatError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Frame {
    node: NodeIndex,
    deps: Vec<NodeIndex>,
    next: usize,
}

/// Directed graph of stat dependencies.
///
/// # Examples
///
/// ```rust
/// use actorstat::graph::DependencyGraph;
/// use actorstat::Dimension;
///
/// let mut graph = DependencyGraph::new();
/// let atk = Dimension::new("atk");
/// let str_id = Dimension::new("str");
///
/// // atk depends on str
/// graph.add_dependency(atk.clone(), str_id.clone());
///
/// let order = graph.topological_order().unwrap();
/// assert_eq!(order, vec![str_id, atk]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<Dimension, ()>,
    node_map: HashMap<Dimension, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it doesn't exist and return its index.
    pub fn add_node(&mut self, stat: Dimension) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&stat) {
            idx
        } else {
            let idx = self.graph.add_node(stat.clone());
            self.node_map.insert(stat, idx);
            idx
        }
    }

    /// Record that `dependent` depends on `dependency`.
    ///
    /// Both nodes are added if missing.
    pub fn add_dependency(&mut self, dependent: Dimension, dependency: Dimension) {
        let from = self.add_node(dependent);
        let to = self.add_node(dependency);
        self.graph.add_edge(from, to, ());
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> Vec<Dimension> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    pub fn contains_node(&self, stat: &Dimension) -> bool {
        self.node_map.contains_key(stat)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of `stat`, in the order they were added.
    pub fn dependencies(&self, stat: &Dimension) -> Vec<Dimension> {
        match self.node_map.get(stat) {
            Some(&idx) => self
                .ordered_dependencies(idx)
                .into_iter()
                .map(|dep| self.graph[dep].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    // petgraph yields neighbours newest-first.
    fn ordered_dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        deps.reverse();
        deps
    }

    /// Order in which stats can be evaluated: every dependency comes before
    /// its dependents.
    ///
    /// # Errors
    ///
    /// `StatError::Cycle` with the closed cycle path, e.g. `[A, B, C, A]`
    /// when A depends on B, B on C and C on A.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use actorstat::graph::DependencyGraph;
    /// use actorstat::{Dimension, StatError};
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_dependency(Dimension::new("a"), Dimension::new("b"));
    /// graph.add_dependency(Dimension::new("b"), Dimension::new("a"));
    ///
    /// match graph.topological_order() {
    ///     Err(StatError::Cycle { path }) => assert_eq!(path.len(), 3),
    ///     other => panic!("expected a cycle, got {:?}", other),
    /// }
    /// ```
    pub fn topological_order(&self) -> Result<Vec<Dimension>, StatError> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut order = Vec::with_capacity(self.graph.node_count());

        for root in self.graph.node_indices() {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }
            marks[root.index()] = Mark::InProgress;
            let mut stack = vec![Frame {
                node: root,
                deps: self.ordered_dependencies(root),
                next: 0,
            }];

            while let Some(frame) = stack.last_mut() {
                if frame.next < frame.deps.len() {
                    let dep = frame.deps[frame.next];
                    frame.next += 1;
                    match marks[dep.index()] {
                        Mark::Unvisited => {
                            marks[dep.index()] = Mark::InProgress;
                            stack.push(Frame {
                                node: dep,
                                deps: self.ordered_dependencies(dep),
                                next: 0,
                            });
                        }
                        Mark::InProgress => return Err(self.cycle_error(&stack, dep)),
                        Mark::Done => {}
                    }
                } else {
                    let node = frame.node;
                    stack.pop();
                    marks[node.index()] = Mark::Done;
                    order.push(self.graph[node].clone());
                }
            }
        }

        Ok(order)
    }

    fn cycle_error(&self, stack: &[Frame], repeated: NodeIndex) -> StatError {
        let start = stack
            .iter()
            .position(|frame| frame.node == repeated)
            .unwrap_or(0);
        let mut path: Vec<Dimension> = stack[start..]
            .iter()
            .map(|frame| self.graph[frame.node].clone())
            .collect();
        path.push(self.graph[repeated].clone());
        StatError::Cycle { path }
    }

    /// Extract the targets and everything they transitively depend on.
    ///
    /// Nodes and edges keep their original insertion order. Unknown targets
    /// are ignored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use actorstat::graph::DependencyGraph;
    /// use actorstat::Dimension;
    ///
    /// let mut graph = DependencyGraph::new();
    /// let (str_id, atk, hp) = (Dimension::new("str"), Dimension::new("atk"), Dimension::new("hp"));
    /// graph.add_dependency(atk.clone(), str_id.clone());
    /// graph.add_node(hp.clone());
    ///
    /// let sub = graph.subgraph_for_targets(&[atk.clone()]);
    /// assert!(sub.contains_node(&atk));
    /// assert!(sub.contains_node(&str_id));
    /// assert!(!sub.contains_node(&hp));
    /// ```
    pub fn subgraph_for_targets(&self, targets: &[Dimension]) -> DependencyGraph {
        let mut reachable = HashSet::new();
        let mut stack: Vec<NodeIndex> = targets
            .iter()
            .filter_map(|target| self.node_map.get(target).copied())
            .collect();

        while let Some(node) = stack.pop() {
            if !reachable.insert(node) {
                continue;
            }
            stack.extend(
                self.graph
                    .neighbors_directed(node, Direction::Outgoing)
                    .filter(|dep| !reachable.contains(dep)),
            );
        }

        let mut subgraph = DependencyGraph::new();
        for node in self.graph.node_indices() {
            if reachable.contains(&node) {
                subgraph.add_node(self.graph[node].clone());
            }
        }
        for node in self.graph.node_indices() {
            if !reachable.contains(&node) {
                continue;
            }
            for dep in self.ordered_dependencies(node) {
                subgraph.add_dependency(self.graph[node].clone(), self.graph[dep].clone());
            }
        }
        subgraph
    }
}
