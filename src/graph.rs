//! The build graph, a graph of nodes and the "depends-on" edges between them.
//!
//! The graph is built once per session and is read-only afterwards; all
//! per-build mutable state lives in `state::Store`.

use crate::densemap::{self, DenseMap};
use crate::error::Error;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;

/// Identifies a node within one `Graph`.  Ids are assigned in declaration
/// order, which is also the tie-break order for topological sorting.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl densemap::Index for NodeId {
    fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(u: usize) -> NodeId {
        NodeId(u)
    }
}

/// A declared input of a node, folded into its fingerprint in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Raw content.
    Bytes(Vec<u8>),
    Text(String),
    /// A file on disk; its path and current content are folded.
    File(PathBuf),
    /// A declared input with no value.  Hashes differently from omitting
    /// the input altogether.
    Absent,
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Input {
        Input::Bytes(bytes)
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Input {
        Input::Text(text.to_owned())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Input {
        Input::Text(text)
    }
}

impl From<PathBuf> for Input {
    fn from(path: PathBuf) -> Input {
        Input::File(path)
    }
}

/// A node as supplied by the graph source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDesc {
    pub name: String,
    pub inputs: Vec<Input>,
}

impl NodeDesc {
    pub fn new(name: impl Into<String>) -> Self {
        NodeDesc {
            name: name.into(),
            inputs: Vec::new(),
        }
    }

    pub fn input(mut self, input: impl Into<Input>) -> Self {
        self.inputs.push(input.into());
        self
    }
}

/// `dependent` depends on `dependency`: the dependency must finish before
/// the dependent starts, and its fingerprint is folded into the dependent's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub dependent: String,
    pub dependency: String,
}

impl Edge {
    pub fn new(dependent: impl Into<String>, dependency: impl Into<String>) -> Self {
        Edge {
            dependent: dependent.into(),
            dependency: dependency.into(),
        }
    }
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub inputs: Vec<Input>,
    /// Nodes this one depends on, in first-declared order.
    pub deps: Vec<NodeId>,
    /// Nodes that depend on this one.
    pub dependents: Vec<NodeId>,
}

pub struct Graph {
    nodes: DenseMap<NodeId, Node>,
    name_to_id: FxHashMap<String, NodeId>,
    /// Dependencies before dependents, ties broken by declaration order.
    order: Vec<NodeId>,
}

impl Graph {
    /// Builds a graph from node and edge descriptors.  An edge naming an
    /// undeclared node creates it with no inputs.  Fails on duplicate node
    /// names and on any dependency cycle; no graph is produced in either case.
    pub fn build(descs: Vec<NodeDesc>, edges: Vec<Edge>) -> Result<Graph, Error> {
        let mut graph = Graph {
            nodes: DenseMap::default(),
            name_to_id: FxHashMap::default(),
            order: Vec::new(),
        };

        for desc in descs {
            if graph.name_to_id.contains_key(&desc.name) {
                return Err(Error::DuplicateNode(desc.name));
            }
            graph.add_node(desc.name, desc.inputs);
        }

        for edge in edges {
            let dependent = graph.node_id(&edge.dependent);
            let dependency = graph.node_id(&edge.dependency);
            if graph.nodes[dependent].deps.contains(&dependency) {
                continue;
            }
            graph.nodes[dependent].deps.push(dependency);
            graph.nodes[dependency].dependents.push(dependent);
        }

        graph.order = match topological_sort(&graph.nodes) {
            Ok(order) => order,
            Err(cycle) => {
                let names = cycle
                    .into_iter()
                    .map(|id| graph.nodes[id].name.clone())
                    .collect();
                return Err(Error::Cycle(names));
            }
        };
        Ok(graph)
    }

    fn add_node(&mut self, name: String, inputs: Vec<Input>) -> NodeId {
        let id = self.nodes.push(Node {
            name: name.clone(),
            inputs,
            deps: Vec::new(),
            dependents: Vec::new(),
        });
        self.name_to_id.insert(name, id);
        id
    }

    fn node_id(&mut self, name: &str) -> NodeId {
        match self.name_to_id.get(name) {
            Some(&id) => id,
            None => self.add_node(name.to_owned(), Vec::new()),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Looks up a node by name.
    pub fn find(&self, name: &str) -> Result<NodeId, Error> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    pub fn node_by_name(&self, name: &str) -> Result<&Node, Error> {
        Ok(self.node(self.find(name)?))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes.all_ids()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// All nodes reachable from `id` by following dependency edges, not
    /// including `id` itself.
    pub fn ancestors_of(&self, id: NodeId) -> FxHashSet<NodeId> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<NodeId> = self.node(id).deps.clone();
        while let Some(dep) = stack.pop() {
            if seen.insert(dep) {
                stack.extend_from_slice(&self.node(dep).deps);
            }
        }
        seen
    }

    /// Dependency names of a node, in declared order.
    pub fn dep_names(&self, id: NodeId) -> Vec<&str> {
        self.node(id)
            .deps
            .iter()
            .map(|&dep| self.node(dep).name.as_str())
            .collect()
    }
}

/// Kahn's algorithm, always emitting the lowest-numbered ready node next so
/// the order is reproducible.  On failure returns one cycle, as a path that
/// starts and ends on the same node.
fn topological_sort(nodes: &DenseMap<NodeId, Node>) -> Result<Vec<NodeId>, Vec<NodeId>> {
    let mut waiting = DenseMap::from_fn(nodes.len(), |id: NodeId| nodes[id].deps.len());
    let mut ready: BinaryHeap<Reverse<NodeId>> = waiting
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for &dependent in &nodes[id].dependents {
            waiting[dependent] -= 1;
            if waiting[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == nodes.len() {
        Ok(order)
    } else {
        Err(find_cycle(nodes, &waiting))
    }
}

/// Walks unsorted nodes along unsorted dependencies until a node repeats.
/// Every unsorted node has at least one unsorted dependency, so the walk
/// can't dead-end.
fn find_cycle(nodes: &DenseMap<NodeId, Node>, waiting: &DenseMap<NodeId, usize>) -> Vec<NodeId> {
    let stuck = |id: NodeId| waiting[id] > 0;
    let mut path_pos: DenseMap<NodeId, Option<usize>> = DenseMap::new_sized(nodes.len(), None);
    let mut path = Vec::new();

    let mut cur = match nodes.all_ids().find(|&id| stuck(id)) {
        Some(id) => id,
        None => return path,
    };
    loop {
        if let Some(start) = path_pos[cur] {
            let mut cycle = path[start..].to_vec();
            cycle.push(cur);
            return cycle;
        }
        path_pos[cur] = Some(path.len());
        path.push(cur);
        cur = match nodes[cur].deps.iter().copied().find(|&dep| stuck(dep)) {
            Some(dep) => dep,
            None => unreachable!("unsorted node {:?} has no unsorted dependency", nodes[cur].name),
        };
    }
}
