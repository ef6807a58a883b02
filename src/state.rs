//! Per-node build state.
//!
//! The store is an arena parallel to the graph's nodes, with one lock per
//! node, so workers touching different nodes never contend and nobody ever
//! observes a half-written record.

use crate::cache::Outcome;
use crate::densemap::DenseMap;
use crate::graph::{Graph, NodeId};
use crate::hash::Fingerprint;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where a node is within the current build pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildState {
    /// Not yet looked at this pass.
    Pending,
    /// Fingerprint being computed.
    Evaluating,
    /// Fingerprint matched a cached result; nothing was executed.
    CacheHit,
    /// The executor is running the node.
    Executing,
    Succeeded,
    Failed,
}

impl BuildState {
    const ALL: [BuildState; 6] = [
        BuildState::Pending,
        BuildState::Evaluating,
        BuildState::CacheHit,
        BuildState::Executing,
        BuildState::Succeeded,
        BuildState::Failed,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Whether the node is done for this pass.  Dependents may start once
    /// all their dependencies are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildState::CacheHit | BuildState::Succeeded | BuildState::Failed
        )
    }

    /// Whether moving from `self` to `next` is a legal step within a pass.
    /// Any state may go back to `Pending`, which starts a new pass.
    pub fn can_become(self, next: BuildState) -> bool {
        use BuildState::*;
        match (self, next) {
            (_, Pending) => true,
            (Pending, Evaluating) | (Pending, Failed) => true,
            (Evaluating, CacheHit) | (Evaluating, Executing) | (Evaluating, Failed) => true,
            (Executing, Succeeded) | (Executing, Failed) => true,
            (a, b) => a == b && a.is_terminal(),
        }
    }
}

/// Counts of nodes in each state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateCounts([usize; 6]);

impl StateCounts {
    pub fn get(&self, state: BuildState) -> usize {
        self.0[state.slot()]
    }

    pub fn add(&mut self, state: BuildState) {
        self.0[state.slot()] += 1;
    }

    /// Moves one node from `from` to `to`.
    pub fn transition(&mut self, from: BuildState, to: BuildState) {
        self.0[from.slot()] -= 1;
        self.0[to.slot()] += 1;
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn finished(&self) -> usize {
        BuildState::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|&s| self.get(s))
            .sum()
    }
}

#[derive(Clone, Debug)]
pub struct NodeRecord {
    pub state: BuildState,
    /// Absent until the node is first evaluated.
    pub fingerprint: Option<Fingerprint>,
    pub last_result: Option<Arc<Outcome>>,
}

impl Default for NodeRecord {
    fn default() -> Self {
        NodeRecord {
            state: BuildState::Pending,
            fingerprint: None,
            last_result: None,
        }
    }
}

pub struct Store {
    records: DenseMap<NodeId, Mutex<NodeRecord>>,
}

impl Store {
    pub fn new(graph: &Graph) -> Self {
        Store {
            records: DenseMap::from_fn(graph.len(), |_| Mutex::new(NodeRecord::default())),
        }
    }

    /// Builds a store for `graph`, carrying over fingerprints and results of
    /// nodes that also exist, by name, in `old_graph`.
    pub fn carry_over(&self, old_graph: &Graph, graph: &Graph) -> Store {
        Store {
            records: DenseMap::from_fn(graph.len(), |id: NodeId| {
                let record = match old_graph.find(&graph.node(id).name) {
                    Ok(old) => NodeRecord {
                        state: BuildState::Pending,
                        ..self.get(old)
                    },
                    Err(_) => NodeRecord::default(),
                };
                Mutex::new(record)
            }),
        }
    }

    fn lock(&self, id: NodeId) -> MutexGuard<'_, NodeRecord> {
        self.records[id]
            .lock()
            .unwrap_or_else(|_| panic!("state of {:?} poisoned", id))
    }

    pub fn get(&self, id: NodeId) -> NodeRecord {
        self.lock(id).clone()
    }

    pub fn state(&self, id: NodeId) -> BuildState {
        self.lock(id).state
    }

    pub fn set(&self, id: NodeId, state: BuildState) {
        let mut record = self.lock(id);
        debug_assert!(
            record.state.can_become(state),
            "{:?}: {:?} -> {:?}",
            id,
            record.state,
            state
        );
        record.state = state;
    }

    pub fn fingerprint(&self, id: NodeId) -> Option<Fingerprint> {
        self.lock(id).fingerprint
    }

    pub fn set_fingerprint(&self, id: NodeId, fingerprint: Fingerprint) {
        self.lock(id).fingerprint = Some(fingerprint);
    }

    /// Moves a node to a terminal state along with its result, in one step.
    /// `fingerprint` is the one computed this pass; `None` clears any left
    /// over from an earlier pass, so a record never pairs this pass's result
    /// with a stale fingerprint.
    pub fn finish(
        &self,
        id: NodeId,
        state: BuildState,
        fingerprint: Option<Fingerprint>,
        result: Arc<Outcome>,
    ) {
        debug_assert!(state.is_terminal());
        let mut record = self.lock(id);
        debug_assert!(
            record.state.can_become(state),
            "{:?}: {:?} -> {:?}",
            id,
            record.state,
            state
        );
        record.state = state;
        record.fingerprint = fingerprint;
        record.last_result = Some(result);
    }

    /// Resets the given nodes to `Pending` for a new pass, keeping their last
    /// fingerprint and result.
    pub fn begin_pass(&self, ids: impl IntoIterator<Item = NodeId>) {
        for id in ids {
            self.lock(id).state = BuildState::Pending;
        }
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for record in self.records.values() {
            let state = record
                .lock()
                .unwrap_or_else(|_| panic!("node state poisoned"))
                .state;
            counts.add(state);
        }
        counts
    }
}
