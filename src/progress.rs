//! Build progress notifications, for the purpose of reporting to the user.

use crate::graph::{Node, NodeId};
use crate::state::{BuildState, StateCounts};
use crate::work::{self, NodeResult, Results};
use std::time::Instant;

/// How a build pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Trait for build progress notifications.  Called only from the
/// coordinating thread.
pub trait Progress {
    /// Called as nodes move through build states.  Counts cover only the
    /// nodes in the current pass.
    fn update(&mut self, counts: &StateCounts);

    /// Called when a node is handed to a worker.
    fn task_started(&mut self, id: NodeId, node: &Node);

    /// Called when a node reaches a terminal state, including nodes skipped
    /// because a dependency failed.
    fn task_finished(&mut self, id: NodeId, node: &Node, result: &NodeResult);

    /// Called once at the end of a pass with every recorded result.
    fn finish(&mut self, results: &Results, status: BuildStatus);
}

/// Ignores all notifications.
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _counts: &StateCounts) {}
    fn task_started(&mut self, _id: NodeId, _node: &Node) {}
    fn task_finished(&mut self, _id: NodeId, _node: &Node, _result: &NodeResult) {}
    fn finish(&mut self, _results: &Results, _status: BuildStatus) {}
}

/// Progress reported through `tracing` events, one line per finished node.
pub struct LogProgress {
    /// Whether to also report nodes started and cache hits.
    verbose: bool,
    start: Instant,
}

impl LogProgress {
    pub fn new(verbose: bool) -> Self {
        LogProgress {
            verbose,
            start: Instant::now(),
        }
    }
}

impl Progress for LogProgress {
    fn update(&mut self, _counts: &StateCounts) {
        // ignore
    }

    fn task_started(&mut self, _id: NodeId, node: &Node) {
        if self.verbose {
            tracing::info!(node = %node.name, "started");
        }
    }

    fn task_finished(&mut self, _id: NodeId, node: &Node, result: &NodeResult) {
        match (&result.error, result.state) {
            (Some(err), _) => tracing::error!("failed: {}", err),
            (None, BuildState::CacheHit) if !self.verbose => {}
            (None, state) => tracing::info!(node = %node.name, ?state, "finished"),
        }
    }

    fn finish(&mut self, results: &Results, status: BuildStatus) {
        tracing::info!(
            ?status,
            nodes = results.len(),
            cache_hits = work::count(results, BuildState::CacheHit),
            executed = work::count(results, BuildState::Succeeded),
            failed = work::count(results, BuildState::Failed),
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "build finished"
        );
    }
}

/// Keeps notifications in memory, for inspecting a build after the fact.
#[derive(Default)]
pub struct RecordingProgress {
    /// Node names in the order they were started.
    pub started: Vec<String>,
    /// Node names in the order they finished.
    pub finished: Vec<String>,
    pub last_counts: StateCounts,
    pub status: Option<BuildStatus>,
}

impl Progress for RecordingProgress {
    fn update(&mut self, counts: &StateCounts) {
        self.last_counts = counts.clone();
    }

    fn task_started(&mut self, _id: NodeId, node: &Node) {
        self.started.push(node.name.clone());
    }

    fn task_finished(&mut self, _id: NodeId, node: &Node, _result: &NodeResult) {
        self.finished.push(node.name.clone());
    }

    fn finish(&mut self, _results: &Results, status: BuildStatus) {
        self.status = Some(status);
    }
}
