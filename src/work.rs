//! Build orchestration: decides which nodes run, and when.
//!
//! The coordinator runs on the calling thread.  It hands nodes whose
//! dependencies are all finished to a pool of workers, records each finished
//! node in the store, and releases that node's dependents.  A node is never
//! started before every one of its dependencies is terminal.

use crate::cache::{Cache, Outcome};
use crate::cancel::CancelToken;
use crate::densemap::DenseMap;
use crate::error::{AggregateBuildError, Error, NodeError, Result};
use crate::graph::{Graph, NodeId};
use crate::hash::Fingerprint;
use crate::progress::{BuildStatus, Progress};
use crate::state::{BuildState, StateCounts, Store};
use crate::task::{Execute, FinishedTask, Runner, TaskContext, TaskResult};
use crate::trace;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Which nodes a build pass covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Every node in the graph.
    AllNodes,
    /// The named node plus everything it transitively depends on.
    RootAndCachedAncestors(String),
}

impl Scope {
    /// The nodes in scope, in topological order.
    pub fn select(&self, graph: &Graph) -> Result<Vec<NodeId>> {
        match self {
            Scope::AllNodes => Ok(graph.topological_order().to_vec()),
            Scope::RootAndCachedAncestors(root) => {
                let root = graph.find(root)?;
                let mut keep = graph.ancestors_of(root);
                keep.insert(root);
                Ok(graph
                    .topological_order()
                    .iter()
                    .copied()
                    .filter(|id| keep.contains(id))
                    .collect())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildRequest {
    /// Opaque build target, e.g. a platform or configuration name.  Folded
    /// into every fingerprint.
    pub target: String,
    pub scope: Scope,
}

impl BuildRequest {
    pub fn all(target: impl Into<String>) -> Self {
        BuildRequest {
            target: target.into(),
            scope: Scope::AllNodes,
        }
    }

    pub fn root(target: impl Into<String>, root: impl Into<String>) -> Self {
        BuildRequest {
            target: target.into(),
            scope: Scope::RootAndCachedAncestors(root.into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Maximum number of nodes evaluated at once.
    pub parallelism: usize,
    /// Seed for fingerprints.  Changing it invalidates every cached result.
    pub seed: Fingerprint,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
            seed: Fingerprint::DEFAULT_SEED,
        }
    }
}

impl Options {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }
}

/// The result of one node in a build pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeResult {
    /// `CacheHit`, `Succeeded` or `Failed`.
    pub state: BuildState,
    /// Absent if the node failed before its fingerprint was known.
    pub fingerprint: Option<Fingerprint>,
    pub outcome: Arc<Outcome>,
    pub error: Option<NodeError>,
}

impl NodeResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-node results of a pass, by node name.
pub type Results = BTreeMap<String, NodeResult>;

/// Number of results that ended in `state`.
pub fn count(results: &Results, state: BuildState) -> usize {
    results.values().filter(|r| r.state == state).count()
}

/// Coordinator bookkeeping for one pass.
struct Pass<'a> {
    graph: &'a Graph,
    store: &'a Store,
    in_scope: DenseMap<NodeId, bool>,
    /// Count of unfinished dependencies.
    waiting: DenseMap<NodeId, usize>,
    /// The first failed dependency, if any.
    failed_dep: DenseMap<NodeId, Option<NodeId>>,
    ready: VecDeque<NodeId>,
    counts: StateCounts,
    results: Results,
}

impl<'a> Pass<'a> {
    fn new(graph: &'a Graph, store: &'a Store, selected: &[NodeId]) -> Self {
        let mut in_scope = DenseMap::new_sized(graph.len(), false);
        let mut counts = StateCounts::default();
        for &id in selected {
            in_scope[id] = true;
            counts.add(BuildState::Pending);
        }
        // A scope is closed under dependencies, so every dependency of a
        // selected node is itself selected.
        let waiting = DenseMap::from_fn(graph.len(), |id| graph.node(id).deps.len());
        let ready = selected
            .iter()
            .copied()
            .filter(|&id| waiting[id] == 0)
            .collect();
        Pass {
            graph,
            store,
            in_scope,
            waiting,
            failed_dep: DenseMap::new_sized(graph.len(), None),
            ready,
            counts,
            results: Results::new(),
        }
    }

    fn started(&mut self, progress: &mut dyn Progress) {
        self.counts
            .transition(BuildState::Pending, BuildState::Evaluating);
        progress.update(&self.counts);
    }

    /// Records a node's result and releases its dependents.
    fn finish(&mut self, id: NodeId, result: NodeResult, progress: &mut dyn Progress) {
        let node = self.graph.node(id);
        let launched = !matches!(result.error, Some(NodeError::DependencyFailed { .. }));
        self.counts.transition(
            if launched {
                BuildState::Evaluating
            } else {
                BuildState::Pending
            },
            result.state,
        );
        self.store.finish(
            id,
            result.state,
            result.fingerprint,
            Arc::clone(&result.outcome),
        );
        progress.task_finished(id, node, &result);
        progress.update(&self.counts);

        let failed = result.error.is_some();
        for &dependent in &node.dependents {
            if !self.in_scope[dependent] {
                continue;
            }
            if failed && self.failed_dep[dependent].is_none() {
                self.failed_dep[dependent] = Some(id);
            }
            self.waiting[dependent] -= 1;
            if self.waiting[dependent] == 0 {
                self.ready.push_back(dependent);
            }
        }
        self.results.insert(node.name.clone(), result);
    }

    fn dependency_failed(&self, id: NodeId, dependency: NodeId) -> NodeResult {
        let node = &self.graph.node(id).name;
        let dependency = &self.graph.node(dependency).name;
        tracing::debug!(node = %node, dependency = %dependency, "skipped, dependency failed");
        NodeResult {
            state: BuildState::Failed,
            fingerprint: None,
            outcome: Arc::new(Outcome::failed(format!("dependency {:?} failed", dependency))),
            error: Some(NodeError::DependencyFailed {
                node: node.clone(),
                dependency: dependency.clone(),
            }),
        }
    }

    fn task_result(&self, task: FinishedTask) -> NodeResult {
        let name = &self.graph.node(task.id).name;
        let (state, outcome) = match task.result {
            TaskResult::Cached(outcome) => (BuildState::CacheHit, outcome),
            TaskResult::Executed(outcome) if outcome.success => (BuildState::Succeeded, outcome),
            TaskResult::Executed(outcome) => (BuildState::Failed, outcome),
            TaskResult::Unhashable(message) => {
                (BuildState::Failed, Arc::new(Outcome::failed(message)))
            }
            TaskResult::Panicked(payload) => std::panic::resume_unwind(payload),
        };
        let error = (state == BuildState::Failed).then(|| NodeError::Execution {
            node: name.clone(),
            message: outcome
                .error
                .clone()
                .unwrap_or_else(|| "failed".to_string()),
        });
        if let Some(err) = &error {
            tracing::warn!("{}", err);
        }
        NodeResult {
            state,
            fingerprint: task.fingerprint,
            outcome,
            error,
        }
    }
}

/// Runs build passes over one graph.
pub struct Work<'a> {
    graph: &'a Graph,
    store: &'a Store,
    cache: &'a Cache,
    progress: &'a mut dyn Progress,
    options: Options,
    cancel: CancelToken,
}

impl<'a> Work<'a> {
    pub fn new(
        graph: &'a Graph,
        store: &'a Store,
        cache: &'a Cache,
        progress: &'a mut dyn Progress,
        options: Options,
    ) -> Self {
        Work {
            graph,
            store,
            cache,
            progress,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Uses `cancel` to stop the build from outside, e.g. from a signal
    /// handler or from within the executor.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs one build pass.
    ///
    /// Returns every node's result on success.  If any node failed, the
    /// error carries every node's result; if cancelled, it carries the
    /// results of the nodes that finished.
    pub fn execute(&mut self, request: &BuildRequest, executor: &dyn Execute) -> Result<Results> {
        trace::scope("work.execute", || self.execute_pass(request, executor))
    }

    fn execute_pass(&mut self, request: &BuildRequest, executor: &dyn Execute) -> Result<Results> {
        let selected = request.scope.select(self.graph)?;
        tracing::info!(
            target = %request.target,
            nodes = selected.len(),
            parallelism = self.options.parallelism,
            "build started"
        );
        self.store.begin_pass(selected.iter().copied());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.parallelism.max(1))
            .thread_name(|i| format!("incbuild-worker-{}", i))
            .build()?;
        let ctx = TaskContext {
            graph: self.graph,
            store: self.store,
            cache: self.cache,
            executor,
            target: &request.target,
            seed: self.options.seed,
        };
        let mut pass = Pass::new(self.graph, self.store, &selected);
        let progress = &mut *self.progress;
        let cancel = &self.cancel;
        let parallelism = self.options.parallelism;

        pool.in_place_scope(|scope| {
            let mut runner = Runner::new(scope, &ctx, parallelism);
            loop {
                while !cancel.is_cancelled() && runner.can_start_more() {
                    let id = match pass.ready.pop_front() {
                        Some(id) => id,
                        None => break,
                    };
                    if let Some(dependency) = pass.failed_dep[id] {
                        let result = pass.dependency_failed(id, dependency);
                        pass.finish(id, result, progress);
                        continue;
                    }
                    progress.task_started(id, pass.graph.node(id));
                    pass.started(progress);
                    runner.start(id);
                }

                // With nothing running, the loop above drained the ready
                // queue unless the build was cancelled.
                if !runner.is_running() {
                    break;
                }

                let task = runner.wait();
                let id = task.id;
                trace::span(&pass.graph.node(id).name, task.tid, task.span.0, task.span.1);
                let result = pass.task_result(task);
                pass.finish(id, result, progress);
            }
        });

        let results = pass.results;
        let status = if results.len() < selected.len() {
            BuildStatus::Cancelled
        } else if results.values().any(|r| r.error.is_some()) {
            BuildStatus::Failed
        } else {
            BuildStatus::Succeeded
        };
        self.progress.finish(&results, status);
        tracing::info!(?status, finished = results.len(), "build done");

        match status {
            BuildStatus::Succeeded => Ok(results),
            BuildStatus::Failed => Err(AggregateBuildError { results }.into()),
            BuildStatus::Cancelled => Err(Error::Cancelled(results)),
        }
    }
}
