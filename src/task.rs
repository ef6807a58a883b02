//! Runs nodes on a bounded pool of workers.
//!
//! Unaware of scheduling; a worker takes one node whose dependencies are all
//! done, computes its fingerprint, consults the cache, and only on a miss
//! hands the node to the executor.  Finished nodes are reported back to the
//! coordinator over a channel.

use crate::cache::{Cache, Outcome};
use crate::graph::{Graph, Node, NodeId};
use crate::hash::{self, Fingerprint};
use crate::state::{BuildState, Store};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{mpsc, Arc};
use std::time::Instant;

/// The engine-provided primitive that actually builds a node.  Called only
/// on a cache miss, possibly from several workers at once.
pub trait Execute: Sync {
    /// Runs `node` for the given target.  An `Err` is recorded as a failed
    /// outcome carrying the error text.
    fn run(&self, node: &Node, target: &str) -> anyhow::Result<Outcome>;
}

impl<F> Execute for F
where
    F: Fn(&Node, &str) -> anyhow::Result<Outcome> + Sync,
{
    fn run(&self, node: &Node, target: &str) -> anyhow::Result<Outcome> {
        self(node, target)
    }
}

/// Everything a worker needs.  The store and cache are the only things
/// workers mutate, through their own synchronized APIs.
pub struct TaskContext<'a> {
    pub graph: &'a Graph,
    pub store: &'a Store,
    pub cache: &'a Cache,
    pub executor: &'a dyn Execute,
    pub target: &'a str,
    pub seed: Fingerprint,
}

/// What a worker found out about one node.
pub enum TaskResult {
    /// The fingerprint matched a cached success; nothing ran.
    Cached(Arc<Outcome>),
    /// The executor ran; the outcome may be a failure.
    Executed(Arc<Outcome>),
    /// The fingerprint couldn't be computed, e.g. an unreadable input file.
    Unhashable(String),
    /// The worker panicked.  The coordinator resumes the panic.
    Panicked(Box<dyn Any + Send>),
}

pub struct FinishedTask {
    /// Worker index, plus one; track 0 is the coordinator's in trace output.
    pub tid: usize,
    pub id: NodeId,
    pub span: (Instant, Instant),
    pub fingerprint: Option<Fingerprint>,
    pub result: TaskResult,
}

fn run_task(ctx: &TaskContext, id: NodeId) -> (Option<Fingerprint>, TaskResult) {
    let node = ctx.graph.node(id);
    ctx.store.set(id, BuildState::Evaluating);

    let fingerprint = match hash::hash_node(ctx.graph, ctx.store, id, ctx.target, ctx.seed) {
        Ok(fingerprint) => fingerprint,
        Err(err) => return (None, TaskResult::Unhashable(format!("fingerprint: {}", err))),
    };
    ctx.store.set_fingerprint(id, fingerprint);

    if let Some(outcome) = ctx.cache.lookup(&node.name, fingerprint) {
        tracing::debug!(node = %node.name, %fingerprint, "cache hit");
        ctx.store.set(id, BuildState::CacheHit);
        return (Some(fingerprint), TaskResult::Cached(outcome));
    }

    tracing::debug!(node = %node.name, %fingerprint, "cache miss, executing");
    ctx.store.set(id, BuildState::Executing);
    let outcome = ctx
        .executor
        .run(node, ctx.target)
        .unwrap_or_else(|err| Outcome::failed(format!("{:#}", err)));
    let outcome = Arc::new(outcome);
    ctx.cache.record(&node.name, fingerprint, Arc::clone(&outcome));
    (Some(fingerprint), TaskResult::Executed(outcome))
}

pub struct Runner<'s, 'a> {
    scope: &'s rayon::Scope<'a>,
    ctx: &'a TaskContext<'a>,
    finished_send: mpsc::Sender<FinishedTask>,
    finished_recv: mpsc::Receiver<FinishedTask>,
    pub running: usize,
    parallelism: usize,
}

impl<'s, 'a> Runner<'s, 'a> {
    pub fn new(scope: &'s rayon::Scope<'a>, ctx: &'a TaskContext<'a>, parallelism: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Runner {
            scope,
            ctx,
            finished_send: tx,
            finished_recv: rx,
            running: 0,
            parallelism: parallelism.max(1),
        }
    }

    pub fn can_start_more(&self) -> bool {
        self.running < self.parallelism
    }

    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    pub fn start(&mut self, id: NodeId) {
        let ctx = self.ctx;
        let tx = self.finished_send.clone();
        self.scope.spawn(move |_| {
            let start = Instant::now();
            // A panic must still produce a message, or the coordinator
            // would wait for this node forever.
            let (fingerprint, result) =
                match std::panic::catch_unwind(AssertUnwindSafe(|| run_task(ctx, id))) {
                    Ok(done) => done,
                    Err(payload) => (None, TaskResult::Panicked(payload)),
                };
            let task = FinishedTask {
                tid: rayon::current_thread_index().map_or(0, |i| i + 1),
                id,
                span: (start, Instant::now()),
                fingerprint,
                result,
            };
            // The send only fails if the coordinator is gone, e.g. unwinding.
            let _ = tx.send(task);
        });
        self.running += 1;
    }

    /// Blocks until some running node finishes.
    pub fn wait(&mut self) -> FinishedTask {
        // The runner holds a sender, so the channel can't disconnect.
        let task = self
            .finished_recv
            .recv()
            .unwrap_or_else(|_| unreachable!("runner channel disconnected"));
        self.running -= 1;
        task
    }
}
