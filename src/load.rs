//! Graph loading: asks a graph source for node and edge descriptors and
//! constructs the build graph from them.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::graph::{Edge, Graph, NodeDesc};
use crate::progress::{NoProgress, Progress};
use crate::state::Store;
use crate::task::Execute;
use crate::trace;
use crate::work::{BuildRequest, Options, Results, Work};
use std::path::Path;

/// Nodes and edges as produced by a graph source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphDescription {
    pub nodes: Vec<NodeDesc>,
    pub edges: Vec<Edge>,
}

/// Supplies the graph, e.g. by parsing a project file.  Called again on
/// every reload.
pub trait GraphSource {
    fn load(&mut self) -> anyhow::Result<GraphDescription>;
}

impl GraphSource for GraphDescription {
    fn load(&mut self) -> anyhow::Result<GraphDescription> {
        Ok(self.clone())
    }
}

/// Loads and builds a graph.
pub fn read(source: &mut dyn GraphSource) -> Result<Graph> {
    let desc = trace::scope("graph.load", || source.load()).map_err(Error::Source)?;
    tracing::debug!(
        nodes = desc.nodes.len(),
        edges = desc.edges.len(),
        "loaded graph"
    );
    trace::scope("graph.build", || Graph::build(desc.nodes, desc.edges))
}

/// A graph together with its per-node state and the result cache, living
/// across build passes.
pub struct Session {
    graph: Graph,
    store: Store,
    cache: Cache,
    pub options: Options,
}

impl Session {
    pub fn open(source: &mut dyn GraphSource) -> Result<Session> {
        let graph = read(source)?;
        let store = Store::new(&graph);
        Ok(Session {
            graph,
            store,
            cache: Cache::new(),
            options: Options::default(),
        })
    }

    /// Replaces the (empty) cache, e.g. with one loaded from disk.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// An orchestrator over this session, reporting to `progress`.
    pub fn work<'a>(&'a self, progress: &'a mut dyn Progress) -> Work<'a> {
        Work::new(
            &self.graph,
            &self.store,
            &self.cache,
            progress,
            self.options.clone(),
        )
    }

    /// Runs one pass without progress reporting.
    pub fn build(&self, request: &BuildRequest, executor: &dyn Execute) -> Result<Results> {
        let mut progress = NoProgress;
        self.work(&mut progress).execute(request, executor)
    }

    /// Reloads the graph from `source`, keeping the cache and each surviving
    /// node's last fingerprint and result.
    ///
    /// Returns the names of nodes that are new or whose inputs or
    /// dependencies changed, in topological order.  On failure the previous
    /// graph stays in place.
    pub fn reload(&mut self, source: &mut dyn GraphSource) -> Result<Vec<String>> {
        let graph = read(source)?;
        let changed = graph
            .topological_order()
            .iter()
            .copied()
            .filter(|&id| {
                let node = graph.node(id);
                match self.graph.find(&node.name) {
                    Ok(old) => {
                        self.graph.node(old).inputs != node.inputs
                            || self.graph.dep_names(old) != graph.dep_names(id)
                    }
                    Err(_) => true,
                }
            })
            .map(|id| graph.node(id).name.clone())
            .collect::<Vec<_>>();
        tracing::info!(nodes = graph.len(), changed = changed.len(), "reloaded graph");

        self.store = self.store.carry_over(&self.graph, &graph);
        self.graph = graph;
        Ok(changed)
    }

    pub fn save_cache(&self, path: impl AsRef<Path>) -> Result<()> {
        self.cache.save(path)
    }
}
