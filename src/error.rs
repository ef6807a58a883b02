//! Error types.
//!
//! `Error` covers everything that stops a session or a build pass.  Failures
//! of individual nodes are `NodeError`s, recorded in that node's result
//! rather than raised, so one broken node never hides the others.

use crate::work::Results;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The dependency edges contain a cycle; the path starts and ends on the
    /// same node.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("unknown node {0:?}")]
    NotFound(String),

    #[error("node {0:?} declared twice")]
    DuplicateNode(String),

    /// One or more nodes failed; carries every node's result.
    #[error(transparent)]
    Build(#[from] AggregateBuildError),

    /// The build was cancelled; carries the results of nodes that finished.
    #[error("build cancelled after {} nodes finished", .0.len())]
    Cancelled(Results),

    #[error("starting workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("loading graph: {0:#}")]
    Source(anyhow::Error),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: corrupt cache file: {reason}")]
    CorruptCache { path: PathBuf, reason: String },
}

/// Why a single node failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node itself is broken: its executor reported failure, or its
    /// inputs couldn't be read.
    #[error("{node}: {message}")]
    Execution { node: String, message: String },

    /// The node was skipped because something it depends on failed.
    #[error("{node}: dependency {dependency:?} failed")]
    DependencyFailed { node: String, dependency: String },
}

/// Returned when any node in the requested scope failed.
#[derive(Debug)]
pub struct AggregateBuildError {
    pub results: Results,
}

impl AggregateBuildError {
    /// Names of failed nodes, in name order.
    pub fn failed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, result)| result.error.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Failed nodes that were themselves broken, as opposed to skipped
    /// because a dependency failed.
    pub fn root_causes(&self) -> Vec<&NodeError> {
        self.results
            .values()
            .filter_map(|result| result.error.as_ref())
            .filter(|err| matches!(err, NodeError::Execution { .. }))
            .collect()
    }
}

impl fmt::Display for AggregateBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed();
        write!(f, "{} of {} nodes failed", failed.len(), self.results.len())?;
        for cause in self.root_causes() {
            write!(f, "\n  {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateBuildError {}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
