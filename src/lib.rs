//! Incremental build orchestration over a dependency graph of nodes, with
//! content-addressed caching of node results.

pub mod cache;
pub mod cancel;
mod db;
mod densemap;
pub mod error;
pub mod graph;
pub mod hash;
pub mod load;
pub mod progress;
pub mod spooky;
pub mod state;
pub mod task;
pub mod trace;
pub mod work;

pub use cache::{Cache, Outcome};
pub use cancel::CancelToken;
pub use error::{AggregateBuildError, Error, NodeError, Result};
pub use graph::{Edge, Graph, Input, Node, NodeDesc, NodeId};
pub use hash::{fingerprint, Fingerprint};
pub use load::{GraphDescription, GraphSource, Session};
pub use progress::{BuildStatus, LogProgress, NoProgress, Progress};
pub use state::BuildState;
pub use task::Execute;
pub use work::{BuildRequest, NodeResult, Options, Results, Scope, Work};
