//! Support code for end-to-end tests, which run whole build passes through
//! the public API against an in-memory executor.

mod basic;
mod cancel;
mod failure;

use incbuild::graph::{Edge, Node, NodeDesc};
use incbuild::{CancelToken, Execute, GraphDescription, Options, Outcome, Session};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Start(String),
    End(String),
}

/// Executor that records what it ran and can be told to fail, dawdle, or
/// cancel the build partway through.
#[derive(Default)]
pub struct TestExecutor {
    events: Mutex<Vec<Event>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    /// Cancels the token once this many nodes have started.
    cancel: Option<(CancelToken, usize)>,
    started: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl TestExecutor {
    pub fn new() -> Self {
        TestExecutor::default()
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_owned());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn cancel_after(mut self, token: CancelToken, runs: usize) -> Self {
        self.cancel = Some((token, runs));
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Names of the nodes executed, in start order.
    pub fn runs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start(name) => Some(name),
                Event::End(_) => None,
            })
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Execute for TestExecutor {
    fn run(&self, node: &Node, target: &str) -> anyhow::Result<Outcome> {
        let started = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(Event::Start(node.name.clone()));

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some((token, after)) = &self.cancel {
            if started >= *after {
                token.cancel();
            }
        }

        self.events.lock().unwrap().push(Event::End(node.name.clone()));
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.failing.contains(&node.name) {
            anyhow::bail!("{} is broken", node.name);
        }
        Ok(Outcome::with_artifact(format!("{}/{}", target, node.name)))
    }
}

/// A graph description where each node has one text input, its content.
/// Edges are (dependent, dependency).
pub fn desc(nodes: &[(&str, &str)], edges: &[(&str, &str)]) -> GraphDescription {
    GraphDescription {
        nodes: nodes
            .iter()
            .map(|&(name, content)| NodeDesc::new(name).input(content))
            .collect(),
        edges: edges
            .iter()
            .map(|&(dependent, dependency)| Edge::new(dependent, dependency))
            .collect(),
    }
}

pub fn session(desc: &mut GraphDescription, parallelism: usize) -> anyhow::Result<Session> {
    Ok(Session::open(desc)?.with_options(Options::default().with_parallelism(parallelism)))
}
