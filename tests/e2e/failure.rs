use crate::e2e::*;
use incbuild::{BuildRequest, BuildState, Error, GraphDescription, NodeError, Session};

fn build_error(err: Error) -> incbuild::AggregateBuildError {
    match err {
        Error::Build(agg) => agg,
        other => panic!("expected a build failure, got {:?}", other),
    }
}

#[test]
fn independent_nodes_survive_a_failure() -> anyhow::Result<()> {
    let session = session(&mut desc(&[("A", "a"), ("B", "b")], &[]), 2)?;
    let executor = TestExecutor::new().failing("A");
    let err = session
        .build(&BuildRequest::all("Build"), &executor)
        .unwrap_err();
    let agg = build_error(err);

    assert_eq!(agg.failed(), ["A"]);
    assert_eq!(agg.results["A"].state, BuildState::Failed);
    assert_eq!(agg.results["B"].state, BuildState::Succeeded);
    assert_eq!(
        agg.results["A"].error,
        Some(NodeError::Execution {
            node: "A".into(),
            message: "A is broken".into()
        })
    );
    assert_eq!(agg.results["A"].outcome.error.as_deref(), Some("A is broken"));
    assert!(agg.to_string().starts_with("1 of 2 nodes failed"));
    Ok(())
}

#[test]
fn dependents_of_a_failure_are_skipped() -> anyhow::Result<()> {
    let session = session(
        &mut desc(
            &[("A", ""), ("B", ""), ("C", ""), ("D", "")],
            &[("C", "A"), ("C", "B"), ("D", "C")],
        ),
        2,
    )?;
    let executor = TestExecutor::new().failing("A");
    let agg = build_error(
        session
            .build(&BuildRequest::all("Build"), &executor)
            .unwrap_err(),
    );

    let mut runs = executor.runs();
    runs.sort();
    assert_eq!(runs, ["A", "B"]);
    assert_eq!(agg.failed(), ["A", "C", "D"]);
    assert_eq!(
        agg.results["C"].error,
        Some(NodeError::DependencyFailed {
            node: "C".into(),
            dependency: "A".into()
        })
    );
    assert_eq!(
        agg.results["D"].error,
        Some(NodeError::DependencyFailed {
            node: "D".into(),
            dependency: "C".into()
        })
    );
    assert_eq!(agg.root_causes().len(), 1);
    assert_eq!(agg.results["B"].state, BuildState::Succeeded);

    let d = session.graph().find("D")?;
    assert_eq!(session.store().state(d), BuildState::Failed);
    Ok(())
}

#[test]
fn failures_are_retried_next_pass() -> anyhow::Result<()> {
    let session = session(&mut desc(&[("A", ""), ("B", "")], &[("B", "A")]), 1)?;
    let request = BuildRequest::all("Build");
    assert!(session
        .build(&request, &TestExecutor::new().failing("A"))
        .is_err());

    let executor = TestExecutor::new();
    let results = session.build(&request, &executor)?;
    assert_eq!(executor.runs(), ["A", "B"]);
    assert_eq!(results["A"].state, BuildState::Succeeded);
    Ok(())
}

#[test]
fn cycle_is_reported_with_its_nodes() {
    let mut cyclic = desc(
        &[("Start", ""), ("A", ""), ("B", "")],
        &[("A", "Start"), ("A", "B"), ("B", "A")],
    );
    let err = Session::open(&mut cyclic).err().unwrap();
    match &err {
        Error::Cycle(path) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"A".to_string()));
            assert!(path.contains(&"B".to_string()));
            assert!(!path.contains(&"Start".to_string()));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert!(err.to_string().starts_with("dependency cycle: "));
}

#[test]
fn duplicate_node_is_rejected() {
    let mut dup = GraphDescription {
        nodes: vec![
            incbuild::NodeDesc::new("x"),
            incbuild::NodeDesc::new("x"),
        ],
        edges: vec![],
    };
    assert!(matches!(
        Session::open(&mut dup),
        Err(Error::DuplicateNode(name)) if name == "x"
    ));
}
