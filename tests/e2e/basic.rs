use crate::e2e::*;
use incbuild::{BuildRequest, BuildState, Error};
use std::time::Duration;

#[test]
fn empty_graph() -> anyhow::Result<()> {
    let session = session(&mut desc(&[], &[]), 2)?;
    let results = session.build(&BuildRequest::all("Build"), &TestExecutor::new())?;
    assert!(results.is_empty());
    Ok(())
}

#[test]
fn second_build_is_all_hits() -> anyhow::Result<()> {
    let session = session(
        &mut desc(
            &[("lib", "fn lib()"), ("app", "fn main()"), ("docs", "# app")],
            &[("app", "lib"), ("docs", "app")],
        ),
        4,
    )?;
    let request = BuildRequest::all("Build");

    let executor = TestExecutor::new();
    let first = session.build(&request, &executor)?;
    assert_eq!(executor.runs(), ["lib", "app", "docs"]);
    assert!(first.values().all(|r| r.state == BuildState::Succeeded));
    assert_eq!(
        first["app"].outcome.artifact.as_deref(),
        Some("Build/app")
    );

    let executor = TestExecutor::new();
    let second = session.build(&request, &executor)?;
    assert!(executor.runs().is_empty());
    for (name, result) in &second {
        assert_eq!(result.state, BuildState::CacheHit, "{}", name);
        assert_eq!(result.fingerprint, first[name].fingerprint);
        assert_eq!(result.outcome, first[name].outcome);
    }
    Ok(())
}

#[test]
fn change_propagates_to_dependents_only() -> anyhow::Result<()> {
    let mut session = session(
        &mut desc(
            &[("leaf", "v1"), ("mid", "m"), ("root", "r"), ("other", "o")],
            &[("mid", "leaf"), ("root", "mid")],
        ),
        2,
    )?;
    let request = BuildRequest::all("Build");
    let first = session.build(&request, &TestExecutor::new())?;

    let changed = session.reload(&mut desc(
        &[("leaf", "v2"), ("mid", "m"), ("root", "r"), ("other", "o")],
        &[("mid", "leaf"), ("root", "mid")],
    ))?;
    assert_eq!(changed, ["leaf"]);

    let executor = TestExecutor::new();
    let second = session.build(&request, &executor)?;
    assert_eq!(executor.runs(), ["leaf", "mid", "root"]);
    assert_eq!(second["other"].state, BuildState::CacheHit);
    for name in ["leaf", "mid", "root"] {
        assert_eq!(second[name].state, BuildState::Succeeded);
        assert_ne!(second[name].fingerprint, first[name].fingerprint);
    }
    assert_eq!(second["other"].fingerprint, first["other"].fingerprint);
    Ok(())
}

#[test]
fn root_scope_builds_ancestors_only() -> anyhow::Result<()> {
    let session = session(
        &mut desc(
            &[("Leaf", "l"), ("Root", "r"), ("Other", "o")],
            &[("Root", "Leaf")],
        ),
        2,
    )?;
    let executor = TestExecutor::new();
    let results = session.build(&BuildRequest::root("Build", "Root"), &executor)?;
    assert_eq!(results.keys().collect::<Vec<_>>(), ["Leaf", "Root"]);
    assert_eq!(executor.runs(), ["Leaf", "Root"]);

    let other = session.graph().find("Other")?;
    assert_eq!(session.store().state(other), BuildState::Pending);
    assert_eq!(session.store().fingerprint(other), None);

    // A full build afterwards reuses what the scoped one produced.
    let executor = TestExecutor::new();
    let results = session.build(&BuildRequest::all("Build"), &executor)?;
    assert_eq!(executor.runs(), ["Other"]);
    assert_eq!(results["Root"].state, BuildState::CacheHit);
    Ok(())
}

#[test]
fn unknown_root_is_not_found() -> anyhow::Result<()> {
    let session = session(&mut desc(&[("a", "")], &[]), 1)?;
    let executor = TestExecutor::new();
    let err = session
        .build(&BuildRequest::root("Build", "nope"), &executor)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref name) if name == "nope"));
    assert!(executor.runs().is_empty());
    Ok(())
}

#[test]
fn target_is_part_of_the_key() -> anyhow::Result<()> {
    let session = session(&mut desc(&[("a", "x")], &[]), 1)?;
    let build = session.build(&BuildRequest::all("Build"), &TestExecutor::new())?;

    let executor = TestExecutor::new();
    let restore = session.build(&BuildRequest::all("Restore"), &executor)?;
    assert_eq!(executor.runs(), ["a"]);
    assert_ne!(build["a"].fingerprint, restore["a"].fingerprint);
    assert_eq!(restore["a"].outcome.artifact.as_deref(), Some("Restore/a"));
    Ok(())
}

#[test]
fn dependencies_finish_before_dependents_start() -> anyhow::Result<()> {
    // Two diamonds sharing a base.
    let edges = [
        ("b1", "base"),
        ("c1", "base"),
        ("top1", "b1"),
        ("top1", "c1"),
        ("b2", "base"),
        ("c2", "base"),
        ("top2", "b2"),
        ("top2", "c2"),
        ("all", "top1"),
        ("all", "top2"),
    ];
    let nodes = [
        ("base", ""),
        ("b1", ""),
        ("c1", ""),
        ("top1", ""),
        ("b2", ""),
        ("c2", ""),
        ("top2", ""),
        ("all", ""),
    ];
    let session = session(&mut desc(&nodes, &edges), 4)?;
    let executor = TestExecutor::new().with_delay(Duration::from_millis(5));
    session.build(&BuildRequest::all("Build"), &executor)?;

    let events = executor.events();
    let position = |event: Event| {
        events
            .iter()
            .position(|e| *e == event)
            .unwrap_or_else(|| panic!("missing {:?}", event))
    };
    for (dependent, dependency) in edges {
        assert!(
            position(Event::End(dependency.into())) < position(Event::Start(dependent.into())),
            "{} started before {} finished",
            dependent,
            dependency
        );
    }
    assert_eq!(executor.runs().len(), nodes.len());
    Ok(())
}

#[test]
fn parallelism_is_bounded() -> anyhow::Result<()> {
    let nodes: Vec<(String, String)> = (0..12).map(|i| (format!("n{}", i), String::new())).collect();
    let nodes: Vec<(&str, &str)> = nodes.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();

    let session = session(&mut desc(&nodes, &[]), 3)?;
    let executor = TestExecutor::new().with_delay(Duration::from_millis(10));
    session.build(&BuildRequest::all("Build"), &executor)?;
    assert_eq!(executor.runs().len(), 12);
    assert!(executor.max_active() <= 3, "{} ran at once", executor.max_active());
    Ok(())
}

#[test]
fn single_worker_follows_declaration_order() -> anyhow::Result<()> {
    let session = session(
        &mut desc(&[("c", ""), ("b", ""), ("a", "")], &[("c", "a")]),
        1,
    )?;
    let executor = TestExecutor::new();
    session.build(&BuildRequest::all("Build"), &executor)?;
    assert_eq!(executor.runs(), ["b", "a", "c"]);
    Ok(())
}

#[test]
fn touched_leaf_rebuilds_root_in_root_scope() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let leaf_src = dir.path().join("leaf.txt");
    std::fs::write(&leaf_src, "v1")?;
    let mut graph = desc(&[("Root", "root inputs")], &[("Root", "Leaf")]);
    graph
        .nodes
        .push(incbuild::NodeDesc::new("Leaf").input(leaf_src.clone()));
    let session = session(&mut graph, 2)?;

    session.build(&BuildRequest::all("Build"), &TestExecutor::new())?;

    std::fs::write(&leaf_src, "v2")?;
    let executor = TestExecutor::new();
    let results = session.build(&BuildRequest::root("Build", "Root"), &executor)?;
    assert_eq!(executor.runs(), ["Leaf", "Root"]);
    assert_eq!(results["Root"].state, BuildState::Succeeded);
    Ok(())
}
