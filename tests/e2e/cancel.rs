use crate::e2e::*;
use incbuild::progress::RecordingProgress;
use incbuild::{BuildRequest, BuildState, BuildStatus, CancelToken, Error};

fn five() -> incbuild::GraphDescription {
    desc(
        &[("n0", ""), ("n1", ""), ("n2", ""), ("n3", ""), ("n4", "")],
        &[],
    )
}

#[test]
fn cancel_stops_new_work_and_keeps_finished() -> anyhow::Result<()> {
    let session = session(&mut five(), 1)?;
    let token = CancelToken::new();
    let executor = TestExecutor::new().cancel_after(token.clone(), 2);
    let mut progress = RecordingProgress::default();

    let err = session
        .work(&mut progress)
        .with_cancel(token)
        .execute(&BuildRequest::all("Build"), &executor)
        .unwrap_err();
    let partial = match err {
        Error::Cancelled(results) => results,
        other => panic!("expected cancellation, got {:?}", other),
    };
    assert_eq!(partial.keys().collect::<Vec<_>>(), ["n0", "n1"]);
    assert!(partial.values().all(|r| r.state == BuildState::Succeeded));
    assert_eq!(progress.status, Some(BuildStatus::Cancelled));
    for name in ["n2", "n3", "n4"] {
        let id = session.graph().find(name)?;
        assert_eq!(session.store().state(id), BuildState::Pending);
    }

    // The next pass picks up where the cancelled one stopped.
    let executor = TestExecutor::new();
    let results = session.build(&BuildRequest::all("Build"), &executor)?;
    assert_eq!(executor.runs(), ["n2", "n3", "n4"]);
    assert_eq!(results["n0"].state, BuildState::CacheHit);
    assert_eq!(results.len(), 5);
    Ok(())
}

#[test]
fn cancelled_before_start_runs_nothing() -> anyhow::Result<()> {
    let session = session(&mut five(), 2)?;
    let token = CancelToken::new();
    token.cancel();
    let executor = TestExecutor::new();
    let mut progress = RecordingProgress::default();

    let result = session
        .work(&mut progress)
        .with_cancel(token)
        .execute(&BuildRequest::all("Build"), &executor);
    assert!(matches!(result, Err(Error::Cancelled(ref r)) if r.is_empty()));
    assert!(executor.runs().is_empty());
    assert!(progress.started.is_empty());
    Ok(())
}
