//! Cancellation semantics: requests take effect between steps only, the
//! in-flight step finishes, and the terminal outcome is reported as
//! cancelled; never succeeded.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{registry_with, request, Harness, ScriptedApi, TestHandler, TEST_CATEGORY};
use provisio::{Capabilities, JobPhase, JobStatus};
use tokio::sync::Notify;

async fn wait_for(check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn cancellation_during_invoking_lets_the_call_finish() {
    let handler = Arc::new(TestHandler::new(Capabilities::EXTERNAL));
    let gate = Arc::new(Notify::new());
    let api = Arc::new(ScriptedApi::with_gate(gate.clone()));
    let harness = Harness::with_api(registry_with(handler.clone()), api);

    let mut handle = harness
        .orchestrator
        .submit(request("job-30", TEST_CATEGORY))
        .await
        .unwrap();

    // Wait until the external call is in flight, then cancel.
    let api = harness.api.clone();
    wait_for(|| api.calls.load(Ordering::SeqCst) == 1).await;
    assert!(harness.orchestrator.cancel("job-30").await);

    // Release the in-flight call; it must be allowed to complete.
    gate.notify_one();

    assert_eq!(handle.await_terminal().await, JobPhase::Failed);
    assert_eq!(harness.api.completed.load(Ordering::SeqCst), 1);

    // The boundary after the call observed the cancellation: no wait step.
    assert_eq!(handler.wait_calls.load(Ordering::SeqCst), 0);

    let events = harness.sink.events();
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Cancelled);
    assert!(events.iter().all(|e| e.status != JobStatus::Succeeded));
}

#[tokio::test]
async fn cancelling_an_unknown_or_finished_job_is_refused() {
    let handler = Arc::new(TestHandler::new(Capabilities::NONE));
    let harness = Harness::new(registry_with(handler));

    assert!(!harness.orchestrator.cancel("never-submitted").await);

    let mut handle = harness
        .orchestrator
        .submit(request("job-31", TEST_CATEGORY))
        .await
        .unwrap();
    assert_eq!(handle.await_terminal().await, JobPhase::Succeeded);
    assert!(!harness.orchestrator.cancel("job-31").await);
}
