//! Async-fork orchestrator
//!
//! After the cleaner returns, two lanes run concurrently: publish (build
//! envelope, fan out) and intelligence (extract, persist). Lanes are
//! spawned as independent tasks so a caller that disconnects cannot tear
//! them down mid-write, results are collected as values, and neither
//! lane's failure ever becomes the caller's error. The lanes share no
//! mutable state; the request context crosses by value/clone only.

use tracing::{error, info};
use uuid::Uuid;

/// What happened on each lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkOutcome {
    pub publish_ok: bool,
    pub intelligence_ok: bool,
}

/// Run the publish and intelligence lanes to completion and report
/// per-lane outcomes. Failures (errors and panics alike) are logged with
/// the lane name and absorbed.
pub async fn run_fork<P, I>(interaction_id: Uuid, publish_lane: P, intelligence_lane: I) -> ForkOutcome
where
    P: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    I: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let publish_handle = tokio::spawn(publish_lane);
    let intelligence_handle = tokio::spawn(intelligence_lane);

    let (publish_result, intelligence_result) =
        tokio::join!(publish_handle, intelligence_handle);

    let publish_ok = settle("publish", interaction_id, publish_result);
    let intelligence_ok = settle("intelligence", interaction_id, intelligence_result);

    info!(
        interaction_id = %interaction_id,
        publish_ok,
        intelligence_ok,
        "Async fork complete"
    );

    ForkOutcome {
        publish_ok,
        intelligence_ok,
    }
}

fn settle(
    lane: &str,
    interaction_id: Uuid,
    result: Result<anyhow::Result<()>, tokio::task::JoinError>,
) -> bool {
    match result {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!(
                lane,
                interaction_id = %interaction_id,
                error = %err,
                "Lane failed"
            );
            false
        }
        Err(join_err) => {
            error!(
                lane,
                interaction_id = %interaction_id,
                error = %join_err,
                "Lane panicked or was aborted"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn both_lanes_succeed() {
        let outcome = run_fork(Uuid::new_v4(), async { Ok(()) }, async { Ok(()) }).await;
        assert!(outcome.publish_ok);
        assert!(outcome.intelligence_ok);
    }

    #[tokio::test]
    async fn publish_failure_does_not_stop_intelligence() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        let outcome = run_fork(
            Uuid::new_v4(),
            async { anyhow::bail!("stream unreachable") },
            async move {
                ran_clone.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert!(!outcome.publish_ok);
        assert!(outcome.intelligence_ok);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn intelligence_panic_does_not_stop_publish() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        let outcome = run_fork(
            Uuid::new_v4(),
            async move {
                ran_clone.store(true, Ordering::SeqCst);
                Ok(())
            },
            async { panic!("extractor exploded") },
        )
        .await;

        assert!(outcome.publish_ok);
        assert!(!outcome.intelligence_ok);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn lanes_survive_caller_cancellation() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        let fork = tokio::spawn(run_fork(
            Uuid::new_v4(),
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                ran_clone.store(true, Ordering::SeqCst);
                Ok(())
            },
            async { Ok(()) },
        ));

        // Simulate the caller going away while lanes are inflight
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        fork.abort();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(
            ran.load(Ordering::SeqCst),
            "spawned lane must run to completion after caller cancellation"
        );
    }
}
