//! Bounded-parallel job dispatch.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::classify::Classification;
use crate::events::{EventSink, RunEvent};
use crate::executor::JobExecutor;
use crate::state_machine::{Job, JobResult, JobState, StateMachine};

/// Runs jobs with at most `max_parallel` in flight.
///
/// Each job gets a fresh task; nothing is shared between concurrent jobs except the
/// result list. Once the run is cancelled no further job is dispatched, and every job
/// that was never started is still reported.
#[derive(Debug, Clone)]
pub struct ConcurrencyCoordinator {
    max_parallel: usize,
}

impl ConcurrencyCoordinator {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Runs every job to completion and returns one result per job, in completion order.
    pub async fn run<E: JobExecutor>(
        &self,
        executor: Arc<E>,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
        events: &Arc<dyn EventSink>,
    ) -> Vec<JobResult> {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let results = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let mut tasks = JoinSet::new();
        let mut pending = jobs.into_iter();

        while let Some(mut job) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    results.lock().await.push(not_dispatched(job, events.as_ref()));
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        results.lock().await.push(not_dispatched(job, events.as_ref()));
                        break;
                    }
                },
            };

            StateMachine::advance(&mut job, JobState::Dispatched);
            debug!(identity = %job.identity, in_flight = self.max_parallel - semaphore.available_permits(), "dispatched");

            let executor = Arc::clone(&executor);
            let results = Arc::clone(&results);
            let events = Arc::clone(events);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let mut fallback = JobResult::from_job(&job);
                let result = AssertUnwindSafe(executor.execute(job, cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!(identity = %fallback.identity, "job worker panicked");
                        fallback.mark_non_processed("job worker panicked");
                        fallback
                    });
                events.emit(RunEvent::JobFinished {
                    identity: result.identity.clone(),
                    outcome: result.outcome,
                    reason: result.reason.clone(),
                });
                results.lock().await.push(result);
            });
        }

        let skipped: Vec<JobResult> = pending.map(|job| not_dispatched(job, events.as_ref())).collect();
        if !skipped.is_empty() {
            info!(count = skipped.len(), "run cancelled, jobs left undispatched");
        }
        results.lock().await.extend(skipped);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("job task failed: {e}");
            }
        }

        let mut results = results.lock().await;
        std::mem::take(&mut *results)
    }
}

fn not_dispatched(mut job: Job, events: &dyn EventSink) -> JobResult {
    StateMachine::advance(&mut job, JobState::Cancelled);
    job.classify(Classification::non_processed("run cancelled before the job started"));
    let result = JobResult::from_job(&job);
    events.emit(RunEvent::JobFinished {
        identity: result.identity.clone(),
        outcome: result.outcome,
        reason: result.reason.clone(),
    });
    result
}
