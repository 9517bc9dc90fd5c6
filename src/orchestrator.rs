use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::{ConfigurationAssembler, Resolution};
use crate::classify::OutcomeClassifier;
use crate::context::RunContext;
use crate::coordinator::ConcurrencyCoordinator;
use crate::events::{EventSink, RunEvent};
use crate::executor::JobExecutor;
use crate::report::{ReportAggregator, RunSummary};
use crate::state_machine::{Job, JobResult, JobState, StateMachine};
use crate::work::WorkItem;

/// Drives a whole run: resolve every item, dispatch the resolvable ones, summarize.
pub struct BatchOrchestrator<E: JobExecutor> {
    assembler: ConfigurationAssembler,
    coordinator: ConcurrencyCoordinator,
    executor: Arc<E>,
    events: Arc<dyn EventSink>,
}

impl<E: JobExecutor> BatchOrchestrator<E> {
    pub fn new(
        assembler: ConfigurationAssembler,
        coordinator: ConcurrencyCoordinator,
        executor: E,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            assembler,
            coordinator,
            executor: Arc::new(executor),
            events,
        }
    }

    /// Resolves the configuration for one item and moves the job out of `Discovered`.
    ///
    /// Returns the job ready for dispatch, or the finished result of a job that
    /// must not run.
    pub fn prepare(&self, item: &WorkItem) -> Result<Job, JobResult> {
        let mut job = Job::new(item);
        job.configuration = self.assembler.resolve(item);

        if let Resolution::Resolved(cfg) = &job.configuration {
            if cfg.matched.is_none() {
                debug!(identity = %job.identity, "template only");
            }
            StateMachine::advance(&mut job, JobState::ConfigResolved);
            return Ok(job);
        }

        warn!(identity = %job.identity, "no configuration available, item will not be processed");
        StateMachine::advance(&mut job, JobState::ConfigUnavailable);
        job.classify(OutcomeClassifier::configuration_unavailable());
        self.events.emit(RunEvent::ConfigurationUnavailable {
            identity: job.identity.clone(),
        });
        Err(JobResult::from_job(&job))
    }

    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        run: &RunContext,
        cancel: CancellationToken,
    ) -> RunSummary {
        let started_at = Utc::now();
        self.events.emit(RunEvent::RunStarted {
            total: items.len(),
            run_dir: run.run_dir.clone(),
        });
        info!(items = items.len(), run_dir = %run.run_dir.display(), "run started");

        let mut aggregator = ReportAggregator::new();
        let mut ready = Vec::with_capacity(items.len());
        for item in &items {
            match self.prepare(item) {
                Ok(job) => ready.push(job),
                Err(result) => {
                    self.events.emit(RunEvent::JobFinished {
                        identity: result.identity.clone(),
                        outcome: result.outcome,
                        reason: result.reason.clone(),
                    });
                    aggregator.record(result);
                }
            }
        }

        let results = self
            .coordinator
            .run(Arc::clone(&self.executor), ready, &cancel, &self.events)
            .await;
        for result in results {
            aggregator.record(result);
        }

        let summary = aggregator.finish(&run.timestamp, &run.run_dir, started_at, cancel.is_cancelled());
        self.events.emit(RunEvent::RunFinished);
        info!(
            successful = summary.successful.len(),
            failed_validation = summary.failed_validation.len(),
            non_processed = summary.non_processed.len(),
            "run finished"
        );
        summary
    }
}
