//! Executes one resolved job against the engine.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::assembler::Resolution;
use crate::classify::{Classification, OutcomeClassifier, artifact_name};
use crate::context::RunContext;
use crate::events::{EventSink, RunEvent};
use crate::runner::ProcessRunner;
use crate::runner::env::JobParameters;
use crate::script::{JobScriptBuilder, ScriptMode, ScriptSpec};
use crate::state_machine::{Job, JobResult, JobState, StateMachine};

/// Runs a dispatched job to a terminal state.
///
/// The coordinator only schedules; implementations own everything between dispatch and
/// the final [`JobResult`]. Implementations must not fail: every problem becomes part of
/// the result.
pub trait JobExecutor: Send + Sync + 'static {
    fn execute(&self, job: Job, cancel: CancellationToken) -> impl Future<Output = JobResult> + Send;
}

/// Script settings shared by every job of a run.
#[derive(Debug, Clone)]
pub struct ScriptSettings {
    pub modules: Vec<PathBuf>,
    pub command_name: String,
    pub settle_delay: Duration,
    pub mode: ScriptMode,
}

/// Writes the job script, runs the engine, and classifies what it left behind.
pub struct EngineExecutor {
    runner: ProcessRunner,
    script: ScriptSettings,
    run: RunContext,
    classifier: OutcomeClassifier,
    events: Arc<dyn EventSink>,
}

impl EngineExecutor {
    pub fn new(
        runner: ProcessRunner,
        script: ScriptSettings,
        run: RunContext,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let classifier = OutcomeClassifier::new(&run.run_dir);
        Self {
            runner,
            script,
            run,
            classifier,
            events,
        }
    }
}

impl JobExecutor for EngineExecutor {
    async fn execute(&self, mut job: Job, cancel: CancellationToken) -> JobResult {
        let content = match &job.configuration {
            Resolution::Resolved(cfg) => Some(cfg.content.clone()),
            Resolution::Unavailable => None,
        };
        let Some(content) = content else {
            // Filtered out before dispatch; kept as a guard.
            StateMachine::advance(&mut job, JobState::Crashed);
            job.classify(OutcomeClassifier::configuration_unavailable());
            return JobResult::from_job(&job);
        };

        let output_file = artifact_name(&job.identity);
        let spec = ScriptSpec {
            item_path: &job.item_path,
            modules: &self.script.modules,
            command_name: &self.script.command_name,
            output_dir: &self.run.run_dir,
            output_file: &output_file,
            settle_delay: self.script.settle_delay,
            mode: self.script.mode,
        };
        let script = match JobScriptBuilder::write_temp(&spec, job.tag()) {
            Ok(script) => script,
            Err(e) => {
                error!(identity = %job.identity, "could not write engine script: {e}");
                StateMachine::advance(&mut job, JobState::Crashed);
                job.classify(Classification::non_processed(format!(
                    "could not write engine script: {e}"
                )));
                return JobResult::from_job(&job);
            }
        };
        job.script_path = Some(script.path().to_path_buf());

        let params = JobParameters {
            identity: job.identity.clone(),
            output_dir: self.run.run_dir.display().to_string(),
            output_file,
            run_timestamp: self.run.timestamp.clone(),
            configuration: content,
        };

        StateMachine::advance(&mut job, JobState::Running);
        self.events.emit(RunEvent::JobStarted {
            identity: job.identity.clone(),
        });
        info!(identity = %job.identity, item = %job.item_path.display(), "job started");

        let report = self
            .runner
            .run(&job.item_path, script, &params, &cancel, self.events.as_ref())
            .await;

        job.started_at = Some(report.started_at);
        job.ended_at = Some(report.ended_at);
        job.exit_code = report.exit_code();
        job.shared_module_failure = report.shared_module_failure;
        StateMachine::advance(&mut job, JobState::after(&report.termination));
        job.classify(self.classifier.classify(&job.identity, &report.termination));
        job.load_errors = report.load_errors;
        job.output = report.output;

        info!(
            identity = %job.identity,
            state = %job.state,
            exit_code = ?job.exit_code,
            "job finished"
        );
        JobResult::from_job(&job)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::assembler::{ConfigurationAssembler, TemplateConfiguration};
    use crate::classify::Outcome;
    use crate::events::NullSink;
    use crate::runner::EngineCommand;
    use crate::runner::scan::KeywordLineClassifier;
    use crate::work::WorkItem;
    use std::path::Path;

    fn executor(root: &Path, body: &str, timeout: Duration) -> (EngineExecutor, RunContext) {
        let fake = root.join("fake-engine.sh");
        std::fs::write(&fake, format!("#!/bin/sh\n{body}\n")).unwrap();
        let run = RunContext::create(&root.join("out")).unwrap();
        let runner = ProcessRunner::new(
            EngineCommand {
                program: PathBuf::from("/bin/sh"),
                extra_args: vec![fake.display().to_string()],
                mode: ScriptMode::Batch,
            },
            timeout,
            Arc::new(KeywordLineClassifier::new("Newtonsoft.Json")),
        );
        let settings = ScriptSettings {
            modules: vec![],
            command_name: "CHECKSTANDARDS".into(),
            settle_delay: Duration::ZERO,
            mode: ScriptMode::Batch,
        };
        (
            EngineExecutor::new(runner, settings, run.clone(), Arc::new(NullSink)),
            run,
        )
    }

    fn resolved_job() -> Job {
        let item = WorkItem::from_path("/in/Drawing1.dwg").unwrap();
        let template = TemplateConfiguration::parse(r#"{"checkLayers":true}"#).unwrap();
        let assembler = ConfigurationAssembler::new(Some(template), None);
        let mut job = Job::new(&item);
        job.configuration = assembler.resolve(&item);
        StateMachine::advance(&mut job, JobState::ConfigResolved);
        StateMachine::advance(&mut job, JobState::Dispatched);
        job
    }

    #[tokio::test]
    async fn report_written_by_engine_is_a_validation_failure() {
        let root = tempfile::tempdir().unwrap();
        let (exec, run) = executor(
            root.path(),
            "echo '{}' > \"$BATCHCHECK_OUTPUT_DIR/$BATCHCHECK_OUTPUT_FILE\"",
            Duration::from_secs(10),
        );
        let result = exec.execute(resolved_job(), CancellationToken::new()).await;

        assert_eq!(result.outcome, Outcome::FailedValidation);
        assert_eq!(result.exit_code, Some(0));
        assert!(run.run_dir.join("Drawing1.json").exists());
        assert_eq!(result.state_transitions.last(), Some(&JobState::Completed));
    }

    #[tokio::test]
    async fn clean_exit_without_report_is_success() {
        let root = tempfile::tempdir().unwrap();
        let (exec, _) = executor(root.path(), "exit 1", Duration::from_secs(10));
        let result = exec.execute(resolved_job(), CancellationToken::new()).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.exit_code, Some(1));
        assert!(result.started_at.is_some() && result.duration_ms.is_some());
    }

    #[tokio::test]
    async fn timeout_is_not_processed_even_with_report() {
        let root = tempfile::tempdir().unwrap();
        let (exec, _) = executor(
            root.path(),
            "echo '{}' > \"$BATCHCHECK_OUTPUT_DIR/$BATCHCHECK_OUTPUT_FILE\"\nexec sleep 30",
            Duration::from_millis(500),
        );
        let result = exec.execute(resolved_job(), CancellationToken::new()).await;

        assert_eq!(result.outcome, Outcome::NonProcessed);
        assert_eq!(result.state_transitions.last(), Some(&JobState::TimedOut));
        assert!(result.reason.unwrap().contains("timed out"));
    }
}
