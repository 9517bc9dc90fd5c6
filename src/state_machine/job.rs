use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobState;
use crate::assembler::{MatchStrategy, Resolution};
use crate::classify::{Classification, Outcome};
use crate::work::WorkItem;

/// One unit of work: a single item processed by a single engine invocation.
///
/// Owned by exactly one worker while running; nothing about a job is shared with
/// another job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub identity: String,
    pub item_path: PathBuf,
    pub configuration: Resolution,
    pub script_path: Option<PathBuf>,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub output: String,
    pub exit_code: Option<i32>,
    pub load_errors: Vec<String>,
    pub shared_module_failure: bool,
    pub was_processed: bool,
    pub success: bool,
    pub error_message: Option<String>,
    pub classification: Option<Classification>,
}

impl Job {
    pub fn new(item: &WorkItem) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identity: item.identity.clone(),
            item_path: item.path.clone(),
            configuration: Resolution::Unavailable,
            script_path: None,
            state: JobState::Discovered,
            state_history: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            output: String::new(),
            exit_code: None,
            load_errors: Vec::new(),
            shared_module_failure: false,
            was_processed: false,
            success: false,
            error_message: None,
            classification: None,
        }
    }

    /// Short tag used in temp file names.
    pub fn tag(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }

    pub fn match_strategy(&self) -> Option<MatchStrategy> {
        match &self.configuration {
            Resolution::Resolved(cfg) => cfg.matched.as_ref().map(|(_, s)| *s),
            Resolution::Unavailable => None,
        }
    }

    /// Records the final verdict and derives the processed/success flags from it.
    pub fn classify(&mut self, classification: Classification) {
        self.was_processed = classification.outcome != Outcome::NonProcessed;
        self.success = classification.outcome == Outcome::Success;
        self.error_message = classification.reason.clone();
        self.classification = Some(classification);
    }
}

/// Serializable per-job record produced when a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub identity: String,
    pub item_path: PathBuf,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
    pub match_strategy: Option<MatchStrategy>,
    pub load_errors: Vec<String>,
    pub shared_module_failure: bool,
    pub state_transitions: Vec<JobState>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl JobResult {
    pub fn from_job(job: &Job) -> Self {
        let mut transitions = job.state_history.clone();
        transitions.push(job.state);

        let (outcome, reason) = match &job.classification {
            Some(c) => (c.outcome, c.reason.clone()),
            None => (Outcome::NonProcessed, Some("job was never classified".into())),
        };
        let duration_ms = match (job.started_at, job.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };

        Self {
            job_id: job.id.clone(),
            identity: job.identity.clone(),
            item_path: job.item_path.clone(),
            outcome,
            reason,
            exit_code: job.exit_code,
            match_strategy: job.match_strategy(),
            load_errors: job.load_errors.clone(),
            shared_module_failure: job.shared_module_failure,
            state_transitions: transitions,
            started_at: job.started_at,
            ended_at: job.ended_at,
            duration_ms,
        }
    }

    /// Rewrites the record as not processed, e.g. when the worker died mid-job.
    pub fn mark_non_processed(&mut self, reason: impl Into<String>) {
        self.outcome = Outcome::NonProcessed;
        self.reason = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job() -> Job {
        Job::new(&WorkItem::from_path("/in/Drawing1.dwg").unwrap())
    }

    #[test]
    fn job_creation_defaults() {
        let job = make_job();
        assert_eq!(job.identity, "Drawing1");
        assert_eq!(job.state, JobState::Discovered);
        assert!(job.configuration.is_unavailable());
        assert!(!job.was_processed);
        assert!(job.state_history.is_empty());
        assert_eq!(job.tag().len(), 8);
    }

    #[test]
    fn classification_sets_flags() {
        let mut job = make_job();
        job.classify(Classification::success());
        assert!(job.was_processed && job.success);
        assert_eq!(job.error_message, None);

        job.classify(Classification::failed_validation("report written"));
        assert!(job.was_processed && !job.success);

        job.classify(Classification::non_processed("timed out after 600s"));
        assert!(!job.was_processed && !job.success);
        assert_eq!(job.error_message.as_deref(), Some("timed out after 600s"));
    }

    #[test]
    fn result_from_unclassified_job_is_non_processed() {
        let job = make_job();
        let result = JobResult::from_job(&job);
        assert_eq!(result.outcome, Outcome::NonProcessed);
        assert_eq!(result.state_transitions, vec![JobState::Discovered]);
        assert_eq!(result.duration_ms, None);
    }

    #[test]
    fn result_carries_duration_and_transitions() {
        let mut job = make_job();
        let start = Utc::now();
        job.started_at = Some(start);
        job.ended_at = Some(start + chrono::Duration::milliseconds(1500));
        job.state_history = vec![JobState::Discovered, JobState::ConfigResolved];
        job.state = JobState::Cancelled;
        job.classify(Classification::non_processed("cancelled"));

        let result = JobResult::from_job(&job);
        assert_eq!(result.duration_ms, Some(1500));
        assert_eq!(result.state_transitions.last(), Some(&JobState::Cancelled));
        assert_eq!(result.reason.as_deref(), Some("cancelled"));
    }

    #[test]
    fn result_serialization_roundtrip() {
        let mut job = make_job();
        job.classify(Classification::success());
        let result = JobResult::from_job(&job);
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("\"reason\""));
        let back: JobResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
