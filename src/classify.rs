//! Final verdict for a job.
//!
//! The engine-side command writes `<identity>.json` into the run directory only when it
//! found violations. A clean check leaves nothing behind, so for a job whose process ran
//! to completion an absent artifact means success. The exit code is recorded but does
//! not take part in the verdict.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::runner::Termination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    FailedValidation,
    NonProcessed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::FailedValidation => write!(f, "failed validation"),
            Outcome::NonProcessed => write!(f, "not processed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub outcome: Outcome,
    pub reason: Option<String>,
}

impl Classification {
    pub fn success() -> Self {
        Self {
            outcome: Outcome::Success,
            reason: None,
        }
    }

    pub fn failed_validation(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::FailedValidation,
            reason: Some(reason.into()),
        }
    }

    pub fn non_processed(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::NonProcessed,
            reason: Some(reason.into()),
        }
    }
}

/// Name of the violation report for `identity`.
pub fn artifact_name(identity: &str) -> String {
    format!("{identity}.json")
}

/// Classifies finished jobs against one run directory.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    run_dir: PathBuf,
}

impl OutcomeClassifier {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn artifact_path(&self, identity: &str) -> PathBuf {
        self.run_dir.join(artifact_name(identity))
    }

    /// Abnormal terminations are never processed, whatever is on disk; only a process
    /// that ran to completion is judged by the artifact.
    pub fn classify(&self, identity: &str, termination: &Termination) -> Classification {
        match termination {
            Termination::Exited { .. } => {
                let artifact = self.artifact_path(identity);
                if artifact_exists(&artifact) {
                    Classification::failed_validation(format!(
                        "violations reported in {}",
                        artifact.display()
                    ))
                } else {
                    Classification::success()
                }
            }
            Termination::TimedOut(after) => {
                Classification::non_processed(format!("timed out after {}s", after.as_secs()))
            }
            Termination::Cancelled => Classification::non_processed("cancelled"),
            Termination::SpawnFailed(e) => {
                Classification::non_processed(format!("engine failed to start: {e}"))
            }
            Termination::WaitFailed(e) => {
                Classification::non_processed(format!("lost track of engine process: {e}"))
            }
        }
    }

    pub fn configuration_unavailable() -> Classification {
        Classification::non_processed("no configuration available (no template and no matching override row)")
    }
}

fn artifact_exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn artifact_present_means_failed_validation_even_on_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Drawing1.json"), "{\"violations\":[]}").unwrap();
        let classifier = OutcomeClassifier::new(dir.path());

        let c = classifier.classify("Drawing1", &Termination::Exited { exit_code: Some(0) });
        assert_eq!(c.outcome, Outcome::FailedValidation);
        assert!(c.reason.unwrap().contains("Drawing1.json"));
    }

    #[test]
    fn absent_artifact_means_success_even_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = OutcomeClassifier::new(dir.path());

        let c = classifier.classify("Drawing1", &Termination::Exited { exit_code: Some(7) });
        assert_eq!(c, Classification::success());

        let c = classifier.classify("Drawing1", &Termination::Exited { exit_code: None });
        assert_eq!(c.outcome, Outcome::Success);
    }

    #[test]
    fn other_items_artifacts_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Drawing2.json"), "{}").unwrap();
        let classifier = OutcomeClassifier::new(dir.path());
        let c = classifier.classify("Drawing1", &Termination::Exited { exit_code: Some(0) });
        assert_eq!(c.outcome, Outcome::Success);
    }

    #[test]
    fn abnormal_termination_wins_over_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Drawing1.json"), "{}").unwrap();
        let classifier = OutcomeClassifier::new(dir.path());

        let c = classifier.classify("Drawing1", &Termination::TimedOut(Duration::from_secs(600)));
        assert_eq!(c, Classification::non_processed("timed out after 600s"));

        let c = classifier.classify("Drawing1", &Termination::Cancelled);
        assert_eq!(c.outcome, Outcome::NonProcessed);

        let c = classifier.classify("Drawing1", &Termination::SpawnFailed("No such file".into()));
        assert_eq!(c.outcome, Outcome::NonProcessed);
        assert!(c.reason.unwrap().contains("No such file"));
    }

    #[test]
    fn unavailable_configuration_is_non_processed() {
        let c = OutcomeClassifier::configuration_unavailable();
        assert_eq!(c.outcome, Outcome::NonProcessed);
        assert!(c.reason.unwrap().contains("no configuration"));
    }

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Outcome::FailedValidation).unwrap(),
            "\"failed_validation\""
        );
    }
}
