//! Run summary.
//!
//! Folds per-job results into three disjoint lists and renders them. Everything is
//! sorted by identity so two runs over the same inputs produce the same summary.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Outcome;
use crate::error::Result;
use crate::state_machine::JobResult;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonProcessedItem {
    pub identity: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_timestamp: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub total: usize,
    pub successful: Vec<String>,
    pub failed_validation: Vec<String>,
    pub non_processed: Vec<NonProcessedItem>,
    /// At least one job could not load the shared module.
    pub shared_module_load_failure: bool,
    pub load_errors: BTreeMap<String, Vec<String>>,
    pub cancelled: bool,
    pub jobs: Vec<JobResult>,
}

impl RunSummary {
    /// Nothing failed and nothing was skipped.
    pub fn is_clean(&self) -> bool {
        self.failed_validation.is_empty() && self.non_processed.is_empty()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run {} ({} items)", self.run_timestamp, self.total);
        let _ = writeln!(out, "  successful:         {}", self.successful.len());
        let _ = writeln!(out, "  failed validation:  {}", self.failed_validation.len());
        let _ = writeln!(out, "  not processed:      {}", self.non_processed.len());

        if !self.failed_validation.is_empty() {
            let _ = writeln!(out, "\nFailed validation:");
            for identity in &self.failed_validation {
                let _ = writeln!(out, "  - {identity}");
            }
        }
        if !self.non_processed.is_empty() {
            let _ = writeln!(out, "\nNot processed:");
            for item in &self.non_processed {
                let _ = writeln!(out, "  - {}: {}", item.identity, item.reason);
            }
        }
        if !self.load_errors.is_empty() {
            let _ = writeln!(out, "\nLoad errors:");
            for (identity, lines) in &self.load_errors {
                for line in lines {
                    let _ = writeln!(out, "  - {identity}: {line}");
                }
            }
        }
        if self.shared_module_load_failure {
            let _ = writeln!(
                out,
                "\nThe shared module failed to load in at least one job; check the engine's module search path."
            );
        }
        if self.cancelled {
            let _ = writeln!(out, "\nThe run was cancelled.");
        }
        let _ = writeln!(
            out,
            "\nOutput: {}\nDuration: {:.1}s",
            self.run_dir.display(),
            self.duration_ms as f64 / 1000.0
        );
        out
    }
}

/// Collects job results as they arrive.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    results: Vec<JobResult>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: JobResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn finish(
        mut self,
        run_timestamp: &str,
        run_dir: &Path,
        started_at: DateTime<Utc>,
        cancelled: bool,
    ) -> RunSummary {
        let ended_at = Utc::now();
        self.results.sort_by(|a, b| a.identity.cmp(&b.identity));

        let mut successful = Vec::new();
        let mut failed_validation = Vec::new();
        let mut non_processed = Vec::new();
        let mut load_errors = BTreeMap::new();
        let mut shared_module_load_failure = false;

        for result in &self.results {
            match result.outcome {
                Outcome::Success => successful.push(result.identity.clone()),
                Outcome::FailedValidation => failed_validation.push(result.identity.clone()),
                Outcome::NonProcessed => non_processed.push(NonProcessedItem {
                    identity: result.identity.clone(),
                    reason: result
                        .reason
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                }),
            }
            if !result.load_errors.is_empty() {
                load_errors.insert(result.identity.clone(), result.load_errors.clone());
            }
            shared_module_load_failure |= result.shared_module_failure;
        }

        RunSummary {
            run_timestamp: run_timestamp.to_string(),
            run_dir: run_dir.to_path_buf(),
            started_at,
            ended_at,
            duration_ms: (ended_at - started_at).num_milliseconds(),
            total: self.results.len(),
            successful,
            failed_validation,
            non_processed,
            shared_module_load_failure,
            load_errors,
            cancelled,
            jobs: self.results,
        }
    }
}
