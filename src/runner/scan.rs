//! Classification of engine output lines.
//!
//! Kept apart from process handling so the heuristics can be exercised on plain strings.

use crate::script::MODULE_LOADING_MARKER;

/// Something worth recording about one output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineDiagnostic {
    /// The module-loading marker printed by the job script.
    ModuleLoading(String),
    /// A module or assembly failed to load.
    LoadError {
        line: String,
        /// The line names the configured shared module.
        shared_module: bool,
    },
}

/// Turns one line of engine output into an optional diagnostic.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> Option<LineDiagnostic>;
}

/// Vocabulary that places a line in module/assembly loading territory.
const LOAD_VOCABULARY: &[&str] = &[
    "load",
    "assembly",
    "module",
    "netload",
    "arxload",
    "dependency",
];

const FAILURE_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "cannot",
    "unable",
    "not found",
    "exception",
    "could not",
];

/// Keyword-based classifier matching the engine's load-failure messages.
#[derive(Debug, Clone)]
pub struct KeywordLineClassifier {
    shared_module: String,
}

impl KeywordLineClassifier {
    pub fn new(shared_module: impl Into<String>) -> Self {
        Self {
            shared_module: shared_module.into().to_lowercase(),
        }
    }
}

impl LineClassifier for KeywordLineClassifier {
    fn classify(&self, line: &str) -> Option<LineDiagnostic> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.contains(MODULE_LOADING_MARKER) {
            return Some(LineDiagnostic::ModuleLoading(trimmed.to_string()));
        }

        let lower = trimmed.to_lowercase();
        let about_loading = LOAD_VOCABULARY.iter().any(|w| lower.contains(w));
        let failed = FAILURE_KEYWORDS.iter().any(|w| lower.contains(w));
        if !(about_loading && failed) {
            return None;
        }

        let shared_module = !self.shared_module.is_empty() && lower.contains(&self.shared_module);
        Some(LineDiagnostic::LoadError {
            line: trimmed.to_string(),
            shared_module,
        })
    }
}
