//! Environment contract between the runner and the engine-side command.

pub const ITEM_ID: &str = "BATCHCHECK_ITEM_ID";
pub const OUTPUT_DIR: &str = "BATCHCHECK_OUTPUT_DIR";
pub const OUTPUT_FILE: &str = "BATCHCHECK_OUTPUT_FILE";
pub const RUN_TIMESTAMP: &str = "BATCHCHECK_RUN_TIMESTAMP";
/// Always set; empty means "read `BATCHCHECK_CONFIG_CONTENT`".
pub const CONFIG_PATH: &str = "BATCHCHECK_CONFIG_PATH";
pub const CONFIG_CONTENT: &str = "BATCHCHECK_CONFIG_CONTENT";

/// Per-job values handed to the engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParameters {
    pub identity: String,
    pub output_dir: String,
    pub output_file: String,
    pub run_timestamp: String,
    /// Serialized job configuration, delivered inline.
    pub configuration: String,
}

impl JobParameters {
    /// Variables to set on the child. The configuration travels inline so concurrent
    /// jobs never share a file.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            (ITEM_ID, self.identity.clone()),
            (OUTPUT_DIR, self.output_dir.clone()),
            (OUTPUT_FILE, self.output_file.clone()),
            (RUN_TIMESTAMP, self.run_timestamp.clone()),
            (CONFIG_PATH, String::new()),
            (CONFIG_CONTENT, self.configuration.clone()),
        ]
    }
}
