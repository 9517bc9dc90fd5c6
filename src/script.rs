//! Engine script generation.
//!
//! One script per job, emitted in a fixed order: for every extension module a print
//! directive carrying [`MODULE_LOADING_MARKER`] followed by its load directive, then a
//! settle delay, the automation command, and the save/quit bracket for the mode.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Printed before each module load; the output scanner keys on it.
pub const MODULE_LOADING_MARKER: &str = "MODULE LOADING:";

/// How the engine is invoked, which decides the open/save/quit bracket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMode {
    /// `<engine> /i <drawing> /s <script>`: the engine opens the drawing itself.
    #[default]
    Batch,
    /// `<engine> /nologo /b <script>`: the script opens the drawing.
    Headless,
}

impl ScriptMode {
    /// Engine arguments for this mode.
    pub fn engine_args(self, item_path: &Path, script_path: &Path) -> Vec<std::ffi::OsString> {
        match self {
            ScriptMode::Batch => vec![
                "/i".into(),
                item_path.as_os_str().to_owned(),
                "/s".into(),
                script_path.as_os_str().to_owned(),
            ],
            ScriptMode::Headless => vec![
                "/nologo".into(),
                "/b".into(),
                script_path.as_os_str().to_owned(),
            ],
        }
    }
}

/// Everything needed to write one job's script.
#[derive(Debug, Clone)]
pub struct ScriptSpec<'a> {
    pub item_path: &'a Path,
    pub modules: &'a [PathBuf],
    pub command_name: &'a str,
    pub output_dir: &'a Path,
    pub output_file: &'a str,
    pub settle_delay: Duration,
    pub mode: ScriptMode,
}

/// A script on disk. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct ScriptFile {
    file: NamedTempFile,
}

impl ScriptFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

pub struct JobScriptBuilder;

impl JobScriptBuilder {
    /// Renders the script text.
    pub fn build(spec: &ScriptSpec<'_>) -> String {
        let mut out = String::new();

        if spec.mode == ScriptMode::Headless {
            let _ = writeln!(out, "_.OPEN \"{}\"", script_path(spec.item_path));
        }

        let total = spec.modules.len();
        for (i, module) in spec.modules.iter().enumerate() {
            let name = module
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| module.display().to_string());
            let resolved = std::path::absolute(module).unwrap_or_else(|_| module.clone());
            let _ = writeln!(
                out,
                "(princ \"\\n{MODULE_LOADING_MARKER} [{}/{total}] {} -> {}\\n\")",
                i + 1,
                lisp_escape(&name),
                lisp_escape(&script_path(&resolved)),
            );
            out.push_str(&load_directive(&resolved));
            out.push('\n');
        }

        let _ = writeln!(out, "_.DELAY {}", spec.settle_delay.as_millis());
        let _ = writeln!(
            out,
            "(princ \"\\nRunning {} -> {}\\n\")",
            lisp_escape(spec.command_name),
            lisp_escape(&script_path(&spec.output_dir.join(spec.output_file))),
        );
        let _ = writeln!(out, "{}", spec.command_name);

        match spec.mode {
            ScriptMode::Batch => {
                out.push_str("_.QSAVE\n");
                out.push_str("_.QUIT\n");
            }
            ScriptMode::Headless => {
                out.push_str("_.QSAVE\n");
                out.push_str("_.CLOSE\n");
                out.push_str("_.QUIT\n");
            }
        }
        out
    }

    /// Writes the script to a fresh temporary file unique to `job_tag`.
    pub fn write_temp(spec: &ScriptSpec<'_>, job_tag: &str) -> std::io::Result<ScriptFile> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("batchcheck-{job_tag}-"))
            .suffix(".scr")
            .tempfile()?;
        file.write_all(Self::build(spec).as_bytes())?;
        file.flush()?;
        Ok(ScriptFile { file })
    }
}

/// Load directive chosen by module extension.
fn load_directive(module: &Path) -> String {
    let path = script_path(module);
    let ext = module
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("dll") => format!("_.NETLOAD \"{path}\""),
        Some("arx") => format!("(arxload \"{}\")", lisp_escape(&path)),
        _ => format!("(load \"{}\")", lisp_escape(&path)),
    }
}

/// Paths in scripts use forward slashes; the engine accepts both.
fn script_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

fn lisp_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
