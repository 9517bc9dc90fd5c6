//! Engine process supervision.
//!
//! [`ProcessRunner`] launches one engine process per job with a generated script, streams
//! both output pipes line by line through a [`LineClassifier`], and enforces the job
//! timeout and run cancellation by killing the process.

pub mod env;
pub mod scan;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventSink, RunEvent};
use crate::script::{ScriptFile, ScriptMode};
use env::JobParameters;
use scan::{LineClassifier, LineDiagnostic};

/// How long to keep reading pipes after the process is gone. A grandchild that
/// inherited the pipes can hold them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How the engine process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Ran to completion. `None` when the platform reports no code (killed by a signal).
    Exited { exit_code: Option<i32> },
    TimedOut(Duration),
    Cancelled,
    SpawnFailed(String),
    WaitFailed(String),
}

/// Everything observed while one engine process ran.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub termination: Termination,
    pub output: String,
    pub load_errors: Vec<String>,
    pub shared_module_failure: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl ProcessReport {
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited { exit_code } => exit_code,
            _ => None,
        }
    }
}

/// The engine executable and how to call it.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: PathBuf,
    /// Placed before the mode arguments.
    pub extra_args: Vec<String>,
    pub mode: ScriptMode,
}

pub struct ProcessRunner {
    engine: EngineCommand,
    timeout: Duration,
    classifier: Arc<dyn LineClassifier>,
}

impl ProcessRunner {
    pub fn new(engine: EngineCommand, timeout: Duration, classifier: Arc<dyn LineClassifier>) -> Self {
        Self {
            engine,
            timeout,
            classifier,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, item_path: &Path, script: &ScriptFile, params: &JobParameters) -> Command {
        let mut cmd = Command::new(&self.engine.program);
        cmd.args(&self.engine.extra_args)
            .args(self.engine.mode.engine_args(item_path, script.path()))
            .envs(params.env_vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs one engine process to the end.
    ///
    /// Takes the script by value: it is deleted when this call returns, however the
    /// process ended. Never returns an error; failures are reported as a [`Termination`].
    pub async fn run(
        &self,
        item_path: &Path,
        script: ScriptFile,
        params: &JobParameters,
        cancel: &CancellationToken,
        events: &dyn EventSink,
    ) -> ProcessReport {
        let mut scan = OutputScan::new(self.classifier.as_ref(), &params.identity, events);
        let started_at = Utc::now();

        let mut child = match self.command(item_path, &script, params).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(identity = %params.identity, program = %self.engine.program.display(), "failed to start engine: {e}");
                return scan.finish(Termination::SpawnFailed(e.to_string()), started_at);
            }
        };
        debug!(identity = %params.identity, pid = ?child.id(), script = %script.path().display(), "engine started");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let termination = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(identity = %params.identity, "cancelling engine process");
                    kill(&mut child, &params.identity).await;
                    break Termination::Cancelled;
                }
                _ = &mut deadline => {
                    warn!(identity = %params.identity, "engine exceeded {}s, killing it", self.timeout.as_secs());
                    kill(&mut child, &params.identity).await;
                    break Termination::TimedOut(self.timeout);
                }
                status = child.wait() => {
                    break match status {
                        Ok(status) => Termination::Exited { exit_code: status.code() },
                        Err(e) => Termination::WaitFailed(e.to_string()),
                    };
                }
                Some(line) = rx.recv() => scan.push(&line),
            }
        };

        let drain = async {
            while let Some(line) = rx.recv().await {
                scan.push(&line);
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            debug!(identity = %params.identity, "output pipes still open after exit, abandoning them");
        }
        for reader in readers {
            reader.abort();
        }
        drop(script);

        debug!(identity = %params.identity, ?termination, "engine finished");
        scan.finish(termination, started_at)
    }
}

async fn kill(child: &mut Child, identity: &str) {
    if let Err(e) = child.kill().await {
        warn!(%identity, "failed to kill engine process: {e}");
    }
}

/// Forwards decoded lines until EOF or a read error.
fn spawn_reader<R>(pipe: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(decode_line(&buf)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("stopped reading engine output: {e}");
                    break;
                }
            }
        }
    })
}

/// Lossy UTF-8 with line endings and NULs removed. The engine's console output is
/// UTF-16-ish on some hosts, which shows up as NULs between characters.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| !matches!(c, '\0' | '\r' | '\n'))
        .collect()
}

/// Accumulates output and diagnostics for one process.
struct OutputScan<'a> {
    classifier: &'a dyn LineClassifier,
    identity: &'a str,
    events: &'a dyn EventSink,
    output: String,
    load_errors: Vec<String>,
    shared_module_failure: bool,
}

impl<'a> OutputScan<'a> {
    fn new(classifier: &'a dyn LineClassifier, identity: &'a str, events: &'a dyn EventSink) -> Self {
        Self {
            classifier,
            identity,
            events,
            output: String::new(),
            load_errors: Vec::new(),
            shared_module_failure: false,
        }
    }

    fn push(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');

        match self.classifier.classify(line) {
            Some(LineDiagnostic::ModuleLoading(line)) => {
                info!(identity = %self.identity, "{line}");
                self.events.emit(RunEvent::ModuleLoading {
                    identity: self.identity.to_string(),
                    line,
                });
            }
            Some(LineDiagnostic::LoadError { line, shared_module }) => {
                warn!(identity = %self.identity, shared_module, "load error: {line}");
                self.shared_module_failure |= shared_module;
                self.events.emit(RunEvent::LoadError {
                    identity: self.identity.to_string(),
                    line: line.clone(),
                    shared_module,
                });
                self.load_errors.push(line);
            }
            None => {}
        }
    }

    fn finish(self, termination: Termination, started_at: DateTime<Utc>) -> ProcessReport {
        ProcessReport {
            termination,
            output: self.output,
            load_errors: self.load_errors,
            shared_module_failure: self.shared_module_failure,
            started_at,
            ended_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::script::{JobScriptBuilder, ScriptSpec};
    use scan::KeywordLineClassifier;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<RunEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: RunEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn params(dir: &Path) -> JobParameters {
        JobParameters {
            identity: "Drawing1".into(),
            output_dir: dir.display().to_string(),
            output_file: "Drawing1.json".into(),
            run_timestamp: "20240101_120000".into(),
            configuration: r#"{"checkLayers":true}"#.into(),
        }
    }

    fn script() -> ScriptFile {
        let spec = ScriptSpec {
            item_path: Path::new("/in/Drawing1.dwg"),
            modules: &[],
            command_name: "CHECKSTANDARDS",
            output_dir: Path::new("/out"),
            output_file: "Drawing1.json",
            settle_delay: Duration::ZERO,
            mode: ScriptMode::Batch,
        };
        JobScriptBuilder::write_temp(&spec, "test").unwrap()
    }

    /// Runs `body` through `/bin/sh` in place of the engine. The mode arguments land in
    /// `$1..$4` and are ignored by the fake.
    #[cfg(unix)]
    fn fake_engine(dir: &Path, body: &str, timeout: Duration) -> ProcessRunner {
        let path = dir.join("fake-engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        ProcessRunner::new(
            EngineCommand {
                program: PathBuf::from("/bin/sh"),
                extra_args: vec![path.display().to_string()],
                mode: ScriptMode::Batch,
            },
            timeout,
            Arc::new(KeywordLineClassifier::new("Newtonsoft.Json")),
        )
    }

    #[test]
    fn decode_strips_nuls_and_line_endings() {
        assert_eq!(decode_line(b"C\0o\0m\0m\0a\0n\0d\0:\r\n"), "Command:");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_engine(dir.path(), "echo hello\necho oops 1>&2\nexit 3", Duration::from_secs(10));
        let report = runner
            .run(Path::new("/in/Drawing1.dwg"), script(), &params(dir.path()), &CancellationToken::new(), &NullSink)
            .await;

        assert_eq!(report.termination, Termination::Exited { exit_code: Some(3) });
        assert_eq!(report.exit_code(), Some(3));
        assert!(report.output.contains("hello"));
        assert!(report.output.contains("oops"));
        assert!(report.ended_at >= report.started_at);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn environment_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_engine(
            dir.path(),
            "echo \"id=$BATCHCHECK_ITEM_ID\"\necho \"path=[$BATCHCHECK_CONFIG_PATH]\"\necho \"cfg=$BATCHCHECK_CONFIG_CONTENT\"\necho \"file=$BATCHCHECK_OUTPUT_FILE\"",
            Duration::from_secs(10),
        );
        let report = runner
            .run(Path::new("/in/Drawing1.dwg"), script(), &params(dir.path()), &CancellationToken::new(), &NullSink)
            .await;

        assert!(report.output.contains("id=Drawing1"));
        assert!(report.output.contains("path=[]"));
        assert!(report.output.contains(r#"cfg={"checkLayers":true}"#));
        assert!(report.output.contains("file=Drawing1.json"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_path_is_passed_and_removed_afterwards() {
        let dir = tempfile::tempdir().unwrap();
        // Batch mode: $1=/i $2=item $3=/s $4=script
        let runner = fake_engine(dir.path(), "echo \"script=$4\"\ntest -f \"$4\" && echo present", Duration::from_secs(10));
        let script = script();
        let script_path = script.path().to_path_buf();

        let report = runner
            .run(Path::new("/in/Drawing1.dwg"), script, &params(dir.path()), &CancellationToken::new(), &NullSink)
            .await;

        assert!(report.output.contains(&format!("script={}", script_path.display())));
        assert!(report.output.contains("present"));
        assert!(!script_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_engine_is_killed_at_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_engine(dir.path(), "echo started\nexec sleep 30", Duration::from_millis(300));
        let script = script();
        let script_path = script.path().to_path_buf();

        let begin = std::time::Instant::now();
        let report = runner
            .run(Path::new("/in/Drawing1.dwg"), script, &params(dir.path()), &CancellationToken::new(), &NullSink)
            .await;

        assert_eq!(report.termination, Termination::TimedOut(Duration::from_millis(300)));
        assert!(begin.elapsed() < Duration::from_secs(10));
        assert!(!script_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_kills_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_engine(dir.path(), "exec sleep 30", Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let begin = std::time::Instant::now();
        let report = runner
            .run(Path::new("/in/Drawing1.dwg"), script(), &params(dir.path()), &cancel, &NullSink)
            .await;

        assert_eq!(report.termination, Termination::Cancelled);
        assert!(begin.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_engine_is_a_spawn_failure() {
        let runner = ProcessRunner::new(
            EngineCommand {
                program: PathBuf::from("/definitely/not/an/engine"),
                extra_args: vec![],
                mode: ScriptMode::Batch,
            },
            Duration::from_secs(5),
            Arc::new(KeywordLineClassifier::new("Newtonsoft.Json")),
        );
        let dir = tempfile::tempdir().unwrap();
        let script = script();
        let script_path = script.path().to_path_buf();
        let report = runner
            .run(Path::new("/in/Drawing1.dwg"), script, &params(dir.path()), &CancellationToken::new(), &NullSink)
            .await;

        assert!(matches!(report.termination, Termination::SpawnFailed(_)));
        assert!(!script_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn load_errors_and_markers_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let runner = fake_engine(
            dir.path(),
            "echo 'MODULE LOADING: [1/1] Core.dll -> /plugins/Core.dll'\n\
             echo \"Could not load file or assembly 'Newtonsoft.Json, Version=13.0.0.0'\"\n\
             echo 'Regenerating model.'",
            Duration::from_secs(10),
        );
        let sink = RecordingSink::default();
        let report = runner
            .run(Path::new("/in/Drawing1.dwg"), script(), &params(dir.path()), &CancellationToken::new(), &sink)
            .await;

        assert_eq!(report.load_errors.len(), 1);
        assert!(report.shared_module_failure);

        let events = sink.0.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, RunEvent::ModuleLoading { line, .. } if line.contains("Core.dll"))));
        assert!(events.iter().any(|e| matches!(e, RunEvent::LoadError { shared_module: true, .. })));
    }
}
