//! Subcommand handlers used by the binary.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assembler::{ConfigurationAssembler, Resolution, TemplateConfiguration};
use crate::classify::artifact_name;
use crate::config::BatchConfig;
use crate::context::RunContext;
use crate::coordinator::ConcurrencyCoordinator;
use crate::events::{EventSink, RunEvent};
use crate::executor::{EngineExecutor, ScriptSettings};
use crate::orchestrator::BatchOrchestrator;
use crate::overrides::{OverrideTable, TableOptions};
use crate::report::SUMMARY_FILE;
use crate::runner::scan::KeywordLineClassifier;
use crate::runner::{EngineCommand, ProcessRunner};
use crate::script::{JobScriptBuilder, ScriptSpec};
use crate::ui::{self, RunProgress};
use crate::work::{self, WorkItem};

/// Loads the template and override table named by the configuration.
///
/// A bad template only costs the template; a bad override table stops the run, since
/// it was asked for explicitly and silently dropping it would change every item.
pub fn build_assembler(config: &BatchConfig) -> Result<ConfigurationAssembler> {
    let template = config.template.as_deref().and_then(TemplateConfiguration::load);

    let overrides = match &config.overrides {
        Some(path) => {
            let opts = TableOptions {
                delimiter: config.delimiter as u8,
                identity_column: config.identity_column.clone(),
            };
            let table = OverrideTable::load(path, &opts)
                .with_context(|| format!("failed to load override table {}", path.display()))?;
            info!(rows = table.len(), path = %path.display(), "override table loaded");
            Some(table)
        }
        None => None,
    };

    if template.is_none() && overrides.is_none() {
        warn!("neither a template nor an override table is configured; every item will be skipped");
    }
    Ok(ConfigurationAssembler::new(template, overrides))
}

/// `run`: processes every input and returns a failing exit code unless all items
/// passed.
pub async fn run(config: &BatchConfig, inputs: &[PathBuf], verbose: bool) -> Result<ExitCode> {
    let items = work::enumerate(inputs, &config.extensions)?;
    let assembler = build_assembler(config)?;
    let run = RunContext::create(&config.output_dir).with_context(|| {
        format!("failed to create run directory under {}", config.output_dir.display())
    })?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<RunEvent>();
    let events: Arc<dyn EventSink> = Arc::new(tx);
    let progress = tokio::spawn(RunProgress::new(verbose).drive(rx));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let runner = ProcessRunner::new(
        EngineCommand {
            program: config.engine_path.clone(),
            extra_args: config.engine_args.clone(),
            mode: config.mode,
        },
        config.timeout(),
        Arc::new(KeywordLineClassifier::new(&config.shared_module)),
    );
    let executor = EngineExecutor::new(
        runner,
        ScriptSettings {
            modules: config.modules.clone(),
            command_name: config.command_name.clone(),
            settle_delay: config.settle_delay(),
            mode: config.mode,
        },
        run.clone(),
        Arc::clone(&events),
    );
    let orchestrator = BatchOrchestrator::new(
        assembler,
        ConcurrencyCoordinator::new(config.max_parallel),
        executor,
        Arc::clone(&events),
    );

    let summary = orchestrator.run(items, &run, cancel).await;
    drop(orchestrator);
    drop(events);
    if let Err(e) = progress.await {
        warn!("progress display stopped: {e}");
    }

    let summary_path = run.run_dir.join(SUMMARY_FILE);
    summary
        .write_json(&summary_path)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    ui::print_summary(&summary);

    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// `resolve`: prints how each item's configuration would be assembled.
pub fn resolve(config: &BatchConfig, inputs: &[PathBuf]) -> Result<()> {
    let items = work::enumerate(inputs, &config.extensions)?;
    let assembler = build_assembler(config)?;

    for item in &items {
        match assembler.resolve(item) {
            Resolution::Unavailable => {
                println!("{}: no configuration (would not be processed)", item.identity);
            }
            Resolution::Resolved(cfg) => {
                let source = match &cfg.matched {
                    Some((key, strategy)) => format!("row '{key}' ({strategy})"),
                    None => "template only".to_string(),
                };
                println!("{}: {source}", item.identity);
                println!("  {}", cfg.content);
            }
        }
    }
    Ok(())
}

/// `script`: prints the engine script generated for one item.
pub fn script(config: &BatchConfig, item: &Path) -> Result<()> {
    let item = WorkItem::from_path(item)?;
    let output_dir = config.output_dir.join("<timestamp>");
    let output_file = artifact_name(&item.identity);
    let spec = ScriptSpec {
        item_path: &item.path,
        modules: &config.modules,
        command_name: &config.command_name,
        output_dir: &output_dir,
        output_file: &output_file,
        settle_delay: config.settle_delay(),
        mode: config.mode,
    };
    print!("{}", JobScriptBuilder::build(&spec));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_override_table_is_fatal() {
        let config = BatchConfig {
            overrides: Some(PathBuf::from("/definitely/missing.csv")),
            ..BatchConfig::default()
        };
        let err = build_assembler(&config).unwrap_err();
        assert!(err.to_string().contains("missing.csv"));
    }

    #[test]
    fn malformed_template_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.json");
        std::fs::write(&template, "{ not json").unwrap();
        let config = BatchConfig {
            template: Some(template),
            ..BatchConfig::default()
        };
        let assembler = build_assembler(&config).unwrap();
        assert!(!assembler.has_template());
    }

    #[test]
    fn override_table_uses_configured_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("overrides.csv");
        std::fs::write(&csv, "Name;Discipline\nDrawing1;ARCH\n").unwrap();
        let config = BatchConfig {
            overrides: Some(csv),
            delimiter: ';',
            ..BatchConfig::default()
        };
        let assembler = build_assembler(&config).unwrap();
        let item = WorkItem::from_path("/in/Drawing1.dwg").unwrap();
        match assembler.resolve(&item) {
            Resolution::Resolved(cfg) => assert_eq!(cfg.fields["discipline"], "ARCH"),
            Resolution::Unavailable => panic!("expected a resolved configuration"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_writes_summary_and_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let drawings = dir.path().join("drawings");
        std::fs::create_dir(&drawings).unwrap();
        std::fs::write(drawings.join("Clean.dwg"), b"").unwrap();
        std::fs::write(drawings.join("Dirty.dwg"), b"").unwrap();

        let template = dir.path().join("template.json");
        std::fs::write(&template, r#"{"checkLayers":true}"#).unwrap();

        // Writes a report only for Dirty.
        let fake = dir.path().join("engine.sh");
        std::fs::write(
            &fake,
            "#!/bin/sh\nif [ \"$BATCHCHECK_ITEM_ID\" = Dirty ]; then echo '{}' > \"$BATCHCHECK_OUTPUT_DIR/$BATCHCHECK_OUTPUT_FILE\"; fi\n",
        )
        .unwrap();

        let config = BatchConfig {
            engine_path: PathBuf::from("/bin/sh"),
            engine_args: vec![fake.display().to_string()],
            template: Some(template),
            output_dir: dir.path().join("out"),
            settle_delay_ms: 0,
            ..BatchConfig::default()
        };

        let code = run(&config, &[drawings], false).await.unwrap();
        assert_eq!(code, ExitCode::FAILURE);

        let run_dir = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(run_dir.join(SUMMARY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["successful"][0], "Clean");
        assert_eq!(summary["failed_validation"][0], "Dirty");
    }
}
