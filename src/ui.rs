//! Interface de terminal do batchcheck: barra de progresso e resumo colorido.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`RunProgress`] consome os [`RunEvent`]s da execução
//! e nunca participa das decisões do orquestrador.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::classify::Outcome;
use crate::events::RunEvent;
use crate::report::RunSummary;

const BAR_TEMPLATE: &str = "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}";

/// Indicador visual de progresso para uma execução em lote.
///
/// Mostra quantos itens terminaram e imprime uma linha colorida para cada item
/// que falhou na validação (vermelho) ou não foi processado (amarelo).
pub struct RunProgress {
    // Barra de progresso do indicatif; fica oculta até o início da execução.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    // Também imprime os itens bem-sucedidos.
    verbose: bool,
}

impl RunProgress {
    pub fn new(verbose: bool) -> Self {
        let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            verbose,
        }
    }

    /// Atualiza a barra de acordo com um evento.
    pub fn handle(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { total, run_dir } => {
                self.pb.set_length(*total as u64);
                self.pb.set_message(format!("-> {}", run_dir.display()));
                self.pb.enable_steady_tick(Duration::from_millis(100));
            }
            RunEvent::JobStarted { identity } => {
                self.pb.set_message(identity.clone());
            }
            RunEvent::ConfigurationUnavailable { .. } | RunEvent::ModuleLoading { .. } => {}
            RunEvent::LoadError {
                identity,
                line,
                shared_module,
            } => {
                let label = if *shared_module { "shared module" } else { "load error" };
                self.pb.println(format!(
                    "  {} {identity}: {label}: {line}",
                    self.yellow.apply_to("!")
                ));
            }
            RunEvent::JobFinished {
                identity,
                outcome,
                reason,
            } => {
                self.pb.inc(1);
                let reason = reason.as_deref().unwrap_or_default();
                match outcome {
                    Outcome::Success if self.verbose => {
                        self.pb.println(format!("  {} {identity}", self.green.apply_to("✓")));
                    }
                    Outcome::Success => {}
                    Outcome::FailedValidation => {
                        self.pb.println(format!("  {} {identity}", self.red.apply_to("✗")));
                    }
                    Outcome::NonProcessed => {
                        self.pb.println(format!(
                            "  {} {identity}: {reason}",
                            self.yellow.apply_to("–")
                        ));
                    }
                }
            }
            RunEvent::RunFinished => self.pb.finish_and_clear(),
        }
    }

    /// Consome eventos até o canal fechar.
    pub async fn drive(self, mut events: UnboundedReceiver<RunEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        self.pb.finish_and_clear();
    }
}

/// Imprime o resumo final com estilo colorido.
pub fn print_summary(summary: &RunSummary) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let yellow = Style::new().yellow().bold();

    println!();
    println!("─── Run {} ───", summary.run_timestamp);
    println!("  {} successful", green.apply_to(summary.successful.len()));
    println!("  {} failed validation", red.apply_to(summary.failed_validation.len()));
    println!("  {} not processed", yellow.apply_to(summary.non_processed.len()));

    for identity in &summary.failed_validation {
        println!("  {} {identity}", red.apply_to("✗"));
    }
    for item in &summary.non_processed {
        println!("  {} {}: {}", yellow.apply_to("–"), item.identity, item.reason);
    }
    if summary.shared_module_load_failure {
        println!(
            "\n  {} the shared module failed to load; check the engine's module search path",
            yellow.apply_to("!")
        );
    }
    if summary.cancelled {
        println!("\n  {}", yellow.apply_to("run cancelled"));
    }
    println!("\n  output: {}", summary.run_dir.display());
}
