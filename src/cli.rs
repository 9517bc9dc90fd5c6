//! Interface de linha de comando do batchcheck baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, resolve, script)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::BatchConfig;
use crate::script::ScriptMode;

/// batchcheck: executa verificações de padrão de desenho em lote num motor headless.
#[derive(Debug, Parser)]
#[command(name = "batchcheck", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: `batchcheck.toml` no diretório atual).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Modo de invocação do motor aceito pela CLI, mapeado para [`ScriptMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// O motor abre o desenho (`/i <desenho> /s <script>`).
    Batch,
    /// O script abre o desenho (`/nologo /b <script>`).
    Headless,
}

impl From<ModeArg> for ScriptMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Batch => ScriptMode::Batch,
            ModeArg::Headless => ScriptMode::Headless,
        }
    }
}

/// Flags que sobrescrevem o arquivo de configuração.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Executável do motor.
    #[arg(long)]
    pub engine: Option<PathBuf>,

    /// Modo de invocação do motor.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Configuração base em JSON compartilhada por todos os itens.
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Tabela CSV com uma linha de sobrescrita por item.
    #[arg(long)]
    pub overrides: Option<PathBuf>,

    /// Coluna de identidade da tabela (padrão: a primeira coluna).
    #[arg(long)]
    pub identity_column: Option<String>,

    /// Módulo de extensão a carregar; pode ser repetido.
    #[arg(long = "module")]
    pub modules: Vec<PathBuf>,

    /// Diretório raiz de saída.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Número máximo de processos do motor em paralelo.
    #[arg(long, short = 'j')]
    pub max_parallel: Option<usize>,

    /// Tempo limite por item, em segundos.
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl ConfigArgs {
    /// Aplica as flags informadas sobre a configuração carregada.
    pub fn apply(&self, config: &mut BatchConfig) {
        if let Some(engine) = &self.engine {
            config.engine_path = engine.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(template) = &self.template {
            config.template = Some(template.clone());
        }
        if let Some(overrides) = &self.overrides {
            config.overrides = Some(overrides.clone());
        }
        if let Some(column) = &self.identity_column {
            config.identity_column = Some(column.clone());
        }
        if !self.modules.is_empty() {
            config.modules = self.modules.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(n) = self.max_parallel {
            config.max_parallel = n;
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa os desenhos informados (arquivos ou diretórios).
    Run {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Mostra a configuração resolvida de cada item sem iniciar o motor.
    Resolve {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Imprime o script que seria gerado para um item.
    Script {
        item: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

impl Command {
    pub fn config_args(&self) -> &ConfigArgs {
        match self {
            Command::Run { config, .. }
            | Command::Resolve { config, .. }
            | Command::Script { config, .. } => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["batchcheck", "run", "drawings/", "extra.dwg", "-j", "2"]);
        match cli.command {
            Command::Run { inputs, config } => {
                assert_eq!(inputs, vec![PathBuf::from("drawings/"), PathBuf::from("extra.dwg")]);
                assert_eq!(config.max_parallel, Some(2));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn run_requires_inputs() {
        assert!(Cli::try_parse_from(["batchcheck", "run"]).is_err());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "batchcheck",
            "resolve",
            "a.dwg",
            "--config",
            "other.toml",
            "--verbose",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));
        assert!(matches!(cli.command, Command::Resolve { .. }));
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "batchcheck",
            "script",
            "a.dwg",
            "--engine",
            "/opt/engine",
            "--mode",
            "headless",
            "--module",
            "a.dll",
            "--module",
            "b.lsp",
            "--timeout",
            "30",
        ]);
        let mut config = BatchConfig::default();
        cli.command.config_args().apply(&mut config);

        assert_eq!(config.engine_path, PathBuf::from("/opt/engine"));
        assert_eq!(config.mode, ScriptMode::Headless);
        assert_eq!(config.modules, vec![PathBuf::from("a.dll"), PathBuf::from("b.lsp")]);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_parallel, BatchConfig::default().max_parallel);
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
