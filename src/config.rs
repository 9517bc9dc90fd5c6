//! Configuração do batchcheck carregada a partir de `batchcheck.toml`.
//!
//! A struct [`BatchConfig`] contém todos os parâmetros configuráveis da execução.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `BATCHCHECK_ENGINE` tem precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::script::ScriptMode;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "batchcheck.toml";

/// Variável de ambiente que sobrescreve `engine_path`.
pub const ENGINE_ENV: &str = "BATCHCHECK_ENGINE";

/// Configuração de nível superior carregada de `batchcheck.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Executável do engine externo.
    #[serde(default = "default_engine_path")]
    pub engine_path: PathBuf,

    /// Argumentos extras passados antes dos argumentos do modo (ex.: `/l en-US`).
    #[serde(default)]
    pub engine_args: Vec<String>,

    /// Modo de invocação: `batch` (`/i <desenho> /s <script>`) ou `headless` (`/nologo /b <script>`).
    #[serde(default)]
    pub mode: ScriptMode,

    /// Módulos de extensão carregados em ordem antes do comando.
    #[serde(default)]
    pub modules: Vec<PathBuf>,

    /// Nome do comando de automação executado pelo engine.
    #[serde(default = "default_command_name")]
    pub command_name: String,

    /// Diretório raiz de saída; cada execução cria um subdiretório com timestamp.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Máximo de processos do engine rodando ao mesmo tempo.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Limite por job em segundos antes de matar o processo.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Espera após carregar os módulos, em milissegundos.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Documento JSON usado como template compartilhado.
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Tabela delimitada com overrides por item.
    #[serde(default)]
    pub overrides: Option<PathBuf>,

    /// Coluna que contém a identidade do item. Sem ela, usa a primeira coluna.
    #[serde(default)]
    pub identity_column: Option<String>,

    /// Delimitador da tabela de overrides.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Módulo compartilhado cuja falha de carga é sinalizada no resumo.
    #[serde(default = "default_shared_module")]
    pub shared_module: String,

    /// Extensões aceitas ao varrer diretórios de entrada.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

// Valor padrão para o engine: "accoreconsole.exe".
fn default_engine_path() -> PathBuf {
    PathBuf::from("accoreconsole.exe")
}

// Valor padrão para o comando de automação.
fn default_command_name() -> String {
    "CHECKSTANDARDS".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("batchcheck-output")
}

// Valor padrão para o paralelismo: 4.
fn default_max_parallel() -> usize {
    4
}

// Valor padrão para o timeout: 10 minutos.
fn default_timeout_secs() -> u64 {
    600
}

// Valor padrão para a espera pós-carga: 2000ms.
fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_delimiter() -> char {
    ','
}

fn default_shared_module() -> String {
    "Newtonsoft.Json".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["dwg".to_string()]
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            engine_path: default_engine_path(),
            engine_args: Vec::new(),
            mode: ScriptMode::default(),
            modules: Vec::new(),
            command_name: default_command_name(),
            output_dir: default_output_dir(),
            max_parallel: default_max_parallel(),
            timeout_secs: default_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            template: None,
            overrides: None,
            identity_column: None,
            delimiter: default_delimiter(),
            shared_module: default_shared_module(),
            extensions: default_extensions(),
        }
    }
}

impl BatchConfig {
    /// Carrega a configuração de `path`, ou de `batchcheck.toml` no diretório atual.
    /// Usa valores padrão se o arquivo padrão não existir; um caminho explícito ausente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para o engine.
        if let Ok(engine) = std::env::var(ENGINE_ENV)
            && !engine.is_empty()
        {
            config.engine_path = PathBuf::from(engine);
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<BatchConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Rejeita combinações que tornariam a execução impossível.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            anyhow::bail!("max_parallel must be at least 1");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be at least 1");
        }
        if self.command_name.trim().is_empty() {
            anyhow::bail!("command_name must not be empty");
        }
        if !self.delimiter.is_ascii() {
            anyhow::bail!("delimiter must be a single ASCII character");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
