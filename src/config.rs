//! Configuração do jarsweep carregada a partir de `jarsweep.toml`.
//!
//! A struct [`SweepConfig`] contém todos os parâmetros configuráveis.
//! Valores ausentes no arquivo usam defaults sensíveis; flags da CLI
//! sobrescrevem o arquivo (ver [`SweepConfig::apply_cli`]).
//! `JAVA_HOME` é usado quando `java` não foi configurado explicitamente.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::BatchError;
use crate::runner::DEFAULT_DEADLINE;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "jarsweep.toml";

/// Configuração de nível superior carregada de `jarsweep.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Caminho do descompilador (um `.jar` roda via `java -jar`).
    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,

    /// Diretório com os arquivos de entrada.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Diretório raiz de saída; cada arquivo ganha um subdiretório.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Tempo máximo por tentativa, em segundos.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extensão dos arquivos de entrada.
    #[serde(default = "default_input_extension")]
    pub input_extension: String,

    /// Extensão dos arquivos que indicam saída válida.
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,

    /// Flag que precede o diretório de saída na linha de comando do descompilador.
    #[serde(default = "default_output_flag")]
    pub output_flag: String,

    /// Executável Java usado para ferramentas `.jar`.
    #[serde(default = "default_java")]
    pub java: PathBuf,

    /// Filtro de log do tracing (ex.: "warn", "jarsweep=debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("./jd-cli.jar")
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("./lib")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_DEADLINE.as_secs()
}

fn default_input_extension() -> String {
    "jar".to_string()
}

fn default_artifact_extension() -> String {
    "java".to_string()
}

fn default_output_flag() -> String {
    "-od".to_string()
}

fn default_java() -> PathBuf {
    PathBuf::from("java")
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            timeout_secs: default_timeout_secs(),
            input_extension: default_input_extension(),
            artifact_extension: default_artifact_extension(),
            output_flag: default_output_flag(),
            java: default_java(),
            log_level: default_log_level(),
        }
    }
}

impl SweepConfig {
    /// Carrega `explicit` se informado (erro se não existir), senão
    /// `jarsweep.toml` no diretório atual, senão os valores padrão.
    pub fn load(explicit: Option<&Path>) -> Result<Self, BatchError> {
        let mut config = match explicit {
            Some(path) if !path.exists() => {
                return Err(BatchError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        if config.java == default_java()
            && let Some(home) = std::env::var_os("JAVA_HOME").filter(|h| !h.is_empty())
        {
            config.java = java_in_home(Path::new(&home));
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, BatchError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<SweepConfig>(&contents)?)
    }

    /// Valores da linha de comando têm precedência sobre o arquivo.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), BatchError> {
        if let Some(tool) = &cli.tool {
            self.tool_path = tool.clone();
        }
        if let Some(input) = &cli.input_dir {
            self.input_dir = input.clone();
        }
        if let Some(output) = &cli.output_dir {
            self.output_dir = output.clone();
        }
        if let Some(secs) = cli.timeout {
            self.timeout_secs = secs;
        }
        if let Some(java) = &cli.java {
            self.java = java.clone();
        }
        if cli.verbose {
            self.log_level = "debug".to_string();
        }
        self.validate()
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), BatchError> {
        if self.timeout_secs == 0 {
            return Err(BatchError::Config(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.input_extension.is_empty() || self.artifact_extension.is_empty() {
            return Err(BatchError::Config("extensions must not be empty".to_string()));
        }
        Ok(())
    }
}

fn java_in_home(home: &Path) -> PathBuf {
    let bin = home.join("bin");
    if cfg!(windows) {
        bin.join("java.exe")
    } else {
        bin.join("java")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = SweepConfig::default();
        assert_eq!(config.timeout_secs, 180);
        assert_eq!(config.input_extension, "jar");
        assert_eq!(config.artifact_extension, "java");
        assert_eq!(config.output_flag, "-od");
        assert_eq!(config.input_dir, PathBuf::from("./lib"));
        assert_eq!(config.deadline(), Duration::from_secs(180));
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            timeout_secs = 60
            output_dir = "/srv/sources"
        "#;
        let config: SweepConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.output_dir, PathBuf::from("/srv/sources"));
        assert_eq!(config.tool_path, PathBuf::from("./jd-cli.jar"));
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = toml::from_str::<SweepConfig>("timeout = 10");
        assert!(result.is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = SweepConfig::load(Some(Path::new("/definitely/not/jarsweep.toml"))).unwrap_err();
        assert!(matches!(err, BatchError::Config(_)));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "timeout_secs = 5\njava = \"/opt/jdk/bin/java\"\n").unwrap();
        let config = SweepConfig::load(Some(&path)).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.java, PathBuf::from("/opt/jdk/bin/java"));
    }

    #[test]
    fn zero_timeout_in_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "timeout_secs = 0\n").unwrap();
        assert!(SweepConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn cli_overrides_file() {
        let mut config = SweepConfig::default();
        let cli = Cli::parse_from(["jarsweep", "tools/jd.jar", "deps", "--timeout", "30", "-v"]);
        config.apply_cli(&cli).unwrap();
        assert_eq!(config.tool_path, PathBuf::from("tools/jd.jar"));
        assert_eq!(config.input_dir, PathBuf::from("deps"));
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn java_home_layout() {
        let java = java_in_home(Path::new("/opt/jdk"));
        assert!(java.starts_with("/opt/jdk/bin"));
    }
}
