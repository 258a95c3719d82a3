//! Interface de linha de comando do jarsweep baseada em clap.
//!
//! Três posicionais opcionais (descompilador, diretório de entrada,
//! diretório de saída) e flags que sobrescrevem `jarsweep.toml`.

use std::path::PathBuf;

use clap::Parser;

/// jarsweep: descompila em lote um diretório de JARs com prazo por arquivo.
#[derive(Debug, Parser)]
#[command(name = "jarsweep", version, about)]
pub struct Cli {
    /// Caminho do descompilador (padrão: ./jd-cli.jar).
    pub tool: Option<PathBuf>,

    /// Diretório com os JARs de entrada (padrão: ./lib).
    pub input_dir: Option<PathBuf>,

    /// Diretório raiz para o código-fonte gerado (padrão: ./output).
    pub output_dir: Option<PathBuf>,

    /// Prazo por arquivo, em segundos (padrão: 180).
    #[arg(long, short, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Arquivo de configuração TOML (padrão: ./jarsweep.toml, se existir).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Grava um relatório JSON da execução neste caminho.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Executável Java usado para descompiladores `.jar`.
    #[arg(long)]
    pub java: Option<PathBuf>,

    /// Habilita logs de depuração.
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,

    /// Desativa o spinner; imprime apenas as linhas de status.
    #[arg(long, short, default_value_t = false)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_without_arguments() {
        let cli = Cli::parse_from(["jarsweep"]);
        assert!(cli.tool.is_none());
        assert!(cli.input_dir.is_none());
        assert!(cli.output_dir.is_none());
        assert!(cli.timeout.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_positionals_in_order() {
        let cli = Cli::parse_from(["jarsweep", "/opt/jd-cli.jar", "deps", "src-out"]);
        assert_eq!(cli.tool, Some(PathBuf::from("/opt/jd-cli.jar")));
        assert_eq!(cli.input_dir, Some(PathBuf::from("deps")));
        assert_eq!(cli.output_dir, Some(PathBuf::from("src-out")));
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "jarsweep",
            "--timeout",
            "600",
            "--report",
            "run.json",
            "--quiet",
            "-v",
        ]);
        assert_eq!(cli.timeout, Some(600));
        assert_eq!(cli.report, Some(PathBuf::from("run.json")));
        assert!(cli.quiet);
        assert!(cli.verbose);
    }

    #[test]
    fn cli_rejects_zero_timeout() {
        assert!(Cli::try_parse_from(["jarsweep", "--timeout", "0"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
