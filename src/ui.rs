//! Interface de terminal do jarsweep: spinner e linhas de status coloridas.
//!
//! Usa `indicatif` para o spinner enquanto o descompilador roda e `console`
//! para as cores. [`BatchConsole`] imprime o cabeçalho, as linhas por arquivo
//! e o resumo final; [`ItemProgress`] acompanha uma única tentativa.

use std::path::Path;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::report::RunTally;
use crate::state_machine::{Item, TaskOutcome};

const RULE_WIDTH: usize = 50;

/// Quanto o console deve mostrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Nada (usado nos testes).
    #[cfg_attr(not(test), allow(dead_code))]
    Silent,
    /// Somente linhas de status, sem spinner.
    Plain,
    /// Linhas de status e spinner durante cada tentativa.
    Spinner,
}

/// Saída de console de um lote.
pub struct BatchConsole {
    verbosity: Verbosity,
    // Verde para sucesso.
    green: Style,
    // Vermelho para falha.
    red: Style,
    // Amarelo para timeout e retentativa.
    yellow: Style,
    // Esmaecido para arquivos pulados.
    dim: Style,
}

impl BatchConsole {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    #[cfg(test)]
    pub fn silent() -> Self {
        Self::new(Verbosity::Silent)
    }

    fn line(&self, text: impl AsRef<str>) {
        if self.verbosity != Verbosity::Silent {
            println!("{}", text.as_ref());
        }
    }

    /// Cabeçalho impresso antes da primeira passada.
    pub fn header(&self, total: usize, output_dir: &Path, deadline: Duration) {
        self.line(format!("Found {total} archive(s)"));
        self.line(format!("Output directory: {}", output_dir.display()));
        self.line(format!("Timeout: {}s", deadline.as_secs()));
        self.line("-".repeat(RULE_WIDTH));
    }

    pub fn skipped(&self, item: &Item) {
        self.line(format!(
            "{} {} - prior output found",
            self.dim.apply_to("[skip]"),
            item.file_name()
        ));
    }

    /// Inicia o acompanhamento de uma tentativa.
    pub fn start(&self, item: &Item, retry: bool) -> ItemProgress<'_> {
        let verb = if retry { "Retrying" } else { "Decompiling" };
        let label = format!("{verb} {}", item.file_name());

        let pb = match self.verbosity {
            Verbosity::Silent => None,
            Verbosity::Plain => {
                println!("{label}");
                None
            }
            Verbosity::Spinner => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.cyan} {msg} [{elapsed}]")
                        .expect("invalid template"),
                );
                pb.set_message(label);
                pb.enable_steady_tick(Duration::from_millis(100));
                Some(pb)
            }
        };

        ItemProgress {
            console: self,
            pb,
            name: item.file_name(),
            retry,
        }
    }

    /// Separador antes da passada de retentativa.
    pub fn retry_pass(&self, count: usize) {
        self.line("=".repeat(RULE_WIDTH));
        self.line(format!(
            "{} {count} timed-out archive(s)...",
            self.yellow.apply_to("Retrying")
        ));
        self.line("-".repeat(RULE_WIDTH));
    }

    /// Resumo final com todos os contadores.
    pub fn summary(&self, tally: &RunTally, output_dir: &Path) {
        self.line("=".repeat(RULE_WIDTH));
        self.line(self.summary_line(tally));
        self.line(format!("Sources written to: {}", output_dir.display()));
    }

    fn summary_line(&self, tally: &RunTally) -> String {
        let style = if tally.failed > 0 { &self.red } else { &self.green };
        format!(
            "{} {} archive(s), succeeded {}, failed {}, retried {}, skipped {}, timed out {}",
            style.apply_to("Done:"),
            tally.total,
            tally.succeeded,
            tally.failed,
            tally.retried,
            tally.skipped,
            tally.timed_out
        )
    }

    fn outcome_line(&self, name: &str, outcome: &TaskOutcome, deadline: Duration, retry: bool) -> String {
        match outcome {
            TaskOutcome::Succeeded => format!("{} {name}", self.green.apply_to("[ok]")),
            TaskOutcome::Failed { diagnostic } => {
                let mut text = format!("{} {name}", self.red.apply_to("[fail]"));
                for (i, line) in diagnostic.lines().enumerate() {
                    let prefix = if i == 0 { "  error: " } else { "         " };
                    text.push('\n');
                    text.push_str(prefix);
                    text.push_str(line);
                }
                text
            }
            TaskOutcome::TimedOut => {
                let tail = if retry { "again" } else { "will retry" };
                format!(
                    "{} {name} - exceeded {}s, {tail}",
                    self.yellow.apply_to("[timeout]"),
                    deadline.as_secs()
                )
            }
        }
    }
}

/// Uma tentativa em andamento.
pub struct ItemProgress<'a> {
    console: &'a BatchConsole,
    pb: Option<ProgressBar>,
    name: String,
    retry: bool,
}

impl ItemProgress<'_> {
    /// Finaliza o spinner e imprime o resultado da tentativa.
    pub fn complete(self, outcome: &TaskOutcome, deadline: Duration) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
        let line = self
            .console
            .outcome_line(&self.name, outcome, deadline, self.retry);
        self.console.line(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_lines() {
        console::set_colors_enabled(false);
        let ui = BatchConsole::silent();
        let deadline = Duration::from_secs(180);

        assert_eq!(
            ui.outcome_line("a.jar", &TaskOutcome::Succeeded, deadline, false),
            "[ok] a.jar"
        );
        assert_eq!(
            ui.outcome_line("c.jar", &TaskOutcome::TimedOut, deadline, false),
            "[timeout] c.jar - exceeded 180s, will retry"
        );
        assert_eq!(
            ui.outcome_line("c.jar", &TaskOutcome::TimedOut, deadline, true),
            "[timeout] c.jar - exceeded 180s again"
        );
        assert_eq!(
            ui.outcome_line(
                "b.jar",
                &TaskOutcome::Failed {
                    diagnostic: "first\nsecond".into()
                },
                deadline,
                false
            ),
            "[fail] b.jar\n  error: first\n         second"
        );
    }

    #[test]
    fn summary_line_lists_every_counter() {
        console::set_colors_enabled(false);
        let ui = BatchConsole::silent();
        let tally = RunTally {
            total: 3,
            succeeded: 2,
            failed: 0,
            retried: 1,
            skipped: 1,
            timed_out: 1,
            pending_retry: Vec::new(),
        };
        assert_eq!(
            ui.summary_line(&tally),
            "Done: 3 archive(s), succeeded 2, failed 0, retried 1, skipped 1, timed out 1"
        );

        let tally = RunTally {
            failed: 1,
            succeeded: 1,
            retried: 0,
            ..tally
        };
        assert_eq!(
            ui.summary_line(&tally),
            "Done: 3 archive(s), succeeded 1, failed 1, retried 0, skipped 1, timed out 1"
        );
    }

    #[test]
    fn silent_progress_completes() {
        let ui = BatchConsole::silent();
        let item = Item::from_path(Path::new("lib/a.jar")).unwrap();
        let progress = ui.start(&item, true);
        assert!(progress.pb.is_none());
        progress.complete(&TaskOutcome::Succeeded, Duration::from_secs(1));
    }
}
