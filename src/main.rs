mod cli;
mod config;
mod error;
mod logging;
mod oracle;
mod orchestrator;
mod report;
mod runner;
mod state_machine;
mod ui;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use cli::Cli;
use config::SweepConfig;
use error::BatchError;
use oracle::CompletionOracle;
use orchestrator::{BatchOrchestrator, BatchPlan};
use report::BatchReport;
use runner::{DecompilerRunner, ToolCommand};
use ui::{BatchConsole, Verbosity};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = tokio::select! {
        outcome = run(cli) => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{} interrupted", style("error:").red().bold());
            return ExitCode::from(130);
        }
    };

    match outcome {
        Ok(report) if report.tally.failed > 0 => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            let label = match err.downcast_ref::<BatchError>() {
                Some(e) if e.is_configuration() => "configuration error:",
                _ => "error:",
            };
            eprintln!("{} {err:#}", style(label).red().bold());
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<BatchReport> {
    let mut config = SweepConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli)?;
    logging::init(&config.log_level)?;

    let plan = BatchPlan {
        tool_path: config.tool_path.clone(),
        input_dir: config.input_dir.clone(),
        output_dir: config.output_dir.clone(),
        input_extension: config.input_extension.clone(),
    };
    let tool = ToolCommand::for_tool(&config.tool_path, &config.java)
        .with_output_flag(config.output_flag.clone());
    let runner = DecompilerRunner::new(tool, &config.output_dir, config.deadline());

    let verbosity = if cli.quiet {
        Verbosity::Plain
    } else {
        Verbosity::Spinner
    };
    let orchestrator = BatchOrchestrator::new(
        runner,
        CompletionOracle::new(config.artifact_extension.clone()),
        BatchConsole::new(verbosity),
    );

    let report = orchestrator.run_batch(&plan).await?;

    if let Some(path) = &cli.report {
        report
            .write_to(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    Ok(report)
}
