//! `convoflow` command line: lint flow documents and preview runs without
//! sending anything.
//!
//! ```text
//! convoflow validate demos/support_menu.yaml
//! convoflow simulate demos/support_menu.yaml --choice cancel --var name=Ana
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

use convoflow_core::VariableValue;
use convoflow_monitoring::{init_logging, LogExt, MonitoringConfig};

mod commands;

use commands::{parse_var, render_transcript, simulate_source, transcript_json, validate_source, SimulateOptions};

/// Validate and preview interactive flows
#[derive(Parser, Debug)]
#[command(name = "convoflow", author, version, about, long_about = None)]
struct Cli {
    /// Log engine internals at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse and lint a flow document (YAML or JSON)
    Validate {
        /// Path to the flow document
        file: PathBuf,
    },

    /// Run a flow through the simulator, answering prompts in order
    Simulate {
        /// Path to the flow document
        file: PathBuf,

        /// Flow to run (defaults to the first flow in the document)
        #[arg(long)]
        flow: Option<String>,

        /// Option id to answer the next prompt with; repeat for each prompt
        #[arg(long = "choice")]
        choices: Vec<String>,

        /// Starting variable as NAME=VALUE; repeatable
        #[arg(long = "var", value_parser = parse_var)]
        variables: Vec<(String, VariableValue)>,

        /// Maximum auto-advancing steps before the run is aborted
        #[arg(long)]
        step_budget: Option<u32>,

        /// Print the run as JSON
        #[arg(long)]
        json: bool,
    },
}

fn read(file: &Path) -> anyhow::Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Validate { file } => {
            let report = validate_source(&read(&file)?)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            println!("{}", report.render().trim_end());
            Ok(if report.is_valid() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Simulate {
            file,
            flow,
            choices,
            variables,
            step_budget,
            json,
        } => {
            let options = SimulateOptions {
                flow,
                choices,
                variables,
                step_budget,
            };
            debug!(?options, "Simulating");
            let simulator = simulate_source(&read(&file)?, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&transcript_json(&simulator))?);
            } else {
                print!("{}", render_transcript(&simulator));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = MonitoringConfig {
        log_filter: if cli.verbose { "debug" } else { "warn" }.to_string(),
        metrics_enabled: false,
        ..MonitoringConfig::load()
    };
    let _guard = init_logging(&config)?;

    run(cli).log_err("Command failed")
}
