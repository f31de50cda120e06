//! Faultline command-line interface.
//!
//! Runs the HTTP decision service and inspects the artifacts a campaign
//! reads and writes.
//!
//! # Quick Start
//!
//! ```bash
//! # Serve decisions for a test suite using ./faultline.toml
//! faultline serve --address 127.0.0.1:5050
//!
//! # Check an analysis file before a campaign
//! faultline check-analysis faults/analysis.json
//!
//! # Inspect a recorded failure
//! faultline counterexample target/counterexample.json
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Faultline - service-level fault injection for RPC workflows.
#[derive(Parser)]
#[command(name = "faultline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding faultline.toml.
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run the HTTP decision service.
    Serve {
        /// Address to bind to (overrides [service] address).
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Validate an analysis file and list its configurations.
    CheckAnalysis {
        /// Path to the analysis JSON file.
        file: PathBuf,
    },

    /// List the failures of a counterexample, or look up one call.
    Counterexample {
        /// Path to the counterexample JSON file.
        file: PathBuf,

        /// Execution index to look up.
        #[arg(long)]
        dei: Option<String>,
    },

    /// Execution index utilities.
    #[command(subcommand)]
    Index(IndexCommands),

    /// Print the effective configuration.
    Config {
        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Parse an index and print its segments.
    Parse {
        /// Index text, compact or legacy.
        text: String,
    },

    /// Convert an index to the legacy flat text form.
    Legacy {
        /// Index text, compact or legacy.
        text: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Serve { address } => commands::serve::run(&cli.project, address.as_deref()),
        Commands::CheckAnalysis { file } => commands::analysis::check(&file),
        Commands::Counterexample { file, dei } => {
            commands::counterexample::run(&file, dei.as_deref())
        }
        Commands::Index(cmd) => match cmd {
            IndexCommands::Parse { text } => commands::index::parse(&text),
            IndexCommands::Legacy { text } => commands::index::legacy(&text),
        },
        Commands::Config { format } => commands::config::show(&cli.project, &format),
    }
}
