//! Redo log CLI
//!
//! Operator tools for inspecting a mailbox redo log directory. Every command
//! opens the log read-only, so it can run next to a live writer.
//!
//! # Commands
//!
//! - `segments` - List segments with size, age and seal state
//! - `dump` - Print decoded records
//! - `verify` - Scan the whole log and fail on any decode error

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, OutputFormat};
use redolog_core::SegmentId;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Mailbox redo log tools.
#[derive(Parser)]
#[command(name = "redolog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List segments
    Segments {
        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print decoded records
    Dump {
        /// Start at this segment id
        #[arg(long)]
        from: Option<u64>,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only records for this mailbox
        #[arg(short, long)]
        mailbox: Option<i32>,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Scan the whole log and report decode errors
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Segments { format } => {
            let path = cli.path.ok_or(CliError::PathRequired("segments"))?;
            commands::segments::run(&path, format)?;
        }
        Commands::Dump {
            from,
            limit,
            mailbox,
            format,
        } => {
            let path = cli.path.ok_or(CliError::PathRequired("dump"))?;
            let options = commands::dump::DumpOptions {
                from: from.map(SegmentId::new),
                limit,
                mailbox,
            };
            commands::dump::run(&path, &options, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or(CliError::PathRequired("verify"))?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("redolog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("redolog core v{}", redolog_core::VERSION);
            println!(
                "record format {} (reads {})",
                redolog_core::FormatVersion::CURRENT,
                redolog_core::FormatVersion::SUPPORTED
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    Ok(())
}
