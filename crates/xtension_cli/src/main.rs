//! X-Tension CLI
//!
//! Command-line tools for checking host modules against the bindings.
//!
//! # Commands
//!
//! - `symbols` - List the host functions the bindings require
//! - `probe` - Load a host module and report which required functions it exports
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use commands::OutputFormat;

/// X-Tension host diagnostics.
#[derive(Parser)]
#[command(name = "xtension")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the required host functions
    Symbols {
        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Report which required functions a host module exports
    Probe {
        /// Path to the host executable or library
        #[arg(long)]
        host: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
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
        Commands::Symbols { format } => {
            commands::symbols::run(format)?;
        }
        Commands::Probe { host, format } => {
            let report = commands::probe::run(&host, format)?;
            if !report.is_complete() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Version => {
            println!("X-Tension CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("X-Tension Core v{}", xtension_core::VERSION);
            println!("{} required host functions", xtension_core::REQUIRED_SYMBOLS.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn probe_requires_a_host() {
        assert!(Cli::try_parse_from(["xtension", "probe"]).is_err());
        let cli = Cli::try_parse_from(["xtension", "probe", "--host", "xwforensics64.exe", "-f", "json"]).unwrap();
        match cli.command {
            Commands::Probe { host, format } => {
                assert_eq!(host, PathBuf::from("xwforensics64.exe"));
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected probe"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["xtension", "symbols", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }
}
