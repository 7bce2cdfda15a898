//! Probe command implementation.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use xtension_core::{FunctionTable, HostModule, SymbolSource, REQUIRED_SYMBOLS};

use super::OutputFormat;

/// What a host module exports.
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    /// Description of the probed module.
    pub module: String,
    /// Required functions the module exports.
    pub resolved: Vec<&'static str>,
    /// Required functions the module lacks.
    pub missing: Vec<&'static str>,
}

impl ProbeReport {
    /// Checks `source` against the required functions.
    pub fn inspect<S: SymbolSource>(source: &S) -> Self {
        let missing = FunctionTable::missing(source);
        let resolved = REQUIRED_SYMBOLS
            .iter()
            .copied()
            .filter(|symbol| !missing.contains(symbol))
            .collect();
        Self {
            module: source.describe(),
            resolved,
            missing,
        }
    }

    /// Returns true if every required function resolved.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Runs the probe command.
pub fn run(path: &Path, format: OutputFormat) -> Result<ProbeReport, Box<dyn std::error::Error>> {
    debug!(path = %path.display(), "loading host module");
    let module = HostModule::open(path)?;
    let report = ProbeReport::inspect(&module);
    if report.is_complete() {
        info!(module = %report.module, "all required functions resolved");
    } else {
        warn!(module = %report.module, missing = report.missing.len(), "host module is incomplete");
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            print_text_output(&report);
        }
    }

    Ok(report)
}

fn print_text_output(report: &ProbeReport) {
    println!("Host module: {}", report.module);
    println!(
        "Resolved:    {} of {}",
        report.resolved.len(),
        REQUIRED_SYMBOLS.len()
    );
    if !report.missing.is_empty() {
        println!();
        println!("Missing:");
        for symbol in &report.missing {
            println!("  {symbol}");
        }
    }
}
