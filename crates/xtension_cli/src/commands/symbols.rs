//! Symbols command implementation.

use xtension_core::REQUIRED_SYMBOLS;

use super::OutputFormat;

/// Runs the symbols command.
pub fn run(format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(REQUIRED_SYMBOLS)?);
        }
        OutputFormat::Text => {
            for symbol in REQUIRED_SYMBOLS {
                println!("{symbol}");
            }
            println!();
            println!("{} functions", REQUIRED_SYMBOLS.len());
        }
    }
    Ok(())
}
