//! pelift lifts 32-bit PE executables to an IR-ready structural form.
//!
//! Control flow recovery is handled through reliance on oracles, which
//! provide function entry addresses, basic block entry addresses, and
//! block-to-function membership for non-contiguous functions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pelift::format::OutputFormat;
use pelift::lifter::Lifter;
use pelift::oracle::JsonOracleSource;

#[derive(Parser, Debug)]
#[command(
    name = "pelift",
    version,
    about = "Lifts 32-bit PE executables to an IR-ready structural form",
    long_about = None
)]
struct Cli {
    /// Binary executables to lift.
    #[arg(value_name = "BINARY", required = true)]
    binaries: Vec<PathBuf>,

    /// Suppress non-error messages.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Output format for the lifted program dump.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Directory containing funcs.json, blocks.json and chunks.json.
    #[arg(long, value_name = "DIR", default_value = ".")]
    oracle_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Warnings are always emitted; -q silences the debug trace.
    let filter = if cli.quiet { "warn" } else { "debug" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let source = JsonOracleSource::new(&cli.oracle_dir);
    let formatter = cli.format.formatter();

    // Lift binary executables. The first failure aborts the whole run.
    for bin_path in &cli.binaries {
        let lifter = Lifter::new(bin_path, &source)
            .with_context(|| format!("failed to prepare lift of {}", bin_path.display()))?;
        let program = lifter
            .lift()
            .with_context(|| format!("failed to lift {}", bin_path.display()))?;
        print!("{}", formatter.format(&program)?);
    }

    Ok(())
}
