use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "binward",
    version,
    about = "Audit native binaries against a toolchain security policy"
)]
pub struct Args {
    /// Binaries to audit (PE, ELF or Mach-O)
    #[arg(required = true)]
    pub targets: Vec<PathBuf>,

    /// Policy configuration file (JSON); compiled-in defaults when omitted
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Extra root probed while resolving program databases; may repeat
    #[arg(long = "symbols", value_name = "DIR")]
    pub symbol_search_paths: Vec<PathBuf>,

    /// Output format
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Worker threads for batch scans; defaults to the logical CPU count
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Stop starting new targets once a target has failed
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
