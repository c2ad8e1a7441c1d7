//! CLI argument parsing for sidefx

use crate::config::{ModeKind, SessionConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for analysis results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable verdict per case (default)
    Text,
    /// Result records as JSON for an external report renderer
    Json,
}

/// What the oracle compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// API call traces
    Behavior,
    /// Execution time
    Performance,
}

impl From<ModeArg> for ModeKind {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Behavior => ModeKind::Behavior,
            ModeArg::Performance => ModeKind::Performance,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sidefx")]
#[command(version)]
#[command(about = "Differential oracle for side effects of injected page scripts", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare profiles recorded without and with the candidate script
    Analyze(AnalyzeArgs),

    /// List case documents in a directory, resolved and sorted
    Cases {
        /// Generator output directory
        dir: PathBuf,
    },

    /// Print the page-side instrumentation bundle
    Bundle,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Profiles from the pass without the candidate script (JSON)
    #[arg(long = "without", value_name = "PROFILES")]
    pub without: PathBuf,

    /// Profiles from the pass with the candidate script (JSON)
    #[arg(long = "with", value_name = "PROFILES")]
    pub with: PathBuf,

    /// Override the configured mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Slowdown fraction flagged in performance mode (e.g. 0.2 for 20%)
    #[arg(long, value_name = "FRACTION")]
    pub threshold: Option<f64>,

    /// Session configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl AnalyzeArgs {
    /// Config file (or defaults) with command-line overrides applied
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(threshold) = self.threshold {
            config.performance_threshold = Some(threshold);
        }

        config.validate()?;
        Ok(config)
    }
}
