//! CLI argument definitions for the schema matcher.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, ColorChoice, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use schemap_cli::inputs::MethodFile;
use schemap_cli::logging::{LogConfig, LogFormat};
use schemap_match::ExportFormat;
use schemap_model::{MethodName, parse_weight_override};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(
    name = "schemap",
    version,
    about = "Hybrid ensemble schema matcher",
    long_about = "Match columns of a source schema to a target schema.\n\n\
                  Combines lexical and embedding retrieval scores into one\n\
                  ensemble ranking, optionally asks a language model to pick\n\
                  among the top candidates, and rolls column matches up to\n\
                  table matches."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Logging setup from the flags. An explicit level or `-v`/`-q` turns
    /// off `RUST_LOG`; ANSI follows `--color`, or the terminal in auto mode.
    pub fn log_config(&self) -> LogConfig {
        let explicit = self.log_level.map(LevelFilter::from);
        let with_ansi = match self.color.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.log_file.is_none() && io::stderr().is_terminal(),
        };
        LogConfig {
            level_filter: explicit.unwrap_or_else(|| self.verbosity.tracing_level_filter()),
            use_env_filter: explicit.is_none() && !self.verbosity.is_present(),
            with_ansi,
            format: self.log_format.into(),
            log_file: self.log_file.clone(),
            ..LogConfig::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Rank target columns for every source column and roll them up per table.
    Run(RunArgs),

    /// Recompute table matches from an exported JSON report.
    Aggregate(AggregateArgs),

    /// List the columns of a schema document.
    Inspect(InspectArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Source schema document. Every column in it gets a result.
    #[arg(long = "source-schema", value_name = "FILE")]
    pub source_schema: Option<PathBuf>,

    /// Target schema document. Enables the built-in BM25 method.
    #[arg(long = "target-schema", value_name = "FILE")]
    pub target_schema: Option<PathBuf>,

    /// Method result file (repeatable). `NAME=FILE` sets the method name.
    #[arg(long = "method", value_name = "[NAME=]FILE")]
    pub methods: Vec<MethodFile>,

    /// Column descriptions as `{"table.column": "text"}`.
    #[arg(long = "descriptions", value_name = "FILE")]
    pub descriptions: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Rank and print the summary without writing a report.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Review band cutoffs for the summary.
    #[arg(long = "bands", value_enum, default_value = "default")]
    pub bands: BandPreset,
}

/// Configuration file and the flags that override it.
#[derive(Args)]
pub struct ConfigArgs {
    /// TOML configuration file.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Method weight override (repeatable).
    #[arg(long = "weight", value_name = "METHOD=WEIGHT", value_parser = parse_weight_override)]
    pub weights: Vec<(MethodName, f64)>,

    /// Ask the arbitration service to pick among the top candidates.
    #[arg(long = "arbitrate")]
    pub arbitrate: bool,

    /// Number of top candidates offered to the arbitration service.
    #[arg(long = "top-n", value_name = "N")]
    pub top_n: Option<usize>,

    /// Timeout for a single arbitration call.
    #[arg(long = "timeout-secs", value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

#[derive(Args)]
pub struct OutputArgs {
    /// Report path (default: ./schemap_output_<timestamp>.<format>).
    #[arg(long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Report format.
    #[arg(long = "format", value_enum, default_value = "json")]
    pub format: ExportFormatArg,
}

#[derive(Parser)]
pub struct AggregateArgs {
    /// Exported JSON report, or a bare array of column matches.
    #[arg(value_name = "REPORT")]
    pub report: PathBuf,

    /// Write the table matches as JSON to this path.
    #[arg(long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
pub struct InspectArgs {
    /// Schema document to list.
    #[arg(value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Column descriptions shown next to each column.
    #[arg(long = "descriptions", value_name = "FILE")]
    pub descriptions: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormatArg {
    Json,
    Csv,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(value: ExportFormatArg) -> Self {
        match value {
            ExportFormatArg::Json => ExportFormat::Json,
            ExportFormatArg::Csv => ExportFormat::Csv,
        }
    }
}

/// Summary review bands. Each preset gives the lowest confidence that
/// still counts as high, medium and low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BandPreset {
    Strict,
    #[default]
    Default,
    Relaxed,
}

impl BandPreset {
    pub fn cutoffs(self) -> [f64; 3] {
        match self {
            Self::Strict => [0.98, 0.90, 0.75],
            Self::Default => [0.95, 0.80, 0.60],
            Self::Relaxed => [0.90, 0.70, 0.50],
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        }
    }
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
