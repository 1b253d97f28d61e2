use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use khist_codec::Format;

#[derive(Parser)]
#[command(
    name = "khist",
    about = "khist: Kubernetes manifest history from audit logs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "yaml")]
    pub format: OutputFormat,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Yaml => Format::Yaml,
            OutputFormat::Json => Format::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay an audit log and summarize each resource timeline
    Replay(ReplayArgs),
    /// Apply a strategic merge patch to a manifest
    Merge(MergeArgs),
    /// Print the node at a field path
    Get(GetArgs),
    /// Show revision-to-revision diffs for one resource
    Diff(DiffArgs),
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Audit log file, or a directory of log files
    pub path: PathBuf,
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override the configured worker count
    #[arg(long)]
    pub workers: Option<usize>,
    /// Only replay resources whose key contains this text
    #[arg(long)]
    pub resource: Option<String>,
    /// Print every revision's manifest
    #[arg(long)]
    pub show: bool,
}

#[derive(Args)]
pub struct MergeArgs {
    pub prev: PathBuf,
    pub patch: PathBuf,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub file: PathBuf,
    /// Dot-separated field path; `\.` escapes a literal dot
    pub path: String,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Audit log file, or a directory of log files
    pub path: PathBuf,
    /// Resource key, or a substring matching exactly one key
    pub resource: String,
    #[arg(long)]
    pub config: Option<PathBuf>,
}
