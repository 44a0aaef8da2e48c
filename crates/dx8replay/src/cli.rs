use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dx8replay",
    author,
    version,
    about = "Translate ps.1.x/vs.1.1 shader assembly into GL ES 1.1 fixed-function commands"
)]
pub struct Cli {
    /// Configuration file; defaults to `config.toml` in the dx8replay config directory.
    #[arg(long, global = true, value_name = "FILE", env = "DX8REPLAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Translate one shader file and print its command list.
    Compile(CompileArgs),
    /// Push shader files through the decode, prepare and dispatch pipeline.
    Replay(ReplayArgs),
    /// Print where configuration is looked up.
    Where,
}

#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Shader assembly file.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Fallback directory for `#include` lookups.
    #[arg(long, short = 'I', value_name = "DIR")]
    pub include_dir: Option<PathBuf>,

    /// Output format: `text` (one command per line) or `json`.
    #[arg(
        long,
        value_name = "FORMAT",
        value_parser = parse_output_format,
        default_value = "text"
    )]
    pub format: OutputFormat,

    /// Exit with an error if any instruction failed to translate.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Shader assembly files to replay.
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Fallback directory for `#include` lookups.
    #[arg(long, short = 'I', value_name = "DIR")]
    pub include_dir: Option<PathBuf>,

    /// Number of dispatch workers (1-64); overrides the config file.
    #[arg(long, short = 'j', value_name = "N", value_parser = parse_thread_count)]
    pub threads: Option<usize>,

    /// Submit every file this many times; overrides the config file.
    #[arg(long, value_name = "N", value_parser = parse_repeat)]
    pub repeat: Option<u32>,

    /// Exit with an error if any source was dropped.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("output format must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "text" | "txt" | "dump" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(format!("unknown output format '{other}'; expected text or json")),
    }
}

pub fn parse_thread_count(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("thread count must not be empty".to_string());
    }

    let count: usize = trimmed
        .parse()
        .map_err(|_| format!("invalid thread count '{trimmed}'"))?;
    if !(pipeline::MIN_DISPATCH_WORKERS..=pipeline::MAX_DISPATCH_WORKERS).contains(&count) {
        return Err(format!(
            "thread count must be between {} and {}",
            pipeline::MIN_DISPATCH_WORKERS,
            pipeline::MAX_DISPATCH_WORKERS
        ));
    }
    Ok(count)
}

pub fn parse_repeat(value: &str) -> Result<u32, String> {
    let trimmed = value.trim();
    let repeat: u32 = trimmed
        .parse()
        .map_err(|_| format!("invalid repeat count '{trimmed}'"))?;
    if repeat == 0 {
        return Err("repeat count must be at least 1".into());
    }
    Ok(repeat)
}
