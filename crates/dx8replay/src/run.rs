use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use pipeline::{Pipeline, PipelineConfig, PipelineEvent, PipelineSummary, SourceId};
use replayconfig::ReplayConfig;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use translator::{compile_file, CompileOptions};

use crate::backend::TracingBackend;
use crate::cli::{CompileArgs, OutputFormat, ReplayArgs};
use crate::paths::AppPaths;

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Logs go to stderr so command dumps on stdout stay machine-readable.
pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads `explicit` if given, otherwise the discovered config file. Only an
/// explicitly named file has to exist.
pub fn load_config(explicit: Option<&Path>) -> Result<ReplayConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let discovered = match AppPaths::discover() {
                Ok(paths) => paths.config_file(),
                Err(err) => {
                    warn!("{err:#}; using default configuration");
                    return Ok(ReplayConfig::default());
                }
            };
            if !discovered.exists() {
                debug!(path = %discovered.display(), "no config file; using defaults");
                return Ok(ReplayConfig::default());
            }
            discovered
        }
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = ReplayConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to load config file {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

pub fn run_compile(args: CompileArgs, config: &ReplayConfig) -> Result<()> {
    let options = compile_options(args.include_dir, config);
    let translation = compile_file(&args.file, &options)
        .with_context(|| format!("failed to compile {}", args.file.display()))?;

    for diagnostic in &translation.diagnostics {
        warn!(file = %args.file.display(), "{diagnostic}");
    }

    match args.format {
        OutputFormat::Text => print!("{}", translation.commands.dump()),
        OutputFormat::Json => {
            let diagnostics: Vec<String> =
                translation.diagnostics.iter().map(ToString::to_string).collect();
            let report = serde_json::json!({
                "file": args.file.display().to_string(),
                "commands": &translation.commands,
                "diagnostics": diagnostics,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if args.strict && !translation.is_clean() {
        bail!(
            "{} instruction(s) in {} could not be translated",
            translation.diagnostics.len(),
            args.file.display()
        );
    }
    Ok(())
}

struct ShaderSource {
    path: PathBuf,
    text: String,
    origin: PathBuf,
}

fn read_source(path: &Path) -> Result<ShaderSource> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read shader {}", path.display()))?;
    let origin = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(ShaderSource {
        path: path.to_path_buf(),
        text,
        origin,
    })
}

pub fn run_replay(args: ReplayArgs, config: &ReplayConfig) -> Result<()> {
    let dispatch_workers = args.threads.unwrap_or(config.pipeline.dispatch_workers);
    let repeat = args.repeat.unwrap_or(config.pipeline.repeat);
    let include_dir = args
        .include_dir
        .or_else(|| config.include_dir().map(Path::to_path_buf));

    let sources = args
        .files
        .iter()
        .map(|path| read_source(path))
        .collect::<Result<Vec<_>>>()?;

    let backend = Arc::new(TracingBackend::from_config(config));
    let mut pipeline = Pipeline::init(
        PipelineConfig {
            dispatch_workers,
            include_dir,
        },
        backend.clone(),
    )
    .context("failed to initialise replay pipeline")?;
    let events = pipeline.events();

    pipeline.start()?;
    info!(
        files = sources.len(),
        repeat,
        dispatch_workers = pipeline.dispatch_workers(),
        "replaying shaders"
    );
    for _ in 0..repeat {
        for source in &sources {
            pipeline.submit_from(source.text.as_str(), source.origin.clone())?;
        }
    }
    pipeline.stop();
    wait_for_drain(&pipeline, config.pipeline.report_interval);
    let summary = pipeline.join()?;

    let name_of = |id: SourceId| sources[id as usize % sources.len()].path.display().to_string();
    for event in events.try_iter() {
        match event {
            // Every repeat round produces the same diagnostics; report the first.
            PipelineEvent::TranslationDegraded { source, diagnostic }
                if (source as usize) < sources.len() =>
            {
                warn!(file = %name_of(source), "{diagnostic}");
            }
            PipelineEvent::SourceDropped { source, reason } if (source as usize) < sources.len() => {
                warn!(file = %name_of(source), "{reason}");
            }
            _ => {}
        }
    }

    print_summary(&summary, &backend);

    if args.strict && summary.sources_dropped > 0 {
        bail!("{} source(s) were dropped", summary.sources_dropped);
    }
    Ok(())
}

pub fn run_where(explicit: Option<&Path>) -> Result<()> {
    let paths = AppPaths::discover()?;
    println!("Configuration:");
    println!("  directory: {}", paths.config_dir().display());
    let file = explicit.map(Path::to_path_buf).unwrap_or_else(|| paths.config_file());
    let status = if file.exists() { "present" } else { "missing" };
    println!("  file:      {} ({status})", file.display());
    Ok(())
}

fn compile_options(include_dir: Option<PathBuf>, config: &ReplayConfig) -> CompileOptions {
    let mut options = CompileOptions::new();
    options.include_dir = include_dir.or_else(|| config.include_dir().map(Path::to_path_buf));
    options
}

fn wait_for_drain(pipeline: &Pipeline, interval: Option<Duration>) {
    let mut last_report = Instant::now();
    while !pipeline.is_drained() {
        thread::sleep(DRAIN_POLL);
        let Some(interval) = interval else {
            continue;
        };
        if last_report.elapsed() >= interval {
            info!(
                processed = pipeline.commands_processed(),
                commands_per_second = pipeline.commands_per_second(),
                "replay progress"
            );
            last_report = Instant::now();
        }
    }
}

fn print_summary(summary: &PipelineSummary, backend: &TracingBackend) {
    println!(
        "sources: {} decoded, {} dropped",
        summary.sources_decoded, summary.sources_dropped
    );
    println!("commands processed: {}", summary.commands_processed);
    println!("commands skipped: {}", summary.commands_skipped);
    for (worker, processed) in summary.per_worker.iter().enumerate() {
        println!("  worker {worker:<2} {processed}");
    }
    let tally = backend.tally();
    if !tally.is_empty() {
        println!("applied by kind:");
        for (kind, count) in tally {
            println!("  {:<16} {count}", kind.label());
        }
    }
}
