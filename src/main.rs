//! freeloop: live sample sequencing from a text file.
//!
//! Every non-empty line of the file is one block. `check` prints what the
//! analyser makes of each line and can dry-run a few beats; `play` plays the
//! file and follows edits to it until interrupted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};

use freeloop::assets::{AssetError, AssetSource, LocalLibrary};
use freeloop::ast::BlockId;
use freeloop::audio::{AudioEngine, AudioError, AudioOutput, OfflineOutput};
use freeloop::config::{ConfigError, RuntimeConfig};
use freeloop::feedback::LogFeedback;
use freeloop::runtime::Runtime;

/// How often `play` looks at the file for edits.
const FILE_POLL: Duration = Duration::from_millis(250);
/// How long `check --beats` waits for sounds to resolve.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "freeloop", version)]
#[command(about = "Live coding runtime for sample-based sequencing")]
struct Args {
    /// Config file (default: ~/.freeloop/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of WAV samples to search instead of the configured one
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Log filter, e.g. "info" or "freeloop=debug"
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print tokens and errors for every line of a file
    Check {
        file: PathBuf,
        /// Also resolve sounds and print the clips of this many beats
        #[arg(long, default_value_t = 0)]
        beats: u32,
    },
    /// Play a file, following edits until Ctrl-C
    Play { file: PathBuf },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.as_str())
        .init();

    if let Err(e) = run(args) {
        eprintln!("freeloop: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load_from(path)?,
        None => RuntimeConfig::load()?,
    };
    if let Some(dir) = args.library {
        config.library_dir = Some(dir);
    }

    match args.command {
        Command::Check { file, beats } => check(config, &file, beats),
        Command::Play { file } => play(config, &file),
    }
}

fn asset_source(config: &RuntimeConfig) -> Result<Option<AssetSource>, CliError> {
    #[cfg(feature = "remote")]
    if !config.remote.api_url.is_empty() {
        let client = Arc::new(freeloop::assets::RemoteClient::new(
            config.remote.api_url.clone(),
            config.remote.api_key.clone(),
        )?);
        return Ok(Some(AssetSource::new(
            client.clone(),
            client,
            Arc::new(freeloop::audio::WavDecoder),
        )));
    }
    match &config.library_dir {
        Some(dir) => Ok(Some(AssetSource::local(LocalLibrary::open(dir)?))),
        None => {
            warn!("no sample library or remote service configured, sounds stay unresolved");
            Ok(None)
        }
    }
}

fn read_blocks(path: &Path) -> Result<BTreeMap<BlockId, String>, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (BlockId(i as u32), line.to_string()))
        .collect())
}

fn runtime_with<O: AudioOutput>(config: RuntimeConfig, output: O) -> Result<Runtime<O>, CliError> {
    let source = asset_source(&config)?;
    let mut runtime = Runtime::new(config, output).with_feedback(LogFeedback);
    if let Some(source) = source {
        runtime = runtime.with_source(source);
    }
    Ok(runtime)
}

fn check(config: RuntimeConfig, path: &Path, beats: u32) -> Result<(), CliError> {
    let blocks = read_blocks(path)?;
    let mut runtime = runtime_with(config, OfflineOutput::new())?;

    for (block, text) in &blocks {
        let analysis = runtime.on_block_changed(*block, block.0 as usize, text);
        println!("{:>4} | {text}", block.0 + 1);
        let tokens: Vec<String> = analysis
            .tokens
            .iter()
            .map(|t| format!("{}:{:?}", t.token.value, t.kind))
            .collect();
        println!("     | {:?} {}", analysis.kind, tokens.join(" "));
        for error in &analysis.errors {
            let reasons: Vec<String> = error.reasons.iter().map(|r| r.to_string()).collect();
            println!(
                "     | error at {}..{}: {}",
                error.start,
                error.end(),
                reasons.join("; ")
            );
        }
    }

    if beats == 0 {
        return Ok(());
    }

    runtime.flush();
    let start = Instant::now();
    // Push past the fetch debounce so every search starts now.
    runtime.tick(start + Duration::from_millis(runtime.config().fetch_debounce_ms))?;
    while runtime.table().active_tasks() > 0 && start.elapsed() < RESOLVE_TIMEOUT {
        runtime.wait_for_resolutions(Duration::from_millis(100));
    }
    runtime.wait_for_resolutions(Duration::ZERO);
    for entry in runtime.table().entries().filter(|e| !e.builtin) {
        if let Some(status) = entry.status() {
            println!("sound {}: {status}", entry.id);
        }
    }

    runtime.play();
    let step = runtime.config().scheduler_config().lookahead.as_secs_f64();
    let length = beats as f64 * 60.0 / runtime.scheduler().transport().bpm();
    while runtime.output().now() < length {
        runtime.tick(Instant::now())?;
        runtime.output_mut().advance(step);
    }
    let mut clips = runtime.output_mut().take_clips();
    clips.retain(|c| c.start < length);
    clips.sort_by(|a, b| a.start.total_cmp(&b.start));
    for clip in clips {
        println!(
            "{:>8.3} - {:>8.3}  line {:<3} gain {:.2} pan {:+.2} rate {:.2}",
            clip.start,
            clip.end,
            clip.block.0 + 1,
            clip.gain(),
            clip.pan(),
            clip.rate()
        );
    }
    Ok(())
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn play(config: RuntimeConfig, path: &Path) -> Result<(), CliError> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

    let lookahead = config.scheduler_config().lookahead;
    let engine = AudioEngine::new()?;
    info!(sample_rate = engine.sample_rate(), channels = engine.channels(), "audio ready");
    let mut runtime = runtime_with(config, engine)?;

    let mut current: BTreeMap<BlockId, String> = BTreeMap::new();
    let mut stamp = None;
    let mut last_poll: Option<Instant> = None;
    runtime.play();
    println!("playing {} (Ctrl-C to stop)", path.display());

    while running.load(Ordering::SeqCst) {
        if last_poll.map_or(true, |t| t.elapsed() >= FILE_POLL) {
            last_poll = Some(Instant::now());
            let now_stamp = modified(path);
            if now_stamp != stamp {
                stamp = now_stamp;
                match read_blocks(path) {
                    Ok(blocks) => sync_blocks(&mut runtime, &mut current, blocks),
                    Err(e) => warn!(error = %e, "file not readable, keeping last version"),
                }
            }
        }

        if let Err(e) = runtime.tick(Instant::now()) {
            warn!(error = %e, "tick failed");
        }
        thread::sleep(lookahead);
    }

    runtime.stop();
    println!("stopped");
    Ok(())
}

/// Feed changed, added and removed lines to the runtime.
fn sync_blocks<O: AudioOutput>(
    runtime: &mut Runtime<O>,
    current: &mut BTreeMap<BlockId, String>,
    next: BTreeMap<BlockId, String>,
) {
    for block in current.keys() {
        if !next.contains_key(block) {
            runtime.remove_block(*block);
        }
    }
    for (block, text) in &next {
        if current.get(block) != Some(text) {
            let analysis = runtime.on_block_changed(*block, block.0 as usize, text);
            for error in &analysis.errors {
                let reasons: Vec<String> = error.reasons.iter().map(|r| r.to_string()).collect();
                warn!(line = block.0 + 1, at = error.start, "{}", reasons.join("; "));
            }
        }
    }
    *current = next;
}
