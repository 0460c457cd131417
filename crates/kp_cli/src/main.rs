//! Karaoke player - command-line entry point
//!
//! Handles configuration loading, logging initialization and tool
//! discovery, then runs one subcommand against the core library.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;

use kp_core::config::ConfigManager;
use kp_core::history::{load_list, save_list, HistoryLog, LibraryMap, Timeframe, TIMESTAMP_FORMAT};
use kp_core::logging::init_tracing;
use kp_core::media::{cache, AssetResolver, FfmpegToolkit, MediaToolkit, MediaTools};
use kp_core::models::{format_mmss, ShiftControls, Track};
use kp_core::playback::{ClockEngine, DurationLookup, SyncState};
use kp_core::render::{CancelHandle, RenderJob, RenderOutput, RenderProgress, ShiftRenderWorker};
use kp_core::session::{KaraokeSession, SessionCommand, SessionEvent};
use kp_core::silence;

#[derive(Parser)]
#[command(name = "karaoke-player")]
#[command(about = "Karaoke player core: key/tempo renders, queue playback and maintenance", long_about = None)]
struct Cli {
    /// Settings file (created with defaults if missing)
    #[arg(short, long, default_value = ".config/settings.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a key/tempo shifted copy of a track into the render cache
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Key change in semitones
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        key: i32,

        /// Tempo change in 5% steps
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        tempo: i32,
    },

    /// Print artist, title and duration of media files
    Probe {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Find where a track's audio starts and ends
    Silence {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Inspect or empty the render cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show play history
    History {
        /// today, yesterday, this-week, last-week, this-month, last-month, this-year, all-time
        #[arg(short, long, default_value = "all-time")]
        timeframe: Timeframe,

        /// Print one JSON object per play
        #[arg(long)]
        json: bool,
    },

    /// Show a saved list, optionally rewriting it with probed durations
    List {
        /// List name (in the lists folder) or path
        #[arg(value_name = "LIST")]
        list: String,

        /// Library folder as NAME=PATH (repeatable)
        #[arg(short, long = "library", value_parser = parse_library)]
        libraries: Vec<(String, PathBuf)>,

        /// Save the list back with probed durations filled in
        #[arg(long)]
        rewrite: bool,
    },

    /// Play a saved list through the session loop with simulated engines
    Play {
        /// List name (in the lists folder) or path
        #[arg(value_name = "LIST")]
        list: String,

        /// Library folder as NAME=PATH (repeatable)
        #[arg(short, long = "library", value_parser = parse_library)]
        libraries: Vec<(String, PathBuf)>,

        /// Shuffle the list after the first track
        #[arg(long)]
        shuffle: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cache folder and its size
    Info,
    /// Delete everything in the cache folder
    Purge,
}

fn parse_library(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", value)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigManager::new(&cli.config);
    if let Err(e) = config.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }

    let logs_dir = config.logs_folder();
    let log_to_file = std::fs::create_dir_all(&logs_dir).is_ok();
    let _log_guard = init_tracing(
        config.settings().logging.level,
        log_to_file.then_some(logs_dir.as_path()),
    );

    tracing::info!("Karaoke player starting");
    tracing::info!("Config: {}", cli.config.display());
    tracing::info!("Core version: {}", kp_core::version());

    if let Err(e) = config.ensure_dirs_exist() {
        tracing::error!("Failed to create directories: {}", e);
    }

    match cli.command {
        Commands::Render { file, key, tempo } => render(&config, &file, ShiftControls::new(key, tempo)),
        Commands::Probe { files } => probe(&config, &files),
        Commands::Silence { file } => scan_silence(&config, &file),
        Commands::Cache { action } => cache_command(&config, action),
        Commands::History { timeframe, json } => history(&config, timeframe, json),
        Commands::List {
            list,
            libraries,
            rewrite,
        } => show_list(&config, &list, libraries, rewrite),
        Commands::Play {
            list,
            libraries,
            shuffle,
        } => play(&config, &list, libraries, shuffle),
    }
}

fn toolkit(config: &ConfigManager) -> Result<Arc<FfmpegToolkit>> {
    let tools = MediaTools::locate(&config.settings().render).context("Locating media tools")?;
    tracing::debug!("ffmpeg: {}, ffprobe: {}", tools.ffmpeg.display(), tools.ffprobe.display());
    Ok(Arc::new(FfmpegToolkit::new(tools)))
}

fn open_track(toolkit: &dyn MediaToolkit, file: &Path) -> Result<Track> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }
    let track = Track::from_path(file)
        .with_context(|| format!("Unsupported file type: {}", file.display()))?;
    let duration = toolkit.probe_duration_ms(&track.audio_source()).unwrap_or(0);
    Ok(track.with_duration_ms(duration))
}

fn render(config: &ConfigManager, file: &Path, controls: ShiftControls) -> Result<()> {
    let toolkit = toolkit(config)?;
    let track = open_track(toolkit.as_ref(), file)?.with_controls(controls);
    let settings = config.settings();

    let resolver = AssetResolver::new(config.temp_folder(), settings.render.lossless_extension.as_str());
    let mut worker = ShiftRenderWorker::new(toolkit, resolver, (&settings.render).into());
    if settings.logging.render_logs {
        worker = worker.with_logs(config.logs_folder(), (&settings.logging).into());
    }

    let controls = track.controls();
    println!(
        "Rendering {} (key {}, tempo {})",
        track.file_name(),
        controls.key_label(),
        controls.tempo_label()
    );
    let job = RenderJob::from_track(&track);
    let output = worker
        .run(&job, &CancelHandle::new(), &mut |progress: RenderProgress| {
            print!(
                "\r  {:>3}%  {} left   ",
                progress.percent,
                format_mmss(progress.seconds_remaining * 1000)
            );
            let _ = std::io::stdout().flush();
        })
        .with_context(|| format!("Rendering {}", track.file_name()))?;
    println!();

    match output {
        RenderOutput::NoOp => println!("Nothing to do: key and tempo are unchanged"),
        RenderOutput::CacheHit(path) => println!("Already rendered: {}", path.display()),
        RenderOutput::Rendered(path) => println!("Rendered: {}", path.display()),
    }
    Ok(())
}

fn probe(config: &ConfigManager, files: &[PathBuf]) -> Result<()> {
    let toolkit = toolkit(config)?;
    for file in files {
        match open_track(toolkit.as_ref(), file) {
            Ok(track) => {
                let (artist, title) = track.artist_title();
                println!("{}\t{}\t{}", format_mmss(track.duration_ms()), artist, title);
            }
            Err(e) => eprintln!("{}: {:#}", file.display(), e),
        }
    }
    Ok(())
}

fn scan_silence(config: &ConfigManager, file: &Path) -> Result<()> {
    let toolkit = toolkit(config)?;
    let track = open_track(toolkit.as_ref(), file)?;
    let audio = track.audio_source();
    match silence::analyze(toolkit.as_ref(), &audio, &CancelHandle::new())
        .with_context(|| format!("Scanning {}", audio.display()))?
    {
        Some(markers) => println!(
            "intro {} ({} ms), outro {} ({} ms)",
            format_mmss(markers.intro_ms),
            markers.intro_ms,
            format_mmss(markers.outro_ms),
            markers.outro_ms
        ),
        None => println!("{} is silent", audio.display()),
    }
    Ok(())
}

fn cache_command(config: &ConfigManager, action: CacheAction) -> Result<()> {
    let dir = config.temp_folder();
    match action {
        CacheAction::Info => {
            let size = cache::folder_size(&dir).with_context(|| format!("Reading {}", dir.display()))?;
            println!("{}: {}", dir.display(), cache::format_size(size));
        }
        CacheAction::Purge => {
            let report = cache::purge(&dir).with_context(|| format!("Purging {}", dir.display()))?;
            println!(
                "Removed {} files and {} folders, freed {}",
                report.files_removed,
                report.dirs_removed,
                cache::format_size(report.bytes_freed)
            );
            if report.failures > 0 {
                println!("{} entries could not be removed", report.failures);
            }
        }
    }
    Ok(())
}

fn history(config: &ConfigManager, timeframe: Timeframe, json: bool) -> Result<()> {
    let log = HistoryLog::new(&config.settings().paths.history_file);
    let now = chrono::Local::now().naive_local();
    let entries = log
        .entries_in(timeframe, now)
        .context("Reading play history")?;

    if json {
        for entry in &entries {
            let line = serde_json::json!({
                "played_at": entry.played_at.format(TIMESTAMP_FORMAT).to_string(),
                "library": entry.library,
                "file_name": entry.file_name,
                "semitones": entry.semitones,
                "tempo_steps": entry.tempo_steps,
                "duration_ms": entry.duration_ms,
            });
            println!("{}", line);
        }
        return Ok(());
    }

    println!("{} ({} plays)", timeframe, entries.len());
    for entry in entries {
        let controls = ShiftControls::new(entry.semitones, entry.tempo_steps);
        println!(
            "{}  {:>5}  key {:>3}  tempo {:>4}  [{}] {}",
            entry.played_at.format("%Y-%m-%d %H:%M"),
            format_mmss(entry.duration_ms),
            controls.key_label(),
            controls.tempo_label(),
            entry.library,
            entry.file_name
        );
    }
    Ok(())
}

fn list_path(config: &ConfigManager, list: &str) -> PathBuf {
    let direct = PathBuf::from(list);
    if direct.is_file() {
        return direct;
    }
    PathBuf::from(&config.settings().paths.lists_folder).join(list)
}

fn read_list(
    config: &ConfigManager,
    toolkit: &dyn MediaToolkit,
    list: &str,
    libraries: Vec<(String, PathBuf)>,
) -> Result<(PathBuf, Vec<Track>)> {
    let path = list_path(config, list);
    let libraries: LibraryMap = libraries.into_iter().collect();
    let tracks = load_list(&path, &libraries, &|p: &Path| toolkit.probe_duration_ms(p))
        .with_context(|| format!("Loading list {}", path.display()))?;
    Ok((path, tracks))
}

fn show_list(
    config: &ConfigManager,
    list: &str,
    libraries: Vec<(String, PathBuf)>,
    rewrite: bool,
) -> Result<()> {
    let toolkit = toolkit(config)?;
    let (path, tracks) = read_list(config, toolkit.as_ref(), list, libraries)?;

    let total: u64 = tracks.iter().map(Track::effective_duration_ms).sum();
    println!("{} ({} songs - {})", path.display(), tracks.len(), format_mmss(total));
    for track in &tracks {
        let controls = track.controls();
        println!(
            "{:>5}  key {:>3}  tempo {:>4}  {}",
            format_mmss(track.effective_duration_ms()),
            controls.key_label(),
            controls.tempo_label(),
            track.file_name()
        );
    }

    if rewrite {
        save_list(&path, &tracks).with_context(|| format!("Saving list {}", path.display()))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn play(config: &ConfigManager, list: &str, libraries: Vec<(String, PathBuf)>, shuffle: bool) -> Result<()> {
    let toolkit = toolkit(config)?;
    let (path, tracks) = read_list(config, toolkit.as_ref(), list, libraries)?;
    if tracks.is_empty() {
        bail!("No playable tracks in {}", path.display());
    }

    let settings = config.settings();
    if settings.render.auto_delete_temp {
        match cache::purge(&config.temp_folder()) {
            Ok(report) => tracing::info!("Purged {} cached files", report.files_removed),
            Err(e) => tracing::warn!("Could not purge render cache: {}", e),
        }
    }

    let lookup_toolkit = Arc::clone(&toolkit);
    let lookup: DurationLookup =
        Arc::new(move |p: &Path| lookup_toolkit.probe_duration_ms(p));
    let primary = ClockEngine::new().with_duration_lookup(Arc::clone(&lookup));
    let secondary = ClockEngine::new().with_duration_lookup(lookup);
    let mut session = KaraokeSession::new(settings, toolkit, Box::new(primary), Box::new(secondary));

    let (tx, rx) = unbounded();
    for track in tracks {
        tx.send(SessionCommand::Add { track, autoplay: true })
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("Queueing tracks")?;
    }
    if shuffle {
        tx.send(SessionCommand::ShuffleUpcoming)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("Queueing tracks")?;
    }

    let mut started = false;
    let mut last_playing = None;
    let stop = tx.clone();
    session.run(&rx, |event| match event {
        SessionEvent::Status(status) => {
            if status.now_playing != last_playing {
                if let Some(name) = &status.now_playing {
                    println!("Now playing: {}", name);
                }
                last_playing = status.now_playing.clone();
            }
            if let Some(line) = &status.render_status {
                println!("{}", line);
            }
            match status.state {
                SyncState::Playing => started = true,
                SyncState::Idle if started => {
                    println!("Queue finished");
                    let _ = stop.send(SessionCommand::Shutdown);
                }
                _ => {}
            }
        }
        SessionEvent::Render(event) => tracing::debug!("{:?}", event),
        SessionEvent::TrackFailed {
            error, show_message, ..
        } => {
            if show_message {
                eprintln!("Playback error: {}", error);
            }
        }
        SessionEvent::MarkersFound { track, markers } => {
            tracing::debug!("{}: outro at {}", track, format_mmss(markers.outro_ms));
        }
        SessionEvent::Rejected(e) => eprintln!("{}", e),
    });

    tracing::info!("Karaoke player exiting");
    Ok(())
}
