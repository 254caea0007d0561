//! loopgraph CLI - The `loopgraph` command.
//!
//! Plays a loop session against the simulated backend: a render thread
//! stands in for the audio device, stdin stands in for the game's input,
//! and the scheduler runs on the main thread once per frame.

mod assets;
mod console;
mod driver;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loopgraph_core::backend::sim::SimulatedBackend;
use loopgraph_core::{EventOutcome, Session, SessionConfig, TickOutcome};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// loopgraph - Stimulus-driven seamless loop player
#[derive(Parser, Debug)]
#[command(name = "loopgraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plays a graph of music loops driven by keyboard stimuli", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a session
    Run {
        /// Session file (defaults to the one in the config directory)
        #[arg(value_name = "FILE")]
        session: Option<PathBuf>,

        /// Stop after this long, e.g. "30s" or "2m"
        #[arg(short, long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Scheduler frame period
        #[arg(long, default_value = "10ms", value_parser = humantime::parse_duration)]
        frame: Duration,

        /// Start paused (toggle with space)
        #[arg(long)]
        paused: bool,
    },

    /// Write the commented demo session to the config directory
    Init {
        /// Overwrite an existing session file
        #[arg(long)]
        force: bool,
    },

    /// Print the default session file location
    ConfigPath,

    /// Generate sine-tone clips for every clip a session references
    DemoAssets {
        /// Session file (defaults to the demo session)
        #[arg(value_name = "FILE")]
        session: Option<PathBuf>,

        /// Length of a loop head
        #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
        length: Duration,

        /// Length of a loop tail
        #[arg(long, default_value = "250ms", value_parser = humantime::parse_duration)]
        tail: Duration,
    },
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger();

    match args.command {
        Commands::Run {
            session,
            duration,
            frame,
            paused,
        } => run_session(session, duration, frame, paused),
        Commands::Init { force } => {
            let path = SessionConfig::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Session file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            let path = SessionConfig::create_default_config_file()
                .context("Failed to write default session")?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::ConfigPath => {
            println!("{}", SessionConfig::config_path()?.display());
            Ok(())
        }
        Commands::DemoAssets {
            session,
            length,
            tail,
        } => {
            let config = match session {
                Some(path) => SessionConfig::load(&path)
                    .with_context(|| format!("Failed to load session {}", path.display()))?,
                None => SessionConfig::load_or_default(),
            };
            let written = assets::write_demo_assets(&config, length, tail)?;
            for path in &written {
                println!("  {}", path.display());
            }
            println!("Wrote {} clips to {}", written.len(), config.audio.clip_dir.display());
            Ok(())
        }
    }
}

fn load_session(path: Option<PathBuf>) -> Result<SessionConfig> {
    let path = match path {
        Some(path) => path,
        None => SessionConfig::config_path()?,
    };
    if !path.exists() {
        anyhow::bail!(
            "Session file not found: {}\nCreate one with: loopgraph init",
            path.display()
        );
    }
    SessionConfig::load(&path).with_context(|| format!("Failed to load session {}", path.display()))
}

fn run_session(
    path: Option<PathBuf>,
    duration: Option<Duration>,
    frame: Duration,
    paused: bool,
) -> Result<()> {
    let config = load_session(path)?;
    let spec = config.audio.to_spec();
    let bindings_help = config.states.len().min(9);

    let (backend, batches) = SimulatedBackend::with_channel();
    let clock = backend.clock();
    let mut manager = Session::build(config, backend)
        .context("Failed to build session")?
        .into_manager();

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("Failed to install SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("Failed to install SIGTERM handler")?;

    let buffer_period =
        Duration::from_secs_f64(spec.buffer_size as f64 / spec.sample_rate.max(1) as f64);
    let render = driver::spawn(clock, batches, buffer_period, Arc::clone(&shutdown))
        .context("Failed to start render thread")?;
    let input = console::spawn().context("Failed to start console input")?;

    println!("loopgraph - {} states", manager.state_graph().len());
    println!("Type 1..{} + Enter to pick a state, space to pause, esc to quit", bindings_help);

    manager.play_pause(!paused);
    let started = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        for event in input.try_iter() {
            if manager.handle_event(&event) == EventOutcome::Quit {
                log::info!("Quit requested");
                shutdown.store(true, Ordering::Relaxed);
            }
        }

        if let TickOutcome::Transitioned { to, .. } = manager.update() {
            if let Some(state) = manager.state_graph().state(to) {
                println!("-> {}", state.name());
            }
        }

        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            log::info!("Run time elapsed");
            break;
        }
        std::thread::sleep(frame);
    }

    shutdown.store(true, Ordering::Relaxed);
    manager.play_pause(false);
    let cycles = manager.total_loops();
    drop(manager);

    let voices = render
        .join()
        .map_err(|_| anyhow::anyhow!("Render thread panicked"))?;
    log::info!(
        "Played {} cycles, {} batches, {} one-shots",
        cycles,
        voices.batches(),
        voices.one_shots()
    );
    if !voices.is_empty() {
        let sounding: Vec<_> = voices.sounding().collect();
        log::debug!("{} voices still sounding at exit: {}", voices.len(), sounding.join(", "));
    }
    Ok(())
}
