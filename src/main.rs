//! Oxidized-Reality - headless session host
//!
//! Boots a cartridge image on a mupen64plus-compatible core, advances a
//! number of frames and optionally persists save RAM and a save state.

use anyhow::{Context, Result};
use clap::Parser;
use or_core::Config;
use or_engine::{ModuleLoader, NativeLoader, SimulatedEngine, SimulatedLoader};
use or_session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "oxidized-reality")]
#[command(about = "Run a cartridge image headless on a mupen64plus-compatible core")]
struct Args {
    /// Cartridge image to boot
    rom: PathBuf,

    /// Core library: a path, or a bare name resolved in --lib-dir
    #[arg(long, default_value = "mupen64plus")]
    core: String,

    /// Directory searched for core and plugin libraries (repeatable)
    #[arg(long = "lib-dir")]
    lib_dirs: Vec<PathBuf>,

    /// Configuration file; defaults to the per-user config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long, default_value = "60")]
    frames: u64,

    /// Use the built-in simulated core instead of loading a library
    #[arg(long)]
    simulate: bool,

    /// Restore save RAM from this file before running
    #[arg(long)]
    load_save_ram: Option<PathBuf>,

    /// Write save RAM to this file once the session has ended
    #[arg(long)]
    save_ram: Option<PathBuf>,

    /// Restore a save state from this file before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state to this file after the last frame
    #[arg(long)]
    save_state: Option<PathBuf>,
}

fn loader(args: &Args) -> Arc<dyn ModuleLoader> {
    if args.simulate {
        tracing::info!("Using the simulated core");
        return Arc::new(SimulatedLoader::new(Arc::new(SimulatedEngine::new())));
    }
    let loader = args
        .lib_dirs
        .iter()
        .fold(NativeLoader::new(), |loader, dir| loader.with_search_dir(dir));
    Arc::new(loader)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    or_core::logging::init(config.debug.log_level);

    tracing::info!("Starting Oxidized-Reality");

    let rom = std::fs::read(&args.rom)
        .with_context(|| format!("reading cartridge image {}", args.rom.display()))?;
    let session = Session::start(loader(&args), &args.core, &rom, &config)
        .with_context(|| format!("starting core {}", args.core))?;

    if let Some(path) = &args.load_save_ram {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading save RAM {}", path.display()))?;
        session.load_non_volatile_memory(&bytes)?;
    }
    if let Some(path) = &args.load_state {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading save state {}", path.display()))?;
        session.load_state(&bytes)?;
    }

    let started = Instant::now();
    for _ in 0..args.frames {
        session.advance_frame()?;
    }
    tracing::info!(
        "Ran {} frames in {:.2?}",
        session.frame_count(),
        started.elapsed()
    );

    if let Some(path) = &args.save_state {
        std::fs::write(path, session.save_state()?)
            .with_context(|| format!("writing save state {}", path.display()))?;
    }

    session.teardown()?;

    if let Some(path) = &args.save_ram {
        std::fs::write(path, session.save_non_volatile_memory()?)
            .with_context(|| format!("writing save RAM {}", path.display()))?;
    }
    Ok(())
}
