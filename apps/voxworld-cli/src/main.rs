use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use glam::{DVec3, I64Vec3};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use voxworld_common::{Element, ElementKind, element_of_point};
use voxworld_persist::{CellGateway, SaveStore, SectionStore, StoreConfig};
use voxworld_render::{DebugTextRenderer, PointCounter, RenderView, Renderer, render_world};
use voxworld_stream::{DEFAULT_SEED, FrameTimer, StreamConfig, WorldSession};

#[derive(Parser)]
#[command(name = "voxworld-cli", about = "Headless driver for the streaming voxel world")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON file with `stream` and `store` settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SaveArgs {
    /// Directory holding saves
    #[arg(short, long, default_value = "saves")]
    dir: PathBuf,
    /// Save name; the save lives in `<dir>/<name>.world`
    #[arg(short, long, default_value = "world")]
    name: String,
}

#[derive(Args)]
struct RunArgs {
    /// Frames to run before shutting down
    #[arg(short, long, default_value = "300")]
    frames: u32,
    /// Observer movement per frame along +x, in elements
    #[arg(long, default_value = "1.5")]
    speed: f64,
    /// Drop sand above the observer every this many frames (0 disables)
    #[arg(long, default_value = "20")]
    edit_every: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the effective configuration
    Info,
    /// Create a new world and run it
    New {
        #[command(flatten)]
        save: SaveArgs,
        #[command(flatten)]
        run: RunArgs,
        /// Terrain seed
        #[arg(short, long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Resume a saved world and run it
    Resume {
        #[command(flatten)]
        save: SaveArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// List what a save contains
    Inspect {
        #[command(flatten)]
        save: SaveArgs,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    stream: StreamConfig,
    store: StoreConfig,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening config {}", path.display()))?;
    let config: CliConfig = serde_json::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn open_store(save: &SaveArgs, config: &CliConfig) -> anyhow::Result<SaveStore> {
    std::fs::create_dir_all(&save.dir)
        .with_context(|| format!("creating save directory {}", save.dir.display()))?;
    SaveStore::open_named(&save.dir, &save.name, config.store.clone())
        .with_context(|| format!("opening save {:?}", save.name))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("voxworld-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::New { save, run, seed } => {
            let store = open_store(&save, &config)?;
            let session =
                WorldSession::create(config.stream.clone(), CellGateway::new(store), seed)?;
            run_session(&session, &run)?;
        }
        Commands::Resume { save, run } => {
            let store = open_store(&save, &config)?;
            let session = WorldSession::resume(config.stream.clone(), CellGateway::new(store))?;
            run_session(&session, &run)?;
        }
        Commands::Inspect { save } => {
            let store = open_store(&save, &config)?;
            let keys = store.section_keys()?;
            let cells = keys.iter().filter(|k| k.starts_with("cell_")).count();
            println!("Save: {}", store.root().display());
            println!("Schema: v{}", store.meta().schema_version);
            println!("Sections: {} ({cells} cells)", keys.len());
            let gateway = CellGateway::new(store);
            match gateway.load_seed()? {
                Some(seed) => println!("Seed: {seed}"),
                None => println!("Seed: (none, default {DEFAULT_SEED})"),
            }
            match gateway.load_observer() {
                Some(p) => println!("Observer: ({}, {}, {})", p.x, p.y, p.z),
                None => println!("Observer: (none)"),
            }
        }
    }

    Ok(())
}

fn run_session(session: &WorldSession, run: &RunArgs) -> anyhow::Result<()> {
    let world = session.world();
    session.start()?;

    let population_started = Instant::now();
    while !session.wait_populated(Duration::from_millis(250)) {
        println!("Populating: {:.0}%", world.population_progress() * 100.0);
    }
    println!(
        "Populated {} cells in {:?}",
        world.generated_count(),
        population_started.elapsed()
    );

    let frame_budget = Duration::from_millis(16);
    let mut timer = FrameTimer::new(120);
    let mut edits = 0usize;
    let mut observer = world.observer();

    for frame in 0..run.frames {
        let frame_start = Instant::now();

        observer += DVec3::new(run.speed, 0.0, 0.0);
        world.recenter(observer);

        if run.edit_every > 0 && frame % run.edit_every == 0 {
            let above = element_of_point(observer) + I64Vec3::new(0, 4, 0);
            match world.set_element(above, Element::new(ElementKind::Sand), 2, true) {
                Ok(()) => edits += 1,
                Err(e) => tracing::debug!(error = %e, "edit skipped"),
            }
        }
        world.flush_scheduled_updates();

        let summary = render_world(&PointCounter, world, &RenderView::at(observer));
        tracing::trace!(frame, triangles = summary.triangles, "frame");

        let elapsed = frame_start.elapsed();
        timer.record(elapsed);
        if let Some(rest) = frame_budget.checked_sub(elapsed) {
            std::thread::sleep(rest);
        }
    }

    let view = RenderView::at(observer);
    print!("{}", DebugTextRenderer::new().render(&world.draw_list(), &view));

    let stats = world.stats();
    println!(
        "Frames: {} avg={:?} min={:?} max={:?}",
        timer.count(),
        timer.average(),
        timer.min(),
        timer.max()
    );
    println!(
        "Cells: resident={} stale={} generated={} loaded={} edits={}",
        stats.resident, stats.stale, stats.generated_total, stats.loaded_total, edits
    );
    println!(
        "Rebuilds: exhaustive={} near={} ray={} instant={} updates={}",
        stats.rebuilt_exhaustive,
        stats.rebuilt_near_field,
        stats.rebuilt_raycast,
        stats.rebuilt_instant,
        stats.updates_run
    );

    if let Some(report) = session.shutdown() {
        println!(
            "Shutdown: saved={} failed={} observer_saved={}",
            report.cells.saved, report.cells.failed, report.observer_saved
        );
    }
    Ok(())
}
