use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::world::{SaveSweep, VoxelWorld};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use glam::{DVec3, I64Vec3};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use voxworld_common::element_of_point;
use voxworld_kernel::{Generator, TerrainGenerator};
use voxworld_persist::CellGateway;

/// Seed used when a save does not record one.
pub const DEFAULT_SEED: u64 = 3;

/// Outcome of [`WorldSession::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cells: SaveSweep,
    pub observer_saved: bool,
}

/// Choose the spawn point of a new world: above the surface at the origin
/// column, never below y = 0.1.
pub fn spawn_point(generator: &dyn Generator) -> DVec3 {
    let mut y = generator.height_at(0, 0) as f64 + 1.1;
    if y < 0.0 {
        y = 0.1;
    }
    DVec3::new(0.5, y, 0.5)
}

/// A running (or runnable) world and its worker threads.
///
/// `start` spawns a bootstrap thread that populates the table over scoped
/// threads, spawns the four re-derivation workers and then becomes the
/// generation worker. Every worker sleeps on the same stop channel; shutdown
/// raises the stop flag and drops the sender to wake them.
pub struct WorldSession {
    world: Arc<VoxelWorld>,
    seed: u64,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    bootstrap: Mutex<Option<JoinHandle<()>>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl WorldSession {
    /// Wrap an already constructed world.
    pub fn from_world(world: VoxelWorld, seed: u64) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        Self {
            world: Arc::new(world),
            seed,
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            bootstrap: Mutex::new(None),
            workers: Arc::new(Mutex::new(Vec::new())),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Start a fresh world: record the seed and spawn above the terrain.
    pub fn create(
        config: StreamConfig,
        mut gateway: CellGateway,
        seed: u64,
    ) -> Result<Self, StreamError> {
        gateway.save_seed(seed)?;
        let generator = TerrainGenerator::new(seed);
        let spawn = spawn_point(&generator);
        tracing::info!(seed, ?spawn, "creating world");
        Ok(Self::from_world(
            VoxelWorld::new(config, gateway, generator, spawn),
            seed,
        ))
    }

    /// Reopen a saved world at the stored observer position. A missing or
    /// malformed position falls back to the origin.
    pub fn resume(config: StreamConfig, mut gateway: CellGateway) -> Result<Self, StreamError> {
        let seed = match gateway.load_seed()? {
            Some(seed) => seed,
            None => {
                tracing::warn!(seed = DEFAULT_SEED, "save has no seed, using default");
                gateway.save_seed(DEFAULT_SEED)?;
                DEFAULT_SEED
            }
        };
        let observer = match gateway.load_observer() {
            Some(pos) => pos.as_dvec3() + DVec3::splat(0.5),
            None => {
                tracing::error!("could not read observer position, placing at origin");
                DVec3::ZERO
            }
        };
        tracing::info!(seed, ?observer, "resuming world");
        Ok(Self::from_world(
            VoxelWorld::new(config, gateway, TerrainGenerator::new(seed), observer),
            seed,
        ))
    }

    pub fn world(&self) -> &Arc<VoxelWorld> {
        &self.world
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Spawn the bootstrap thread. Calling twice, or after shutdown, logs an
    /// error and does nothing.
    pub fn start(&self) -> Result<(), StreamError> {
        if self.shut_down.load(Ordering::Acquire) {
            tracing::error!("start called after shutdown");
            return Ok(());
        }
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::error!("world already started");
            return Ok(());
        }

        let world = Arc::clone(&self.world);
        let rx = self.stop_rx.clone();
        let workers = Arc::clone(&self.workers);
        let handle = std::thread::Builder::new()
            .name("voxworld-generation".into())
            .spawn(move || bootstrap(world, rx, workers));
        match handle {
            Ok(handle) => {
                *self.bootstrap.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.started.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Block until the initial population completes, a stop is requested or
    /// `timeout` passes. Returns whether the table is populated.
    pub fn wait_populated(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.world.is_populated() {
            if self.world.stop_requested() || Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Stop and join every worker, then save all resident cells that need it
    /// and the observer position. Save failures are logged, never fatal.
    /// A second call logs an error and returns `None`.
    pub fn shutdown(&self) -> Option<ShutdownReport> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::error!("world already shut down");
            return None;
        }
        let _span = tracing::info_span!("shutdown").entered();

        self.world.request_stop();
        drop(self.stop_tx.lock().take());

        if let Some(handle) = self.bootstrap.lock().take() {
            join_worker(handle);
        }
        for handle in self.workers.lock().drain(..) {
            join_worker(handle);
        }
        tracing::info!("workers joined");

        let cells = self.world.save_resident();
        let position: I64Vec3 = element_of_point(self.world.observer());
        let mut gateway = self.world.gateway();
        let observer_saved = match gateway.save_observer(position) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "observer position not saved");
                false
            }
        };
        if let Err(e) = gateway.flush() {
            tracing::warn!(error = %e, "store flush failed");
        }
        Some(ShutdownReport {
            cells,
            observer_saved,
        })
    }
}

impl Drop for WorldSession {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::Acquire) {
            self.shutdown();
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("worker").to_owned();
    if handle.join().is_err() {
        tracing::error!(worker = %name, "worker panicked");
    }
}

/// Sleep up to `wait`. Returns false once the stop channel is closed.
fn idle(rx: &Receiver<()>, wait: Duration) -> bool {
    match rx.recv_timeout(wait) {
        Ok(()) | Err(RecvTimeoutError::Timeout) => true,
        Err(RecvTimeoutError::Disconnected) => false,
    }
}

fn bootstrap(world: Arc<VoxelWorld>, rx: Receiver<()>, workers: Arc<Mutex<Vec<JoinHandle<()>>>>) {
    world.populate(world.config().init_workers);
    if world.stop_requested() {
        return;
    }

    let remesh: [(&str, fn(&VoxelWorld) -> usize); 3] = [
        ("voxworld-remesh-exhaustive", VoxelWorld::remesh_exhaustive),
        ("voxworld-remesh-near", VoxelWorld::remesh_near_field),
        ("voxworld-remesh-ray", VoxelWorld::remesh_raycast),
    ];
    for (name, pass) in remesh {
        let world = Arc::clone(&world);
        let rx = rx.clone();
        let spawned = std::thread::Builder::new().name(name.into()).spawn(move || {
            let interval = world.config().remesh_interval();
            while !world.stop_requested() {
                pass(&world);
                if !idle(&rx, interval) {
                    break;
                }
            }
        });
        push_worker(&workers, name, spawned);
    }

    let instant_world = Arc::clone(&world);
    let instant_rx = rx.clone();
    let spawned = std::thread::Builder::new()
        .name("voxworld-remesh-instant".into())
        .spawn(move || {
            let period = instant_world.config().instant_min_period();
            while !instant_world.stop_requested() {
                let started = Instant::now();
                instant_world.remesh_instant();
                if !idle(&instant_rx, period.saturating_sub(started.elapsed())) {
                    break;
                }
            }
        });
    push_worker(&workers, "voxworld-remesh-instant", spawned);

    let interval = world.config().generation_interval();
    tracing::info!("workers running");
    while !world.stop_requested() {
        let generated = world.generation_pass(0..world.table().edge());
        if generated > 0 {
            tracing::debug!(generated, "generation pass");
        }
        if !idle(&rx, interval) {
            break;
        }
    }
}

fn push_worker(
    workers: &Mutex<Vec<JoinHandle<()>>>,
    name: &str,
    spawned: std::io::Result<JoinHandle<()>>,
) {
    match spawned {
        Ok(handle) => workers.lock().push(handle),
        Err(e) => tracing::error!(worker = name, error = %e, "failed to spawn worker"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxworld_common::{Element, ElementKind, cell_of};
    use voxworld_persist::{MemoryStore, OBSERVER_KEY, SectionStore, encode_position, section_key};

    fn test_config() -> StreamConfig {
        StreamConfig {
            generation_interval_ms: 5,
            remesh_interval_ms: 5,
            instant_min_period_ms: 10,
            ray_grid: 1,
            ..StreamConfig::with_edge(3)
        }
    }

    fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn spawn_point_sits_above_surface() {
        let generator = TerrainGenerator::new(DEFAULT_SEED);
        let spawn = spawn_point(&generator);
        assert_eq!(spawn.x, 0.5);
        assert_eq!(spawn.z, 0.5);
        let surface = generator.height_at(0, 0) as f64;
        assert!(spawn.y >= 0.1);
        assert!(spawn.y == surface + 1.1 || surface + 1.1 < 0.0);
    }

    #[test]
    fn create_records_seed() {
        let store = MemoryStore::new();
        let session = WorldSession::create(test_config(), CellGateway::new(store.clone()), 42).unwrap();
        assert_eq!(session.seed(), 42);
        let gateway = CellGateway::new(store);
        assert_eq!(gateway.load_seed().unwrap(), Some(42));
        drop(session);
    }

    #[test]
    fn resume_without_position_starts_at_origin() {
        let session = WorldSession::resume(test_config(), CellGateway::new(MemoryStore::new())).unwrap();
        assert_eq!(session.world().observer(), DVec3::ZERO);
        assert_eq!(session.seed(), DEFAULT_SEED);
    }

    #[test]
    fn resume_places_observer_mid_element() {
        let mut store = MemoryStore::new();
        store
            .write_section(OBSERVER_KEY, &encode_position(I64Vec3::new(10, -4, 300)))
            .unwrap();
        let session = WorldSession::resume(test_config(), CellGateway::new(store)).unwrap();
        assert_eq!(session.world().observer(), DVec3::new(10.5, -3.5, 300.5));
    }

    #[test]
    fn workers_populate_and_settle() {
        let store = MemoryStore::new();
        let session = WorldSession::create(test_config(), CellGateway::new(store.clone()), 3).unwrap();
        session.start().unwrap();
        assert!(session.wait_populated(Duration::from_secs(20)));
        let world = Arc::clone(session.world());
        wait_for("remesh to settle", || {
            let stats = world.stats();
            stats.stale == 0 && stats.rebuilding == 0
        });
        assert_eq!(world.stats().resident, 27);

        // An edit near the observer is rebuilt by the background workers.
        let pos = element_of_point(world.observer()) + I64Vec3::new(0, 2, 0);
        world
            .set_element(pos, Element::new(ElementKind::Stone), 0, true)
            .unwrap();
        wait_for("edit to be rebuilt", || {
            let stats = world.stats();
            stats.stale == 0 && stats.rebuilding == 0
        });

        // Moving the observer brings a new scope in.
        let moved = world.observer() + DVec3::new(16.0 * 4.0, 0.0, 0.0);
        world.recenter(moved);
        wait_for("new scope", || world.stats().resident == 27);

        let report = session.shutdown().unwrap();
        assert_eq!(report.cells.failed, 0);
        assert!(report.observer_saved);
        assert!(store.contains(OBSERVER_KEY));
        // The edited cell was evicted by the move and saved then.
        assert!(store.contains(&section_key(cell_of(pos))));
        assert!(session.shutdown().is_none());
    }

    #[test]
    fn second_start_spawns_nothing() {
        let session =
            WorldSession::create(test_config(), CellGateway::new(MemoryStore::new()), 3).unwrap();
        session.start().unwrap();
        assert!(session.wait_populated(Duration::from_secs(20)));
        wait_for("remesh workers", || session.workers.lock().len() == 4);
        let bootstrap = session.bootstrap.lock().as_ref().map(|h| h.thread().id());
        assert!(bootstrap.is_some());

        assert!(session.start().is_ok());
        assert_eq!(session.workers.lock().len(), 4);
        assert_eq!(
            session.bootstrap.lock().as_ref().map(|h| h.thread().id()),
            bootstrap
        );
        assert!(!session.world().stop_requested());
        assert!(session.shutdown().is_some());
    }

    #[test]
    fn shutdown_before_start_still_saves() {
        let store = MemoryStore::new();
        let session = WorldSession::create(test_config(), CellGateway::new(store.clone()), 3).unwrap();
        session.world().generation_pass(0..3);
        let center = session.world().scope().center;
        let pos = center.origin() + I64Vec3::new(1, 1, 1);
        session
            .world()
            .set_element(pos, Element::new(ElementKind::Dirt), 0, false)
            .unwrap();

        let report = session.shutdown().unwrap();
        assert_eq!(report.cells.saved, 1);
        assert!(store.contains(&section_key(center)));
        assert!(session.start().is_ok());
        assert!(session.world().stop_requested());
    }

    #[test]
    fn shutdown_survives_failing_store() {
        let store = MemoryStore::new();
        let session = WorldSession::create(test_config(), CellGateway::new(store.clone()), 3).unwrap();
        session.start().unwrap();
        assert!(session.wait_populated(Duration::from_secs(20)));
        let world = Arc::clone(session.world());
        let pos = element_of_point(world.observer());
        world
            .set_element(pos, Element::new(ElementKind::Sand), 0, false)
            .unwrap();
        store.set_fail_writes(true);

        let report = session.shutdown().unwrap();
        assert_eq!(report.cells.failed, 1);
        assert!(!report.observer_saved);
    }
}
