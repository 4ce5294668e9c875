use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::scope::Scope;
use crate::stats::{self, Counters, StreamStats};
use crate::table::{MeshState, Slot, SlotTable};
use glam::{DVec3, I64Vec3};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use voxworld_common::{CellCoord, Element, Face, cell_of, local_of, world_pos};
use voxworld_kernel::{
    Cell, ElementAccess, FaceMesher, FallingRules, Generator, GeometryBuilder, Mesh, UpdateFlags,
    UpdateRules,
};
use voxworld_persist::CellGateway;

/// One renderable cell: geometry plus where to draw it.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub coord: CellCoord,
    /// Cell origin relative to the observer, in elements.
    pub offset: DVec3,
    pub mesh: Arc<Mesh>,
}

/// Result of a persistence sweep over every resident cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSweep {
    pub saved: usize,
    pub failed: usize,
}

/// Shared state of a streamed world. Workers hold it through an `Arc`; the
/// control thread calls the public methods directly.
///
/// Lock order: a cell lock may be held while taking the gateway mutex, never
/// the reverse. Several cell locks are only ever held together as read locks
/// taken in ascending slot order.
pub struct VoxelWorld {
    pub(crate) config: StreamConfig,
    pub(crate) table: SlotTable,
    pub(crate) scope: RwLock<Scope>,
    pub(crate) gateway: Mutex<CellGateway>,
    pub(crate) generator: Box<dyn Generator>,
    pub(crate) mesher: Box<dyn GeometryBuilder>,
    pub(crate) rules: Box<dyn UpdateRules>,
    pub(crate) stop: AtomicBool,
    pub(crate) populated: AtomicBool,
    pub(crate) counters: Counters,
}

impl VoxelWorld {
    /// Build a world around `observer` with face meshing and falling rules.
    /// No cell is resident until the generation worker visits it.
    pub fn new(
        config: StreamConfig,
        gateway: CellGateway,
        generator: impl Generator + 'static,
        observer: DVec3,
    ) -> Self {
        let config = config.normalized();
        let table = SlotTable::new(config.edge);
        let scope = Scope::around(observer, config.edge);
        tracing::info!(edge = config.edge, center = %scope.center, "voxel world created");
        Self {
            table,
            scope: RwLock::new(scope),
            gateway: Mutex::new(gateway),
            generator: Box::new(generator),
            mesher: Box::new(FaceMesher),
            rules: Box::new(FallingRules),
            stop: AtomicBool::new(false),
            populated: AtomicBool::new(false),
            counters: Counters::default(),
            config,
        }
    }

    pub fn with_mesher(mut self, mesher: impl GeometryBuilder + 'static) -> Self {
        self.mesher = Box::new(mesher);
        self
    }

    pub fn with_rules(mut self, rules: impl UpdateRules + 'static) -> Self {
        self.rules = Box::new(rules);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    pub fn scope(&self) -> Scope {
        *self.scope.read()
    }

    pub fn observer(&self) -> DVec3 {
        self.scope.read().observer
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    pub(crate) fn gateway(&self) -> MutexGuard<'_, CellGateway> {
        self.gateway.lock()
    }

    /// Move the observer. Only bookkeeping: the generation worker notices
    /// slots whose occupant no longer matches and swaps them.
    pub fn recenter(&self, observer: DVec3) {
        let next = Scope::around(observer, self.table.edge());
        let mut scope = self.scope.write();
        if next.center != scope.center {
            tracing::debug!(from = %scope.center, to = %next.center, "scope recentered");
        }
        *scope = next;
    }

    /// Element at `pos`, or `NotResident` when the owning slot holds another
    /// cell. Every coordinate is not resident until first generated.
    pub fn get_element(&self, pos: I64Vec3) -> Result<Element, StreamError> {
        let coord = cell_of(pos);
        let cell = self
            .table
            .read_resident(coord)
            .ok_or(StreamError::NotResident { coord })?;
        Ok(cell.element(local_of(pos)))
    }

    /// Like [`Self::get_element`], with [`Element::ERR`] standing in for a
    /// non-resident coordinate.
    pub fn element_or_err(&self, pos: I64Vec3) -> Element {
        self.get_element(pos).unwrap_or(Element::ERR)
    }

    /// Write an element.
    ///
    /// With `propagate > 0`, the element and its six neighbours are scheduled
    /// for re-evaluation after `propagate - 1` flushes. The owning slot and
    /// every resident neighbour sharing the edited boundary are flagged stale;
    /// `instant` additionally queues them for the instant re-derivation pass.
    /// Fails without side effects if the cell is not resident.
    pub fn set_element(
        &self,
        pos: I64Vec3,
        element: Element,
        propagate: u8,
        instant: bool,
    ) -> Result<(), StreamError> {
        let coord = cell_of(pos);
        let local = local_of(pos);
        let slot = self.table.slot_for(coord);
        let mut crossing = Vec::new();
        {
            let mut cell = slot.write();
            if !cell.holds(coord) {
                return Err(StreamError::NotResident { coord });
            }
            cell.set_element(local, element);
            if propagate > 0 {
                let delay = propagate - 1;
                cell.updates_mut().push(local, delay, UpdateFlags::NONE);
                for face in Face::ALL {
                    match local.step(face) {
                        (next, false) => cell.updates_mut().push(next, delay, UpdateFlags::NONE),
                        (_, true) => crossing.push((pos + face.offset(), delay)),
                    }
                }
            }
            slot.set_unsaved(true);
        }

        flag_for_rebuild(slot, instant);
        for face in Face::ALL {
            if local.is_on_face(face) {
                if let Some(neighbor) = self.table.resident(coord.neighbor(face)) {
                    flag_for_rebuild(neighbor, instant);
                }
            }
        }
        // Notifications into non-resident neighbours are dropped.
        for (pos, delay) in crossing {
            self.schedule_update(pos, delay, UpdateFlags::NONE);
        }
        tracing::trace!(?pos, kind = ?element.kind, propagate, instant, "element set");
        Ok(())
    }

    /// Queue a re-evaluation of `pos` after `delay` flushes. Returns false if
    /// the cell is not resident.
    pub fn schedule_update(&self, pos: I64Vec3, delay: u8, flags: UpdateFlags) -> bool {
        let coord = cell_of(pos);
        let slot = self.table.slot_for(coord);
        let mut cell = slot.write();
        if !cell.holds(coord) {
            return false;
        }
        cell.updates_mut().push(local_of(pos), delay, flags);
        slot.set_unsaved(true);
        true
    }

    /// Run one tick of every cell's update queue. Due entries are collected
    /// from all slots first and evaluated afterwards, so entries queued while
    /// evaluating wait for a later flush. Returns how many ran.
    pub fn flush_scheduled_updates(&self) -> usize {
        let _span = tracing::debug_span!("flush_scheduled_updates").entered();
        let mut due = Vec::new();
        for (_, slot) in self.table.iter() {
            if slot.read().updates().is_empty() {
                continue;
            }
            let mut cell = slot.write();
            let coord = cell.coord();
            if coord.is_unbounded() {
                continue;
            }
            for update in cell.updates_mut().tick() {
                due.push((world_pos(coord, update.local), update.flags));
            }
            slot.set_unsaved(true);
        }

        let ran = due.len();
        for (pos, flags) in due {
            self.rules.evaluate(self, pos, flags);
        }
        Counters::bump(&self.counters.updates_run, ran);
        if ran > 0 {
            tracing::debug!(ran, "scheduled updates flushed");
        }
        ran
    }

    /// Geometry of every occupied slot, positioned relative to the observer.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let scope = self.scope();
        self.table
            .iter()
            .filter_map(|(_, slot)| {
                let geometry = slot.geometry();
                (!geometry.coord.is_unbounded()).then(|| DrawItem {
                    coord: geometry.coord,
                    offset: scope.offset_of(geometry.coord),
                    mesh: geometry.mesh,
                })
            })
            .collect()
    }

    pub fn triangle_count(&self) -> usize {
        let points: usize = self
            .table
            .iter()
            .map(|(_, slot)| slot.geometry().mesh.point_count())
            .sum();
        points / 3
    }

    /// True once the initial population pass has finished.
    pub fn is_populated(&self) -> bool {
        self.populated.load(Ordering::Acquire)
    }

    /// Cells generated or loaded so far. Never decreases.
    pub fn generated_count(&self) -> usize {
        stats::load(&self.counters.generated)
    }

    /// Ask every worker to stop at its next coordinate boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StreamStats {
        let scope = self.scope();
        let mut out = StreamStats::default();
        for (index, slot) in self.table.iter() {
            if slot.coord() == scope.required(index) {
                out.resident += 1;
            }
            match slot.mesh_state() {
                MeshState::Stale => out.stale += 1,
                MeshState::Rebuilding => out.rebuilding += 1,
                MeshState::Current => {}
            }
            if slot.instant_requested() {
                out.instant_pending += 1;
            }
            if slot.is_unsaved() {
                out.unsaved += 1;
            }
            out.triangles += slot.geometry().mesh.triangle_count();
        }
        let c = &self.counters;
        out.generated_total = stats::load(&c.generated);
        out.loaded_total = stats::load(&c.loaded);
        out.saved_total = stats::load(&c.saved);
        out.save_failures = stats::load(&c.save_failures);
        out.rebuilt_exhaustive = stats::load(&c.rebuilt_exhaustive);
        out.rebuilt_near_field = stats::load(&c.rebuilt_near_field);
        out.rebuilt_raycast = stats::load(&c.rebuilt_raycast);
        out.rebuilt_instant = stats::load(&c.rebuilt_instant);
        out.updates_run = stats::load(&c.updates_run);
        out
    }

    /// Whether a cell with these flags has to be written before it is dropped.
    pub(crate) fn needs_save(&self, slot: &Slot) -> bool {
        slot.is_generated() && (slot.is_unsaved() || self.config.persist_clean_cells)
    }

    /// Save `cell`, which the caller holds locked. Failures are logged and
    /// counted, never propagated.
    pub(crate) fn persist(&self, slot: &Slot, cell: &Cell) -> bool {
        let coord = cell.coord();
        match self.gateway().save(coord, cell.data(), cell.updates()) {
            Ok(()) => {
                slot.set_unsaved(false);
                Counters::bump(&self.counters.saved, 1);
                tracing::trace!(%coord, "cell saved");
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.save_failures, 1);
                tracing::warn!(%coord, error = %e, "cell save failed, changes lost");
                false
            }
        }
    }

    /// Save every resident cell that needs it.
    pub fn save_resident(&self) -> SaveSweep {
        let _span = tracing::info_span!("save_resident").entered();
        let mut sweep = SaveSweep::default();
        for (_, slot) in self.table.iter() {
            let cell = slot.read();
            if cell.coord().is_unbounded() || !self.needs_save(slot) {
                continue;
            }
            if self.persist(slot, &cell) {
                sweep.saved += 1;
            } else {
                sweep.failed += 1;
            }
        }
        tracing::info!(saved = sweep.saved, failed = sweep.failed, "resident cells saved");
        sweep
    }
}

fn flag_for_rebuild(slot: &Slot, instant: bool) {
    slot.mark_stale();
    if instant {
        slot.request_instant();
    }
}

impl ElementAccess for VoxelWorld {
    fn element(&self, pos: I64Vec3) -> Element {
        self.element_or_err(pos)
    }

    fn place(&self, pos: I64Vec3, element: Element, propagate: u8) -> bool {
        self.set_element(pos, element, propagate, false).is_ok()
    }
}
