use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use voxworld_common::{CellCoord, SlotIndex, slot_index};
use voxworld_kernel::{Cell, Mesh};

/// Geometry state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshState {
    /// Published geometry reflects the cell and its neighbours.
    Current,
    /// Something changed since the geometry was last built.
    Stale,
    /// A worker holds the rebuild claim.
    Rebuilding,
}

/// Geometry published for a slot, tagged with the coordinate it was built for.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub coord: CellCoord,
    pub mesh: Arc<Mesh>,
}

#[derive(Debug)]
struct Published {
    geometry: Geometry,
    /// `stale_marks` value observed when the geometry was claimed.
    stamp: u64,
}

/// One table entry.
#[derive(Debug)]
pub struct Slot {
    cell: RwLock<Cell>,
    /// Bumped on every structural change that invalidates geometry.
    stale_marks: AtomicU64,
    rebuilding: AtomicBool,
    instant: AtomicBool,
    generated: AtomicBool,
    unsaved: AtomicBool,
    published: Mutex<Published>,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: RwLock::new(Cell::unbounded()),
            stale_marks: AtomicU64::new(0),
            rebuilding: AtomicBool::new(false),
            instant: AtomicBool::new(false),
            generated: AtomicBool::new(false),
            unsaved: AtomicBool::new(false),
            published: Mutex::new(Published {
                geometry: Geometry {
                    coord: CellCoord::UNBOUNDED,
                    mesh: Arc::new(Mesh::empty()),
                },
                stamp: 0,
            }),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Cell> {
        self.cell.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Cell> {
        self.cell.write()
    }

    /// Current occupant. Only a snapshot; re-check under the lock before use.
    pub fn coord(&self) -> CellCoord {
        self.cell.read().coord()
    }

    pub fn mesh_state(&self) -> MeshState {
        if self.rebuilding.load(Ordering::Acquire) {
            MeshState::Rebuilding
        } else if self.is_stale() {
            MeshState::Stale
        } else {
            MeshState::Current
        }
    }

    /// True when a change happened after the published geometry was claimed.
    pub fn is_stale(&self) -> bool {
        self.published.lock().stamp < self.stale_marks.load(Ordering::Acquire)
    }

    pub fn mark_stale(&self) {
        self.stale_marks.fetch_add(1, Ordering::AcqRel);
    }

    /// Ask the instant worker to rebuild this slot.
    pub fn request_instant(&self) {
        self.instant.store(true, Ordering::Release);
    }

    pub fn instant_requested(&self) -> bool {
        self.instant.load(Ordering::Acquire)
    }

    pub(crate) fn take_instant(&self) -> bool {
        self.instant.swap(false, Ordering::AcqRel)
    }

    pub fn is_generated(&self) -> bool {
        self.generated.load(Ordering::Acquire)
    }

    pub(crate) fn set_generated(&self) {
        self.generated.store(true, Ordering::Release);
    }

    /// True when the occupant was edited since it was generated, loaded or
    /// last saved.
    pub fn is_unsaved(&self) -> bool {
        self.unsaved.load(Ordering::Acquire)
    }

    pub(crate) fn set_unsaved(&self, unsaved: bool) {
        self.unsaved.store(unsaved, Ordering::Release);
    }

    /// The last published geometry.
    pub fn geometry(&self) -> Geometry {
        self.published.lock().geometry.clone()
    }

    /// Drop the published geometry of an evicted occupant.
    pub(crate) fn clear_geometry(&self) {
        let mut published = self.published.lock();
        published.geometry = Geometry {
            coord: CellCoord::UNBOUNDED,
            mesh: Arc::new(Mesh::empty()),
        };
    }

    /// Take the rebuild claim if the slot is stale and no other worker holds it.
    pub(crate) fn claim_if_stale(&self) -> Option<RebuildClaim<'_>> {
        if !self.is_stale() {
            return None;
        }
        self.claim()
    }

    /// Take the rebuild claim regardless of staleness.
    pub(crate) fn claim(&self) -> Option<RebuildClaim<'_>> {
        self.rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(RebuildClaim {
            slot: self,
            stamp: self.stale_marks.load(Ordering::Acquire),
        })
    }
}

/// Exclusive right to rebuild one slot. Released on drop, published or not.
///
/// The stamp is taken before any cell is read, so a change racing the
/// rebuild leaves the slot stale rather than marking outdated geometry
/// current.
pub(crate) struct RebuildClaim<'a> {
    slot: &'a Slot,
    stamp: u64,
}

impl RebuildClaim<'_> {
    pub(crate) fn publish(self, coord: CellCoord, mesh: Mesh) {
        let mut published = self.slot.published.lock();
        if self.stamp >= published.stamp {
            published.geometry = Geometry {
                coord,
                mesh: Arc::new(mesh),
            };
            published.stamp = self.stamp;
        }
    }
}

impl Drop for RebuildClaim<'_> {
    fn drop(&mut self) {
        self.slot.rebuilding.store(false, Ordering::Release);
    }
}

/// Fixed table of N³ slots. Many coordinates alias each slot; only the
/// coordinate stored in the slot's cell says who lives there.
#[derive(Debug)]
pub struct SlotTable {
    edge: usize,
    slots: Box<[Slot]>,
}

impl SlotTable {
    /// Every slot starts holding an empty cell at [`CellCoord::UNBOUNDED`],
    /// so no real coordinate is resident.
    pub fn new(edge: usize) -> Self {
        let slots = (0..edge * edge * edge).map(|_| Slot::new()).collect();
        tracing::debug!(edge, "slot table created");
        Self { edge, slots }
    }

    pub fn edge(&self) -> usize {
        self.edge
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index_of(&self, coord: CellCoord) -> SlotIndex {
        slot_index(coord, self.edge)
    }

    pub fn slot(&self, index: SlotIndex) -> &Slot {
        &self.slots[index.linear(self.edge)]
    }

    /// The slot `coord` maps to, whoever occupies it.
    pub fn slot_for(&self, coord: CellCoord) -> &Slot {
        self.slot(self.index_of(coord))
    }

    /// The slot holding `coord`, if it is resident right now.
    pub fn resident(&self, coord: CellCoord) -> Option<&Slot> {
        let slot = self.slot_for(coord);
        (slot.coord() == coord).then_some(slot)
    }

    /// Read guard on the cell at `coord`, if it is resident.
    pub fn read_resident(&self, coord: CellCoord) -> Option<RwLockReadGuard<'_, Cell>> {
        let guard = self.slot_for(coord).read();
        guard.holds(coord).then_some(guard)
    }

    /// Write guard on the cell at `coord`, if it is resident.
    pub fn write_resident(&self, coord: CellCoord) -> Option<RwLockWriteGuard<'_, Cell>> {
        let guard = self.slot_for(coord).write();
        guard.holds(coord).then_some(guard)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &Slot)> {
        let edge = self.edge;
        self.slots
            .iter()
            .enumerate()
            .map(move |(i, slot)| (SlotIndex::from_linear(i, edge), slot))
    }
}
