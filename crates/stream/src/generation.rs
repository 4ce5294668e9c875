use crate::stats::Counters;
use crate::world::VoxelWorld;
use std::ops::Range;
use std::sync::atomic::Ordering;
use voxworld_common::{CellCoord, Face};
use voxworld_kernel::{Cell, CellData, UpdateQueue};

impl VoxelWorld {
    /// Visit every in-scope coordinate whose x offset from the scope origin
    /// lies in `xs`, generating each one whose slot holds something else.
    /// Stops between coordinates once a stop is requested. Returns the number
    /// of cells generated.
    pub fn generation_pass(&self, xs: Range<usize>) -> usize {
        let n = self.table.edge();
        let mut generated = 0;
        for dx in xs {
            for dy in 0..n {
                for dz in 0..n {
                    if self.stop_requested() {
                        return generated;
                    }
                    let coord = self.scope().at(dx, dy, dz);
                    if self.generate(coord) {
                        generated += 1;
                    }
                }
            }
        }
        generated
    }

    /// Make `coord` the occupant of its slot. Returns false if it already was.
    ///
    /// Contents are loaded or synthesized before the cell lock is taken; the
    /// lock is held only to save the previous occupant and swap.
    pub fn generate(&self, coord: CellCoord) -> bool {
        let slot = self.table.slot_for(coord);
        if slot.coord() == coord {
            return false;
        }

        let loaded = self.gateway().load(coord);
        let was_loaded = loaded.is_some();
        let (data, updates) = match loaded {
            Some(cell) => (cell.data, cell.updates),
            None => {
                let mut data = CellData::empty();
                self.generator.synthesize(&mut data, coord);
                (data, UpdateQueue::new())
            }
        };

        {
            let mut cell = slot.write();
            if cell.holds(coord) {
                return false;
            }
            let previous = cell.coord();
            if !previous.is_unbounded() && self.needs_save(slot) {
                self.persist(slot, &cell);
            }
            *cell = Cell::new(coord, data, updates);
            slot.set_generated();
            slot.set_unsaved(false);
            slot.mark_stale();
            slot.clear_geometry();
            tracing::trace!(%previous, %coord, loaded = was_loaded, "slot reassigned");
        }

        for face in Face::ALL {
            if let Some(neighbor) = self.table.resident(coord.neighbor(face)) {
                neighbor.mark_stale();
            }
        }

        Counters::bump(&self.counters.generated, 1);
        if was_loaded {
            Counters::bump(&self.counters.loaded, 1);
        }
        true
    }

    /// First population of the table, the x range split across `workers`
    /// scoped threads.
    pub fn populate(&self, workers: usize) -> usize {
        let n = self.table.edge();
        let workers = workers.clamp(1, n);
        let _span = tracing::info_span!("populate", edge = n, workers).entered();

        let generated = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    let xs = n * w / workers..n * (w + 1) / workers;
                    s.spawn(move || self.generation_pass(xs))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        tracing::error!("population worker panicked");
                        0
                    })
                })
                .sum::<usize>()
        });

        if !self.stop_requested() {
            self.populated.store(true, Ordering::Release);
            tracing::info!(generated, "initial population complete");
        }
        generated
    }

    /// Fraction of the table generated so far, for loading screens.
    pub fn population_progress(&self) -> f64 {
        let total = self.config.volume();
        if self.is_populated() || total == 0 {
            return 1.0;
        }
        (self.generated_count().min(total) as f64) / total as f64
    }
}
