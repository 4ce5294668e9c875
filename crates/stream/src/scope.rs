use glam::{DVec3, I64Vec3};
use voxworld_common::{CellCoord, SlotIndex, cell_of_point};

/// The resident region: an N-cell cube whose origin trails the observer's
/// cell by N/2 on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scope {
    /// Observer position in element units.
    pub observer: DVec3,
    /// Cell containing the observer.
    pub center: CellCoord,
    /// Lowest corner of the region.
    pub origin: CellCoord,
    pub edge: usize,
}

impl Scope {
    pub fn around(observer: DVec3, edge: usize) -> Self {
        let center = cell_of_point(observer);
        let half = (edge / 2) as i64;
        Self {
            observer,
            center,
            origin: CellCoord::new(center.x - half, center.y - half, center.z - half),
            edge,
        }
    }

    /// Coordinate at offset `(dx, dy, dz)` from the origin.
    pub fn at(&self, dx: usize, dy: usize, dz: usize) -> CellCoord {
        CellCoord::new(
            self.origin.x + dx as i64,
            self.origin.y + dy as i64,
            self.origin.z + dz as i64,
        )
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        let n = self.edge as i64;
        let inside = |c: i64, o: i64| c >= o && c < o + n;
        inside(coord.x, self.origin.x) && inside(coord.y, self.origin.y) && inside(coord.z, self.origin.z)
    }

    /// The one in-scope coordinate that maps to `index`.
    pub fn required(&self, index: SlotIndex) -> CellCoord {
        let n = self.edge as i64;
        let axis = |i: usize, o: i64| o + (i as i64 - o).rem_euclid(n);
        CellCoord::new(
            axis(index.i, self.origin.x),
            axis(index.j, self.origin.y),
            axis(index.k, self.origin.z),
        )
    }

    /// World offset of a cell's origin relative to the observer.
    pub fn offset_of(&self, coord: CellCoord) -> DVec3 {
        let origin: I64Vec3 = coord.origin();
        origin.as_dvec3() - self.observer
    }
}
