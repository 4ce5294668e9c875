use glam::{DVec3, I64Vec3};

use crate::types::{CELL_EDGE, CellCoord, LocalPos};

/// Index of a slot in an `n`×`n`×`n` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

impl SlotIndex {
    pub const fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }

    /// Position in a flat array of `n³` slots.
    pub fn linear(self, n: usize) -> usize {
        (self.i * n + self.j) * n + self.k
    }

    /// Inverse of [`SlotIndex::linear`].
    pub fn from_linear(index: usize, n: usize) -> Self {
        Self {
            i: index / (n * n),
            j: index / n % n,
            k: index % n,
        }
    }
}

/// Slot owning `coord` in a table of edge length `n`: component-wise floor
/// modulo, so negative coordinates wrap instead of going negative.
pub fn slot_index(coord: CellCoord, n: usize) -> SlotIndex {
    let n = n as i64;
    SlotIndex {
        i: coord.x.rem_euclid(n) as usize,
        j: coord.y.rem_euclid(n) as usize,
        k: coord.z.rem_euclid(n) as usize,
    }
}

/// Cell containing the element at `pos`.
pub fn cell_of(pos: I64Vec3) -> CellCoord {
    CellCoord::new(
        pos.x.div_euclid(CELL_EDGE),
        pos.y.div_euclid(CELL_EDGE),
        pos.z.div_euclid(CELL_EDGE),
    )
}

/// Offset of the element at `pos` inside its cell.
pub fn local_of(pos: I64Vec3) -> LocalPos {
    LocalPos::new(
        pos.x.rem_euclid(CELL_EDGE) as u8,
        pos.y.rem_euclid(CELL_EDGE) as u8,
        pos.z.rem_euclid(CELL_EDGE) as u8,
    )
}

/// Element containing a continuous world-space point.
pub fn element_of_point(pos: DVec3) -> I64Vec3 {
    let p = pos.floor();
    I64Vec3::new(p.x as i64, p.y as i64, p.z as i64)
}

/// Cell containing a continuous world-space point.
pub fn cell_of_point(pos: DVec3) -> CellCoord {
    let p = (pos / CELL_EDGE as f64).floor();
    CellCoord::new(p.x as i64, p.y as i64, p.z as i64)
}

/// Recompose a world element position from its cell and in-cell offset.
pub fn world_pos(coord: CellCoord, local: LocalPos) -> I64Vec3 {
    coord.origin() + I64Vec3::new(local.x as i64, local.y as i64, local.z as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_is_floor_modulo() {
        assert_eq!(slot_index(CellCoord::new(0, 0, 0), 4), SlotIndex::new(0, 0, 0));
        assert_eq!(slot_index(CellCoord::new(-1, -4, -5), 4), SlotIndex::new(3, 0, 3));
        assert_eq!(slot_index(CellCoord::new(9, 4, 7), 4), SlotIndex::new(1, 0, 3));
    }

    #[test]
    fn aliased_coords_share_a_slot() {
        let n = 5;
        let a = CellCoord::new(2, -1, 3);
        let b = CellCoord::new(2 + n as i64, -1 - n as i64, 3);
        assert_ne!(a, b);
        assert_eq!(slot_index(a, n), slot_index(b, n));
    }

    #[test]
    fn linear_roundtrip() {
        let n = 7;
        for index in 0..n * n * n {
            assert_eq!(SlotIndex::from_linear(index, n).linear(n), index);
        }
    }

    #[test]
    fn cell_and_local_of_negative_positions() {
        let p = I64Vec3::new(-1, -16, -17);
        assert_eq!(cell_of(p), CellCoord::new(-1, -1, -2));
        assert_eq!(local_of(p), LocalPos::new(15, 0, 15));
    }

    #[test]
    fn decomposition_roundtrip() {
        for x in -40..40 {
            for (y, z) in [(-33, 5), (0, -1), (17, 31)] {
                let p = I64Vec3::new(x, y, z);
                let cell = cell_of(p);
                let local = local_of(p);
                assert_eq!(world_pos(cell, local), p);
                let recomposed = I64Vec3::new(local.x as i64, local.y as i64, local.z as i64)
                    + cell.origin();
                assert_eq!(cell_of(recomposed), cell);
            }
        }
    }

    #[test]
    fn point_mapping_floors() {
        let p = DVec3::new(-0.25, 15.99, 16.0);
        assert_eq!(element_of_point(p), I64Vec3::new(-1, 15, 16));
        assert_eq!(cell_of_point(p), CellCoord::new(-1, 0, 1));
        assert_eq!(cell_of_point(p), cell_of(element_of_point(p)));
    }
}
