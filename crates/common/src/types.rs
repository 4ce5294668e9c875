use glam::I64Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge length of a cell, in elements.
pub const CELL_EDGE: i64 = 16;

/// Number of elements in one cell.
pub const CELL_VOLUME: usize = (CELL_EDGE * CELL_EDGE * CELL_EDGE) as usize;

/// Absolute position of a cell in the unbounded lattice, in units of
/// [`CELL_EDGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl CellCoord {
    /// Sentinel carried by slots that hold no real cell yet. No coordinate the
    /// scope can ever require compares equal to it.
    pub const UNBOUNDED: Self = Self {
        x: i64::MAX,
        y: i64::MAX,
        z: i64::MAX,
    };

    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    pub fn is_unbounded(self) -> bool {
        self == Self::UNBOUNDED
    }

    /// The face-adjacent cell in the given direction.
    pub fn neighbor(self, face: Face) -> Self {
        let d = face.offset();
        Self {
            x: self.x.wrapping_add(d.x),
            y: self.y.wrapping_add(d.y),
            z: self.z.wrapping_add(d.z),
        }
    }

    /// World-space element position of this cell's (0, 0, 0) corner.
    pub fn origin(self) -> I64Vec3 {
        I64Vec3::new(
            self.x.wrapping_mul(CELL_EDGE),
            self.y.wrapping_mul(CELL_EDGE),
            self.z.wrapping_mul(CELL_EDGE),
        )
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "(unbounded)")
        } else {
            write!(f, "({}, {}, {})", self.x, self.y, self.z)
        }
    }
}

/// Offset of an element inside its cell. Each component is in `0..CELL_EDGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl LocalPos {
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Dense index into a cell's element array.
    pub fn index(self) -> usize {
        let edge = CELL_EDGE as usize;
        (self.x as usize * edge + self.y as usize) * edge + self.z as usize
    }

    /// Inverse of [`LocalPos::index`].
    pub fn from_index(index: usize) -> Self {
        let edge = CELL_EDGE as usize;
        Self {
            x: (index / (edge * edge)) as u8,
            y: (index / edge % edge) as u8,
            z: (index % edge) as u8,
        }
    }

    /// Whether this position lies on the boundary layer facing `face`.
    pub fn is_on_face(self, face: Face) -> bool {
        let last = (CELL_EDGE - 1) as u8;
        match face {
            Face::East => self.x == last,
            Face::West => self.x == 0,
            Face::Up => self.y == last,
            Face::Down => self.y == 0,
            Face::South => self.z == last,
            Face::North => self.z == 0,
        }
    }

    /// Step one element towards `face`. Returns the new position and whether
    /// the step crossed into the neighbouring cell (in which case the position
    /// is wrapped to the matching boundary of that cell).
    pub fn step(self, face: Face) -> (Self, bool) {
        let crossed = self.is_on_face(face);
        let d = face.offset();
        let wrap = |v: u8, d: i64| (v as i64 + d).rem_euclid(CELL_EDGE) as u8;
        (
            Self {
                x: wrap(self.x, d.x),
                y: wrap(self.y, d.y),
                z: wrap(self.z, d.z),
            },
            crossed,
        )
    }

    /// Iterate every position of a cell in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..CELL_VOLUME).map(Self::from_index)
    }
}

/// The six face directions. `East` is +x, `Up` is +y, `South` is +z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Up,
        Face::Down,
        Face::North,
        Face::South,
        Face::East,
        Face::West,
    ];

    /// Unit offset of this direction.
    pub fn offset(self) -> I64Vec3 {
        match self {
            Face::Up => I64Vec3::new(0, 1, 0),
            Face::Down => I64Vec3::new(0, -1, 0),
            Face::North => I64Vec3::new(0, 0, -1),
            Face::South => I64Vec3::new(0, 0, 1),
            Face::East => I64Vec3::new(1, 0, 0),
            Face::West => I64Vec3::new(-1, 0, 0),
        }
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::Up => Face::Down,
            Face::Down => Face::Up,
            Face::North => Face::South,
            Face::South => Face::North,
            Face::East => Face::West,
            Face::West => Face::East,
        }
    }
}
