//! World kernel: cell contents and the collaborators that act on a single cell.
//!
//! # Invariants
//! - A cell's identity is the coordinate stored inside it, never where it sits.
//! - Generation is a pure function of the world seed and the cell coordinate.
//! - Geometry is derived data; rebuilding from unchanged inputs is idempotent.

pub mod cell;
pub mod generate;
pub mod mesh;
pub mod update;

pub use cell::{Cell, CellData};
pub use generate::{Generator, TerrainGenerator};
pub use mesh::{FaceMesher, GeometryBuilder, Mesh, Neighbors, Vertex};
pub use update::{ElementAccess, FallingRules, ScheduledUpdate, UpdateFlags, UpdateQueue, UpdateRules};
