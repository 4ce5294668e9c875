//! Shared types: cell coordinates, in-cell positions, faces, the coordinate
//! mapper and the static element table.
//!
//! # Invariants
//! - Every mapping here is pure arithmetic with no failure modes.
//! - Signed coordinates always map through floor division / floor modulo, never
//!   truncation, so negative space behaves like positive space.

pub mod coords;
pub mod element;
pub mod types;

pub use coords::{SlotIndex, cell_of, cell_of_point, element_of_point, local_of, slot_index, world_pos};
pub use element::{Element, ElementInfo, ElementKind};
pub use types::{CELL_EDGE, CELL_VOLUME, CellCoord, Face, LocalPos};
