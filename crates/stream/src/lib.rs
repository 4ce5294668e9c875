//! Streaming: a toroidal cache of cells around a moving observer.
//!
//! One generation worker swaps required cells into slots. Four re-derivation
//! passes rebuild stale geometry: every slot, a near field around the
//! observer, cells hit by rays from the eye, and slots flagged by instant
//! edits.
//!
//! # Invariants
//! - A slot's identity is the coordinate stored in its cell; aliasing
//!   coordinates are never resident at the same time.
//! - An edited cell is saved before its slot is handed to another coordinate.
//! - Published geometry is never marked current if the cell or a neighbour
//!   changed after the rebuild started.
//! - Workers stop between coordinates, never mid-cell; shutdown joins them
//!   all before the final save.

mod config;
mod error;
mod generation;
mod lifecycle;
mod remesh;
mod scope;
mod stats;
mod table;
mod world;

pub use config::StreamConfig;
pub use error::StreamError;
pub use lifecycle::{DEFAULT_SEED, ShutdownReport, WorldSession, spawn_point};
pub use remesh::RayHit;
pub use scope::Scope;
pub use stats::{FrameTimer, StreamStats};
pub use table::{Geometry, MeshState, Slot, SlotTable};
pub use world::{DrawItem, SaveSweep, VoxelWorld};
