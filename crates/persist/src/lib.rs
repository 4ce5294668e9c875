//! Persistence: a section-keyed save store and the cell gateway on top of it.
//!
//! # Invariants
//! - A missing section is not an error; it means "never saved".
//! - Section payloads are integrity-checked on read and written atomically
//!   (temp file + rename).
//! - Section keys for cells are deterministic and collision-free.

mod gateway;
mod memory;
mod store;

pub use gateway::{
    CellGateway, LoadedCell, OBSERVER_KEY, SEED_KEY, decode_position, encode_position, section_key,
};
pub use memory::MemoryStore;
pub use store::{SAVE_EXTENSION, SaveMeta, SaveStore, SectionStore, StoreConfig, StoreError};
