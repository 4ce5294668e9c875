use voxworld_common::CellCoord;
use voxworld_persist::StoreError;

/// Errors surfaced by the streaming world.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The slot that would hold `coord` currently holds another cell (or
    /// none yet). Recoverable: retry once the generation worker catches up.
    #[error("cell {coord} is not resident")]
    NotResident { coord: CellCoord },
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
