use crate::store::{SectionStore, StoreError, decode_cbor, encode_cbor};
use glam::I64Vec3;
use serde::{Deserialize, Serialize};
use voxworld_common::CellCoord;
use voxworld_kernel::{CellData, ScheduledUpdate, UpdateQueue};

/// Section holding the last observer position.
pub const OBSERVER_KEY: &str = "world_player_pos";

/// Section holding the terrain seed.
pub const SEED_KEY: &str = "world_seed";

/// Section key for a cell. Distinct coordinates give distinct keys.
pub fn section_key(coord: CellCoord) -> String {
    format!("cell_{}.{}.{}", coord.x, coord.y, coord.z)
}

/// Observer position as 24 bytes: three big-endian i64.
pub fn encode_position(pos: I64Vec3) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[0..8].copy_from_slice(&pos.x.to_be_bytes());
    out[8..16].copy_from_slice(&pos.y.to_be_bytes());
    out[16..24].copy_from_slice(&pos.z.to_be_bytes());
    out
}

pub fn decode_position(bytes: &[u8]) -> Option<I64Vec3> {
    let bytes: &[u8; 24] = bytes.try_into().ok()?;
    let axis = |i: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
        i64::from_be_bytes(raw)
    };
    Some(I64Vec3::new(axis(0), axis(1), axis(2)))
}

#[derive(Debug, Serialize, Deserialize)]
struct CellRecord {
    coord: CellCoord,
    elements: Vec<u8>,
    updates: Vec<ScheduledUpdate>,
}

/// Contents of a previously saved cell.
#[derive(Debug, Clone)]
pub struct LoadedCell {
    pub data: CellData,
    pub updates: UpdateQueue,
}

/// Load and save cells by coordinate.
///
/// The gateway is not internally synchronized; callers share it behind a
/// mutex.
pub struct CellGateway {
    store: Box<dyn SectionStore>,
}

impl CellGateway {
    pub fn new(store: impl SectionStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn store(&self) -> &dyn SectionStore {
        self.store.as_ref()
    }

    /// Load a cell. Absent, unreadable and malformed sections are all a miss;
    /// the latter two are logged.
    pub fn load(&self, coord: CellCoord) -> Option<LoadedCell> {
        let key = section_key(coord);
        let bytes = match self.store.read_section(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%coord, error = %e, "cell section unreadable, regenerating");
                return None;
            }
        };
        let record: CellRecord = match decode_cbor(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(%coord, error = %e, "cell section undecodable, regenerating");
                return None;
            }
        };
        if record.coord != coord {
            tracing::warn!(%coord, stored = %record.coord, "cell section holds another coordinate");
            return None;
        }
        let Some(data) = CellData::from_packed(&record.elements) else {
            tracing::warn!(%coord, "cell section has malformed element data");
            return None;
        };
        tracing::trace!(%coord, "loaded cell");
        Some(LoadedCell {
            data,
            updates: UpdateQueue::from_entries(record.updates),
        })
    }

    /// Save a cell's elements and pending updates under its coordinate.
    pub fn save(
        &mut self,
        coord: CellCoord,
        data: &CellData,
        updates: &UpdateQueue,
    ) -> Result<(), StoreError> {
        let record = CellRecord {
            coord,
            elements: data.to_packed(),
            updates: updates.entries().to_vec(),
        };
        let bytes = encode_cbor(&record)?;
        self.store.write_section(&section_key(coord), &bytes)
    }

    /// The stored observer position, if any. A malformed section is treated
    /// as absent.
    pub fn load_observer(&self) -> Option<I64Vec3> {
        match self.store.read_section(OBSERVER_KEY) {
            Ok(Some(bytes)) => {
                let pos = decode_position(&bytes);
                if pos.is_none() {
                    tracing::warn!(len = bytes.len(), "observer section has the wrong size");
                }
                pos
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "observer section unreadable");
                None
            }
        }
    }

    pub fn save_observer(&mut self, pos: I64Vec3) -> Result<(), StoreError> {
        self.store.write_section(OBSERVER_KEY, &encode_position(pos))
    }

    pub fn load_seed(&self) -> Result<Option<u64>, StoreError> {
        let Some(bytes) = self.store.read_section(SEED_KEY)? else {
            return Ok(None);
        };
        let raw: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Malformed(format!("seed is {} bytes", bytes.len())))?;
        Ok(Some(u64::from_be_bytes(raw)))
    }

    pub fn save_seed(&mut self, seed: u64) -> Result<(), StoreError> {
        self.store.write_section(SEED_KEY, &seed.to_be_bytes())
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.store.flush()
    }
}
