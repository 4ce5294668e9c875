use voxworld_common::{CELL_EDGE, CellCoord, Element, ElementKind, LocalPos, world_pos};

use crate::cell::CellData;

/// Procedural content collaborator.
pub trait Generator: Send + Sync {
    /// Fill `out` with the contents of the cell at `coord`.
    fn synthesize(&self, out: &mut CellData, coord: CellCoord);

    /// Surface height of the column at `(x, z)`. Used once to pick a spawn.
    fn height_at(&self, x: i64, z: i64) -> i64;
}

/// Water fills every non-solid element at or below this height.
pub const SEA_LEVEL: i64 = 0;
/// Everything at or below this height is bedrock.
pub const BEDROCK_LEVEL: i64 = -64;

const OCTAVES: u32 = 4;
const BASE_WAVELENGTH: f64 = 96.0;
const BASE_AMPLITUDE: f64 = 28.0;
const DIRT_DEPTH: i64 = 3;

/// Heightmap terrain: bedrock floor, stone, a dirt layer, grass or beach sand
/// on top, and water up to [`SEA_LEVEL`].
#[derive(Debug, Clone, Copy)]
pub struct TerrainGenerator {
    seed: u64,
}

impl TerrainGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Element at an absolute position given its column's surface height.
    fn element_at(y: i64, height: i64) -> Element {
        let kind = if y <= BEDROCK_LEVEL {
            ElementKind::Bedrock
        } else if y < height - DIRT_DEPTH {
            ElementKind::Stone
        } else if y < height {
            ElementKind::Dirt
        } else if y == height {
            if height <= SEA_LEVEL + 1 {
                ElementKind::Sand
            } else {
                ElementKind::Grass
            }
        } else if y <= SEA_LEVEL {
            ElementKind::Water
        } else {
            ElementKind::Air
        };
        Element::new(kind)
    }

    /// Lattice value in `[0, 1)` for integer noise coordinates.
    fn lattice(&self, octave: u32, x: i64, z: i64) -> f64 {
        let mut h = self.seed ^ (octave as u64).wrapping_mul(0x632b_e59b_d9b4_e019);
        h = splitmix64(h ^ (x as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        h = splitmix64(h ^ (z as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f));
        (h >> 11) as f64 / (1u64 << 53) as f64
    }

    fn value_noise(&self, octave: u32, x: f64, z: f64) -> f64 {
        let x0 = x.floor();
        let z0 = z.floor();
        let tx = smoothstep(x - x0);
        let tz = smoothstep(z - z0);
        let (ix, iz) = (x0 as i64, z0 as i64);
        let a = self.lattice(octave, ix, iz);
        let b = self.lattice(octave, ix + 1, iz);
        let c = self.lattice(octave, ix, iz + 1);
        let d = self.lattice(octave, ix + 1, iz + 1);
        let top = a + (b - a) * tx;
        let bottom = c + (d - c) * tx;
        top + (bottom - top) * tz
    }
}

impl Default for TerrainGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Generator for TerrainGenerator {
    fn synthesize(&self, out: &mut CellData, coord: CellCoord) {
        let _span = tracing::trace_span!("synthesize", %coord).entered();
        let edge = CELL_EDGE as u8;
        for lx in 0..edge {
            for lz in 0..edge {
                let column = world_pos(coord, LocalPos::new(lx, 0, lz));
                let height = self.height_at(column.x, column.z);
                for ly in 0..edge {
                    let local = LocalPos::new(lx, ly, lz);
                    out.set(local, Self::element_at(column.y + ly as i64, height));
                }
            }
        }
    }

    fn height_at(&self, x: i64, z: i64) -> i64 {
        let mut total = 0.0;
        let mut wavelength = BASE_WAVELENGTH;
        let mut amplitude = BASE_AMPLITUDE;
        for octave in 0..OCTAVES {
            let n = self.value_noise(octave, x as f64 / wavelength, z as f64 / wavelength);
            total += (n * 2.0 - 1.0) * amplitude;
            wavelength /= 2.0;
            amplitude /= 2.0;
        }
        (SEA_LEVEL as f64 + 4.0 + total).floor() as i64
    }
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

/// Splitmix64 finalizer, used as the lattice hash.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_is_deterministic() {
        let g1 = TerrainGenerator::new(42);
        let g2 = TerrainGenerator::new(42);
        let coord = CellCoord::new(3, 0, -2);
        let mut a = CellData::empty();
        let mut b = CellData::empty();
        g1.synthesize(&mut a, coord);
        g2.synthesize(&mut b, coord);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_diverge() {
        let g1 = TerrainGenerator::new(1);
        let g2 = TerrainGenerator::new(2);
        let differs = (0..64).any(|x| g1.height_at(x * 7, x * 3) != g2.height_at(x * 7, x * 3));
        assert!(differs);
    }

    #[test]
    fn deep_cells_are_bedrock_and_high_cells_are_air() {
        let g = TerrainGenerator::default();
        let mut deep = CellData::empty();
        g.synthesize(&mut deep, CellCoord::new(0, -10, 0));
        assert_eq!(deep.count(ElementKind::Bedrock), voxworld_common::CELL_VOLUME);

        let mut sky = CellData::filled(Element::new(ElementKind::Stone));
        g.synthesize(&mut sky, CellCoord::new(0, 10, 0));
        assert!(sky.is_all_air());
    }

    #[test]
    fn surface_column_matches_height() {
        let g = TerrainGenerator::new(9);
        let h = g.height_at(5, 5);
        let top = TerrainGenerator::element_at(h, h);
        assert!(matches!(top.kind, ElementKind::Grass | ElementKind::Sand));
        assert!(TerrainGenerator::element_at(h + 1, h).kind != ElementKind::Grass);
        assert_eq!(TerrainGenerator::element_at(h - 1, h).kind, ElementKind::Dirt);
    }

    #[test]
    fn height_is_bounded() {
        let g = TerrainGenerator::default();
        for x in -50..50 {
            let h = g.height_at(x * 13, -x * 5);
            assert!(h > BEDROCK_LEVEL && h < 64, "height {h} out of range");
        }
    }
}
