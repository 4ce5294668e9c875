use crate::stats::Counters;
use crate::table::{RebuildClaim, Slot};
use crate::world::VoxelWorld;
use glam::{DVec3, I64Vec3};
use voxworld_common::{CellCoord, Element, Face, SlotIndex, cell_of, element_of_point, slot_index};
use voxworld_kernel::Neighbors;

/// Where a ray stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayHit {
    /// Element the ray stopped in.
    pub pos: I64Vec3,
    /// Element stepped through just before `pos`.
    pub previous: I64Vec3,
    /// What stopped it: a solid element, [`Element::ERR`] for a non-resident
    /// cell, or whatever lies at the end of the ray.
    pub element: Element,
}

impl VoxelWorld {
    /// Rebuild one slot now, stale or not. Returns the point count, or `None`
    /// if another worker holds the slot's claim.
    pub fn rebuild(&self, index: SlotIndex) -> Option<usize> {
        let slot = self.table.slot(index);
        let claim = slot.claim()?;
        Some(self.rebuild_claimed(slot, claim))
    }

    /// Rebuild a claimed slot against whichever neighbours are resident.
    ///
    /// The slot and its neighbour slots are read-locked together in ascending
    /// index order. An unoccupied slot yields empty geometry.
    pub(crate) fn rebuild_claimed(&self, slot: &Slot, claim: RebuildClaim<'_>) -> usize {
        let n = self.table.edge();
        let coord = slot.coord();
        if coord.is_unbounded() {
            claim.publish(coord, Default::default());
            return 0;
        }

        let own = slot_index(coord, n);
        let mut order: Vec<SlotIndex> = Face::ALL
            .iter()
            .map(|&face| slot_index(coord.neighbor(face), n))
            .chain(std::iter::once(own))
            .collect();
        order.sort();
        order.dedup();
        let guards: Vec<_> = order
            .iter()
            .map(|&index| (index, self.table.slot(index).read()))
            .collect();
        let guard = |index: SlotIndex| guards.iter().find(|(i, _)| *i == index).map(|(_, g)| g);

        let Some(cell) = guard(own).filter(|cell| cell.holds(coord)) else {
            // Reassigned since the snapshot; the generation worker flagged it.
            return 0;
        };

        let mut neighbors = Neighbors::none();
        for face in Face::ALL {
            let other = coord.neighbor(face);
            let found = guard(slot_index(other, n)).filter(|g| g.holds(other));
            neighbors.set(face, found.map(|g| g.data()));
        }

        let mesh = self.mesher.build(cell.data(), &neighbors);
        let points = mesh.point_count();
        // Published under the read locks so a swap cannot slip in between.
        claim.publish(coord, mesh);
        drop(guards);
        tracing::trace!(%coord, points, "cell rebuilt");
        points
    }

    fn rebuild_if_stale(&self, slot: &Slot) -> bool {
        match slot.claim_if_stale() {
            Some(claim) => {
                self.rebuild_claimed(slot, claim);
                true
            }
            None => false,
        }
    }

    /// Rebuild every stale slot. Returns how many were rebuilt.
    pub fn remesh_exhaustive(&self) -> usize {
        let _span = tracing::trace_span!("remesh_exhaustive").entered();
        let mut rebuilt = 0;
        for (_, slot) in self.table.iter() {
            if self.stop_requested() {
                break;
            }
            if self.rebuild_if_stale(slot) {
                rebuilt += 1;
            }
        }
        Counters::bump(&self.counters.rebuilt_exhaustive, rebuilt);
        rebuilt
    }

    /// Rebuild stale resident cells within the near-field radius of the
    /// observer's cell, lower bound inclusive and upper bound exclusive.
    pub fn remesh_near_field(&self) -> usize {
        let _span = tracing::trace_span!("remesh_near_field").entered();
        let center = self.scope().center;
        let r = self.config.near_field_radius();
        let mut rebuilt = 0;
        'scan: for x in center.x - r..center.x + r {
            for y in center.y - r..center.y + r {
                for z in center.z - r..center.z + r {
                    if self.stop_requested() {
                        break 'scan;
                    }
                    let Some(slot) = self.table.resident(CellCoord::new(x, y, z)) else {
                        continue;
                    };
                    if self.rebuild_if_stale(slot) {
                        rebuilt += 1;
                    }
                }
            }
        }
        Counters::bump(&self.counters.rebuilt_near_field, rebuilt);
        rebuilt
    }

    /// Cast a ray per integer direction in `[-ray_grid, ray_grid)^3` from the
    /// observer's eye and rebuild the cell each one stops in, if stale.
    pub fn remesh_raycast(&self) -> usize {
        let _span = tracing::trace_span!("remesh_raycast").entered();
        let eye = self.observer() + DVec3::new(0.0, self.config.eye_height, 0.0);
        let g = self.config.ray_grid as i64;
        let mut rebuilt = 0;
        'scan: for i in -g..g {
            for j in -g..g {
                for k in -g..g {
                    if self.stop_requested() {
                        break 'scan;
                    }
                    if i == 0 && j == 0 && k == 0 {
                        continue;
                    }
                    let dir = DVec3::new(i as f64, j as f64, k as f64);
                    let hit = self.raycast(eye, dir, self.config.ray_max_distance);
                    let Some(slot) = self.table.resident(cell_of(hit.pos)) else {
                        continue;
                    };
                    if self.rebuild_if_stale(slot) {
                        rebuilt += 1;
                    }
                }
            }
        }
        Counters::bump(&self.counters.rebuilt_raycast, rebuilt);
        rebuilt
    }

    /// Rebuild every slot flagged by an instant edit, stale or not. A slot
    /// claimed elsewhere keeps its flag for the next pass.
    pub fn remesh_instant(&self) -> usize {
        let mut rebuilt = 0;
        for (_, slot) in self.table.iter() {
            if self.stop_requested() {
                break;
            }
            if !slot.take_instant() {
                continue;
            }
            match slot.claim() {
                Some(claim) => {
                    self.rebuild_claimed(slot, claim);
                    rebuilt += 1;
                }
                None => slot.request_instant(),
            }
        }
        Counters::bump(&self.counters.rebuilt_instant, rebuilt);
        if rebuilt > 0 {
            tracing::debug!(rebuilt, "instant remesh");
        }
        rebuilt
    }

    /// Step through elements along `dir` from `origin` (grid traversal) until
    /// a solid or non-resident element, or until `max_distance` elements
    /// along the ray. Only the direction of `dir` matters; a zero or
    /// non-finite `dir` stops at the origin element.
    pub fn raycast(&self, origin: DVec3, dir: DVec3, max_distance: f64) -> RayHit {
        let mut pos = element_of_point(origin);
        let mut previous = pos;
        let length = dir.length();
        if length == 0.0 || !length.is_finite() {
            return RayHit {
                pos,
                previous,
                element: self.element_or_err(pos),
            };
        }
        let dir = dir / length;
        let step = I64Vec3::new(
            if dir.x > 0.0 { 1 } else { -1 },
            if dir.y > 0.0 { 1 } else { -1 },
            if dir.z > 0.0 { 1 } else { -1 },
        );
        let inv = |d: f64| if d != 0.0 { 1.0 / d.abs() } else { f64::INFINITY };
        let delta = DVec3::new(inv(dir.x), inv(dir.y), inv(dir.z));
        let first = |o: f64, p: i64, d: f64, dt: f64| {
            if d > 0.0 {
                (p as f64 + 1.0 - o) * dt
            } else if d < 0.0 {
                (o - p as f64) * dt
            } else {
                f64::INFINITY
            }
        };
        let mut t_max = DVec3::new(
            first(origin.x, pos.x, dir.x, delta.x),
            first(origin.y, pos.y, dir.y, delta.y),
            first(origin.z, pos.z, dir.z, delta.z),
        );

        let mut travelled = 0.0;
        loop {
            let element = self.element_or_err(pos);
            if element.is_solid() || travelled >= max_distance {
                return RayHit {
                    pos,
                    previous,
                    element,
                };
            }
            previous = pos;
            if t_max.x < t_max.y && t_max.x < t_max.z {
                travelled = t_max.x;
                pos.x += step.x;
                t_max.x += delta.x;
            } else if t_max.y < t_max.z {
                travelled = t_max.y;
                pos.y += step.y;
                t_max.y += delta.y;
            } else {
                travelled = t_max.z;
                pos.z += step.z;
                t_max.z += delta.z;
            }
            if !travelled.is_finite() {
                return RayHit {
                    pos: previous,
                    previous,
                    element,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::table::MeshState;
    use voxworld_common::{CELL_EDGE, ElementKind};
    use voxworld_kernel::{CellData, FaceMesher, Generator, GeometryBuilder, TerrainGenerator};
    use voxworld_persist::{CellGateway, MemoryStore};

    /// Solid floor below y = 0, air above.
    struct Flat;

    impl Generator for Flat {
        fn synthesize(&self, out: &mut CellData, coord: CellCoord) {
            let fill = if coord.y < 0 {
                Element::new(ElementKind::Stone)
            } else {
                Element::AIR
            };
            *out = CellData::filled(fill);
        }

        fn height_at(&self, _x: i64, _z: i64) -> i64 {
            0
        }
    }

    fn flat_world(edge: usize) -> VoxelWorld {
        let world = VoxelWorld::new(
            StreamConfig::with_edge(edge),
            CellGateway::new(MemoryStore::new()),
            Flat,
            DVec3::new(8.0, 8.0, 8.0),
        );
        world.generation_pass(0..edge);
        world
    }

    fn stale_count(world: &VoxelWorld) -> usize {
        world.stats().stale
    }

    #[test]
    fn unoccupied_slot_rebuilds_to_nothing() {
        let world = VoxelWorld::new(
            StreamConfig::with_edge(2),
            CellGateway::new(MemoryStore::new()),
            Flat,
            DVec3::ZERO,
        );
        assert_eq!(world.rebuild(SlotIndex::new(1, 1, 1)), Some(0));
        assert!(world.draw_list().is_empty());
    }

    #[test]
    fn generated_cell_geometry_matches_mesher() {
        let world = VoxelWorld::new(
            StreamConfig::with_edge(3),
            CellGateway::new(MemoryStore::new()),
            TerrainGenerator::default(),
            DVec3::new(8.0, 8.0, 8.0),
        );
        world.generation_pass(0..3);
        let coord = CellCoord::new(0, 0, 0);
        let slot = world.table().resident(coord).unwrap();
        assert!(slot.is_generated());

        let points = world.rebuild(slot_index(coord, 3)).unwrap();
        let expected = {
            let own = slot.read();
            let up = world.table().read_resident(coord.neighbor(Face::Up)).unwrap();
            let down = world.table().read_resident(coord.neighbor(Face::Down)).unwrap();
            let north = world.table().read_resident(coord.neighbor(Face::North)).unwrap();
            let south = world.table().read_resident(coord.neighbor(Face::South)).unwrap();
            let east = world.table().read_resident(coord.neighbor(Face::East)).unwrap();
            let west = world.table().read_resident(coord.neighbor(Face::West)).unwrap();
            let neighbors = Neighbors {
                up: Some(up.data()),
                down: Some(down.data()),
                north: Some(north.data()),
                south: Some(south.data()),
                east: Some(east.data()),
                west: Some(west.data()),
            };
            FaceMesher.build(own.data(), &neighbors).point_count()
        };
        assert_eq!(points, expected);
        assert_eq!(slot.geometry().mesh.point_count(), expected);
        assert_eq!(slot.mesh_state(), MeshState::Current);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let world = flat_world(3);
        let index = slot_index(CellCoord::new(0, -1, 0), 3);
        let first = world.rebuild(index).unwrap();
        let second = world.rebuild(index).unwrap();
        assert_eq!(first, second);
        assert!(first > 0);
    }

    #[test]
    fn missing_neighbour_exposes_face() {
        let world = flat_world(3);
        // Stone on four sides, air above, and (0,-2,0) below is out of scope.
        let index = slot_index(CellCoord::new(0, -1, 0), 3);
        let area = (CELL_EDGE * CELL_EDGE) as usize;
        assert_eq!(world.rebuild(index), Some(2 * area * 6));
    }

    #[test]
    fn exhaustive_pass_clears_all_staleness() {
        let world = flat_world(3);
        assert_eq!(stale_count(&world), 27);
        assert_eq!(world.remesh_exhaustive(), 27);
        assert_eq!(stale_count(&world), 0);
        assert_eq!(world.remesh_exhaustive(), 0);
        assert_eq!(world.stats().rebuilt_exhaustive, 27);
    }

    #[test]
    fn near_field_pass_stays_near() {
        let world = flat_world(6);
        // Radius 6 / 6 = 1: cells -1..1 on each axis around (0,0,0).
        assert_eq!(world.remesh_near_field(), 8);
        for (_, slot) in world.table().iter() {
            let c = slot.coord();
            let near = (-1..1).contains(&c.x) && (-1..1).contains(&c.y) && (-1..1).contains(&c.z);
            assert_eq!(slot.mesh_state() == MeshState::Current, near, "{c}");
        }
    }

    #[test]
    fn raycast_stops_on_floor() {
        let world = flat_world(3);
        let hit = world.raycast(DVec3::new(4.5, 9.6, 4.5), DVec3::new(0.0, -1.0, 0.0), 1000.0);
        assert_eq!(hit.pos, I64Vec3::new(4, -1, 4));
        assert_eq!(hit.previous, I64Vec3::new(4, 0, 4));
        assert_eq!(hit.element.kind, ElementKind::Stone);
    }

    #[test]
    fn raycast_stops_at_scope_edge_or_distance() {
        let world = flat_world(3);
        let up = world.raycast(DVec3::new(4.5, 9.6, 4.5), DVec3::new(0.0, 1.0, 0.0), 1000.0);
        // Scope ends at y = 31; the next element is not resident.
        assert_eq!(up.pos, I64Vec3::new(4, 32, 4));
        assert!(up.element.is_err());

        let short = world.raycast(DVec3::new(4.5, 9.6, 4.5), DVec3::new(1.0, 0.0, 0.0), 3.0);
        assert_eq!(short.element, Element::AIR);
        assert_eq!(short.pos.y, 9);
        assert!(short.pos.x >= 7 && short.pos.x <= 8);
    }

    #[test]
    fn ray_length_ignores_direction_magnitude() {
        let world = flat_world(3);
        let origin = DVec3::new(4.5, 9.5, 4.5);
        let unit = world.raycast(origin, DVec3::X, 3.0);
        let long = world.raycast(origin, DVec3::new(3.0, 0.0, 0.0), 3.0);
        assert_eq!(unit.pos, I64Vec3::new(8, 9, 4));
        assert_eq!(long, unit);

        let diagonal = world.raycast(origin, DVec3::new(1.0, 0.0, 1.0), 3.0);
        let scaled = world.raycast(origin, DVec3::new(7.0, 0.0, 7.0), 3.0);
        assert_eq!(scaled, diagonal);
    }

    #[test]
    fn degenerate_ray_stays_at_origin() {
        let world = flat_world(3);
        let origin = DVec3::new(4.5, 9.5, 4.5);
        for dir in [DVec3::ZERO, DVec3::new(f64::NAN, 0.0, 0.0), DVec3::splat(f64::INFINITY)] {
            let hit = world.raycast(origin, dir, 10.0);
            assert_eq!(hit.pos, I64Vec3::new(4, 9, 4));
            assert_eq!(hit.element, Element::AIR);
        }
    }

    /// Face mesher that reports when it starts and waits to be released.
    struct GatedMesher {
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl GeometryBuilder for GatedMesher {
        fn build(&self, cell: &CellData, neighbors: &Neighbors<'_>) -> voxworld_kernel::Mesh {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            FaceMesher.build(cell, neighbors)
        }
    }

    #[test]
    fn eviction_during_rebuild_discards_old_geometry() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let world = VoxelWorld::new(
            StreamConfig::with_edge(2),
            CellGateway::new(MemoryStore::new()),
            Flat,
            DVec3::new(8.0, 8.0, 8.0),
        )
        .with_mesher(GatedMesher {
            entered: entered_tx,
            release: release_rx,
        });
        world.generation_pass(0..2);

        let old = CellCoord::new(0, -1, 0);
        let new = CellCoord::new(2, -1, 0);
        let index = world.table().index_of(old);
        assert_eq!(world.table().index_of(new), index);

        std::thread::scope(|s| {
            let rebuild = s.spawn(|| world.rebuild(index));
            entered_rx.recv().unwrap();
            let generate = s.spawn(|| world.generate(new));
            release_tx.send(()).unwrap();
            assert!(rebuild.join().unwrap().is_some());
            assert!(generate.join().unwrap());
        });

        let slot = world.table().slot(index);
        assert_eq!(slot.coord(), new);
        assert!(slot.geometry().coord.is_unbounded());
        assert_eq!(slot.mesh_state(), MeshState::Stale);
        assert!(world.draw_list().iter().all(|item| item.coord != old));
    }

    #[test]
    fn raycast_pass_rebuilds_hit_cells() {
        let world = flat_world(3);
        let rebuilt = world.remesh_raycast();
        assert!(rebuilt > 0);
        // The floor right under the eye is always hit.
        let below = world.table().resident(CellCoord::new(0, -1, 0)).unwrap();
        assert_eq!(below.mesh_state(), MeshState::Current);
        assert_eq!(world.stats().rebuilt_raycast, rebuilt);
    }

    #[test]
    fn instant_pass_rebuilds_flagged_only() {
        let world = flat_world(3);
        world.remesh_exhaustive();
        world
            .set_element(I64Vec3::new(5, 5, 5), Element::new(ElementKind::Sand), 0, true)
            .unwrap();
        let own = world.table().resident(CellCoord::new(0, 0, 0)).unwrap();
        assert_eq!(own.mesh_state(), MeshState::Stale);

        assert_eq!(world.remesh_instant(), 1);
        assert_eq!(own.mesh_state(), MeshState::Current);
        assert_eq!(own.geometry().mesh.point_count(), 36);
        assert_eq!(world.remesh_instant(), 0);
    }

    #[test]
    fn claimed_slot_keeps_instant_flag() {
        let world = flat_world(2);
        let slot = world.table().resident(CellCoord::new(0, 0, 0)).unwrap();
        slot.request_instant();
        let held = slot.claim().unwrap();
        assert_eq!(world.remesh_instant(), 0);
        assert!(slot.instant_requested());
        drop(held);
        assert_eq!(world.remesh_instant(), 1);
    }

    #[test]
    fn edit_during_rebuild_is_not_lost() {
        let world = flat_world(2);
        world.remesh_exhaustive();
        let coord = CellCoord::new(0, 0, 0);
        let slot = world.table().resident(coord).unwrap();

        slot.mark_stale();
        let claim = slot.claim_if_stale().unwrap();
        world
            .set_element(I64Vec3::new(3, 3, 3), Element::new(ElementKind::Stone), 0, false)
            .unwrap();
        // The claim predates the edit, so its result cannot make the slot current.
        world.rebuild_claimed(slot, claim);
        assert_eq!(slot.mesh_state(), MeshState::Stale);
        assert_eq!(world.remesh_exhaustive(), 1);
        assert_eq!(slot.geometry().mesh.point_count(), 36);
    }
}
