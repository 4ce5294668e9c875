use glam::I64Vec3;
use serde::{Deserialize, Serialize};
use voxworld_common::{Element, ElementKind, Face, LocalPos};

/// Modifiers carried by a scheduled update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UpdateFlags(pub u8);

impl UpdateFlags {
    pub const NONE: Self = Self(0);
    /// Liquids only fall; they do not spread sideways.
    pub const NO_SPREAD: Self = Self(1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A pending re-evaluation of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledUpdate {
    pub local: LocalPos,
    /// Flushes to wait before running. Zero runs on the next flush.
    pub delay: u8,
    pub flags: UpdateFlags,
}

/// Small per-cell queue of scheduled updates, at most one entry per element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQueue {
    entries: Vec<ScheduledUpdate>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ScheduledUpdate>) -> Self {
        let mut queue = Self::new();
        for e in entries {
            queue.push(e.local, e.delay, e.flags);
        }
        queue
    }

    /// Schedule `local`. An element already queued keeps the shorter delay and
    /// the union of both flag sets.
    pub fn push(&mut self, local: LocalPos, delay: u8, flags: UpdateFlags) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.local == local) {
            existing.delay = existing.delay.min(delay);
            existing.flags = existing.flags.union(flags);
        } else {
            self.entries.push(ScheduledUpdate {
                local,
                delay,
                flags,
            });
        }
    }

    /// Advance one tick: remove and return every due entry, decrement the rest.
    pub fn tick(&mut self) -> Vec<ScheduledUpdate> {
        let mut due = Vec::new();
        self.entries.retain_mut(|e| {
            if e.delay == 0 {
                due.push(*e);
                false
            } else {
                e.delay -= 1;
                true
            }
        });
        due
    }

    pub fn entries(&self) -> &[ScheduledUpdate] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// World access handed to update rules. Reads of non-resident elements yield
/// [`Element::ERR`]; writes to them are dropped and return `false`.
pub trait ElementAccess {
    fn element(&self, pos: I64Vec3) -> Element;

    /// Write an element, scheduling re-evaluation of it and its six neighbours
    /// when `propagate > 0`.
    fn place(&self, pos: I64Vec3, element: Element, propagate: u8) -> bool;
}

/// Consumer of scheduled updates.
pub trait UpdateRules: Send + Sync {
    /// Re-evaluate the element at `pos`. Returns whether anything changed.
    fn evaluate(&self, world: &dyn ElementAccess, pos: I64Vec3, flags: UpdateFlags) -> bool;
}

/// Highest liquid level; water at this level no longer spreads.
pub const MAX_FLOW_LEVEL: u8 = 7;

/// Gravity for sand and downhill/sideways flow for water.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallingRules;

impl UpdateRules for FallingRules {
    fn evaluate(&self, world: &dyn ElementAccess, pos: I64Vec3, flags: UpdateFlags) -> bool {
        let here = world.element(pos);
        let below_pos = pos + Face::Down.offset();
        match here.kind {
            ElementKind::Sand => {
                let below = world.element(below_pos);
                if !matches!(below.kind, ElementKind::Air | ElementKind::Water)
                    || !world.place(below_pos, here, 1)
                {
                    return false;
                }
                if world.place(pos, below, 1) {
                    return true;
                }
                // The source went away mid-move; undo so the sand is not duplicated.
                world.place(below_pos, below, 0);
                false
            }
            ElementKind::Water => {
                if world.element(below_pos).kind == ElementKind::Air {
                    return world.place(below_pos, Element::with_meta(ElementKind::Water, 1), 1);
                }
                if flags.contains(UpdateFlags::NO_SPREAD) || here.meta >= MAX_FLOW_LEVEL {
                    return false;
                }
                let mut changed = false;
                for face in [Face::North, Face::South, Face::East, Face::West] {
                    let side = pos + face.offset();
                    if world.element(side).kind == ElementKind::Air {
                        let flow = Element::with_meta(ElementKind::Water, here.meta + 1);
                        changed |= world.place(side, flow, 1);
                    }
                }
                changed
            }
            _ => false,
        }
    }
}
