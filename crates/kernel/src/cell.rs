use std::fmt;

use voxworld_common::{CELL_VOLUME, CellCoord, Element, ElementKind, LocalPos};

use crate::update::UpdateQueue;

/// Dense element contents of one cell.
#[derive(Clone, PartialEq, Eq)]
pub struct CellData {
    elements: Box<[Element]>,
}

impl CellData {
    /// A cell filled with air.
    pub fn empty() -> Self {
        Self::filled(Element::AIR)
    }

    pub fn filled(element: Element) -> Self {
        Self {
            elements: vec![element; CELL_VOLUME].into_boxed_slice(),
        }
    }

    pub fn get(&self, local: LocalPos) -> Element {
        self.elements[local.index()]
    }

    pub fn set(&mut self, local: LocalPos, element: Element) {
        self.elements[local.index()] = element;
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Overwrite every element with air.
    pub fn clear(&mut self) {
        self.elements.fill(Element::AIR);
    }

    /// Number of elements of the given kind.
    pub fn count(&self, kind: ElementKind) -> usize {
        self.elements.iter().filter(|e| e.kind == kind).count()
    }

    pub fn is_all_air(&self) -> bool {
        self.elements.iter().all(|e| e.kind == ElementKind::Air)
    }

    /// Pack as `(kind, meta)` byte pairs in index order.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CELL_VOLUME * 2);
        for e in self.elements.iter() {
            out.push(e.kind as u8);
            out.push(e.meta);
        }
        out
    }

    /// Inverse of [`CellData::to_packed`]. Returns `None` on a length mismatch
    /// or an unknown element kind.
    pub fn from_packed(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CELL_VOLUME * 2 {
            return None;
        }
        let elements = bytes
            .chunks_exact(2)
            .map(|pair| Some(Element::with_meta(ElementKind::from_u8(pair[0])?, pair[1])))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            elements: elements.into_boxed_slice(),
        })
    }
}

impl Default for CellData {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for CellData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let solid = self.elements.iter().filter(|e| e.is_solid()).count();
        f.debug_struct("CellData")
            .field("solid", &solid)
            .field("water", &self.count(ElementKind::Water))
            .finish()
    }
}

/// A resident cell: its true coordinate, its contents, and its queue of
/// scheduled element re-evaluations.
#[derive(Debug, Clone)]
pub struct Cell {
    coord: CellCoord,
    data: CellData,
    updates: UpdateQueue,
}

impl Cell {
    /// An empty cell tagged with the unbounded sentinel coordinate.
    pub fn unbounded() -> Self {
        Self {
            coord: CellCoord::UNBOUNDED,
            data: CellData::empty(),
            updates: UpdateQueue::new(),
        }
    }

    pub fn new(coord: CellCoord, data: CellData, updates: UpdateQueue) -> Self {
        Self {
            coord,
            data,
            updates,
        }
    }

    pub fn coord(&self) -> CellCoord {
        self.coord
    }

    /// Whether this cell currently holds exactly `coord`.
    pub fn holds(&self, coord: CellCoord) -> bool {
        self.coord == coord
    }

    pub fn data(&self) -> &CellData {
        &self.data
    }

    pub fn updates(&self) -> &UpdateQueue {
        &self.updates
    }

    pub fn updates_mut(&mut self) -> &mut UpdateQueue {
        &mut self.updates
    }

    pub fn element(&self, local: LocalPos) -> Element {
        self.data.get(local)
    }

    pub fn set_element(&mut self, local: LocalPos, element: Element) {
        self.data.set(local, element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_cell_is_empty() {
        let cell = Cell::unbounded();
        assert!(cell.coord().is_unbounded());
        assert!(cell.data().is_all_air());
        assert!(cell.updates().is_empty());
    }

    #[test]
    fn set_and_get_element() {
        let mut cell = Cell::new(CellCoord::new(1, 2, 3), CellData::empty(), UpdateQueue::new());
        let p = LocalPos::new(4, 5, 6);
        cell.set_element(p, Element::with_meta(ElementKind::Water, 2));
        assert_eq!(cell.element(p), Element::with_meta(ElementKind::Water, 2));
        assert_eq!(cell.data().count(ElementKind::Water), 1);
        assert!(cell.holds(CellCoord::new(1, 2, 3)));
    }

    #[test]
    fn packed_roundtrip_and_rejects_garbage() {
        let mut data = CellData::filled(Element::new(ElementKind::Stone));
        data.set(LocalPos::new(0, 15, 0), Element::with_meta(ElementKind::Water, 7));
        let packed = data.to_packed();
        assert_eq!(CellData::from_packed(&packed), Some(data));

        assert_eq!(CellData::from_packed(&packed[1..]), None);
        let mut bad = packed;
        bad[0] = 99;
        assert_eq!(CellData::from_packed(&bad), None);
    }
}
