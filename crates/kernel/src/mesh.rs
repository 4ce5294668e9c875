use voxworld_common::{Element, ElementKind, Face, LocalPos};

use crate::cell::CellData;

/// One point of a triangle list, in cell-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

/// Derived renderable geometry of one cell: a triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn point_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

/// The six face-adjacent neighbour cells. `None` means the neighbour is not
/// resident; that side is built without cross-cell context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Neighbors<'a> {
    pub up: Option<&'a CellData>,
    pub down: Option<&'a CellData>,
    pub north: Option<&'a CellData>,
    pub south: Option<&'a CellData>,
    pub east: Option<&'a CellData>,
    pub west: Option<&'a CellData>,
}

impl<'a> Neighbors<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn get(&self, face: Face) -> Option<&'a CellData> {
        match face {
            Face::Up => self.up,
            Face::Down => self.down,
            Face::North => self.north,
            Face::South => self.south,
            Face::East => self.east,
            Face::West => self.west,
        }
    }

    pub fn set(&mut self, face: Face, cell: Option<&'a CellData>) {
        match face {
            Face::Up => self.up = cell,
            Face::Down => self.down = cell,
            Face::North => self.north = cell,
            Face::South => self.south = cell,
            Face::East => self.east = cell,
            Face::West => self.west = cell,
        }
    }

    pub fn present(&self) -> usize {
        Face::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }
}

/// Geometry-building collaborator.
pub trait GeometryBuilder: Send + Sync {
    fn build(&self, cell: &CellData, neighbors: &Neighbors<'_>) -> Mesh;
}

/// Emits two triangles for every element face not hidden by its neighbour.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaceMesher;

impl FaceMesher {
    fn occludes(element: Element, other: Element) -> bool {
        other.is_solid() || (element.kind == ElementKind::Water && other.kind == ElementKind::Water)
    }

    fn emit_face(out: &mut Vec<Vertex>, local: LocalPos, face: Face, element: Element) {
        let base = [local.x as f32, local.y as f32, local.z as f32];
        let shade = match face {
            Face::Up => 1.0,
            Face::Down => 0.5,
            Face::North | Face::South => 0.8,
            Face::East | Face::West => 0.65,
        };
        let c = element.kind.color();
        let color = [c[0] * shade, c[1] * shade, c[2] * shade];
        let corners = face_corners(face);
        for i in [0, 1, 2, 0, 2, 3] {
            let corner = corners[i];
            out.push(Vertex {
                position: [
                    base[0] + corner[0],
                    base[1] + corner[1],
                    base[2] + corner[2],
                ],
                color,
            });
        }
    }
}

impl GeometryBuilder for FaceMesher {
    fn build(&self, cell: &CellData, neighbors: &Neighbors<'_>) -> Mesh {
        let mut vertices = Vec::new();
        for local in LocalPos::all() {
            let element = cell.get(local);
            if element.kind == ElementKind::Air {
                continue;
            }
            for face in Face::ALL {
                let (next, crossed) = local.step(face);
                let other = if crossed {
                    neighbors.get(face).map(|n| n.get(next))
                } else {
                    Some(cell.get(next))
                };
                let hidden = other.is_some_and(|o| Self::occludes(element, o));
                if !hidden {
                    Self::emit_face(&mut vertices, local, face, element);
                }
            }
        }
        Mesh::new(vertices)
    }
}

/// Unit-cube corners of a face, counter-clockwise seen from outside.
fn face_corners(face: Face) -> [[f32; 3]; 4] {
    match face {
        Face::Up => [[0.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0]],
        Face::Down => [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
        Face::North => [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
        Face::South => [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]],
        Face::East => [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]],
        Face::West => [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]],
    }
}
