use serde::{Deserialize, Serialize};

/// Material of a single element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementKind {
    #[default]
    Air = 0,
    Stone,
    Dirt,
    Grass,
    Sand,
    Bedrock,
    Water,
    /// Sentinel returned by internal lookups that hit a non-resident cell.
    Err,
}

/// Static attributes of an element kind.
#[derive(Debug)]
pub struct ElementInfo {
    pub name: &'static str,
    pub solid: bool,
    pub color: [f32; 3],
}

static ELEMENT_TABLE: [ElementInfo; 8] = [
    ElementInfo { name: "air", solid: false, color: [0.0, 0.0, 0.0] },
    ElementInfo { name: "stone", solid: true, color: [0.5, 0.5, 0.5] },
    ElementInfo { name: "dirt", solid: true, color: [0.45, 0.3, 0.15] },
    ElementInfo { name: "grass", solid: true, color: [0.2, 0.65, 0.15] },
    ElementInfo { name: "sand", solid: true, color: [0.85, 0.8, 0.5] },
    ElementInfo { name: "bedrock", solid: true, color: [0.1, 0.1, 0.1] },
    ElementInfo { name: "water", solid: false, color: [0.1, 0.3, 0.8] },
    ElementInfo { name: "error", solid: true, color: [1.0, 0.0, 1.0] },
];

impl ElementKind {
    pub const ALL: [ElementKind; 8] = [
        ElementKind::Air,
        ElementKind::Stone,
        ElementKind::Dirt,
        ElementKind::Grass,
        ElementKind::Sand,
        ElementKind::Bedrock,
        ElementKind::Water,
        ElementKind::Err,
    ];

    pub fn info(self) -> &'static ElementInfo {
        &ELEMENT_TABLE[self as usize]
    }

    pub fn is_solid(self) -> bool {
        self.info().solid
    }

    pub fn color(self) -> [f32; 3] {
        self.info().color
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }
}

/// One addressable unit of cell content: a kind plus a small per-instance
/// payload (e.g. a liquid level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    pub meta: u8,
}

impl Element {
    pub const AIR: Self = Self::new(ElementKind::Air);
    pub const ERR: Self = Self::new(ElementKind::Err);

    pub const fn new(kind: ElementKind) -> Self {
        Self { kind, meta: 0 }
    }

    pub const fn with_meta(kind: ElementKind, meta: u8) -> Self {
        Self { kind, meta }
    }

    pub fn is_solid(self) -> bool {
        self.kind.is_solid()
    }

    pub fn is_err(self) -> bool {
        self.kind == ElementKind::Err
    }
}

impl From<ElementKind> for Element {
    fn from(kind: ElementKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_discriminants() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(ElementKind::from_u8(200), None);
    }

    #[test]
    fn solidity() {
        assert!(!ElementKind::Air.is_solid());
        assert!(!ElementKind::Water.is_solid());
        assert!(ElementKind::Stone.is_solid());
        assert_eq!(ElementKind::Grass.name(), "grass");
    }

    #[test]
    fn default_is_air() {
        assert_eq!(Element::default(), Element::AIR);
        assert!(Element::ERR.is_err());
    }
}
