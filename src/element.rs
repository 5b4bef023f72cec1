//! Element kinds for unstructured cells.
//!
//! Cells are polytopes of a fixed [`ElementKind`]. Each kind knows its node
//! count, spatial dimension, serialized CGNS enumeration value, and face
//! layout (local node indices per face, used by the debug-level mesh
//! validator's manifold check).
//!
//! [`ElementKind::Mixed`] tags a *section* whose cells carry their own kinds
//! inline; it is never the kind of an individual cell.

use serde::{Deserialize, Serialize};

/// The supported cell shapes, plus the `Mixed` section marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ElementKind {
    /// 2-node line.
    Bar2,
    /// 3-node triangle.
    Tri3,
    /// 4-node quadrilateral.
    Quad4,
    /// 4-node tetrahedron.
    Tetra4,
    /// 5-node pyramid.
    Pyra5,
    /// 6-node pentahedron (wedge).
    Penta6,
    /// 8-node hexahedron.
    Hexa8,
    /// Section marker: cells of heterogeneous kinds stored inline.
    Mixed,
}

impl ElementKind {
    /// All concrete (non-`Mixed`) kinds, in CGNS enumeration order.
    pub const CONCRETE: [ElementKind; 7] = [
        ElementKind::Bar2,
        ElementKind::Tri3,
        ElementKind::Quad4,
        ElementKind::Tetra4,
        ElementKind::Pyra5,
        ElementKind::Penta6,
        ElementKind::Hexa8,
    ];

    /// Number of nodes a cell of this kind references; `None` for `Mixed`.
    pub fn node_count(self) -> Option<usize> {
        match self {
            ElementKind::Bar2 => Some(2),
            ElementKind::Tri3 => Some(3),
            ElementKind::Quad4 => Some(4),
            ElementKind::Tetra4 => Some(4),
            ElementKind::Pyra5 => Some(5),
            ElementKind::Penta6 => Some(6),
            ElementKind::Hexa8 => Some(8),
            ElementKind::Mixed => None,
        }
    }

    /// Spatial dimension of the shape (1, 2 or 3); `None` for `Mixed`.
    pub fn dimension(self) -> Option<u8> {
        match self {
            ElementKind::Bar2 => Some(1),
            ElementKind::Tri3 | ElementKind::Quad4 => Some(2),
            ElementKind::Tetra4
            | ElementKind::Pyra5
            | ElementKind::Penta6
            | ElementKind::Hexa8 => Some(3),
            ElementKind::Mixed => None,
        }
    }

    /// The CGNS `ElementType_t` enumeration value used in serialized form.
    pub fn cgns_id(self) -> u8 {
        match self {
            ElementKind::Bar2 => 3,
            ElementKind::Tri3 => 5,
            ElementKind::Quad4 => 7,
            ElementKind::Tetra4 => 10,
            ElementKind::Pyra5 => 12,
            ElementKind::Penta6 => 14,
            ElementKind::Hexa8 => 17,
            ElementKind::Mixed => 20,
        }
    }

    /// Inverse of [`Self::cgns_id`]; `None` for unrecognized values.
    pub fn from_cgns_id(id: u8) -> Option<Self> {
        Some(match id {
            3 => ElementKind::Bar2,
            5 => ElementKind::Tri3,
            7 => ElementKind::Quad4,
            10 => ElementKind::Tetra4,
            12 => ElementKind::Pyra5,
            14 => ElementKind::Penta6,
            17 => ElementKind::Hexa8,
            20 => ElementKind::Mixed,
            _ => return None,
        })
    }

    /// Canonical uppercase name, as used in section naming (`HEXA_8` etc.).
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Bar2 => "BAR_2",
            ElementKind::Tri3 => "TRI_3",
            ElementKind::Quad4 => "QUAD_4",
            ElementKind::Tetra4 => "TETRA_4",
            ElementKind::Pyra5 => "PYRA_5",
            ElementKind::Penta6 => "PENTA_6",
            ElementKind::Hexa8 => "HEXA_8",
            ElementKind::Mixed => "MIXED",
        }
    }

    /// Face layout: local (0-based) node indices per face, CGNS node order.
    ///
    /// For 1D/2D kinds the "faces" are the bounding edges/vertices that
    /// separate neighbouring cells of the same dimension.
    pub fn faces(self) -> &'static [&'static [usize]] {
        match self {
            ElementKind::Bar2 => &[&[0], &[1]],
            ElementKind::Tri3 => &[&[0, 1], &[1, 2], &[2, 0]],
            ElementKind::Quad4 => &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]],
            ElementKind::Tetra4 => &[&[0, 2, 1], &[0, 1, 3], &[1, 2, 3], &[2, 0, 3]],
            ElementKind::Pyra5 => &[
                &[0, 3, 2, 1],
                &[0, 1, 4],
                &[1, 2, 4],
                &[2, 3, 4],
                &[3, 0, 4],
            ],
            ElementKind::Penta6 => &[
                &[0, 1, 4, 3],
                &[1, 2, 5, 4],
                &[2, 0, 3, 5],
                &[0, 2, 1],
                &[3, 4, 5],
            ],
            ElementKind::Hexa8 => &[
                &[0, 3, 2, 1],
                &[0, 1, 5, 4],
                &[1, 2, 6, 5],
                &[2, 3, 7, 6],
                &[0, 4, 7, 3],
                &[4, 5, 6, 7],
            ],
            ElementKind::Mixed => &[],
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgns_ids_roundtrip() {
        for kind in ElementKind::CONCRETE {
            assert_eq!(ElementKind::from_cgns_id(kind.cgns_id()), Some(kind));
        }
        assert_eq!(ElementKind::from_cgns_id(20), Some(ElementKind::Mixed));
        assert_eq!(ElementKind::from_cgns_id(99), None);
    }

    #[test]
    fn node_counts() {
        assert_eq!(ElementKind::Hexa8.node_count(), Some(8));
        assert_eq!(ElementKind::Tetra4.node_count(), Some(4));
        assert_eq!(ElementKind::Mixed.node_count(), None);
    }

    #[test]
    fn face_layouts_reference_valid_nodes() {
        for kind in ElementKind::CONCRETE {
            let n = kind.node_count().unwrap();
            for face in kind.faces() {
                assert!(face.iter().all(|&i| i < n), "{kind} face out of range");
            }
        }
    }

    #[test]
    fn hexa_has_six_quad_faces() {
        let faces = ElementKind::Hexa8.faces();
        assert_eq!(faces.len(), 6);
        assert!(faces.iter().all(|f| f.len() == 4));
    }
}
