pub mod input;
pub mod output;

use anyhow::Context;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::MeshError;

/// Name of the per-cell scalar array holding material tags.
pub const TAG_ARRAY_NAME: &str = "elemTag";

/// VTK cell types understood by the reader and writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellType {
    Vertex,
    PolyVertex,
    Line,
    PolyLine,
    Triangle,
    TriangleStrip,
    Polygon,
    Pixel,
    Quad,
    Tetra,
    Voxel,
    Hexahedron,
    Wedge,
    Pyramid,
    QuadraticTetra,
}

impl CellType {
    pub fn from_vtk_id(id: i64) -> Option<Self> {
        let kind = match id {
            1 => CellType::Vertex,
            2 => CellType::PolyVertex,
            3 => CellType::Line,
            4 => CellType::PolyLine,
            5 => CellType::Triangle,
            6 => CellType::TriangleStrip,
            7 => CellType::Polygon,
            8 => CellType::Pixel,
            9 => CellType::Quad,
            10 => CellType::Tetra,
            11 => CellType::Voxel,
            12 => CellType::Hexahedron,
            13 => CellType::Wedge,
            14 => CellType::Pyramid,
            24 => CellType::QuadraticTetra,
            _ => return None,
        };
        Some(kind)
    }

    pub fn vtk_id(&self) -> i32 {
        match self {
            CellType::Vertex => 1,
            CellType::PolyVertex => 2,
            CellType::Line => 3,
            CellType::PolyLine => 4,
            CellType::Triangle => 5,
            CellType::TriangleStrip => 6,
            CellType::Polygon => 7,
            CellType::Pixel => 8,
            CellType::Quad => 9,
            CellType::Tetra => 10,
            CellType::Voxel => 11,
            CellType::Hexahedron => 12,
            CellType::Wedge => 13,
            CellType::Pyramid => 14,
            CellType::QuadraticTetra => 24,
        }
    }

    /// Node count for fixed-size cells, `None` for the poly variants.
    pub fn node_count(&self) -> Option<usize> {
        match self {
            CellType::Vertex => Some(1),
            CellType::Line => Some(2),
            CellType::Triangle => Some(3),
            CellType::Pixel | CellType::Quad | CellType::Tetra => Some(4),
            CellType::Pyramid => Some(5),
            CellType::Wedge => Some(6),
            CellType::Voxel | CellType::Hexahedron => Some(8),
            CellType::QuadraticTetra => Some(10),
            CellType::PolyVertex
            | CellType::PolyLine
            | CellType::TriangleStrip
            | CellType::Polygon => None,
        }
    }

    pub fn is_volumetric(&self) -> bool {
        matches!(
            self,
            CellType::Tetra
                | CellType::Voxel
                | CellType::Hexahedron
                | CellType::Wedge
                | CellType::Pyramid
                | CellType::QuadraticTetra
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub kind: CellType,
    pub nodes: Vec<usize>,
}

impl Cell {
    pub fn new(kind: CellType, nodes: Vec<usize>) -> Self {
        Self { kind, nodes }
    }

    pub fn tetra(nodes: [usize; 4]) -> Self {
        Self {
            kind: CellType::Tetra,
            nodes: nodes.to_vec(),
        }
    }
}

/// Encoding used when writing legacy VTK files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VtkEncoding {
    #[default]
    Ascii,
    Binary,
}

/// Unstructured volumetric mesh with an optional material tag per cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeMesh {
    pub points: Vec<Point3<f64>>,
    pub cells: Vec<Cell>,
    pub tags: Option<Vec<u32>>,
}

impl VolumeMesh {
    pub fn new(points: Vec<Point3<f64>>, cells: Vec<Cell>) -> Self {
        Self {
            points,
            cells,
            tags: None,
        }
    }

    /// Reads a legacy VTK unstructured grid.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        input::read_vtk(path).with_context(|| format!("Failed to load mesh {}", path.display()))
    }

    /// Writes the mesh as a legacy VTK unstructured grid.
    pub fn write<P: AsRef<Path>>(&self, path: P, encoding: VtkEncoding) -> anyhow::Result<()> {
        let path = path.as_ref();
        output::write_vtk(self, path, encoding)
            .with_context(|| format!("Failed to write mesh {}", path.display()))
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the mesh with every cell carrying `tag`, replacing existing tags.
    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tags = Some(vec![tag; self.cells.len()]);
        self
    }

    pub fn tag_of(&self, cell: usize) -> Option<u32> {
        self.tags.as_ref().and_then(|t| t.get(cell).copied())
    }

    pub fn distinct_tags(&self) -> BTreeSet<u32> {
        self.tags
            .as_ref()
            .map(|t| t.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of cells per tag.
    pub fn tag_histogram(&self) -> BTreeMap<u32, usize> {
        let mut histogram = BTreeMap::new();
        if let Some(tags) = &self.tags {
            for tag in tags {
                *histogram.entry(*tag).or_insert(0) += 1;
            }
        }
        histogram
    }

    /// Checks node indices, node counts and tag array length.
    pub fn validate(&self) -> Result<(), MeshError> {
        for (i, cell) in self.cells.iter().enumerate() {
            if let Some(expected) = cell.kind.node_count() {
                if cell.nodes.len() != expected {
                    return Err(MeshError::InvalidMesh(format!(
                        "cell {} of type {:?} has {} nodes, expected {}",
                        i,
                        cell.kind,
                        cell.nodes.len(),
                        expected
                    )));
                }
            }
            if let Some(&bad) = cell.nodes.iter().find(|&&n| n >= self.points.len()) {
                return Err(MeshError::InvalidMesh(format!(
                    "cell {} references point {} but the mesh has {} points",
                    i,
                    bad,
                    self.points.len()
                )));
            }
        }
        if let Some(tags) = &self.tags {
            if tags.len() != self.cells.len() {
                return Err(MeshError::InvalidMesh(format!(
                    "{} tags for {} cells",
                    tags.len(),
                    self.cells.len()
                )));
            }
        }
        Ok(())
    }

    /// Signed volume of a tetrahedron given by four point indices.
    pub fn signed_tet_volume(&self, nodes: [usize; 4]) -> f64 {
        signed_tet_volume(
            &self.points[nodes[0]],
            &self.points[nodes[1]],
            &self.points[nodes[2]],
            &self.points[nodes[3]],
        )
    }

    /// Total volume of the tetrahedral cells.
    pub fn tet_volume(&self) -> f64 {
        self.tet_volume_by_tag().values().sum()
    }

    /// Tetrahedral volume per tag. Untagged meshes report everything under tag 0.
    pub fn tet_volume_by_tag(&self) -> BTreeMap<u32, f64> {
        let mut volumes = BTreeMap::new();
        for (i, cell) in self.cells.iter().enumerate() {
            if cell.kind != CellType::Tetra {
                continue;
            }
            let nodes = [cell.nodes[0], cell.nodes[1], cell.nodes[2], cell.nodes[3]];
            let tag = self.tag_of(i).unwrap_or(0);
            *volumes.entry(tag).or_insert(0.0) += self.signed_tet_volume(nodes).abs();
        }
        volumes
    }
}

pub fn signed_tet_volume(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> f64 {
    let v1: Vector3<f64> = p1 - p0;
    let v2: Vector3<f64> = p2 - p0;
    let v3: Vector3<f64> = p3 - p0;
    v1.dot(&v2.cross(&v3)) / 6.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::unit_tet_mesh;
    use approx::assert_relative_eq;

    #[test]
    fn test_with_tag_sets_every_cell() {
        let mesh = unit_tet_mesh([0.0, 0.0, 0.0]).with_tag(3);
        assert_eq!(mesh.tags, Some(vec![3]));
        assert_eq!(mesh.distinct_tags().into_iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_with_tag_replaces_existing_tags() {
        let mesh = unit_tet_mesh([0.0, 0.0, 0.0]).with_tag(1).with_tag(2);
        assert_eq!(mesh.tag_of(0), Some(2));
    }

    #[test]
    fn test_unit_tet_volume() {
        let mesh = unit_tet_mesh([5.0, -1.0, 2.0]);
        assert_relative_eq!(mesh.tet_volume(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_validate_rejects_out_of_range_node() {
        let mut mesh = unit_tet_mesh([0.0, 0.0, 0.0]);
        mesh.cells[0].nodes[3] = 9;
        let err = mesh.validate().unwrap_err();
        assert!(err.to_string().contains("references point 9"));
    }

    #[test]
    fn test_validate_rejects_tag_length_mismatch() {
        let mut mesh = unit_tet_mesh([0.0, 0.0, 0.0]);
        mesh.tags = Some(vec![1, 2]);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_cell_type_ids_roundtrip() {
        for id in [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 24] {
            let kind = CellType::from_vtk_id(id).unwrap();
            assert_eq!(kind.vtk_id() as i64, id);
        }
        assert!(CellType::from_vtk_id(42).is_none());
    }
}
