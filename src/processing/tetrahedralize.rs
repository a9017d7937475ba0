use log::debug;

use crate::error::MeshError;
use crate::io::{Cell, CellType, VolumeMesh};

// Local tetrahedra per cell type, as indices into the cell's node list.
const HEX_TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
    [0, 5, 1, 6],
];
// VTK voxel node order mapped onto hexahedron order.
const VOXEL_AS_HEX: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];
const WEDGE_TETS: [[usize; 4]; 3] = [[0, 1, 2, 3], [1, 4, 5, 3], [1, 5, 2, 3]];
const PYRAMID_TETS: [[usize; 4]; 2] = [[0, 1, 2, 4], [0, 2, 3, 4]];

/// Turns the mesh into a pure tetrahedral grid.
///
/// Every 3-D cell is split into tetrahedra, each inheriting the tag of the
/// cell it came from; vertices, lines and surface cells are dropped, as are
/// points no tetrahedron references. Output tetrahedra have non-negative
/// signed volume.
pub fn tetrahedralize(mesh: &VolumeMesh) -> Result<VolumeMesh, MeshError> {
    mesh.validate()?;

    let mut tets: Vec<[usize; 4]> = Vec::with_capacity(mesh.cells.len());
    let mut tags: Vec<u32> = Vec::new();
    let mut dropped = 0usize;

    for (i, cell) in mesh.cells.iter().enumerate() {
        let split = split_cell(cell);
        if split.is_empty() {
            dropped += 1;
            continue;
        }
        for local in split {
            tets.push(orient(mesh, local));
            if let Some(tag) = mesh.tag_of(i) {
                tags.push(tag);
            }
        }
    }

    if tets.is_empty() {
        return Err(MeshError::InvalidMesh(
            "mesh contains no volumetric cells".into(),
        ));
    }
    if dropped > 0 {
        debug!("Dropped {} non-volumetric cells", dropped);
    }

    // compact points to the ones referenced by a tetrahedron
    let mut remap: Vec<Option<usize>> = vec![None; mesh.points.len()];
    let mut points = Vec::new();
    for tet in &mut tets {
        for node in tet.iter_mut() {
            let new = match remap[*node] {
                Some(idx) => idx,
                None => {
                    let idx = points.len();
                    points.push(mesh.points[*node]);
                    remap[*node] = Some(idx);
                    idx
                }
            };
            *node = new;
        }
    }

    Ok(VolumeMesh {
        points,
        cells: tets.into_iter().map(Cell::tetra).collect(),
        tags: mesh.tags.as_ref().map(|_| tags),
    })
}

fn split_cell(cell: &Cell) -> Vec<[usize; 4]> {
    let n = &cell.nodes;
    let pick = |table: &[[usize; 4]], order: Option<&[usize; 8]>| -> Vec<[usize; 4]> {
        table
            .iter()
            .map(|t| {
                let at = |k: usize| match order {
                    Some(o) => n[o[k]],
                    None => n[k],
                };
                [at(t[0]), at(t[1]), at(t[2]), at(t[3])]
            })
            .collect()
    };

    match cell.kind {
        CellType::Tetra | CellType::QuadraticTetra => vec![[n[0], n[1], n[2], n[3]]],
        CellType::Hexahedron => pick(&HEX_TETS, None),
        CellType::Voxel => pick(&HEX_TETS, Some(&VOXEL_AS_HEX)),
        CellType::Wedge => pick(&WEDGE_TETS, None),
        CellType::Pyramid => pick(&PYRAMID_TETS, None),
        _ => Vec::new(),
    }
}

fn orient(mesh: &VolumeMesh, tet: [usize; 4]) -> [usize; 4] {
    if mesh.signed_tet_volume(tet) < 0.0 {
        [tet[0], tet[2], tet[1], tet[3]]
    } else {
        tet
    }
}
