use nalgebra::Point3;
use std::collections::{HashMap, HashSet};

use super::tagging::TaggedMesh;
use crate::error::MeshError;
use crate::io::{Cell, CellType, VolumeMesh};

/// Combines two meshes into one.
///
/// Coincident points (bit-identical after folding `-0.0` into `0.0`) are
/// shared and cells keep whatever tag they carried. A cell of `b` already
/// present in `a` with the same tag is kept once, while repeated cells within
/// one operand are all kept. The result does not depend on operand order
/// beyond the numbering of points and cells.
pub fn merge_meshes(a: &VolumeMesh, b: &VolumeMesh) -> Result<VolumeMesh, MeshError> {
    let tagged = match (a.tags.is_some(), b.tags.is_some()) {
        (true, true) => true,
        (false, false) => false,
        _ => {
            return Err(MeshError::InvalidMesh(
                "cannot merge a tagged mesh with an untagged one".into(),
            ))
        }
    };

    let mut builder = MergeBuilder::default();
    builder.append(a);
    builder.append(b);
    Ok(builder.finish(tagged))
}

/// Folds tagged element meshes into one, the first seeding the result.
///
/// Fails when two meshes carry the same tag or when there is nothing to merge.
pub fn merge_tagged<I>(meshes: I) -> Result<VolumeMesh, MeshError>
where
    I: IntoIterator<Item = TaggedMesh>,
{
    let mut used: HashMap<u32, String> = HashMap::new();
    let mut merged: Option<VolumeMesh> = None;

    for tagged in meshes {
        if let Some(other) = used.insert(tagged.tag, tagged.name.clone()) {
            return Err(MeshError::TagCollision {
                name: format!("{} (already used by {})", tagged.name, other),
                tag: tagged.tag,
            });
        }
        merged = Some(match merged {
            None => tagged.mesh,
            Some(acc) => merge_meshes(&acc, &tagged.mesh)?,
        });
    }

    merged.ok_or_else(|| MeshError::InvalidMesh("no element meshes to merge".into()))
}

type CellKey = (CellType, Vec<usize>, Option<u32>);

#[derive(Default)]
struct MergeBuilder {
    points: Vec<Point3<f64>>,
    point_index: HashMap<[u64; 3], usize>,
    cells: Vec<Cell>,
    tags: Vec<u32>,
    seen_cells: HashSet<CellKey>,
}

impl MergeBuilder {
    fn intern(&mut self, p: &Point3<f64>) -> usize {
        let key = point_key(p);
        if let Some(&idx) = self.point_index.get(&key) {
            return idx;
        }
        let idx = self.points.len();
        self.points.push(*p);
        self.point_index.insert(key, idx);
        idx
    }

    /// Cells are only matched against earlier operands.
    fn append(&mut self, mesh: &VolumeMesh) {
        let remap: Vec<usize> = mesh.points.iter().map(|p| self.intern(p)).collect();
        let mut added = Vec::with_capacity(mesh.cells.len());

        for (i, cell) in mesh.cells.iter().enumerate() {
            let nodes: Vec<usize> = cell.nodes.iter().map(|&n| remap[n]).collect();
            let tag = mesh.tag_of(i);

            let mut sorted = nodes.clone();
            sorted.sort_unstable();
            let key = (cell.kind, sorted, tag);
            if self.seen_cells.contains(&key) {
                continue;
            }
            added.push(key);

            self.cells.push(Cell::new(cell.kind, nodes));
            if let Some(t) = tag {
                self.tags.push(t);
            }
        }
        self.seen_cells.extend(added);
    }

    fn finish(self, tagged: bool) -> VolumeMesh {
        VolumeMesh {
            points: self.points,
            cells: self.cells,
            tags: if tagged { Some(self.tags) } else { None },
        }
    }
}

fn point_key(p: &Point3<f64>) -> [u64; 3] {
    let fold = |v: f64| if v == 0.0 { 0.0f64 } else { v };
    [fold(p.x).to_bits(), fold(p.y).to_bits(), fold(p.z).to_bits()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::tagging::{ElementCatalog, ElementMesh};
    use crate::utils::test_utils::{cell_signature, two_tet_mesh, unit_tet_mesh};

    fn element(name: &str, origin: [f64; 3]) -> ElementMesh {
        ElementMesh {
            name: name.to_string(),
            mesh: unit_tet_mesh(origin),
        }
    }

    fn four_chambers() -> Vec<TaggedMesh> {
        let catalog = ElementCatalog::default();
        [
            ("LV", [0.0, 0.0, 0.0]),
            ("RV", [2.0, 0.0, 0.0]),
            ("LA", [0.0, 2.0, 0.0]),
            ("RA", [2.0, 2.0, 0.0]),
        ]
        .iter()
        .map(|(name, origin)| element(name, *origin).tag_with(&catalog).unwrap())
        .collect()
    }

    #[test]
    fn test_four_single_cell_elements_merge_into_four_tagged_cells() {
        let merged = merge_tagged(four_chambers()).unwrap();
        assert_eq!(merged.cell_count(), 4);
        assert_eq!(merged.tags, Some(vec![1, 2, 3, 4]));

        let histogram = merged.tag_histogram();
        for tag in 1..=4 {
            assert_eq!(histogram[&tag], 1);
        }
    }

    #[test]
    fn test_merge_is_order_independent() {
        let meshes = four_chambers();
        let reference = cell_signature(&merge_tagged(meshes.clone()).unwrap());

        let orders = [[3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
        for order in orders {
            let permuted: Vec<TaggedMesh> = order.iter().map(|&i| meshes[i].clone()).collect();
            let merged = merge_tagged(permuted).unwrap();
            assert_eq!(cell_signature(&merged), reference);
        }
    }

    #[test]
    fn test_merge_is_associative() {
        let m: Vec<VolumeMesh> = four_chambers().into_iter().map(|t| t.mesh).collect();
        let left = merge_meshes(&merge_meshes(&m[0], &m[1]).unwrap(), &m[2]).unwrap();
        let right = merge_meshes(&m[0], &merge_meshes(&m[1], &m[2]).unwrap()).unwrap();
        assert_eq!(cell_signature(&left), cell_signature(&right));
        assert_eq!(left.point_count(), right.point_count());
    }

    #[test]
    fn test_shared_interface_points_are_merged() {
        let mesh = two_tet_mesh();
        let lv = VolumeMesh::new(mesh.points.clone(), vec![mesh.cells[0].clone()]).with_tag(1);
        let rv = VolumeMesh::new(mesh.points.clone(), vec![mesh.cells[1].clone()]).with_tag(2);

        let merged = merge_meshes(&lv, &rv).unwrap();
        assert_eq!(merged.point_count(), 5);
        assert_eq!(merged.cell_count(), 2);
        assert_eq!(merged.tags, Some(vec![1, 2]));
    }

    #[test]
    fn test_negative_zero_matches_zero() {
        let a = unit_tet_mesh([0.0, 0.0, 0.0]).with_tag(1);
        let mut b = unit_tet_mesh([0.0, 0.0, 0.0]).with_tag(2);
        b.points[0] = Point3::new(-0.0, -0.0, -0.0);
        let merged = merge_meshes(&a, &b).unwrap();
        assert_eq!(merged.point_count(), 4);
    }

    #[test]
    fn test_cells_never_change_tag() {
        let meshes = four_chambers();
        let expected: Vec<_> = meshes
            .iter()
            .flat_map(|t| cell_signature(&t.mesh))
            .collect();
        let merged = merge_tagged(meshes).unwrap();
        let signature = cell_signature(&merged);
        for entry in expected {
            assert!(signature.contains(&entry));
        }
    }

    #[test]
    fn test_identical_cell_with_same_tag_is_kept_once() {
        let a = unit_tet_mesh([0.0, 0.0, 0.0]).with_tag(1);
        let merged = merge_meshes(&a, &a).unwrap();
        assert_eq!(merged.cell_count(), 1);
    }

    #[test]
    fn test_repeated_cells_within_one_element_are_kept() {
        let mut lv = element("LV", [0.0, 0.0, 0.0]);
        let cell = lv.mesh.cells[0].clone();
        lv.mesh.cells.push(cell);
        let rv = element("RV", [2.0, 0.0, 0.0]);

        let merged = merge_tagged(vec![lv.tag(1), rv.tag(2)]).unwrap();
        assert_eq!(merged.cell_count(), 3);
        assert_eq!(merged.tag_histogram()[&1], 2);

        let doubled = merged.clone();
        assert_eq!(merge_meshes(&merged, &doubled).unwrap().cell_count(), 3);
    }

    #[test]
    fn test_mixed_tagging_is_rejected() {
        let a = unit_tet_mesh([0.0, 0.0, 0.0]).with_tag(1);
        let b = unit_tet_mesh([1.0, 0.0, 0.0]);
        assert!(merge_meshes(&a, &b).is_err());
    }

    #[test]
    fn test_duplicate_tags_are_rejected() {
        let a = element("LV", [0.0, 0.0, 0.0]).tag(1);
        let b = element("RV", [2.0, 0.0, 0.0]).tag(1);
        assert!(matches!(
            merge_tagged(vec![a, b]),
            Err(MeshError::TagCollision { tag: 1, .. })
        ));
    }

    #[test]
    fn test_empty_merge_is_rejected() {
        assert!(merge_tagged(Vec::<TaggedMesh>::new()).is_err());
    }
}
