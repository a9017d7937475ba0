use nalgebra::Point3;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::io::{Cell as MeshCell, CellType, VolumeMesh, VtkEncoding};
use crate::tetra::{PericardiumGenerator, Tetrahedralizer};

/// Single positively oriented unit tetrahedron anchored at `origin`.
pub fn unit_tet_mesh(origin: [f64; 3]) -> VolumeMesh {
    let [x, y, z] = origin;
    VolumeMesh::new(
        vec![
            Point3::new(x, y, z),
            Point3::new(x + 1.0, y, z),
            Point3::new(x, y + 1.0, z),
            Point3::new(x, y, z + 1.0),
        ],
        vec![MeshCell::tetra([0, 1, 2, 3])],
    )
}

/// Axis-aligned cube as one hexahedron in VTK node order.
pub fn hex_cube_mesh(origin: [f64; 3], size: f64) -> VolumeMesh {
    let [x, y, z] = origin;
    let s = size;
    VolumeMesh::new(
        vec![
            Point3::new(x, y, z),
            Point3::new(x + s, y, z),
            Point3::new(x + s, y + s, z),
            Point3::new(x, y + s, z),
            Point3::new(x, y, z + s),
            Point3::new(x + s, y, z + s),
            Point3::new(x + s, y + s, z + s),
            Point3::new(x, y + s, z + s),
        ],
        vec![MeshCell::new(CellType::Hexahedron, (0..8).collect())],
    )
}

/// Two unit tets sharing the face (1, 2, 3).
pub fn two_tet_mesh() -> VolumeMesh {
    VolumeMesh::new(
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ],
        vec![MeshCell::tetra([0, 1, 2, 3]), MeshCell::tetra([1, 2, 4, 3])],
    )
}

/// Writes `mesh` to `dir/name` and returns the path.
pub fn write_mesh(dir: &Path, name: &str, mesh: &VolumeMesh) -> PathBuf {
    let path = dir.join(name);
    mesh.write(&path, VtkEncoding::Ascii)
        .expect("Failed to write test mesh");
    path
}

/// Order-independent view of a mesh: each cell as its sorted corner
/// coordinates (bit patterns) together with its tag.
pub fn cell_signature(mesh: &VolumeMesh) -> BTreeSet<(Vec<[u64; 3]>, Option<u32>)> {
    mesh.cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let mut corners: Vec<[u64; 3]> = cell
                .nodes
                .iter()
                .map(|&n| {
                    let p = mesh.points[n];
                    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
                })
                .collect();
            corners.sort();
            (corners, mesh.tag_of(i))
        })
        .collect()
}

/// Stand-in for the gmsh scripts: writes one unit tet per catalog element
/// into `tetra_dir` and a pericardium tet into `workspace`.
pub struct FakeTetrahedralizer {
    pub tetra_dir: PathBuf,
    pub workspace: PathBuf,
    pub elements: Vec<String>,
    pub heart_calls: Cell<usize>,
    pub pericardium_calls: Cell<usize>,
}

impl FakeTetrahedralizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            tetra_dir: config.main_dir.join("tetra"),
            workspace: config.workspace.clone(),
            elements: config.elements.clone(),
            heart_calls: Cell::new(0),
            pericardium_calls: Cell::new(0),
        }
    }
}

impl Tetrahedralizer for FakeTetrahedralizer {
    fn mesh_heart(&self) -> anyhow::Result<()> {
        self.heart_calls.set(self.heart_calls.get() + 1);
        fs::create_dir_all(&self.tetra_dir)?;
        for (i, name) in self.elements.iter().enumerate() {
            let mesh = unit_tet_mesh([2.0 * i as f64, 0.0, 0.0]);
            write_mesh(&self.tetra_dir, &format!("{}_tetra.vtk", name), &mesh);
        }
        Ok(())
    }

    fn mesh_pericardium(&self) -> anyhow::Result<()> {
        self.pericardium_calls.set(self.pericardium_calls.get() + 1);
        write_mesh(&self.workspace, "peri_tetra.vtk", &unit_tet_mesh([0.0, 0.0, 5.0]));
        Ok(())
    }
}

/// Records the heart meshes it was asked to wrap.
#[derive(Default)]
pub struct FakeGenerator {
    pub seen: RefCell<Vec<PathBuf>>,
}

impl PericardiumGenerator for FakeGenerator {
    fn generate(&self, heart_mesh: &Path) -> anyhow::Result<()> {
        self.seen.borrow_mut().push(heart_mesh.to_path_buf());
        Ok(())
    }
}

/// Config rooted in `root`, with one `.geo` script per default element.
pub fn fixture_config(root: &Path, extra: &str) -> PipelineConfig {
    let geo_dir = root.join("gmsh").join("geofiles");
    fs::create_dir_all(&geo_dir).expect("Failed to create geo dir");
    for name in ["LV", "RV", "LA", "RA"] {
        fs::write(
            geo_dir.join(format!("{}.geo", name)),
            format!("// {}\nMerge \"placeholder.vtk\";\nMesh 3;\n", name),
        )
        .expect("Failed to write geo script");
    }
    let text = format!(
        "main_dir = '{}'\ngeo_dir = '{}'\nworkspace = '{}'\n\
         models_dir = '{}'\noutput_dir = '{}'\n{}",
        root.join("gmsh").display(),
        geo_dir.display(),
        root.join("gmsh").join("current_model").display(),
        root.join("shooting_{dataset}").display(),
        root.join("final_{dataset:02}").display(),
        extra
    );
    PipelineConfig::from_toml_str(&text).expect("Failed to parse fixture config")
}

/// Writes surface placeholders for `models` and a tagged full-heart mesh per
/// model into the models directory of `dataset`.
pub fn stage_dataset(root: &Path, dataset: u32, models: &[u32]) -> PathBuf {
    let dir = root.join(format!("shooting_{}", dataset));
    fs::create_dir_all(&dir).expect("Failed to create models dir");
    for k in models {
        for name in ["LV", "RV", "LA", "RA"] {
            fs::write(dir.join(format!("Shooting_{}_{}.vtk", k, name)), "surface")
                .expect("Failed to write surface");
        }
        fs::write(dir.join(format!("Shooting_{}_ControlPoints.txt", k)), "0")
            .expect("Failed to write control points");
        let mut heart = unit_tet_mesh([0.0, 0.0, 0.0]);
        heart.cells = vec![heart.cells[0].clone(); 4];
        heart.tags = Some(vec![1, 2, 3, 4]);
        write_mesh(&dir, &format!("Full_Heart_{}.vtk", k), &heart);
    }
    dir
}
