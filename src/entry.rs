use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::io::{VolumeMesh, VtkEncoding};
use crate::pipeline::batch::{run_batch, BatchReport};
use crate::pipeline::{MeshPipeline, WorkItem};
use crate::processing::process_case::{tag_and_merge_heart_elements, MergeReport};
use crate::processing::tagging::ElementCatalog;
use crate::tetra::{CommandPericardiumGenerator, ShellTetrahedralizer};

fn load_config(config_path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::from_file(config_path)
        .with_context(|| format!("Could not load configuration {}", config_path.display()))
}

fn shell_collaborators(
    config: &PipelineConfig,
) -> (ShellTetrahedralizer, CommandPericardiumGenerator) {
    let tetrahedralizer = ShellTetrahedralizer::new(
        &config.main_dir,
        config.tetrahedralizer.heart.clone(),
        config.tetrahedralizer.pericardium.clone(),
    );
    let generator = CommandPericardiumGenerator {
        command: config.pericardium.clone(),
    };
    (tetrahedralizer, generator)
}

pub fn run_surface_to_tetra(
    config_path: &Path,
    dataset: u32,
    model: u32,
    template: bool,
) -> Result<MergeReport> {
    let config = load_config(config_path)?;
    let (tetrahedralizer, generator) = shell_collaborators(&config);
    let item = WorkItem {
        dataset,
        model,
        template,
    };
    MeshPipeline::new(&config, item, &tetrahedralizer, &generator)?.surface_to_tetra()
}

pub fn run_add_pericardium(config_path: &Path, dataset: u32, model: u32) -> Result<MergeReport> {
    let config = load_config(config_path)?;
    let (tetrahedralizer, generator) = shell_collaborators(&config);
    let item = WorkItem {
        dataset,
        model,
        template: false,
    };
    MeshPipeline::new(&config, item, &tetrahedralizer, &generator)?.add_pericardium()
}

/// Runs the `[batch]` section of the configuration. Failed items under the
/// `continue` policy are only reported, see [`BatchReport::ensure_success`].
pub fn run_batch_from_file(config_path: &Path) -> Result<BatchReport> {
    let config = load_config(config_path)?;
    let batch = config
        .batch
        .clone()
        .ok_or_else(|| anyhow!("{} has no [batch] section", config_path.display()))?;
    let (tetrahedralizer, generator) = shell_collaborators(&config);
    run_batch(&config, &batch, &tetrahedralizer, &generator)
}

/// Tags and merges already tetrahedralized element meshes, without staging
/// or running any external tool.
pub fn run_tag_and_merge(
    tetra_dir: &Path,
    output_dir: &Path,
    elements: Option<Vec<String>>,
    model: u32,
    template: bool,
    encoding: VtkEncoding,
) -> Result<MergeReport> {
    let catalog = match elements {
        Some(names) => ElementCatalog::new(names)?,
        None => ElementCatalog::default(),
    };
    tag_and_merge_heart_elements(tetra_dir, output_dir, &catalog, model, template, encoding)
}

#[derive(Debug, Clone, Serialize)]
pub struct MeshSummary {
    pub points: usize,
    pub cells: usize,
    pub tagged: bool,
    pub cells_per_tag: BTreeMap<u32, usize>,
    pub tet_volume: f64,
}

pub fn inspect_mesh(path: &Path) -> Result<MeshSummary> {
    let mesh = VolumeMesh::load(path)?;
    Ok(MeshSummary {
        points: mesh.point_count(),
        cells: mesh.cell_count(),
        tagged: mesh.tags.is_some(),
        cells_per_tag: mesh.tag_histogram(),
        tet_volume: mesh.tet_volume(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{hex_cube_mesh, unit_tet_mesh, write_mesh};
    use approx::assert_relative_eq;
    use std::fs;

    #[test]
    fn test_batch_requires_batch_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(
            &path,
            "main_dir = '/m'\ngeo_dir = '/g'\nworkspace = '/w'\n\
             models_dir = '/d'\noutput_dir = '/o'\n",
        )
        .unwrap();
        let err = run_batch_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("no [batch] section"));
    }

    #[test]
    fn test_tag_and_merge_with_custom_elements() {
        let tetra = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_mesh(tetra.path(), "AO_tetra.vtk", &unit_tet_mesh([0.0, 0.0, 0.0]));
        write_mesh(tetra.path(), "LV_tetra.vtk", &unit_tet_mesh([3.0, 0.0, 0.0]));

        let report = run_tag_and_merge(
            tetra.path(),
            out.path(),
            Some(vec!["LV".into(), "AO".into()]),
            4,
            false,
            VtkEncoding::Ascii,
        )
        .unwrap();
        let tags: Vec<(String, u32)> = report
            .elements
            .iter()
            .map(|e| (e.name.clone(), e.tag))
            .collect();
        assert_eq!(tags, vec![("LV".to_string(), 1), ("AO".to_string(), 2)]);
        assert!(out.path().join("Full_Heart_4.vtk").exists());
    }

    #[test]
    fn test_inspect_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let cube = hex_cube_mesh([0.0, 0.0, 0.0], 1.0).with_tag(3);
        let path = write_mesh(dir.path(), "cube.vtk", &cube);
        let summary = inspect_mesh(&path).unwrap();
        assert_eq!(summary.points, 8);
        assert_eq!(summary.cells, 1);
        assert!(summary.tagged);
        assert_eq!(summary.cells_per_tag[&3], 1);
        // hexahedra do not count towards the tetrahedral volume
        assert_relative_eq!(summary.tet_volume, 0.0);
    }
}
