pub mod geo_patch;

use anyhow::Context;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MeshError;
use crate::utils::utils::{ensure_dir, file_name_str, list_regular_files};

/// Name the volumetric input receives inside the workspace.
pub const STAGED_HEART_NAME: &str = "Full_Heart.vtk";
/// Pericardium mesh produced by the external tetrahedralizer in the workspace.
pub const PERICARDIUM_TETRA_NAME: &str = "peri_tetra.vtk";
pub const TEMPLATE_OUTPUT_NAME: &str = "Full_Template.vtk";

// Deformetrica writes these next to the shooting meshes, they are not meshes.
const AUXILIARY_MARKERS: [&str; 2] = ["ControlPoints", "Momenta"];

pub fn element_tetra_name(element: &str) -> String {
    format!("{}_tetra.vtk", element)
}

pub fn volumetric_input_name(model_index: u32) -> String {
    format!("Full_Heart_{}.vtk", model_index)
}

pub fn heart_output_name(model_index: u32, template: bool) -> String {
    if template {
        TEMPLATE_OUTPUT_NAME.to_string()
    } else {
        format!("Full_Heart_{}.vtk", model_index)
    }
}

pub fn pericardium_output_name(model_index: u32) -> String {
    format!("Full_Heart_{}_w_peri.vtk", model_index)
}

/// Removes the regular files directly inside `workspace`; subdirectories are
/// left alone. Creates the workspace when it does not exist yet.
pub fn clean(workspace: &Path) -> anyhow::Result<usize> {
    ensure_dir(workspace)?;
    let files = list_regular_files(workspace)?;
    for file in &files {
        fs::remove_file(file).map_err(|e| MeshError::io(file, e))?;
    }
    debug!("Removed {} files from {}", files.len(), workspace.display());
    Ok(files.len())
}

/// Glob-style description of the surface selection, used in messages.
pub fn surface_input_pattern(model_index: u32, template: bool) -> String {
    if template {
        "*Template*".to_string()
    } else {
        format!("Shooting_{}_*", model_index)
    }
}

pub fn is_surface_input(file_name: &str, model_index: u32, template: bool) -> bool {
    let selected = if template {
        file_name.contains("Template")
    } else {
        file_name.starts_with(&format!("Shooting_{}_", model_index))
    };
    selected && !AUXILIARY_MARKERS.iter().any(|m| file_name.contains(m))
}

/// Surface meshes of one model (or the template), sorted by file name.
pub fn select_surface_inputs(
    models_dir: &Path,
    model_index: u32,
    template: bool,
) -> anyhow::Result<Vec<PathBuf>> {
    let files = list_regular_files(models_dir)
        .with_context(|| format!("Could not list models directory {}", models_dir.display()))?;
    let selected: Vec<PathBuf> = files
        .into_iter()
        .filter(|p| is_surface_input(file_name_str(p), model_index, template))
        .collect();
    debug!("Selected surface inputs: {:?}", selected);
    Ok(selected)
}

/// Replaces the workspace contents with the surface meshes of one model.
pub fn copy_surface_inputs(
    models_dir: &Path,
    workspace: &Path,
    model_index: u32,
    template: bool,
) -> anyhow::Result<Vec<PathBuf>> {
    clean(workspace)?;
    let selected = select_surface_inputs(models_dir, model_index, template)?;
    if selected.is_empty() {
        return Err(MeshError::NoInputs {
            dir: models_dir.to_path_buf(),
            pattern: surface_input_pattern(model_index, template),
        }
        .into());
    }

    let mut staged = Vec::with_capacity(selected.len());
    for source in &selected {
        let target = workspace.join(file_name_str(source));
        fs::copy(source, &target).map_err(|e| MeshError::io(source, e))?;
        staged.push(target);
    }
    info!(
        "Staged {} surface meshes from {}",
        staged.len(),
        models_dir.display()
    );
    Ok(staged)
}

/// Replaces the workspace contents with the full-heart volumetric mesh of
/// one model, staged as [`STAGED_HEART_NAME`].
pub fn copy_volumetric_input(
    models_dir: &Path,
    workspace: &Path,
    model_index: u32,
) -> anyhow::Result<PathBuf> {
    clean(workspace)?;
    let source = models_dir.join(volumetric_input_name(model_index));
    let target = workspace.join(STAGED_HEART_NAME);
    fs::copy(&source, &target)
        .map_err(|e| MeshError::io(&source, e))
        .context("Could not stage the volumetric heart mesh")?;
    info!("Staged {}", source.display());
    Ok(target)
}
