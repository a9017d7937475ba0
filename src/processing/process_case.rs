use anyhow::Context;
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MeshError;
use crate::io::{VolumeMesh, VtkEncoding};
use crate::processing::merge::{merge_meshes, merge_tagged};
use crate::processing::tagging::{ElementCatalog, ElementMesh, TaggedMesh};
use crate::processing::tetrahedralize::tetrahedralize;
use crate::staging::{
    element_tetra_name, heart_output_name, pericardium_output_name, PERICARDIUM_TETRA_NAME,
    STAGED_HEART_NAME,
};
use crate::utils::utils::relocate;

const PERICARDIUM_ELEMENT: &str = "pericardium";
const MERGED_HEART_NAME: &str = "Full_Heart_merged.vtk";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSummary {
    pub name: String,
    pub tag: u32,
    pub cells: usize,
}

/// What a tag-and-merge step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    pub elements: Vec<ElementSummary>,
    pub points: usize,
    pub cells: usize,
}

fn summary(tagged: &TaggedMesh) -> ElementSummary {
    ElementSummary {
        name: tagged.name.clone(),
        tag: tagged.tag,
        cells: tagged.mesh.cell_count(),
    }
}

/// Writes `mesh` under `staged_name` in `dir`, renames it to `final_name`
/// and moves it into `output_dir`.
fn publish(
    mesh: &VolumeMesh,
    dir: &Path,
    staged_name: &str,
    final_name: &str,
    output_dir: &Path,
    encoding: VtkEncoding,
) -> anyhow::Result<PathBuf> {
    let staged = dir.join(staged_name);
    mesh.write(&staged, encoding)?;

    let renamed = dir.join(final_name);
    if renamed != staged {
        fs::rename(&staged, &renamed).map_err(|e| MeshError::io(&staged, e))?;
    }
    let output = output_dir.join(final_name);
    relocate(&renamed, &output)?;
    info!("Wrote {}", output.display());
    Ok(output)
}

/// Tags the per-element tetrahedral meshes in `tetra_dir` by catalog
/// position, merges them into one heart mesh and moves the result to
/// `output_dir` as `Full_Heart_<k>.vtk` (`Full_Template.vtk` for the
/// template).
pub fn tag_and_merge_heart_elements(
    tetra_dir: &Path,
    output_dir: &Path,
    catalog: &ElementCatalog,
    model_index: u32,
    template: bool,
    encoding: VtkEncoding,
) -> anyhow::Result<MergeReport> {
    let mut tagged = Vec::with_capacity(catalog.len());
    for name in catalog.names() {
        let path = tetra_dir.join(element_tetra_name(name));
        let element = ElementMesh::load(&path)?;
        tagged.push(element.tag_with(catalog)?);
    }
    let elements: Vec<ElementSummary> = tagged.iter().map(summary).collect();

    let merged = merge_tagged(tagged).context("Merging heart elements failed")?;
    let merged = tetrahedralize(&merged)?;

    // catalog is never empty
    let staged_name = format!("{}_tetramerged.vtk", catalog.names()[0]);
    let output = publish(
        &merged,
        tetra_dir,
        &staged_name,
        &heart_output_name(model_index, template),
        output_dir,
        encoding,
    )?;

    Ok(MergeReport {
        output,
        elements,
        points: merged.point_count(),
        cells: merged.cell_count(),
    })
}

/// Adds the tetrahedralized pericardium in `workspace` to the staged heart
/// mesh under the next free tag and moves the result to `output_dir` as
/// `Full_Heart_<k>_w_peri.vtk`.
pub fn tag_and_merge_pericardium(
    workspace: &Path,
    output_dir: &Path,
    catalog: &ElementCatalog,
    model_index: u32,
    encoding: VtkEncoding,
) -> anyhow::Result<MergeReport> {
    let heart = VolumeMesh::load(workspace.join(STAGED_HEART_NAME))?;
    let peri_tag = catalog
        .pericardium_tag_for(&heart)
        .context("Cannot tag the pericardium")?;
    info!(
        "Element name: {}, element tag: {}",
        PERICARDIUM_ELEMENT, peri_tag
    );

    let pericardium = ElementMesh {
        name: PERICARDIUM_ELEMENT.to_string(),
        mesh: VolumeMesh::load(workspace.join(PERICARDIUM_TETRA_NAME))?,
    }
    .tag(peri_tag);

    let mut elements: Vec<ElementSummary> = heart
        .tag_histogram()
        .into_iter()
        .map(|(tag, cells)| ElementSummary {
            name: (tag as usize)
                .checked_sub(1)
                .and_then(|i| catalog.names().get(i))
                .cloned()
                .unwrap_or_else(|| format!("tag {}", tag)),
            tag,
            cells,
        })
        .collect();
    elements.push(summary(&pericardium));

    let merged = merge_meshes(&heart, &pericardium.mesh)?;
    let merged = tetrahedralize(&merged)?;

    let output = publish(
        &merged,
        workspace,
        MERGED_HEART_NAME,
        &pericardium_output_name(model_index),
        output_dir,
        encoding,
    )?;

    Ok(MergeReport {
        output,
        elements,
        points: merged.point_count(),
        cells: merged.cell_count(),
    })
}
