pub mod batch;

use anyhow::Context;
use log::info;
use serde::Serialize;

use crate::config::{PipelineConfig, PipelinePaths};
use crate::io::VtkEncoding;
use crate::processing::process_case::{
    tag_and_merge_heart_elements, tag_and_merge_pericardium, MergeReport,
};
use crate::processing::tagging::ElementCatalog;
use crate::staging::geo_patch::{patch_geometry_scripts, PairingStrategy};
use crate::staging::{copy_surface_inputs, copy_volumetric_input};
use crate::tetra::{PericardiumGenerator, Tetrahedralizer};

/// One model of one dataset; `template` selects the atlas template instead
/// of a shooting model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    pub dataset: u32,
    pub model: u32,
    pub template: bool,
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.template {
            write!(f, "dataset {} template", self.dataset)
        } else {
            write!(f, "dataset {} model {}", self.dataset, self.model)
        }
    }
}

/// Runs the two end-to-end workflows for a single work item.
pub struct MeshPipeline<'a> {
    pub item: WorkItem,
    pub paths: PipelinePaths,
    pub catalog: ElementCatalog,
    pub pairing: PairingStrategy,
    pub encoding: VtkEncoding,
    pub tetrahedralizer: &'a dyn Tetrahedralizer,
    pub generator: &'a dyn PericardiumGenerator,
}

impl<'a> MeshPipeline<'a> {
    pub fn new(
        config: &PipelineConfig,
        item: WorkItem,
        tetrahedralizer: &'a dyn Tetrahedralizer,
        generator: &'a dyn PericardiumGenerator,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            item,
            paths: config.paths_for(item.dataset, item.model)?,
            catalog: config.catalog()?,
            pairing: config.pairing,
            encoding: config.vtk_encoding,
            tetrahedralizer,
            generator,
        })
    }

    /// Surface meshes → tetrahedral element meshes → tagged, merged heart.
    pub fn surface_to_tetra(&self) -> anyhow::Result<MergeReport> {
        let WorkItem {
            model, template, ..
        } = self.item;
        info!("Surface to tetra: {}", self.item);

        copy_surface_inputs(&self.paths.models_dir, &self.paths.workspace, model, template)
            .context("Staging surface meshes failed")?;
        patch_geometry_scripts(&self.paths.geo_dir, &self.paths.workspace, self.pairing)
            .context("Patching geometry scripts failed")?;
        self.tetrahedralizer
            .mesh_heart()
            .context("Heart tetrahedralization failed")?;

        tag_and_merge_heart_elements(
            &self.paths.tetra_dir,
            &self.paths.output_dir,
            &self.catalog,
            model,
            template,
            self.encoding,
        )
        .with_context(|| format!("Tagging and merging heart elements for {} failed", self.item))
    }

    /// Tagged heart → generated pericardium → heart with pericardium.
    pub fn add_pericardium(&self) -> anyhow::Result<MergeReport> {
        let model = self.item.model;
        info!("Add pericardium: {}", self.item);

        let heart = copy_volumetric_input(&self.paths.models_dir, &self.paths.workspace, model)
            .context("Staging the volumetric heart failed")?;
        self.generator
            .generate(&heart)
            .context("Pericardium generation failed")?;
        self.tetrahedralizer
            .mesh_pericardium()
            .context("Pericardium tetrahedralization failed")?;

        tag_and_merge_pericardium(
            &self.paths.workspace,
            &self.paths.output_dir,
            &self.catalog,
            model,
            self.encoding,
        )
        .with_context(|| format!("Tagging and merging the pericardium for {} failed", self.item))
    }
}
