use anyhow::anyhow;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

use super::{MeshPipeline, WorkItem};
use crate::config::{BatchConfig, FailurePolicy, PipelineConfig, PipelineKind};
use crate::tetra::{PericardiumGenerator, Tetrahedralizer};
use crate::utils::utils::ensure_dir;

/// Expands the batch ranges into work items, datasets outermost.
///
/// The template exists once per dataset, so template batches yield a single
/// item per dataset regardless of the model range.
pub fn work_list(batch: &BatchConfig) -> Vec<WorkItem> {
    let [d0, d1] = batch.datasets;
    let [m0, m1] = batch.models;
    let mut items = Vec::new();
    for dataset in d0..d1 {
        if batch.template {
            items.push(WorkItem {
                dataset,
                model: 0,
                template: true,
            });
            continue;
        }
        for model in m0..m1 {
            items.push(WorkItem {
                dataset,
                model,
                template: false,
            });
        }
    }
    items
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSuccess {
    pub item: WorkItem,
    pub output: PathBuf,
    pub cells: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item: WorkItem,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<ItemSuccess>,
    pub failed: Vec<ItemFailure>,
}

impl BatchReport {
    /// Errors when any work item failed.
    pub fn ensure_success(&self) -> anyhow::Result<()> {
        if self.failed.is_empty() {
            return Ok(());
        }
        let items: Vec<String> = self.failed.iter().map(|f| f.item.to_string()).collect();
        Err(anyhow!(
            "{} of {} work items failed: {}",
            self.failed.len(),
            self.failed.len() + self.succeeded.len(),
            items.join(", ")
        ))
    }
}

/// Runs every work item of `batch` in order.
///
/// With [`FailurePolicy::Abort`] the first failing item ends the batch with
/// its error; with [`FailurePolicy::Continue`] failures are recorded in the
/// report and the remaining items still run.
pub fn run_batch(
    config: &PipelineConfig,
    batch: &BatchConfig,
    tetrahedralizer: &dyn Tetrahedralizer,
    generator: &dyn PericardiumGenerator,
) -> anyhow::Result<BatchReport> {
    let items = work_list(batch);
    info!("Batch of {} work items ({:?})", items.len(), batch.pipeline);

    let mut report = BatchReport::default();
    let mut current_dataset = None;
    for item in items {
        if current_dataset != Some(item.dataset) {
            let paths = config.paths_for(item.dataset, item.model)?;
            ensure_dir(&paths.output_dir)?;
            current_dataset = Some(item.dataset);
        }

        let outcome = MeshPipeline::new(config, item, tetrahedralizer, generator).and_then(
            |pipeline| match batch.pipeline {
                PipelineKind::SurfaceToTetra => pipeline.surface_to_tetra(),
                PipelineKind::AddPericardium => pipeline.add_pericardium(),
            },
        );

        match outcome {
            Ok(merge) => report.succeeded.push(ItemSuccess {
                item,
                output: merge.output,
                cells: merge.cells,
            }),
            Err(err) => match batch.on_failure {
                FailurePolicy::Abort => {
                    return Err(err.context(format!("Batch aborted at {}", item)));
                }
                FailurePolicy::Continue => {
                    warn!("{} failed: {:#}", item, err);
                    report.failed.push(ItemFailure {
                        item,
                        error: format!("{:#}", err),
                    });
                }
            },
        }
    }

    info!(
        "Batch finished: {} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    Ok(report)
}
