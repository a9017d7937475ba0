//! Pipeline configuration loaded from TOML.
//!
//! ```toml
//! main_dir = "/home/user/gmsh"
//! geo_dir = "/home/user/gmsh/geofiles"
//! workspace = "/home/user/gmsh/current_model"
//! models_dir = "/data/output_shooting_{dataset}/final_steps"
//! output_dir = "/data/Final_models_{dataset:02}"
//!
//! [batch]
//! datasets = [40, 41]
//! models = [0, 25]
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MeshError;
use crate::io::VtkEncoding;
use crate::processing::tagging::ElementCatalog;
use crate::staging::geo_patch::PairingStrategy;
use crate::tetra::CommandSpec;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding the meshing scripts; element meshes land in its
    /// `tetra/` subdirectory.
    pub main_dir: PathBuf,
    pub geo_dir: PathBuf,
    pub workspace: PathBuf,
    /// Path template, may use `{dataset}`, `{dataset:0N}` and `{model}`.
    pub models_dir: String,
    /// Path template, same placeholders as `models_dir`.
    pub output_dir: String,

    #[serde(default = "default_elements")]
    pub elements: Vec<String>,
    #[serde(default)]
    pub pairing: PairingStrategy,
    #[serde(default)]
    pub vtk_encoding: VtkEncoding,
    #[serde(default)]
    pub tetrahedralizer: TetrahedralizerConfig,
    #[serde(default = "default_pericardium_command")]
    pub pericardium: CommandSpec,
    pub batch: Option<BatchConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TetrahedralizerConfig {
    #[serde(default = "CommandSpec::heart_default")]
    pub heart: CommandSpec,
    #[serde(default = "CommandSpec::pericardium_default")]
    pub pericardium: CommandSpec,
}

impl Default for TetrahedralizerConfig {
    fn default() -> Self {
        Self {
            heart: CommandSpec::heart_default(),
            pericardium: CommandSpec::pericardium_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    #[default]
    SurfaceToTetra,
    AddPericardium,
}

/// What a batch does when one work item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default)]
    pub pipeline: PipelineKind,
    /// Half-open dataset range `[start, end)`.
    pub datasets: [u32; 2],
    /// Half-open model range `[start, end)`, ignored for the template.
    #[serde(default = "default_models")]
    pub models: [u32; 2],
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_elements() -> Vec<String> {
    ElementCatalog::default().names().to_vec()
}

fn default_pericardium_command() -> CommandSpec {
    CommandSpec::new("python3", &["pericardium_generation.py"])
}

fn default_models() -> [u32; 2] {
    [0, 1]
}

/// Concrete directories for one (dataset, model) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub main_dir: PathBuf,
    pub geo_dir: PathBuf,
    pub workspace: PathBuf,
    pub tetra_dir: PathBuf,
    pub models_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, MeshError> {
        let text = fs::read_to_string(path).map_err(|e| MeshError::io(path, e))?;
        Self::from_toml_str(&text)
            .map_err(|e| MeshError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, MeshError> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| MeshError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        self.catalog()?;
        // bad placeholders fail here, before any work item runs
        expand_template(&self.models_dir, 0, 0)?;
        expand_template(&self.output_dir, 0, 0)?;
        if let Some(batch) = &self.batch {
            let ranges = [("datasets", batch.datasets), ("models", batch.models)];
            for (label, [start, end]) in ranges {
                if start > end {
                    return Err(MeshError::Config(format!(
                        "batch {} range [{}, {}) is reversed",
                        label, start, end
                    )));
                }
            }
            // the pericardium is added per shooting model, never to the template
            if batch.template && batch.pipeline == PipelineKind::AddPericardium {
                return Err(MeshError::Config(
                    "batch template = true only applies to the surface-to-tetra pipeline"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<ElementCatalog, MeshError> {
        ElementCatalog::new(self.elements.clone())
    }

    pub fn paths_for(&self, dataset: u32, model: u32) -> Result<PipelinePaths, MeshError> {
        Ok(PipelinePaths {
            main_dir: self.main_dir.clone(),
            geo_dir: self.geo_dir.clone(),
            workspace: self.workspace.clone(),
            tetra_dir: self.main_dir.join("tetra"),
            models_dir: PathBuf::from(expand_template(&self.models_dir, dataset, model)?),
            output_dir: PathBuf::from(expand_template(&self.output_dir, dataset, model)?),
        })
    }
}

/// Substitutes `{dataset}`, `{dataset:0N}`, `{model}` and `{model:0N}`.
pub fn expand_template(template: &str, dataset: u32, model: u32) -> Result<String, MeshError> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            MeshError::Config(format!("unclosed placeholder in '{}'", template))
        })?;
        let placeholder = &after[..close];
        let (name, format) = match placeholder.split_once(':') {
            Some((name, format)) => (name, Some(format)),
            None => (placeholder, None),
        };
        let value = match name {
            "dataset" => dataset,
            "model" => model,
            _ => {
                return Err(MeshError::Config(format!(
                    "unknown placeholder '{{{}}}' in '{}'",
                    placeholder, template
                )))
            }
        };
        match format {
            None => out.push_str(&value.to_string()),
            Some(spec) => {
                let width = spec
                    .strip_prefix('0')
                    .and_then(|w| w.parse::<usize>().ok())
                    .ok_or_else(|| {
                        MeshError::Config(format!(
                            "unsupported format '{}' in '{}', expected 0N",
                            spec, template
                        ))
                    })?;
                out.push_str(&format!("{:0width$}", value, width = width));
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        main_dir = "/home/user/gmsh"
        geo_dir = "/home/user/gmsh/geofiles"
        workspace = "/home/user/gmsh/current_model"
        models_dir = "/data/output_shooting_{dataset}/final_steps"
        output_dir = "/data/Final_models_{dataset:02}"
    "#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.elements, vec!["LV", "RV", "LA", "RA"]);
        assert_eq!(config.pairing, PairingStrategy::ByName);
        assert_eq!(config.vtk_encoding, VtkEncoding::Ascii);
        assert_eq!(config.tetrahedralizer.heart.program, "./meshing.sh");
        assert_eq!(config.tetrahedralizer.pericardium.program, "./peri_meshing.sh");
        assert_eq!(config.pericardium.program, "python3");
        assert!(config.batch.is_none());
    }

    #[test]
    fn test_full_config() {
        let text = format!(
            "{}{}",
            MINIMAL,
            r#"
            elements = ["LV", "RV"]
            pairing = "sorted-order"
            vtk_encoding = "binary"

            [tetrahedralizer.heart]
            program = "./mesh_all.sh"
            args = ["--fine"]

            [pericardium]
            program = "peri-gen"

            [batch]
            pipeline = "add-pericardium"
            datasets = [40, 42]
            models = [0, 25]
            on_failure = "continue"
            "#
        );
        let config = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.pairing, PairingStrategy::SortedOrder);
        assert_eq!(config.vtk_encoding, VtkEncoding::Binary);
        assert_eq!(config.tetrahedralizer.heart.args, vec!["--fine"]);
        assert_eq!(config.tetrahedralizer.pericardium.program, "./peri_meshing.sh");
        assert!(config.pericardium.args.is_empty());

        let batch = config.batch.unwrap();
        assert_eq!(batch.pipeline, PipelineKind::AddPericardium);
        assert_eq!(batch.datasets, [40, 42]);
        assert_eq!(batch.on_failure, FailurePolicy::Continue);
        assert!(!batch.template);
    }

    #[test]
    fn test_paths_for_expands_templates() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        let paths = config.paths_for(7, 3).unwrap();
        assert_eq!(paths.models_dir, PathBuf::from("/data/output_shooting_7/final_steps"));
        assert_eq!(paths.output_dir, PathBuf::from("/data/Final_models_07"));
        assert_eq!(paths.tetra_dir, PathBuf::from("/home/user/gmsh/tetra"));
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(expand_template("a_{dataset:03}_{model}", 5, 12).unwrap(), "a_005_12");
        assert_eq!(expand_template("{dataset:02}", 123, 0).unwrap(), "123");
        assert_eq!(expand_template("plain", 1, 1).unwrap(), "plain");
        assert!(expand_template("{case}", 1, 1).is_err());
        assert!(expand_template("{dataset", 1, 1).is_err());
        assert!(expand_template("{dataset:>3}", 1, 1).is_err());
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let bad_elements = format!("{}elements = [\"L_V\"]\n", MINIMAL);
        assert!(PipelineConfig::from_toml_str(&bad_elements).is_err());

        let reversed = format!("{}[batch]\ndatasets = [5, 2]\n", MINIMAL);
        assert!(PipelineConfig::from_toml_str(&reversed).is_err());

        let unknown = format!("{}colour = \"red\"\n", MINIMAL);
        assert!(PipelineConfig::from_toml_str(&unknown).is_err());

        assert!(PipelineConfig::from_toml_str("main_dir = \"/x\"").is_err());
    }

    #[test]
    fn test_template_batch_of_add_pericardium_is_rejected() {
        let text = format!(
            "{}[batch]\npipeline = \"add-pericardium\"\ndatasets = [1, 2]\n\
             models = [0, 3]\ntemplate = true\n",
            MINIMAL
        );
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("surface-to-tetra"));

        let untemplated = text.replace("template = true", "template = false");
        assert!(PipelineConfig::from_toml_str(&untemplated).is_ok());
    }

    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "main_dir = 3").unwrap();
        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("pipeline.toml"));
    }
}
