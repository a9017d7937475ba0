use log::info;
use std::collections::HashSet;
use std::path::Path;

use crate::error::MeshError;
use crate::io::{VolumeMesh, TAG_ARRAY_NAME};
use crate::utils::utils::file_name_str;

/// Canonical, ordered list of anatomical element names.
///
/// An element's tag is its 1-based position in this list, the pericardium is
/// appended after all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementCatalog {
    names: Vec<String>,
}

impl Default for ElementCatalog {
    fn default() -> Self {
        Self {
            names: ["LV", "RV", "LA", "RA"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ElementCatalog {
    pub fn new(names: Vec<String>) -> Result<Self, MeshError> {
        if names.is_empty() {
            return Err(MeshError::Config("element list is empty".into()));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() || name.contains('_') {
                return Err(MeshError::Config(format!(
                    "element name '{}' must be non-empty and contain no '_'",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(MeshError::Config(format!(
                    "element name '{}' is listed twice",
                    name
                )));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 1-based position of `name` in the catalog.
    pub fn tag_for(&self, name: &str) -> Result<u32, MeshError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32 + 1)
            .ok_or_else(|| MeshError::UnknownElement {
                name: name.to_string(),
                catalog: self.names.clone(),
            })
    }

    /// Tag for a pericardium merged into `heart`: one past the number of
    /// elements already present in the heart mesh.
    ///
    /// Elements are counted as distinct cell tags, so the heart must carry a
    /// tag array.
    pub fn pericardium_tag_for(&self, heart: &VolumeMesh) -> Result<u32, MeshError> {
        if heart.tags.is_none() {
            return Err(MeshError::InvalidMesh(format!(
                "heart mesh has no '{}' cell array",
                TAG_ARRAY_NAME
            )));
        }
        let present = heart.distinct_tags();
        let tag = present.len() as u32 + 1;
        if present.contains(&tag) {
            return Err(MeshError::TagCollision {
                name: "pericardium".into(),
                tag,
            });
        }
        Ok(tag)
    }
}

/// Element name encoded in a mesh file name: the text before the first `_`
/// (`LV_tetra.vtk` → `LV`).
pub fn element_name_from_path(path: &Path) -> Result<String, MeshError> {
    let file_name = file_name_str(path);
    let stem = file_name.split('.').next().unwrap_or_default();
    let name = stem.split('_').next().unwrap_or_default();
    if name.is_empty() {
        return Err(MeshError::InvalidMesh(format!(
            "cannot derive an element name from {}",
            path.display()
        )));
    }
    Ok(name.to_string())
}

/// Tetrahedral mesh of one anatomical element, not yet tagged.
#[derive(Debug, Clone)]
pub struct ElementMesh {
    pub name: String,
    pub mesh: VolumeMesh,
}

impl ElementMesh {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let name = element_name_from_path(path)?;
        let mesh = VolumeMesh::load(path)?;
        Ok(Self { name, mesh })
    }

    /// Tags every cell with the element's catalog position.
    pub fn tag_with(self, catalog: &ElementCatalog) -> Result<TaggedMesh, MeshError> {
        let tag = catalog.tag_for(&self.name)?;
        info!("Element name: {}, element tag: {}", self.name, tag);
        Ok(self.tag(tag))
    }

    pub fn tag(self, tag: u32) -> TaggedMesh {
        TaggedMesh {
            name: self.name,
            tag,
            mesh: self.mesh.with_tag(tag),
        }
    }
}

/// Element mesh whose cells all carry `tag`.
#[derive(Debug, Clone)]
pub struct TaggedMesh {
    pub name: String,
    pub tag: u32,
    pub mesh: VolumeMesh,
}
