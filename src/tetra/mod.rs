//! External meshing tools: the gmsh-driving shell scripts that turn staged
//! surfaces into tetrahedral element meshes, and the pericardium surface
//! generator.

use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::MeshError;

/// Produces tetrahedral meshes from the staged inputs.
///
/// `mesh_heart` writes `<main_dir>/tetra/<EL>_tetra.vtk` for every element,
/// `mesh_pericardium` writes `<workspace>/peri_tetra.vtk`.
pub trait Tetrahedralizer {
    fn mesh_heart(&self) -> anyhow::Result<()>;
    fn mesh_pericardium(&self) -> anyhow::Result<()>;
}

/// Builds the pericardium surface around a staged full-heart mesh.
pub trait PericardiumGenerator {
    fn generate(&self, heart_mesh: &Path) -> anyhow::Result<()>;
}

/// Program plus fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn heart_default() -> Self {
        Self::new("./meshing.sh", &[])
    }

    pub fn pericardium_default() -> Self {
        Self::new("./peri_meshing.sh", &[])
    }

    /// Program path as run from `dir`: relative paths with a separator are
    /// joined to `dir`, bare names are left to `PATH` lookup.
    fn resolve_program(&self, dir: &Path) -> PathBuf {
        let program = Path::new(&self.program);
        if program.is_relative() && program.components().count() > 1 {
            dir.join(program)
        } else {
            program.to_path_buf()
        }
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command to completion in `dir`, with `extra` appended to the
    /// configured arguments.
    pub fn run_in(&self, dir: &Path, extra: &[&Path]) -> Result<(), MeshError> {
        let program = self.resolve_program(dir);
        debug!("Running {} in {}", self.display(), dir.display());

        let status = Command::new(&program)
            .args(&self.args)
            .args(extra)
            .current_dir(dir)
            .status()
            .map_err(|e| MeshError::ExternalProcess {
                command: self.display(),
                reason: format!("could not start {}: {}", program.display(), e),
            })?;

        if !status.success() {
            return Err(MeshError::ExternalProcess {
                command: self.display(),
                reason: match status.code() {
                    Some(code) => format!("exited with status {}", code),
                    None => "terminated by a signal".to_string(),
                },
            });
        }
        Ok(())
    }
}

/// Runs the gmsh shell scripts synchronously from `main_dir`.
#[derive(Debug, Clone)]
pub struct ShellTetrahedralizer {
    pub main_dir: PathBuf,
    pub heart: CommandSpec,
    pub pericardium: CommandSpec,
}

impl ShellTetrahedralizer {
    pub fn new(main_dir: &Path, heart: CommandSpec, pericardium: CommandSpec) -> Self {
        Self {
            main_dir: main_dir.to_path_buf(),
            heart,
            pericardium,
        }
    }
}

impl Tetrahedralizer for ShellTetrahedralizer {
    fn mesh_heart(&self) -> anyhow::Result<()> {
        info!("Tetrahedralizing heart elements");
        self.heart.run_in(&self.main_dir, &[])?;
        Ok(())
    }

    fn mesh_pericardium(&self) -> anyhow::Result<()> {
        info!("Tetrahedralizing pericardium");
        self.pericardium.run_in(&self.main_dir, &[])?;
        Ok(())
    }
}

/// Runs an external program with the heart mesh path as last argument, from
/// the directory holding the heart mesh.
#[derive(Debug, Clone)]
pub struct CommandPericardiumGenerator {
    pub command: CommandSpec,
}

impl PericardiumGenerator for CommandPericardiumGenerator {
    fn generate(&self, heart_mesh: &Path) -> anyhow::Result<()> {
        let dir = heart_mesh
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        info!("Generating pericardium for {}", heart_mesh.display());
        self.command.run_in(dir, &[heart_mesh])?;
        Ok(())
    }
}
