//! Error types shared by the staging, meshing and merging stages.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by cardiomesh operations.
///
/// Public functions return `anyhow::Result` and attach context on the way up,
/// these variants stay reachable through `downcast_ref`.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A legacy VTK file could not be parsed.
    #[error("VTK parse error at line {line}: {message}")]
    Vtk { line: usize, message: String },

    /// An element name does not appear in the canonical element list.
    #[error("element '{name}' is not in the canonical element list {catalog:?}")]
    UnknownElement { name: String, catalog: Vec<String> },

    /// A tag would be assigned twice within one merge.
    #[error("tag {tag} for '{name}' is already used by the target mesh")]
    TagCollision { name: String, tag: u32 },

    /// Geometry scripts and staged files could not be paired.
    #[error("cannot pair geometry scripts with staged files: {0}")]
    Pairing(String),

    /// A geometry script has no second line to rewrite.
    #[error("geometry script {0} has fewer than two lines")]
    MalformedScript(PathBuf),

    /// Input selection matched nothing.
    #[error("no input files in {dir} match '{pattern}'")]
    NoInputs { dir: PathBuf, pattern: String },

    /// The external meshing process could not run or exited abnormally.
    #[error("external process '{command}' failed: {reason}")]
    ExternalProcess { command: String, reason: String },

    /// Mesh data violates a structural invariant.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MeshError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn vtk(line: usize, message: impl Into<String>) -> Self {
        MeshError::Vtk {
            line,
            message: message.into(),
        }
    }
}
