pub mod config;
pub mod entry;
pub mod error;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod processing;
pub mod staging;
pub mod tetra;
mod utils;

#[cfg(feature = "python")]
mod python_bind;

pub use error::MeshError;
pub use io::{VolumeMesh, VtkEncoding};

#[cfg(feature = "python")]
use pyo3::{exceptions::PyRuntimeError, prelude::*, wrap_pyfunction};
#[cfg(feature = "python")]
use python_bind::{PyElementSummary, PyMergeReport};
#[cfg(feature = "python")]
use std::path::Path;

#[cfg(feature = "python")]
fn to_py_err(e: anyhow::Error) -> PyErr {
    PyRuntimeError::new_err(format!("{:#}", e))
}

/// Stages one model's surfaces, tetrahedralizes them with the configured
/// scripts and writes the tagged, merged heart.
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (config_path, dataset, model = 0u32, template = false))]
fn surface_to_tetra_py(
    config_path: &str,
    dataset: u32,
    model: u32,
    template: bool,
) -> PyResult<PyMergeReport> {
    entry::run_surface_to_tetra(Path::new(config_path), dataset, model, template)
        .map(PyMergeReport::from)
        .map_err(to_py_err)
}

#[cfg(feature = "python")]
#[pyfunction]
fn add_pericardium_py(config_path: &str, dataset: u32, model: u32) -> PyResult<PyMergeReport> {
    entry::run_add_pericardium(Path::new(config_path), dataset, model)
        .map(PyMergeReport::from)
        .map_err(to_py_err)
}

/// Runs the `[batch]` section and returns the report as JSON. Raises when any
/// work item failed.
#[cfg(feature = "python")]
#[pyfunction]
fn run_batch_py(config_path: &str) -> PyResult<String> {
    let report = entry::run_batch_from_file(Path::new(config_path)).map_err(to_py_err)?;
    report.ensure_success().map_err(to_py_err)?;
    serde_json::to_string(&report).map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (
    tetra_dir,
    output_dir,
    model = 0u32,
    template = false,
    elements = None,
    binary = false
))]
fn tag_and_merge_py(
    tetra_dir: &str,
    output_dir: &str,
    model: u32,
    template: bool,
    elements: Option<Vec<String>>,
    binary: bool,
) -> PyResult<PyMergeReport> {
    let encoding = if binary {
        VtkEncoding::Binary
    } else {
        VtkEncoding::Ascii
    };
    entry::run_tag_and_merge(
        Path::new(tetra_dir),
        Path::new(output_dir),
        elements,
        model,
        template,
        encoding,
    )
    .map(PyMergeReport::from)
    .map_err(to_py_err)
}

/// This is the module importable from Python:
///
/// ```python
/// import cardiomesh as cm
/// report = cm.surface_to_tetra_py("pipeline.toml", 40, model=7)
/// print(report.tags())
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn cardiomesh(m: &Bound<'_, PyModule>) -> PyResult<()> {
    logging::init_logging(None);
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(surface_to_tetra_py, m)?)?;
    m.add_function(wrap_pyfunction!(add_pericardium_py, m)?)?;
    m.add_function(wrap_pyfunction!(run_batch_py, m)?)?;
    m.add_function(wrap_pyfunction!(tag_and_merge_py, m)?)?;

    m.add_class::<PyElementSummary>()?;
    m.add_class::<PyMergeReport>()?;
    Ok(())
}
