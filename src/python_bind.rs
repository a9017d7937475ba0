// File: src/python_bind.rs
use pyo3::prelude::*;

use crate::processing::process_case::{ElementSummary, MergeReport};

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyElementSummary {
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub tag: u32,
    #[pyo3(get)]
    pub cells: usize,
}

#[pymethods]
impl PyElementSummary {
    fn __repr__(&self) -> String {
        format!(
            "Element(name={}, tag={}, cells={})",
            self.name, self.tag, self.cells
        )
    }
}

impl From<&ElementSummary> for PyElementSummary {
    fn from(summary: &ElementSummary) -> Self {
        Self {
            name: summary.name.clone(),
            tag: summary.tag,
            cells: summary.cells,
        }
    }
}

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyMergeReport {
    #[pyo3(get)]
    pub output: String,
    #[pyo3(get)]
    pub elements: Vec<PyElementSummary>,
    #[pyo3(get)]
    pub points: usize,
    #[pyo3(get)]
    pub cells: usize,
}

#[pymethods]
impl PyMergeReport {
    fn __repr__(&self) -> String {
        format!(
            "MergeReport(output={}, elements={}, points={}, cells={})",
            self.output,
            self.elements.len(),
            self.points,
            self.cells
        )
    }

    /// Mapping of element name to tag.
    fn tags(&self) -> Vec<(String, u32)> {
        self.elements
            .iter()
            .map(|e| (e.name.clone(), e.tag))
            .collect()
    }
}

impl From<MergeReport> for PyMergeReport {
    fn from(report: MergeReport) -> Self {
        Self {
            output: report.output.display().to_string(),
            elements: report.elements.iter().map(PyElementSummary::from).collect(),
            points: report.points,
            cells: report.cells,
        }
    }
}
