use std::fs::File;
use std::fmt::Display;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{VolumeMesh, VtkEncoding, TAG_ARRAY_NAME};
use crate::error::MeshError;

/// Writes a legacy VTK 4.2 unstructured grid, tags as an `int` cell scalar.
pub fn write_vtk(mesh: &VolumeMesh, path: &Path, encoding: VtkEncoding) -> anyhow::Result<()> {
    mesh.validate()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| MeshError::io(parent, e))?;
        }
    }

    let file = File::create(path).map_err(|e| MeshError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_vtk_to(mesh, &mut writer, encoding).map_err(|e| MeshError::io(path, e))?;
    writer.flush().map_err(|e| MeshError::io(path, e))?;
    Ok(())
}

pub fn write_vtk_to<W: Write>(
    mesh: &VolumeMesh,
    w: &mut W,
    encoding: VtkEncoding,
) -> io::Result<()> {
    let binary = encoding == VtkEncoding::Binary;
    if let Some(tags) = &mesh.tags {
        for &t in tags {
            vtk_int(t, "tag")?;
        }
    }

    writeln!(w, "# vtk DataFile Version 4.2")?;
    writeln!(w, "cardiomesh volumetric mesh")?;
    writeln!(w, "{}", if binary { "BINARY" } else { "ASCII" })?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;

    writeln!(w, "POINTS {} double", mesh.points.len())?;
    if binary {
        for p in &mesh.points {
            for c in [p.x, p.y, p.z] {
                w.write_all(&c.to_be_bytes())?;
            }
        }
        writeln!(w)?;
    } else {
        for p in &mesh.points {
            writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
        }
    }

    let size: usize = mesh.cells.iter().map(|c| c.nodes.len() + 1).sum();
    writeln!(w, "CELLS {} {}", mesh.cells.len(), size)?;
    if binary {
        for cell in &mesh.cells {
            w.write_all(&vtk_int(cell.nodes.len(), "cell size")?.to_be_bytes())?;
            for &n in &cell.nodes {
                w.write_all(&vtk_int(n, "point index")?.to_be_bytes())?;
            }
        }
        writeln!(w)?;
    } else {
        for cell in &mesh.cells {
            let ids: Vec<String> = cell.nodes.iter().map(|n| n.to_string()).collect();
            writeln!(w, "{} {}", cell.nodes.len(), ids.join(" "))?;
        }
    }

    writeln!(w, "CELL_TYPES {}", mesh.cells.len())?;
    if binary {
        for cell in &mesh.cells {
            w.write_all(&cell.kind.vtk_id().to_be_bytes())?;
        }
        writeln!(w)?;
    } else {
        for cell in &mesh.cells {
            writeln!(w, "{}", cell.kind.vtk_id())?;
        }
    }

    if let Some(tags) = &mesh.tags {
        writeln!(w, "CELL_DATA {}", tags.len())?;
        writeln!(w, "SCALARS {} int 1", TAG_ARRAY_NAME)?;
        writeln!(w, "LOOKUP_TABLE default")?;
        if binary {
            for &t in tags {
                w.write_all(&vtk_int(t, "tag")?.to_be_bytes())?;
            }
            writeln!(w)?;
        } else {
            for t in tags {
                writeln!(w, "{}", t)?;
            }
        }
    }

    Ok(())
}

/// Connectivity and tags are declared as 32-bit `int` in the file.
fn vtk_int<T>(value: T, what: &str) -> io::Result<i32>
where
    T: Copy + Display,
    i32: TryFrom<T>,
{
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} {} does not fit a VTK int", what, value),
        )
    })
}
