use log::debug;
use nalgebra::Point3;
use std::fs;
use std::path::Path;

use super::{Cell, CellType, VolumeMesh, TAG_ARRAY_NAME};
use crate::error::MeshError;

/// Reads a legacy VTK unstructured grid from disk.
///
/// Both ASCII and BINARY encodings are accepted, with either the classic
/// `CELLS n size` layout or the 5.x `OFFSETS`/`CONNECTIVITY` layout. Only the
/// cell array named [`TAG_ARRAY_NAME`] is kept, every other attribute array is
/// parsed and dropped.
pub fn read_vtk(path: &Path) -> anyhow::Result<VolumeMesh> {
    let bytes = fs::read(path).map_err(|e| MeshError::io(path, e))?;
    let mesh = parse_vtk(&bytes)?;
    mesh.validate()?;
    debug!(
        "Read {}: {} points, {} cells",
        path.display(),
        mesh.point_count(),
        mesh.cell_count()
    );
    Ok(mesh)
}

pub fn parse_vtk(bytes: &[u8]) -> Result<VolumeMesh, MeshError> {
    let mut cur = Cursor::new(bytes);

    let version_line = cur
        .read_line()?
        .ok_or_else(|| MeshError::vtk(1, "empty file"))?;
    let major_version = parse_major_version(version_line)
        .ok_or_else(|| MeshError::vtk(1, format!("not a legacy VTK header: '{}'", version_line)))?;
    // title line, free text
    cur.read_line()?
        .ok_or_else(|| MeshError::vtk(2, "missing title line"))?;

    let (line, encoding) = cur
        .next_keyword_line()?
        .ok_or_else(|| MeshError::vtk(3, "missing ASCII/BINARY line"))?;
    let binary = match encoding.to_ascii_uppercase().as_str() {
        "ASCII" => false,
        "BINARY" => true,
        other => return Err(MeshError::vtk(line, format!("unknown encoding '{}'", other))),
    };

    let (line, dataset) = cur
        .next_keyword_line()?
        .ok_or_else(|| MeshError::vtk(4, "missing DATASET line"))?;
    let mut parts = dataset.split_whitespace();
    if !parts.next().is_some_and(|k| k.eq_ignore_ascii_case("DATASET")) {
        return Err(MeshError::vtk(line, format!("expected DATASET, found '{}'", dataset)));
    }
    match parts.next() {
        Some(kind) if kind.eq_ignore_ascii_case("UNSTRUCTURED_GRID") => {}
        Some(kind) => {
            return Err(MeshError::vtk(
                line,
                format!("unsupported dataset '{}', expected UNSTRUCTURED_GRID", kind),
            ))
        }
        None => return Err(MeshError::vtk(line, "DATASET without a type")),
    }

    let mut points: Option<Vec<Point3<f64>>> = None;
    let mut connectivity: Option<Vec<Vec<usize>>> = None;
    let mut cell_types: Option<Vec<CellType>> = None;
    let mut tags: Option<Vec<u32>> = None;

    while let Some((line, header)) = cur.next_keyword_line()? {
        let fields: Vec<&str> = header.split_whitespace().collect();
        match fields[0].to_ascii_uppercase().as_str() {
            "POINTS" => {
                let n = parse_count(&fields, 1, line)?;
                let dtype = DataType::parse(field(&fields, 2, line)?, line)?;
                let values = read_values(&mut cur, dtype, checked_count(n, 3, line)?, binary)?;
                points = Some(
                    values
                        .chunks_exact(3)
                        .map(|c| Point3::new(c[0], c[1], c[2]))
                        .collect(),
                );
            }
            "CELLS" => {
                let nodes = if major_version >= 5 {
                    read_cells_offsets(&mut cur, &fields, line, binary)?
                } else {
                    read_cells_classic(&mut cur, &fields, line, binary)?
                };
                connectivity = Some(nodes);
            }
            "CELL_TYPES" => {
                let n = parse_count(&fields, 1, line)?;
                let values = read_values(&mut cur, DataType::Int, n, binary)?;
                let mut kinds = Vec::with_capacity(n);
                for v in values {
                    let kind = CellType::from_vtk_id(v as i64).ok_or_else(|| {
                        MeshError::vtk(line, format!("unsupported cell type {}", v))
                    })?;
                    kinds.push(kind);
                }
                cell_types = Some(kinds);
            }
            "CELL_DATA" => {
                let n = parse_count(&fields, 1, line)?;
                if let Some(raw) = read_attributes(&mut cur, n, binary)? {
                    tags = Some(to_tags(&raw, line)?);
                }
            }
            "POINT_DATA" => {
                let n = parse_count(&fields, 1, line)?;
                read_attributes(&mut cur, n, binary)?;
            }
            "FIELD" => {
                read_field(&mut cur, &fields, line, binary)?;
            }
            "METADATA" => skip_metadata(&mut cur)?,
            other => {
                return Err(MeshError::vtk(line, format!("unexpected section '{}'", other)));
            }
        }
    }

    let points = points.ok_or_else(|| MeshError::vtk(cur.line, "file has no POINTS section"))?;
    let connectivity = connectivity.unwrap_or_default();
    let cell_types = cell_types.unwrap_or_default();
    if connectivity.len() != cell_types.len() {
        return Err(MeshError::vtk(
            cur.line,
            format!(
                "{} cells but {} cell types",
                connectivity.len(),
                cell_types.len()
            ),
        ));
    }
    if let Some(t) = &tags {
        if t.len() != connectivity.len() {
            return Err(MeshError::vtk(
                cur.line,
                format!("{} cell tags for {} cells", t.len(), connectivity.len()),
            ));
        }
    }

    let cells = cell_types
        .into_iter()
        .zip(connectivity)
        .map(|(kind, nodes)| Cell::new(kind, nodes))
        .collect();

    Ok(VolumeMesh {
        points,
        cells,
        tags,
    })
}

fn parse_major_version(line: &str) -> Option<u32> {
    let rest = line.trim().strip_prefix('#')?.trim();
    let mut words = rest.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("vtk") {
        return None;
    }
    let version = words.last()?;
    version.split('.').next()?.parse().ok()
}

fn field<'a>(fields: &[&'a str], index: usize, line: usize) -> Result<&'a str, MeshError> {
    fields.get(index).copied().ok_or_else(|| {
        MeshError::vtk(
            line,
            format!("'{}' is missing field {}", fields.join(" "), index),
        )
    })
}

fn parse_count(fields: &[&str], index: usize, line: usize) -> Result<usize, MeshError> {
    let raw = field(fields, index, line)?;
    raw.parse()
        .map_err(|_| MeshError::vtk(line, format!("expected a count, found '{}'", raw)))
}

/// Value count of a block of `n` entities with `width` values each.
fn checked_count(n: usize, width: usize, line: usize) -> Result<usize, MeshError> {
    n.checked_mul(width)
        .ok_or_else(|| MeshError::vtk(line, format!("{} x {} values overflows", n, width)))
}

/// Classic layout: `CELLS n size` followed by `npts id0 id1 ...` per cell.
fn read_cells_classic(
    cur: &mut Cursor,
    fields: &[&str],
    line: usize,
    binary: bool,
) -> Result<Vec<Vec<usize>>, MeshError> {
    let n = parse_count(fields, 1, line)?;
    let size = parse_count(fields, 2, line)?;
    let values = read_values(cur, DataType::Int, size, binary)?;

    // every cell takes at least its point count
    let mut cells = Vec::with_capacity(n.min(values.len()));
    let mut i = 0;
    for _ in 0..n {
        let npts = to_index(*values.get(i).ok_or_else(|| {
            MeshError::vtk(line, "CELLS list is shorter than its declared cell count")
        })?, line)?;
        let ids = npts
            .checked_add(i + 1)
            .and_then(|end| values.get(i + 1..end))
            .ok_or_else(|| MeshError::vtk(line, "CELLS list ends in the middle of a cell"))?;
        cells.push(
            ids.iter()
                .map(|&v| to_index(v, line))
                .collect::<Result<Vec<_>, _>>()?,
        );
        i += 1 + npts;
    }
    if i != size {
        return Err(MeshError::vtk(
            line,
            format!("CELLS declares {} values but cells use {}", size, i),
        ));
    }
    Ok(cells)
}

/// 5.x layout: `CELLS n_offsets n_conn`, then `OFFSETS` and `CONNECTIVITY` arrays.
fn read_cells_offsets(
    cur: &mut Cursor,
    fields: &[&str],
    line: usize,
    binary: bool,
) -> Result<Vec<Vec<usize>>, MeshError> {
    let n_offsets = parse_count(fields, 1, line)?;
    let n_conn = parse_count(fields, 2, line)?;

    let offsets = read_named_array(cur, "OFFSETS", n_offsets, binary)?;
    let conn = read_named_array(cur, "CONNECTIVITY", n_conn, binary)?;

    let offsets = offsets
        .into_iter()
        .map(|v| to_index(v, line))
        .collect::<Result<Vec<_>, _>>()?;
    let conn = conn
        .into_iter()
        .map(|v| to_index(v, line))
        .collect::<Result<Vec<_>, _>>()?;

    let mut cells = Vec::with_capacity(n_offsets.saturating_sub(1));
    for window in offsets.windows(2) {
        let (start, end) = (window[0], window[1]);
        if start > end || end > conn.len() {
            return Err(MeshError::vtk(
                line,
                format!("invalid cell offsets {}..{}", start, end),
            ));
        }
        cells.push(conn[start..end].to_vec());
    }
    Ok(cells)
}

fn read_named_array(
    cur: &mut Cursor,
    keyword: &str,
    count: usize,
    binary: bool,
) -> Result<Vec<f64>, MeshError> {
    let (line, header) = cur
        .next_keyword_line()?
        .ok_or_else(|| MeshError::vtk(cur.line, format!("missing {} array", keyword)))?;
    let fields: Vec<&str> = header.split_whitespace().collect();
    if !fields[0].eq_ignore_ascii_case(keyword) {
        return Err(MeshError::vtk(
            line,
            format!("expected {}, found '{}'", keyword, header),
        ));
    }
    let dtype = DataType::parse(field(&fields, 1, line)?, line)?;
    read_values(cur, dtype, count, binary)
}

/// Reads a block of attribute arrays for `n` entities.
///
/// Returns the values of the tag array if one is present.
fn read_attributes(
    cur: &mut Cursor,
    n: usize,
    binary: bool,
) -> Result<Option<Vec<f64>>, MeshError> {
    let mut found = None;

    while let Some((_, header)) = cur.peek_keyword_line()? {
        let keyword = header
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if keyword == "POINT_DATA" || keyword == "CELL_DATA" {
            break;
        }

        let (line, header) = match cur.next_keyword_line()? {
            Some(entry) => entry,
            None => break,
        };
        let fields: Vec<&str> = header.split_whitespace().collect();

        match keyword.as_str() {
            "SCALARS" => {
                let name = field(&fields, 1, line)?;
                let dtype = DataType::parse(field(&fields, 2, line)?, line)?;
                let ncomp = match fields.get(3) {
                    Some(raw) => raw.parse().map_err(|_| {
                        MeshError::vtk(line, format!("bad component count '{}'", raw))
                    })?,
                    None => 1,
                };
                if let Some((_, next)) = cur.peek_keyword_line()? {
                    if next
                        .split_whitespace()
                        .next()
                        .is_some_and(|k| k.eq_ignore_ascii_case("LOOKUP_TABLE"))
                    {
                        cur.next_keyword_line()?;
                    }
                }
                let values = read_values(cur, dtype, checked_count(n, ncomp, line)?, binary)?;
                if name == TAG_ARRAY_NAME && ncomp == 1 {
                    found = Some(values);
                } else {
                    debug!("Dropping scalar array '{}'", name);
                }
            }
            "FIELD" => {
                if let Some(values) = read_field(cur, &fields, line, binary)? {
                    if values.len() == n {
                        found = Some(values);
                    }
                }
            }
            "VECTORS" | "NORMALS" => {
                let dtype = DataType::parse(field(&fields, 2, line)?, line)?;
                read_values(cur, dtype, checked_count(n, 3, line)?, binary)?;
            }
            "TENSORS" => {
                let dtype = DataType::parse(field(&fields, 2, line)?, line)?;
                read_values(cur, dtype, checked_count(n, 9, line)?, binary)?;
            }
            "TEXTURE_COORDINATES" => {
                let dim = parse_count(&fields, 2, line)?;
                let dtype = DataType::parse(field(&fields, 3, line)?, line)?;
                read_values(cur, dtype, checked_count(n, dim, line)?, binary)?;
            }
            "COLOR_SCALARS" => {
                let ncomp = parse_count(&fields, 2, line)?;
                let dtype = if binary {
                    DataType::UChar
                } else {
                    DataType::Float
                };
                read_values(cur, dtype, checked_count(n, ncomp, line)?, binary)?;
            }
            "LOOKUP_TABLE" => {
                let size = parse_count(&fields, 2, line)?;
                let dtype = if binary {
                    DataType::UChar
                } else {
                    DataType::Float
                };
                read_values(cur, dtype, checked_count(size, 4, line)?, binary)?;
            }
            "METADATA" => skip_metadata(cur)?,
            other => {
                return Err(MeshError::vtk(
                    line,
                    format!("unsupported attribute '{}'", other),
                ))
            }
        }
    }

    Ok(found)
}

/// Reads a `FIELD name k` block, returning the tag array if it is one of them.
fn read_field(
    cur: &mut Cursor,
    fields: &[&str],
    line: usize,
    binary: bool,
) -> Result<Option<Vec<f64>>, MeshError> {
    let n_arrays = parse_count(fields, 2, line)?;
    let mut found = None;

    for _ in 0..n_arrays {
        let (line, header) = cur
            .next_keyword_line()?
            .ok_or_else(|| MeshError::vtk(cur.line, "FIELD ends before all arrays were read"))?;
        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts[0] == "NULL_ARRAY" {
            continue;
        }
        let ncomp = parse_count(&parts, 1, line)?;
        let ntuples = parse_count(&parts, 2, line)?;
        let dtype = DataType::parse(field(&parts, 3, line)?, line)?;
        let count = checked_count(ncomp, ntuples, line)?;
        let values = read_values(cur, dtype, count, binary)?;

        if let Some((_, next)) = cur.peek_keyword_line()? {
            if next.eq_ignore_ascii_case("METADATA") {
                cur.next_keyword_line()?;
                skip_metadata(cur)?;
            }
        }

        if parts[0] == TAG_ARRAY_NAME && ncomp == 1 {
            found = Some(values);
        } else {
            debug!("Dropping field array '{}'", parts[0]);
        }
    }
    Ok(found)
}

/// METADATA blocks run until the next blank line.
fn skip_metadata(cur: &mut Cursor) -> Result<(), MeshError> {
    while let Some(line) = cur.read_line()? {
        if line.trim().is_empty() {
            break;
        }
    }
    Ok(())
}

fn read_values(
    cur: &mut Cursor,
    dtype: DataType,
    count: usize,
    binary: bool,
) -> Result<Vec<f64>, MeshError> {
    if binary {
        let size = dtype.size();
        let bytes = cur.take_bytes(checked_count(count, size, cur.line)?)?;
        return Ok(bytes
            .chunks_exact(size)
            .map(|chunk| dtype.decode_be(chunk))
            .collect());
    }

    // an ASCII value takes at least one byte
    let mut values = Vec::with_capacity(count.min(cur.remaining()));
    for _ in 0..count {
        let line = cur.line;
        let token = cur.next_token()?;
        let value: f64 = token
            .parse()
            .map_err(|_| MeshError::vtk(line, format!("expected a number, found '{}'", token)))?;
        values.push(value);
    }
    Ok(values)
}

fn to_index(value: f64, line: usize) -> Result<usize, MeshError> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(MeshError::vtk(line, format!("invalid index {}", value)));
    }
    Ok(value as usize)
}

fn to_tags(values: &[f64], line: usize) -> Result<Vec<u32>, MeshError> {
    values
        .iter()
        .map(|&v| {
            if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
                Err(MeshError::vtk(line, format!("invalid tag value {}", v)))
            } else {
                Ok(v as u32)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
}

impl DataType {
    fn parse(name: &str, line: usize) -> Result<Self, MeshError> {
        let dtype = match name.to_ascii_lowercase().as_str() {
            "char" | "vtktypeint8" => DataType::Char,
            "unsigned_char" | "vtktypeuint8" => DataType::UChar,
            "short" | "vtktypeint16" => DataType::Short,
            "unsigned_short" | "vtktypeuint16" => DataType::UShort,
            "int" | "vtktypeint32" => DataType::Int,
            "unsigned_int" | "vtktypeuint32" => DataType::UInt,
            "long" | "vtktypeint64" | "vtkidtype" => DataType::Long,
            "unsigned_long" | "vtktypeuint64" => DataType::ULong,
            "float" | "vtktypefloat32" => DataType::Float,
            "double" | "vtktypefloat64" => DataType::Double,
            other => {
                return Err(MeshError::vtk(
                    line,
                    format!("unsupported data type '{}'", other),
                ))
            }
        };
        Ok(dtype)
    }

    fn size(&self) -> usize {
        match self {
            DataType::Char | DataType::UChar => 1,
            DataType::Short | DataType::UShort => 2,
            DataType::Int | DataType::UInt | DataType::Float => 4,
            DataType::Long | DataType::ULong | DataType::Double => 8,
        }
    }

    /// Legacy VTK binary data is big-endian.
    fn decode_be(&self, b: &[u8]) -> f64 {
        match self {
            DataType::Char => b[0] as i8 as f64,
            DataType::UChar => b[0] as f64,
            DataType::Short => i16::from_be_bytes([b[0], b[1]]) as f64,
            DataType::UShort => u16::from_be_bytes([b[0], b[1]]) as f64,
            DataType::Int => i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
            DataType::UInt => u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
            DataType::Float => f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
            DataType::Long => {
                i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64
            }
            DataType::ULong => {
                u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64
            }
            DataType::Double => {
                f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
        }
    }
}

/// Byte cursor mixing line-oriented headers with token or raw binary payloads.
#[derive(Clone)]
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            line: 1,
        }
    }

    fn read_line(&mut self) -> Result<Option<&'a str>, MeshError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let line_no = self.line;
        let start = self.pos;
        let newline = self.data[start..].iter().position(|&b| b == b'\n');
        let end = match newline {
            Some(offset) => {
                self.pos = start + offset + 1;
                self.line += 1;
                start + offset
            }
            None => {
                self.pos = self.data.len();
                self.data.len()
            }
        };
        let raw = &self.data[start..end];
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        std::str::from_utf8(raw)
            .map(Some)
            .map_err(|_| MeshError::vtk(line_no, "expected a text line"))
    }

    /// Next non-blank line, trimmed, with its line number.
    fn next_keyword_line(&mut self) -> Result<Option<(usize, &'a str)>, MeshError> {
        loop {
            let line_no = self.line;
            match self.read_line()? {
                None => return Ok(None),
                Some(text) if text.trim().is_empty() => continue,
                Some(text) => return Ok(Some((line_no, text.trim()))),
            }
        }
    }

    fn peek_keyword_line(&self) -> Result<Option<(usize, &'a str)>, MeshError> {
        self.clone().next_keyword_line()
    }

    fn next_token(&mut self) -> Result<&'a str, MeshError> {
        while self.pos < self.data.len() && self.data[self.pos].is_ascii_whitespace() {
            if self.data[self.pos] == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
        if self.pos >= self.data.len() {
            return Err(MeshError::vtk(self.line, "unexpected end of file"));
        }
        let start = self.pos;
        while self.pos < self.data.len() && !self.data[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| MeshError::vtk(self.line, "expected a text token"))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take_bytes(&mut self, n: usize) -> Result<&'a [u8], MeshError> {
        if n > self.remaining() {
            return Err(MeshError::vtk(
                self.line,
                format!(
                    "binary block needs {} bytes but only {} remain",
                    n,
                    self.remaining()
                ),
            ));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}
