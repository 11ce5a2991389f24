// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! SWC text format
//!
//! Input rows are seven whitespace-separated columns
//! `id type x y z radius parent`; lines starting with `#` are comments.
//! Ids may be zero- or one-based, detected from the first data row.
//!
//! Output keeps the same columns under a `#id type x y z r parent` header,
//! with real columns printed to six decimals and `-1` as the root parent.

use crate::error::{MorphologyError, Result};
use crate::point::{CompartmentId, CompartmentPoint, Position, SectionType};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Header line of canonical skeleton files
pub const SWC_HEADER: &str = "#id type x y z r parent";

const COLUMNS: usize = 7;

/// Parse SWC text into points, normalising ids to zero-based.
///
/// When the first data row has id 1 every id and every positive parent is
/// shifted down by one and non-positive parents mark the root. Otherwise any
/// negative parent marks the root.
pub fn parse_swc(text: &str) -> Result<Vec<CompartmentPoint>> {
    let mut points = Vec::new();
    let mut one_based: Option<bool> = None;

    for (index, line) in text.lines().enumerate() {
        let line_num = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != COLUMNS {
            return Err(MorphologyError::Format {
                line: line_num,
                reason: format!("expected {} columns, found {}", COLUMNS, fields.len()),
            });
        }

        let raw_id: i64 = parse_field(fields[0], "id", line_num)?;
        let type_code: i32 = parse_field(fields[1], "type", line_num)?;
        let x: f64 = parse_field(fields[2], "x", line_num)?;
        let y: f64 = parse_field(fields[3], "y", line_num)?;
        let z: f64 = parse_field(fields[4], "z", line_num)?;
        let radius: f64 = parse_field(fields[5], "radius", line_num)?;
        let raw_parent: i64 = parse_field(fields[6], "parent", line_num)?;

        if let Some((name, value)) = [("x", x), ("y", y), ("z", z)]
            .into_iter()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(MorphologyError::Format {
                line: line_num,
                reason: format!("{} must be a finite number, found {}", name, value),
            });
        }
        if !radius.is_finite() || radius < 0.0 {
            return Err(MorphologyError::Format {
                line: line_num,
                reason: format!("radius must be a non-negative number, found {}", fields[5]),
            });
        }

        let one_based = *one_based.get_or_insert(raw_id == 1);
        let (id, parent) = if one_based {
            let parent = if raw_parent > 0 { Some(raw_parent - 1) } else { None };
            (raw_id - 1, parent)
        } else {
            let parent = if raw_parent >= 0 { Some(raw_parent) } else { None };
            (raw_id, parent)
        };

        points.push(CompartmentPoint {
            id: to_compartment_id(id, "id", line_num)?,
            section: SectionType::from_code(type_code),
            position: Position::new(x, y, z),
            radius,
            parent: parent
                .map(|p| to_compartment_id(p, "parent", line_num))
                .transpose()?,
        });
    }

    Ok(points)
}

/// Read and parse an SWC file
pub fn read_swc(path: &Path) -> Result<Vec<CompartmentPoint>> {
    let text = fs::read_to_string(path).map_err(|e| MorphologyError::io(path, e))?;
    parse_swc(&text).map_err(|e| e.in_file(path))
}

/// Render points in canonical SWC layout
pub fn format_swc(points: &[CompartmentPoint]) -> String {
    let mut out = String::with_capacity(64 * (points.len() + 1));
    out.push_str(SWC_HEADER);
    out.push('\n');
    for point in points {
        let parent = point.parent.map_or(-1, i64::from);
        // writing into a String cannot fail
        let _ = writeln!(
            out,
            "{} {} {:.6} {:.6} {:.6} {:.6} {}",
            point.id,
            point.section.code(),
            point.position.x,
            point.position.y,
            point.position.z,
            point.radius,
            parent
        );
    }
    out
}

/// Write points to `path` in canonical SWC layout
pub fn write_swc(path: &Path, points: &[CompartmentPoint]) -> Result<()> {
    fs::write(path, format_swc(points)).map_err(|e| MorphologyError::io(path, e))
}

fn parse_field<T: std::str::FromStr>(raw: &str, name: &str, line: usize) -> Result<T> {
    raw.parse::<T>().map_err(|_| MorphologyError::Format {
        line,
        reason: format!("non-numeric {} field '{}'", name, raw),
    })
}

fn to_compartment_id(value: i64, name: &str, line: usize) -> Result<CompartmentId> {
    CompartmentId::try_from(value).map_err(|_| MorphologyError::Format {
        line,
        reason: format!("{} {} is out of range", name, value),
    })
}
