// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Batch conversion of a skeleton directory
//!
//! This is the explicit "prepare" phase: every `*.swc` file in the source
//! directory is canonicalized and written under the same file name into the
//! output directory. Nothing else in the crate touches the disk on its own.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{MorphologyError, Result};
use crate::skeleton::load_canonical;

/// Outcome of [`prepare_morphologies`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareSummary {
    pub output_dir: PathBuf,
    /// Written files, sorted by name
    pub converted: Vec<PathBuf>,
}

/// List `*.swc` files of `dir`, sorted by file name
pub fn list_skeleton_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| MorphologyError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| MorphologyError::io(dir, e))?.path();
        let is_swc = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "swc");
        if is_swc && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Canonicalize every skeleton in `src_dir` into `dst_dir`.
///
/// Files are processed in parallel. The first failing file aborts the batch
/// and its error names the file.
pub fn prepare_morphologies(src_dir: &Path, dst_dir: &Path) -> Result<PrepareSummary> {
    fs::create_dir_all(dst_dir).map_err(|e| MorphologyError::io(dst_dir, e))?;
    let files = list_skeleton_files(src_dir)?;

    let converted = files
        .par_iter()
        .map(|src| {
            let skeleton = load_canonical(src)?;
            let name = src
                .file_name()
                .ok_or_else(|| MorphologyError::Topology(format!("{} has no file name", src.display())))?;
            let dst = dst_dir.join(name);
            skeleton.write(&dst)?;
            debug!(
                target: "neulite-morphology",
                "Converted {} ({} compartments) to {}",
                src.display(),
                skeleton.len(),
                dst.display()
            );
            Ok(dst)
        })
        .collect::<Result<Vec<PathBuf>>>()?;

    info!(
        target: "neulite-morphology",
        "Morphology conversion completed: {} skeleton files written to {}",
        converted.len(),
        dst_dir.display()
    );

    Ok(PrepareSummary {
        output_dir: dst_dir.to_path_buf(),
        converted,
    })
}
