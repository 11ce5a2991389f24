// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Neuron skeleton canonicalization
//!
//! Turns reconstructed SWC skeletons into the canonical layout used for
//! synapse placement:
//!
//! 1. [`MorphologyGraph`] validates the point set as a single rooted tree
//! 2. [`rebuild_axon`] replaces the reconstructed axon with a two-point stub
//!    along the principal axis of the axon cloud
//! 3. [`linearize`] renumbers the tree depth-first into a
//!    [`MorphologySkeleton`]
//!
//! ```no_run
//! use neulite_morphology::canonicalize_swc;
//!
//! let text = std::fs::read_to_string("cell.swc")?;
//! let skeleton = canonicalize_swc(&text)?;
//! println!("{}", skeleton.to_swc_string());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod axon;
pub mod dfs;
pub mod error;
pub mod graph;
pub mod point;
pub mod prepare;
pub mod skeleton;
pub mod swc;

pub use axon::{principal_direction, rebuild_axon, AXON_STUB_OFFSETS, AXON_STUB_RADIUS};
pub use dfs::linearize;
pub use error::{MorphologyError, Result};
pub use graph::MorphologyGraph;
pub use point::{CompartmentId, CompartmentPoint, Position, SectionType};
pub use prepare::{list_skeleton_files, prepare_morphologies, PrepareSummary};
pub use skeleton::{canonicalize, canonicalize_swc, load_canonical, MorphologySkeleton};
pub use swc::{format_swc, parse_swc, read_swc, write_swc, SWC_HEADER};
