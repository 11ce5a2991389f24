// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Canonical skeletons
//!
//! A [`MorphologySkeleton`] is the only representation compartment sampling
//! consumes. Its ids are `0..n` in depth-first order, every parent id is
//! smaller than its child's id and the axon is the two-point stub produced by
//! [`rebuild_axon`](crate::axon::rebuild_axon).

use std::path::Path;

use crate::axon::{rebuild_axon, AXON_STUB_OFFSETS, AXON_STUB_RADIUS};
use crate::dfs::linearize;
use crate::error::{MorphologyError, Result};
use crate::graph::MorphologyGraph;
use crate::point::{CompartmentId, CompartmentPoint, SectionType};
use crate::swc;

/// Positional slack when recognising an existing axon stub; canonical files
/// store six decimals
const STUB_TOLERANCE: f64 = 1e-4;

/// Canonical, simulation-ready skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct MorphologySkeleton {
    points: Vec<CompartmentPoint>,
}

impl MorphologySkeleton {
    pub(crate) fn from_canonical_points(points: Vec<CompartmentPoint>) -> Self {
        Self { points }
    }

    /// Points sorted by id
    pub fn points(&self) -> &[CompartmentPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn count_of(&self, section: SectionType) -> usize {
        self.points.iter().filter(|p| p.section == section).count()
    }

    /// Ids of compartments whose section type is in `sections`, ascending
    pub fn compartments_in(&self, sections: &[SectionType]) -> Vec<CompartmentId> {
        self.points
            .iter()
            .filter(|p| sections.contains(&p.section))
            .map(|p| p.id)
            .collect()
    }

    /// Check the canonical invariants.
    ///
    /// # Errors
    /// [`MorphologyError::Topology`] for id, root or parent ordering
    /// violations; [`MorphologyError::Domain`] when the axon is not exactly
    /// two points.
    pub fn verify(&self) -> Result<()> {
        for (index, point) in self.points.iter().enumerate() {
            if point.id as usize != index {
                return Err(MorphologyError::Topology(format!(
                    "row {} has id {}, expected {}",
                    index, point.id, index
                )));
            }
            match point.parent {
                None if index != 0 => {
                    return Err(MorphologyError::Topology(format!(
                        "point {} is a second root",
                        point.id
                    )))
                }
                Some(_) if index == 0 => {
                    return Err(MorphologyError::Topology("point 0 is not the root".to_string()))
                }
                Some(parent) if parent >= point.id => {
                    return Err(MorphologyError::Topology(format!(
                        "point {} has parent {} that does not precede it",
                        point.id, parent
                    )))
                }
                _ => {}
            }
        }

        let axon_count = self.count_of(SectionType::Axon);
        if axon_count != AXON_STUB_OFFSETS.len() {
            return Err(MorphologyError::Domain(format!(
                "expected {} axon points, found {}",
                AXON_STUB_OFFSETS.len(),
                axon_count
            )));
        }
        Ok(())
    }

    /// Render as canonical SWC text
    pub fn to_swc_string(&self) -> String {
        swc::format_swc(&self.points)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        swc::write_swc(path, &self.points)
    }
}

/// Repair the axon and renumber depth-first.
///
/// A graph whose axon already is a stub (exactly two axon points chained off
/// a soma point at the stub offsets and radius) keeps its axon, so feeding a
/// canonical skeleton back in returns it unchanged.
pub fn canonicalize(graph: &MorphologyGraph) -> Result<MorphologySkeleton> {
    if has_axon_stub(graph) {
        return linearize(graph);
    }
    let repaired = rebuild_axon(graph)?;
    linearize(&repaired)
}

/// Parse, validate and canonicalize SWC text
pub fn canonicalize_swc(text: &str) -> Result<MorphologySkeleton> {
    let graph = MorphologyGraph::from_points(swc::parse_swc(text)?)?;
    canonicalize(&graph)
}

/// Load a skeleton file and canonicalize it; errors name the file
pub fn load_canonical(path: &Path) -> Result<MorphologySkeleton> {
    let points = swc::read_swc(path)?;
    MorphologyGraph::from_points(points)
        .and_then(|graph| canonicalize(&graph))
        .map_err(|e| e.in_file(path))
}

fn has_axon_stub(graph: &MorphologyGraph) -> bool {
    let axon: Vec<&CompartmentPoint> = graph.points_of(SectionType::Axon).collect();
    let [first, second] = axon.as_slice() else {
        return false;
    };

    let Some(anchor) = first.parent.and_then(|id| graph.get(id)) else {
        return false;
    };
    if anchor.section != SectionType::Soma || second.parent != Some(first.id) {
        return false;
    }
    if (first.radius - AXON_STUB_RADIUS).abs() > STUB_TOLERANCE
        || (second.radius - AXON_STUB_RADIUS).abs() > STUB_TOLERANCE
    {
        return false;
    }

    let near = first.position - anchor.position;
    let far = second.position - anchor.position;
    let [near_offset, far_offset] = AXON_STUB_OFFSETS;
    (near.norm() - near_offset).abs() <= STUB_TOLERANCE
        && (far.norm() - far_offset).abs() <= STUB_TOLERANCE
        && (far - near * (far_offset / near_offset)).norm() <= STUB_TOLERANCE
}
