// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Validated skeleton tree
//!
//! A [`MorphologyGraph`] owns its points in input order together with a
//! parent to children index. Children keep the order in which they appear in
//! the input, which the linearizer relies on.

use ahash::AHashMap;

use crate::error::{MorphologyError, Result};
use crate::point::{CompartmentId, CompartmentPoint, SectionType};

/// Rooted tree of skeleton points
#[derive(Debug, Clone)]
pub struct MorphologyGraph {
    points: Vec<CompartmentPoint>,
    root: usize,
    /// Per point index, child point indices in input order
    children: Vec<Vec<usize>>,
    index_of: AHashMap<CompartmentId, usize>,
}

impl MorphologyGraph {
    /// Validate `points` as a single rooted tree.
    ///
    /// # Errors
    /// [`MorphologyError::Topology`] on duplicate ids, zero or several roots,
    /// a parent id that does not exist, or points not reachable from the root.
    pub fn from_points(points: Vec<CompartmentPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(MorphologyError::Topology("skeleton has no points".to_string()));
        }

        let mut index_of = AHashMap::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            if index_of.insert(point.id, index).is_some() {
                return Err(MorphologyError::Topology(format!(
                    "duplicate point id {}",
                    point.id
                )));
            }
        }

        let roots: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_root())
            .map(|(i, _)| i)
            .collect();
        let root = match roots.as_slice() {
            [single] => *single,
            [] => return Err(MorphologyError::Topology("skeleton has no root".to_string())),
            many => {
                return Err(MorphologyError::Topology(format!(
                    "skeleton has {} roots (ids {:?})",
                    many.len(),
                    many.iter().map(|&i| points[i].id).collect::<Vec<_>>()
                )))
            }
        };

        let mut children = vec![Vec::new(); points.len()];
        for (index, point) in points.iter().enumerate() {
            let Some(parent) = point.parent else { continue };
            let Some(&parent_index) = index_of.get(&parent) else {
                return Err(MorphologyError::Topology(format!(
                    "point {} references missing parent {}",
                    point.id, parent
                )));
            };
            children[parent_index].push(index);
        }

        let graph = Self {
            points,
            root,
            children,
            index_of,
        };

        let reached = graph.reachable_count();
        if reached != graph.points.len() {
            return Err(MorphologyError::Topology(format!(
                "{} of {} points are not reachable from root {}",
                graph.points.len() - reached,
                graph.points.len(),
                graph.points[graph.root].id
            )));
        }

        Ok(graph)
    }

    fn reachable_count(&self) -> usize {
        let mut seen = vec![false; self.points.len()];
        let mut stack = vec![self.root];
        let mut count = 0;
        while let Some(index) = stack.pop() {
            if seen[index] {
                continue;
            }
            seen[index] = true;
            count += 1;
            stack.extend(self.children[index].iter().copied());
        }
        count
    }

    /// Points in input order
    pub fn points(&self) -> &[CompartmentPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the root in [`Self::points`]
    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn root(&self) -> &CompartmentPoint {
        &self.points[self.root]
    }

    /// Child indices of the point at `index`, in input order
    pub fn children_of(&self, index: usize) -> &[usize] {
        &self.children[index]
    }

    pub fn index_of(&self, id: CompartmentId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    pub fn get(&self, id: CompartmentId) -> Option<&CompartmentPoint> {
        self.index_of(id).map(|i| &self.points[i])
    }

    /// Points of one section type, in input order
    pub fn points_of(&self, section: SectionType) -> impl Iterator<Item = &CompartmentPoint> {
        self.points.iter().filter(move |p| p.section == section)
    }

    pub fn count_of(&self, section: SectionType) -> usize {
        self.points_of(section).count()
    }

    pub fn into_points(self) -> Vec<CompartmentPoint> {
        self.points
    }
}
