// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Depth-first renumbering of a skeleton tree

use crate::error::{MorphologyError, Result};
use crate::graph::MorphologyGraph;
use crate::point::{CompartmentId, CompartmentPoint};
use crate::skeleton::MorphologySkeleton;

/// Renumber `graph` in pre-order depth-first order starting at the root.
///
/// Children are visited in input order. New ids are `0..n`, every parent is
/// remapped and the points are emitted sorted by new id.
pub fn linearize(graph: &MorphologyGraph) -> Result<MorphologySkeleton> {
    let order = visit_order(graph);
    if order.len() != graph.len() {
        return Err(MorphologyError::Topology(format!(
            "depth-first traversal visited {} of {} points",
            order.len(),
            graph.len()
        )));
    }

    let mut new_id: Vec<CompartmentId> = vec![0; graph.len()];
    for (position, &index) in order.iter().enumerate() {
        new_id[index] = position as CompartmentId;
    }

    let source = graph.points();
    let mut points = Vec::with_capacity(order.len());
    for &index in &order {
        let old = source[index];
        let parent = match old.parent {
            Some(parent_id) => {
                let parent_index = graph.index_of(parent_id).ok_or_else(|| {
                    MorphologyError::Topology(format!(
                        "point {} references missing parent {}",
                        old.id, parent_id
                    ))
                })?;
                Some(new_id[parent_index])
            }
            None => None,
        };
        points.push(CompartmentPoint {
            id: new_id[index],
            parent,
            ..old
        });
    }

    Ok(MorphologySkeleton::from_canonical_points(points))
}

/// Point indices in pre-order, using an explicit stack so deep trees do not
/// exhaust the call stack
fn visit_order(graph: &MorphologyGraph) -> Vec<usize> {
    let mut visited = vec![false; graph.len()];
    let mut order = Vec::with_capacity(graph.len());
    let mut stack = vec![graph.root_index()];

    while let Some(index) = stack.pop() {
        if visited[index] {
            continue;
        }
        visited[index] = true;
        order.push(index);
        // reversed so the first child is popped first
        stack.extend(graph.children_of(index).iter().rev().copied());
    }

    order
}
