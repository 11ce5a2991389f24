// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Perisomatic axon replacement
//!
//! Reconstructed axons are replaced by a straight two-point stub leaving the
//! soma along the principal axis of the original axon cloud.

use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use crate::error::{MorphologyError, Result};
use crate::graph::MorphologyGraph;
use crate::point::{CompartmentPoint, Position, SectionType};

/// Distances of the two synthetic axon points from the soma end, in µm
pub const AXON_STUB_OFFSETS: [f64; 2] = [30.0, 60.0];

/// Radius of synthetic axon points, in µm
pub const AXON_STUB_RADIUS: f64 = 0.5;

/// Largest covariance eigenvalue below which the axon cloud has no usable direction
pub const DEGENERATE_VARIANCE: f64 = 1e-12;

const MAX_JACOBI_SWEEPS: usize = 64;

/// Replace every axon point of `graph` with the two-point stub.
///
/// Non-axon points keep their input order; the stub is appended after them
/// with ids following the largest remaining id. The result is re-validated,
/// so a non-axon point hanging off a removed axon point is reported as a
/// topology error.
pub fn rebuild_axon(graph: &MorphologyGraph) -> Result<MorphologyGraph> {
    let axon: Vec<Position> = graph
        .points_of(SectionType::Axon)
        .map(|p| p.position)
        .collect();
    let Some(&axon_last) = axon.last() else {
        return Err(MorphologyError::Domain(
            "no axonal reconstruction in skeleton".to_string(),
        ));
    };

    let soma: Vec<&CompartmentPoint> = graph.points_of(SectionType::Soma).collect();
    let Some(&soma_end) = soma.last() else {
        return Err(MorphologyError::Domain("skeleton has no soma points".to_string()));
    };
    let soma_mid = soma[soma.len() / 2].position;

    let mut cloud = Vec::with_capacity(axon.len() + 1);
    cloud.push(soma_mid);
    cloud.extend_from_slice(&axon);

    let mut direction = principal_direction(&cloud)?;
    if direction.dot(axon_last - soma_mid) < 0.0 {
        direction = direction * -1.0;
    }

    let mut points: Vec<CompartmentPoint> = graph
        .points()
        .iter()
        .filter(|p| p.section != SectionType::Axon)
        .copied()
        .collect();
    let next_id = points.iter().map(|p| p.id).max().map_or(0, |m| m + 1);

    let mut parent = soma_end.id;
    for (offset_index, offset) in AXON_STUB_OFFSETS.iter().enumerate() {
        let id = next_id + offset_index as u32;
        points.push(CompartmentPoint {
            id,
            section: SectionType::Axon,
            position: soma_end.position + direction * *offset,
            radius: AXON_STUB_RADIUS,
            parent: Some(parent),
        });
        parent = id;
    }

    debug!(
        target: "neulite-morphology",
        "Replaced {} axon points with stub along ({:.4}, {:.4}, {:.4})",
        axon.len(),
        direction.x,
        direction.y,
        direction.z
    );

    MorphologyGraph::from_points(points)
}

/// Unit eigenvector of the largest eigenvalue of the cloud's covariance.
///
/// # Errors
/// [`MorphologyError::Domain`] when the cloud has fewer than two points or
/// no spread.
pub fn principal_direction(cloud: &[Position]) -> Result<Position> {
    if cloud.len() < 2 {
        return Err(MorphologyError::Domain(
            "axon direction needs at least two points".to_string(),
        ));
    }

    let flat: Vec<f64> = cloud.iter().flat_map(|p| p.to_array()).collect();
    let data = Array2::from_shape_vec((cloud.len(), 3), flat)
        .map_err(|e| MorphologyError::Domain(format!("invalid point cloud: {}", e)))?;
    let mean = data
        .mean_axis(Axis(0))
        .ok_or_else(|| MorphologyError::Domain("empty point cloud".to_string()))?;
    let centered = &data - &mean;
    let covariance = centered.t().dot(&centered) / (cloud.len() - 1) as f64;

    let (eigenvalues, eigenvectors) = symmetric_eigen(covariance);
    let (largest, value) = eigenvalues
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

    if !(value > DEGENERATE_VARIANCE) {
        return Err(MorphologyError::Domain(format!(
            "degenerate axon cloud (largest variance {:e})",
            value
        )));
    }

    let column = eigenvectors.column(largest);
    let direction = Position::new(column[0], column[1], column[2]);
    Ok(direction * (1.0 / direction.norm()))
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
///
/// Returns the eigenvalues and a matrix whose columns are the matching
/// eigenvectors.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..MAX_JACOBI_SWEEPS {
        let mut off_diagonal = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diagonal += a[[p, q]] * a[[p, q]];
            }
        }
        let scale: f64 = a.diag().iter().map(|d| d * d).sum::<f64>() + off_diagonal;
        if off_diagonal <= f64::EPSILON * f64::EPSILON * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}
