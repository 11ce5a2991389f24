// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Slicing work across ranks
//!
//! A table of `n` rows is cut into one contiguous slice per rank. Sizes differ
//! by at most one: the first `n % workers` slices take the extra row.

use std::ops::Range;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cluster::{recv, send, Cluster, LEADER_RANK};
use crate::error::{ConnectomeError, Result};

/// Contiguous index ranges covering `0..n`, one per worker, in rank order
pub fn partition_ranges(n: usize, workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }
    let base = n / workers;
    let extra = n % workers;
    let mut start = 0;
    (0..workers)
        .map(|rank| {
            let len = base + usize::from(rank < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Split `rows` into per-worker slices, in rank order
pub fn partition<T>(rows: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let ranges = partition_ranges(rows.len(), workers);
    let mut rows = rows.into_iter();
    ranges
        .into_iter()
        .map(|range| rows.by_ref().take(range.len()).collect())
        .collect()
}

/// Hand each rank its slice. The leader passes one slice per rank and keeps
/// slice 0; every other rank passes `None` and receives its slice.
pub fn scatter<C, T>(cluster: &C, slices: Option<Vec<Vec<T>>>) -> Result<Vec<T>>
where
    C: Cluster + ?Sized,
    T: Serialize + DeserializeOwned,
{
    if !cluster.is_leader() {
        let slice: Vec<T> = recv(cluster, LEADER_RANK)?;
        debug!(
            target: "neulite-connectome",
            "Rank {} received a slice of {} rows",
            cluster.rank(),
            slice.len()
        );
        return Ok(slice);
    }

    let slices = slices
        .ok_or_else(|| ConnectomeError::Distribution("leader has no slices to scatter".to_string()))?;
    if slices.len() != cluster.size() {
        return Err(ConnectomeError::Distribution(format!(
            "{} slices for {} ranks",
            slices.len(),
            cluster.size()
        )));
    }

    let mut slices = slices.into_iter();
    let own = slices.next().unwrap_or_default();
    for (offset, slice) in slices.enumerate() {
        send(cluster, offset + 1, &slice)?;
    }
    Ok(own)
}

/// Collect every rank's result on the leader, in rank order. Non-leaders get
/// `None` back.
pub fn gather<C, T>(cluster: &C, local: T) -> Result<Option<Vec<T>>>
where
    C: Cluster + ?Sized,
    T: Serialize + DeserializeOwned,
{
    if !cluster.is_leader() {
        send(cluster, LEADER_RANK, &local)?;
        return Ok(None);
    }

    let mut all = Vec::with_capacity(cluster.size());
    all.push(local);
    for source in 1..cluster.size() {
        all.push(recv(cluster, source)?);
    }
    Ok(Some(all))
}
