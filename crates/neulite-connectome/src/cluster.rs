// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Worker cluster context
//!
//! A [`Cluster`] is the only way pipeline stages talk to each other:
//! point-to-point byte messages and a barrier. Typed helpers encode payloads
//! with bincode. [`LocalCluster`] runs every rank as a thread connected by
//! crossbeam channels, one channel per ordered pair of ranks.

use std::cell::Cell;

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info_span};

use crate::error::{ConnectomeError, Result};

/// Rank that coordinates and aggregates
pub const LEADER_RANK: usize = 0;

/// Message passing between symmetric workers.
///
/// Every call blocks; there are no timeouts. Any failure is fatal for the run.
pub trait Cluster {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send_bytes(&self, dest: usize, payload: Vec<u8>) -> Result<()>;

    fn recv_bytes(&self, source: usize) -> Result<Vec<u8>>;

    /// Return once every rank has entered the same barrier
    fn barrier(&self) -> Result<()>;

    fn is_leader(&self) -> bool {
        self.rank() == LEADER_RANK
    }
}

/// Encode and send `value` to `dest`
pub fn send<C, T>(cluster: &C, dest: usize, value: &T) -> Result<()>
where
    C: Cluster + ?Sized,
    T: Serialize + ?Sized,
{
    cluster.send_bytes(dest, bincode::serialize(value)?)
}

/// Receive and decode a value from `source`
pub fn recv<C, T>(cluster: &C, source: usize) -> Result<T>
where
    C: Cluster + ?Sized,
    T: DeserializeOwned,
{
    Ok(bincode::deserialize(&cluster.recv_bytes(source)?)?)
}

/// Send the leader's `value` to every rank; non-leaders pass `None`
pub fn broadcast<C, T>(cluster: &C, value: Option<T>) -> Result<T>
where
    C: Cluster + ?Sized,
    T: Serialize + DeserializeOwned,
{
    if cluster.is_leader() {
        let value = value.ok_or_else(|| {
            ConnectomeError::Distribution("leader has nothing to broadcast".to_string())
        })?;
        let payload = bincode::serialize(&value)?;
        for dest in (0..cluster.size()).filter(|&r| r != LEADER_RANK) {
            cluster.send_bytes(dest, payload.clone())?;
        }
        Ok(value)
    } else {
        recv(cluster, LEADER_RANK)
    }
}

#[derive(Debug)]
enum Envelope {
    Data(Vec<u8>),
    Barrier(u64),
}

/// In-process cluster endpoint for one rank
pub struct LocalCluster {
    rank: usize,
    size: usize,
    /// Indexed by destination rank; `None` for self
    outgoing: Vec<Option<Sender<Envelope>>>,
    /// Indexed by source rank; `None` for self
    incoming: Vec<Option<Receiver<Envelope>>>,
    barrier_epoch: Cell<u64>,
}

impl LocalCluster {
    /// Connected endpoints for ranks `0..size`
    pub fn create(size: usize) -> Vec<LocalCluster> {
        let mut outgoing: Vec<Vec<Option<Sender<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut incoming: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for from in 0..size {
            for to in 0..size {
                if from != to {
                    let (tx, rx) = unbounded();
                    outgoing[from][to] = Some(tx);
                    incoming[to][from] = Some(rx);
                }
            }
        }

        outgoing
            .into_iter()
            .zip(incoming)
            .enumerate()
            .map(|(rank, (outgoing, incoming))| LocalCluster {
                rank,
                size,
                outgoing,
                incoming,
                barrier_epoch: Cell::new(0),
            })
            .collect()
    }

    fn post(&self, dest: usize, envelope: Envelope) -> Result<()> {
        let sender = self
            .outgoing
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                ConnectomeError::Distribution(format!("rank {} cannot send to rank {}", self.rank, dest))
            })?;
        sender.send(envelope).map_err(|_| ConnectomeError::Disconnected {
            rank: self.rank,
            peer: dest,
        })
    }

    fn take(&self, source: usize) -> Result<Envelope> {
        let receiver = self
            .incoming
            .get(source)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                ConnectomeError::Distribution(format!(
                    "rank {} cannot receive from rank {}",
                    self.rank, source
                ))
            })?;
        receiver.recv().map_err(|_| ConnectomeError::Disconnected {
            rank: self.rank,
            peer: source,
        })
    }

    fn expect_barrier(&self, source: usize, epoch: u64) -> Result<()> {
        match self.take(source)? {
            Envelope::Barrier(got) if got == epoch => Ok(()),
            Envelope::Barrier(got) => Err(ConnectomeError::Distribution(format!(
                "rank {} expected barrier {} from rank {}, got barrier {}",
                self.rank, epoch, source, got
            ))),
            Envelope::Data(_) => Err(ConnectomeError::Distribution(format!(
                "rank {} expected barrier {} from rank {}, got data",
                self.rank, epoch, source
            ))),
        }
    }
}

impl Cluster for LocalCluster {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_bytes(&self, dest: usize, payload: Vec<u8>) -> Result<()> {
        self.post(dest, Envelope::Data(payload))
    }

    fn recv_bytes(&self, source: usize) -> Result<Vec<u8>> {
        match self.take(source)? {
            Envelope::Data(payload) => Ok(payload),
            Envelope::Barrier(epoch) => Err(ConnectomeError::Distribution(format!(
                "rank {} expected data from rank {}, got barrier {}",
                self.rank, source, epoch
            ))),
        }
    }

    fn barrier(&self) -> Result<()> {
        let epoch = self.barrier_epoch.get() + 1;
        self.barrier_epoch.set(epoch);

        if self.rank == LEADER_RANK {
            for rank in 1..self.size {
                self.expect_barrier(rank, epoch)?;
            }
            for rank in 1..self.size {
                self.post(rank, Envelope::Barrier(epoch))?;
            }
        } else {
            self.post(LEADER_RANK, Envelope::Barrier(epoch))?;
            self.expect_barrier(LEADER_RANK, epoch)?;
        }
        Ok(())
    }
}

/// Run `work` on `size` ranks, one thread each, and return the per-rank
/// results in rank order.
///
/// A rank that fails drops its endpoints, so peers blocked on it fail with
/// [`ConnectomeError::Disconnected`] instead of hanging. When several ranks
/// fail, panics and local failures are reported before lost peers; ties go
/// to the lowest rank.
pub fn run_local<F, T>(size: usize, work: F) -> Result<Vec<T>>
where
    F: Fn(&LocalCluster) -> Result<T> + Sync,
    T: Send,
{
    if size == 0 {
        return Err(ConnectomeError::Distribution("cluster needs at least one rank".to_string()));
    }
    debug!(target: "neulite-connectome", "Starting local cluster with {} ranks", size);

    let work = &work;
    let results: Vec<Result<T>> = std::thread::scope(|scope| {
        let handles: Vec<_> = LocalCluster::create(size)
            .into_iter()
            .map(|cluster| {
                scope.spawn(move || {
                    let _span = info_span!("rank", rank = cluster.rank()).entered();
                    work(&cluster)
                })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|payload| {
                    Err(ConnectomeError::Panicked {
                        rank,
                        message: panic_message(payload.as_ref()),
                    })
                })
            })
            .collect()
    });

    let mut values = Vec::with_capacity(size);
    let mut failure: Option<ConnectomeError> = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => {
                if failure
                    .as_ref()
                    .map_or(true, |f| e.report_priority() < f.report_priority())
                {
                    failure = Some(e);
                }
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_to_point_and_broadcast() {
        let results = run_local(3, |cluster| {
            let shared: Vec<String> = broadcast(
                cluster,
                cluster.is_leader().then(|| vec!["a".to_string(), "b".to_string()]),
            )?;
            if cluster.is_leader() {
                let mut total = 0u64;
                for source in 1..cluster.size() {
                    total += recv::<_, u64>(cluster, source)?;
                }
                Ok((shared, total))
            } else {
                send(cluster, LEADER_RANK, &(cluster.rank() as u64 * 10))?;
                Ok((shared, 0))
            }
        })
        .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(shared, _)| shared == &["a", "b"]));
        assert_eq!(results[0].1, 30);
    }

    #[test]
    fn test_repeated_barriers() {
        let results = run_local(4, |cluster| {
            for _ in 0..5 {
                cluster.barrier()?;
            }
            Ok(cluster.rank())
        })
        .unwrap();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_single_rank_needs_no_peers() {
        let results = run_local(1, |cluster| {
            cluster.barrier()?;
            broadcast(cluster, Some(7u32))
        })
        .unwrap();
        assert_eq!(results, vec![7]);
    }

    #[test]
    fn test_failed_rank_aborts_peers() {
        let err = run_local(2, |cluster| {
            if cluster.is_leader() {
                return Err(ConnectomeError::Catalog("leader failed".to_string()));
            }
            recv::<_, u64>(cluster, LEADER_RANK)
        })
        .unwrap_err();
        assert!(matches!(err, ConnectomeError::Catalog(_)));
    }

    #[test]
    fn test_data_where_barrier_expected_is_distribution_error() {
        let results: Vec<Result<()>> = run_local(2, |cluster| {
            if cluster.is_leader() {
                Ok(cluster.barrier())
            } else {
                send(cluster, LEADER_RANK, &1u8)?;
                // leader bails out on the stray payload and drops its endpoints
                Ok(cluster.barrier())
            }
        })
        .unwrap();
        assert!(matches!(results[0], Err(ConnectomeError::Distribution(_))));
        assert!(results[1].as_ref().is_err_and(ConnectomeError::is_distribution));
    }

    #[test]
    fn test_worker_panic_is_reported_over_lost_peer() {
        let err = run_local(3, |cluster| {
            if cluster.rank() == 1 {
                panic!("boom");
            }
            cluster.barrier()
        })
        .unwrap_err();
        match err {
            ConnectomeError::Panicked { rank, message } => {
                assert_eq!(rank, 1);
                assert_eq!(message, "boom");
            }
            other => panic!("expected the panic to be reported, got {}", other),
        }
    }

    #[test]
    fn test_worker_failure_is_reported_over_lost_peer() {
        let err = run_local(2, |cluster| {
            if cluster.rank() == 1 {
                return Err(ConnectomeError::Catalog("worker failed".to_string()));
            }
            recv::<_, u64>(cluster, 1)
        })
        .unwrap_err();
        assert!(matches!(err, ConnectomeError::Catalog(_)));
    }

    #[test]
    fn test_lost_peer_is_distribution_error() {
        let err = run_local(2, |cluster| {
            if cluster.rank() == 1 {
                return Ok(0);
            }
            recv::<_, u64>(cluster, 1)
        })
        .unwrap_err();
        assert!(matches!(err, ConnectomeError::Disconnected { rank: 0, peer: 1 }));
        assert!(err.is_distribution());
        assert!(err.to_string().starts_with("Distribution error"));
    }

    #[test]
    fn test_send_to_self_rejected() {
        let clusters = LocalCluster::create(2);
        assert!(clusters[0].send_bytes(0, vec![1]).is_err());
        assert!(clusters[0].send_bytes(5, vec![1]).is_err());
    }
}
