//! Collaborator interfaces the manager consumes, expressed as traits the
//! way `cluster::traits` expresses `ClusterService` / `MembershipService` /
//! `FailureDetector`: the manager is generic over these, and a production
//! host wires in real ring/membership/RPC/catalog implementations.
//!
//! None of these are implemented here — the ring topology, cluster
//! membership, RPC transport, and activation catalog are out of scope.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use directory_core::{DeleteActivationsReason, GrainAddress, GrainId, Partition, SiloAddress};

use crate::error::DirectoryError;

/// Consistent-hash ring queries. The ring computation itself (hashing,
/// virtual nodes, rebalancing) lives outside this crate. Method names and
/// signatures follow `spec.md` §6 directly.
pub trait Ring: Send + Sync {
    /// The `count` silos immediately preceding `silo` on the ring, nearest
    /// first.
    fn find_predecessors(&self, silo: &SiloAddress, count: usize) -> Vec<SiloAddress>;

    /// The `count` silos immediately following `silo` on the ring, nearest
    /// first.
    fn find_successors(&self, silo: &SiloAddress, count: usize) -> Vec<SiloAddress>;

    /// The silo that currently owns `grain_id` under the ring's
    /// consistent-hash assignment.
    fn calculate_owner(&self, grain_id: &GrainId) -> SiloAddress;
}

/// A silo's approximate cluster-membership status, as reported by the
/// failure detector / membership protocol (`spec.md` §6
/// `SiloStatusOracle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiloStatus {
    Active,
    Joining,
    Dead,
}

/// Cluster membership view. The membership protocol itself is out of
/// scope; this manager only needs an approximate, possibly-stale read.
pub trait SiloStatusOracle: Send + Sync {
    fn approximate_status(&self, silo: &SiloAddress) -> SiloStatus;

    /// Convenience used at every RPC gate in this crate — `spec.md` never
    /// branches on `Joining`/`Dead` separately, only on "is it safe to call
    /// this silo right now".
    fn is_active(&self, silo: &SiloAddress) -> bool {
        self.approximate_status(silo) == SiloStatus::Active
    }
}

/// Abstracts scheduling so tests can skip real wall-clock waits and so
/// fire-and-forget work (`RemoveOldFollower`'s one-shot RPC, `spec.md`
/// §4.4) doesn't have to share the bounded-retry operation queue's
/// semantics. Mirrors the teacher's pattern of injecting `tokio::time`
/// behavior behind a trait for deterministic tests (see
/// `network/shutdown.rs`'s use of `tokio::sync::watch` rather than a bare
/// sleep loop).
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn delay(&self, duration: Duration);

    /// Runs `task` to completion with no retry and no result reported back
    /// — the caller has already decided it doesn't need to know the
    /// outcome, only that the attempt was made (`spec.md` §4.4: "No retry:
    /// follower-set rebuilding is triggered by subsequent events").
    fn spawn_detached(&self, task: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

/// Production [`Scheduler`] backed by `tokio::time::sleep` / `tokio::spawn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn_detached(&self, task: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        tokio::spawn(task);
    }
}

/// RPC surface toward peer directory partition managers (`spec.md` §6
/// `RemoteDirectory`).
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Peer-side receiver for a full or delta handoff. Must tolerate
    /// repeated delivery of the same `partition` as a no-op (Design Notes
    /// §9, `AcceptSplitPartition` idempotence).
    async fn accept_handoff_partition(
        &self,
        target: &SiloAddress,
        source: SiloAddress,
        partition: Partition,
        is_full: bool,
    ) -> Result<(), DirectoryError>;

    /// Tells `target` to drop its mirrored copy of `source`'s partition.
    /// Idempotent on the receiving end (`spec.md` §4.5).
    async fn remove_handoff_partition(&self, target: &SiloAddress, source: SiloAddress) -> Result<(), DirectoryError>;

    /// Delivers the entries that moved to a new owner after a ring split.
    /// `list` is the split partition's `toList()`, not the `Partition`
    /// itself (`spec.md` §4.3 step 3).
    async fn accept_split_partition(&self, target: &SiloAddress, list: Vec<GrainAddress>) -> Result<(), DirectoryError>;
}

/// Local grain activation catalog on a target silo, consulted by the
/// duplicate reconciler to destroy every losing activation it collects for
/// that silo in one batched call (`spec.md` §4.6 / §6 `Catalog`).
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn delete_activations(
        &self,
        silo: &SiloAddress,
        grains: Vec<GrainAddress>,
        reason: DeleteActivationsReason,
        message: &str,
    ) -> Result<(), DirectoryError>;
}

/// Produces an empty [`Partition`]. A plain closure suffices — there is no
/// state or async work involved in constructing one.
pub trait PartitionFactory: Send + Sync {
    fn create(&self) -> Partition;
}

impl<F> PartitionFactory for F
where
    F: Fn() -> Partition + Send + Sync,
{
    fn create(&self) -> Partition {
        self()
    }
}
