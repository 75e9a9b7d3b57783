//! Top-level facade wiring the partition store, operation queue, event
//! handlers, handoff receivers, and duplicate reconciler into one handle a
//! host runtime can start and shut down.
//!
//! The lifecycle pair mirrors the teacher's `ManagedService` trait
//! (`service/registry.rs`: `name`/`init`/`reset`/`shutdown`) without
//! reusing it directly — this manager is a single component, not an entry
//! in a multi-service registry, so a plain `start`/`shutdown` pair is
//! enough.
//!
//! `spec.md` §7's "no exception escapes the operation executor" policy
//! means every entry point below returns `()`. The `running` flag it used
//! to hold itself now lives on [`DirectoryState`] (`spec.md` §5
//! `localDirectory.Running`), since only the operations queued from these
//! entry points need to check it — the entry points themselves always run.

use std::sync::Arc;

use directory_core::{GrainAddress, GrainId, Partition, RegistrationRank, SiloAddress};
use tracing::info;

use crate::config::DirectoryManagerConfig;
use crate::handlers::{process_silo_added, process_silo_removed};
use crate::handoff::{accept_handoff_partition, enqueue_accept_existing_registrations, remove_handoff_partition};
use crate::queue::OperationQueue;
use crate::state::DirectoryState;
use crate::traits::{Catalog, RemoteDirectory, Ring, Scheduler, SiloStatusOracle};

/// Directory partition manager for one silo.
///
/// Holds the silo's own identity, its concurrent directory state, the
/// single-consumer operation queue, and the collaborators it needs to act
/// (ring, membership oracle, RPC transport, activation catalog, scheduler).
/// None of those collaborators are implemented by this crate.
pub struct DirectoryPartitionManager {
    self_silo: SiloAddress,
    state: Arc<DirectoryState>,
    queue: Arc<OperationQueue>,
    ring: Arc<dyn Ring>,
    oracle: Arc<dyn SiloStatusOracle>,
    remote: Arc<dyn RemoteDirectory>,
    scheduler: Arc<dyn Scheduler>,
    catalog: Arc<dyn Catalog>,
}

impl DirectoryPartitionManager {
    #[must_use]
    pub fn new(
        self_silo: SiloAddress,
        config: DirectoryManagerConfig,
        scheduler: Arc<dyn Scheduler>,
        ring: Arc<dyn Ring>,
        oracle: Arc<dyn SiloStatusOracle>,
        remote: Arc<dyn RemoteDirectory>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            self_silo,
            state: Arc::new(DirectoryState::new(Partition::new())),
            queue: OperationQueue::new(config, Arc::clone(&scheduler)),
            ring,
            oracle,
            remote,
            scheduler,
            catalog,
        }
    }

    /// Marks the manager active. Queued operations enqueued before `start`
    /// still run — `start`/`shutdown` gate the work a queued operation is
    /// willing to do, not whether the queue drains.
    pub fn start(&self) {
        self.state.set_running(true);
        info!(silo = %self.self_silo, "directory partition manager started");
    }

    /// Marks the manager inactive. Already-queued operations check this on
    /// their own next attempt and skip rather than erroring (`spec.md` §7);
    /// synchronous entry points are unaffected and keep accepting calls.
    pub fn shutdown(&self) {
        self.state.set_running(false);
        info!(silo = %self.self_silo, "directory partition manager shutting down");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// `spec.md` §4.3 entry point: a new silo joined the ring.
    pub fn process_silo_add_event(&self, added: SiloAddress) {
        process_silo_added(
            self.self_silo.clone(),
            added,
            Arc::clone(&self.state),
            Arc::clone(&self.ring),
            Arc::clone(&self.oracle),
            Arc::clone(&self.remote),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.queue),
        );
    }

    /// `spec.md` §4.2 entry point: a silo left the ring.
    pub fn process_silo_remove_event(&self, removed: &SiloAddress) {
        process_silo_removed(
            &self.self_silo,
            removed,
            &self.state,
            &self.ring,
            &self.remote,
            &self.scheduler,
            &self.catalog,
            &self.oracle,
            &self.queue,
        );
    }

    /// `spec.md` §4.5 entry point.
    pub fn accept_handoff_partition(&self, source: SiloAddress, partition: Partition, is_full: bool) {
        accept_handoff_partition(&self.state, source, partition, is_full);
    }

    /// `spec.md` §4.5 entry point. Idempotent when nothing is tracked for
    /// `source`.
    pub fn remove_handoff_partition(&self, source: &SiloAddress) {
        remove_handoff_partition(&self.state, source);
    }

    /// `spec.md` §4.5.1 entry point: enqueues reconciliation of a
    /// follower's locally-accepted registrations against the authoritative
    /// partition.
    pub fn accept_existing_registrations(&self, registrations: Vec<(GrainId, GrainAddress, RegistrationRank)>) {
        enqueue_accept_existing_registrations(
            registrations,
            Arc::clone(&self.state),
            Arc::clone(&self.oracle),
            Arc::clone(&self.catalog),
            &self.queue,
        );
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn authoritative_snapshot(&self) -> Partition {
        self.state.authoritative_snapshot()
    }

    #[must_use]
    pub fn mirrored_snapshot(&self, source: &SiloAddress) -> Option<Partition> {
        self.state.mirrored_snapshot(source)
    }

    /// Registers `silo` as a follower of this partition. Follower
    /// registration itself is externally driven (`spec.md` §4.4); this
    /// just gives a host runtime somewhere to record it.
    pub fn add_follower(&self, silo: SiloAddress) {
        self.state.add_follower(silo);
    }
}
