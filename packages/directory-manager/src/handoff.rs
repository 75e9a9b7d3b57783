//! Handoff receivers and registration reconciliation: the inbound side of
//! the messages sent by [`crate::handlers`] and by peers handing off
//! partitions to this silo.
//!
//! `spec.md` §4.5: `accept_handoff_partition` installs a full or delta
//! mirrored copy from a source silo; `remove_handoff_partition` drops one,
//! idempotently. §4.5.1's `AcceptExistingRegistrationsAsync` is queued
//! rather than run inline, since reconciling a follower's locally-accepted
//! registrations against the authoritative partition can surface
//! duplicates that need an RPC to resolve.

use std::collections::HashMap;
use std::sync::Arc;

use directory_core::{GrainAddress, GrainId, Partition, RegistrationRank, SiloAddress};
use tracing::warn;

use crate::error::DirectoryError;
use crate::queue::{OperationQueue, QueuedOp};
use crate::reconciler::destroy_duplicate_activations;
use crate::state::DirectoryState;
use crate::traits::{Catalog, SiloStatusOracle};

/// Installs `partition` as the mirrored copy kept for `source`.
///
/// A full copy (`is_full == true`) replaces the mirror wholesale
/// (`Partition::set`); a delta (`is_full == false`) is applied with
/// supersede semantics (`Partition::update`) onto whatever is already
/// there. If this silo has no prior mirror for `source` — expected for a
/// full copy, unexpected for a delta — an empty one is synthesized first,
/// so a delta arriving before its full copy is never rejected (`spec.md`
/// §4.5, P6/Scenario 3): it just starts the mirror a little early.
pub fn accept_handoff_partition(state: &DirectoryState, source: SiloAddress, partition: Partition, is_full: bool) {
    state.mirrored_entry_or_create(&source, |mirror, existed| {
        if !existed && !is_full {
            warn!(silo = %source, "delta handoff arrived with no prior full copy; synthesizing an empty mirror");
        }
        if is_full {
            mirror.set(partition);
        } else {
            mirror.update(&partition);
        }
    });
}

/// Drops the mirrored copy kept for `source`, typically once `source` is
/// confirmed dead and some other silo has taken over its partition.
///
/// Idempotent (`spec.md` §4.5): calling this when there is no copy to
/// remove is not an error.
pub fn remove_handoff_partition(state: &DirectoryState, source: &SiloAddress) {
    state.remove_mirrored(source);
}

/// `spec.md` §4.5.1: enqueues `AcceptExistingRegistrationsAsync`, which
/// reconciles registrations a follower already holds locally (accepted
/// directly from clients while acting as a secondary) against this silo's
/// authoritative partition.
///
/// Each `(grain_id, address, rank)` is registered against the authoritative
/// partition via [`directory_core::Partition::register`], which applies the
/// same tie-break rule as `merge`. Whenever the returned winner is not the
/// address the follower reported, that follower's own activation lost and
/// is grouped by its hosting silo for the duplicate reconciler.
pub fn enqueue_accept_existing_registrations(
    registrations: Vec<(GrainId, GrainAddress, RegistrationRank)>,
    state: Arc<DirectoryState>,
    oracle: Arc<dyn SiloStatusOracle>,
    catalog: Arc<dyn Catalog>,
    queue: &Arc<OperationQueue>,
) {
    queue.enqueue(QueuedOp::new(
        "accept-existing-registrations",
        Arc::new(move || {
            let state = Arc::clone(&state);
            let oracle = Arc::clone(&oracle);
            let catalog = Arc::clone(&catalog);
            let registrations = registrations.clone();
            Box::pin(async move {
                if !state.is_running() {
                    return Ok(());
                }

                let mut duplicates: HashMap<SiloAddress, Vec<GrainAddress>> = HashMap::new();
                for (grain_id, address, rank) in registrations {
                    let winner = state.with_authoritative(|p| p.register(grain_id.clone(), address.clone(), rank));
                    if winner != address {
                        duplicates.entry(address.silo.clone()).or_default().push(address);
                    }
                }

                if duplicates.is_empty() {
                    return Ok(());
                }

                let errors = destroy_duplicate_activations(duplicates, oracle.as_ref(), catalog.as_ref()).await;
                if let Some((_, err)) = errors.into_iter().next() {
                    return Err(err);
                }
                Ok(())
            })
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use directory_core::{ActivationId, DeleteActivationsReason};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::config::DirectoryManagerConfig;
    use crate::traits::SiloStatus;

    fn addr(grain: &str, silo: &str) -> GrainAddress {
        GrainAddress::new(GrainId::new(grain), SiloAddress::new(silo), ActivationId::new())
    }

    #[test]
    fn full_handoff_replaces_mirrored_copy() {
        let state = DirectoryState::new(Partition::new());
        let mut partition = Partition::new();
        partition.register(GrainId::new("g1"), addr("g1", "s1"), RegistrationRank::new(1, 0, SiloAddress::new("s1")));

        accept_handoff_partition(&state, SiloAddress::new("s1"), partition, true);
        assert_eq!(state.mirrored_snapshot(&SiloAddress::new("s1")).unwrap().len(), 1);
    }

    #[test]
    fn delta_without_prior_copy_is_synthesized_not_rejected() {
        let state = DirectoryState::new(Partition::new());
        let mut delta = Partition::new();
        delta.register(GrainId::new("g1"), addr("g1", "s1"), RegistrationRank::new(1, 0, SiloAddress::new("s1")));

        accept_handoff_partition(&state, SiloAddress::new("s1"), delta, false);

        let mirror = state.mirrored_snapshot(&SiloAddress::new("s1")).unwrap();
        assert_eq!(mirror.len(), 1, "the delta's contents must land even with no prior full copy");
        assert!(mirror.get(&GrainId::new("g1")).is_some());
    }

    #[test]
    fn delta_onto_existing_copy_supersedes_without_rank_comparison() {
        let state = DirectoryState::new(Partition::new());
        let mut full = Partition::new();
        full.register(GrainId::new("g1"), addr("g1", "s-old"), RegistrationRank::new(9, 0, SiloAddress::new("s-old")));
        accept_handoff_partition(&state, SiloAddress::new("s1"), full, true);

        let mut delta = Partition::new();
        delta.register(GrainId::new("g1"), addr("g1", "s-new"), RegistrationRank::new(1, 0, SiloAddress::new("s-new")));
        accept_handoff_partition(&state, SiloAddress::new("s1"), delta, false);

        let mirror = state.mirrored_snapshot(&SiloAddress::new("s1")).unwrap();
        assert_eq!(mirror.get(&GrainId::new("g1")).unwrap().addresses[0], addr("g1", "s-new"));
    }

    #[test]
    fn remove_handoff_partition_is_idempotent_when_absent() {
        let state = DirectoryState::new(Partition::new());
        // Must not panic or otherwise signal failure.
        remove_handoff_partition(&state, &SiloAddress::new("s1"));
        remove_handoff_partition(&state, &SiloAddress::new("s1"));
    }

    #[test]
    fn remove_handoff_partition_drops_an_existing_copy() {
        let state = DirectoryState::new(Partition::new());
        state.set_mirrored(SiloAddress::new("s1"), Partition::new());
        remove_handoff_partition(&state, &SiloAddress::new("s1"));
        assert!(state.mirrored_snapshot(&SiloAddress::new("s1")).is_none());
    }

    struct AlwaysActive;
    impl SiloStatusOracle for AlwaysActive {
        fn approximate_status(&self, _silo: &SiloAddress) -> SiloStatus {
            SiloStatus::Active
        }
    }

    struct NoopCatalog;
    #[async_trait]
    impl Catalog for NoopCatalog {
        async fn delete_activations(
            &self,
            _silo: &SiloAddress,
            _grains: Vec<GrainAddress>,
            _reason: DeleteActivationsReason,
            _message: &str,
        ) -> Result<(), DirectoryError> {
            Ok(())
        }
    }

    struct CountingCatalog {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Catalog for CountingCatalog {
        async fn delete_activations(
            &self,
            _silo: &SiloAddress,
            _grains: Vec<GrainAddress>,
            _reason: DeleteActivationsReason,
            _message: &str,
        ) -> Result<(), DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoDelayScheduler;
    #[async_trait]
    impl crate::traits::Scheduler for NoDelayScheduler {
        async fn delay(&self, _duration: Duration) {}
        fn spawn_detached(&self, task: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>>) {
            tokio::spawn(task);
        }
    }

    #[tokio::test]
    async fn accept_existing_registrations_without_collision_reports_no_duplicates() {
        let state = Arc::new(DirectoryState::new(Partition::new()));
        state.set_running(true);
        let queue = OperationQueue::new(DirectoryManagerConfig::default(), Arc::new(NoDelayScheduler));
        let catalog = Arc::new(CountingCatalog { calls: AtomicUsize::new(0) });

        enqueue_accept_existing_registrations(
            vec![(GrainId::new("g1"), addr("g1", "s2"), RegistrationRank::new(1, 0, SiloAddress::new("s2")))],
            Arc::clone(&state),
            Arc::new(AlwaysActive),
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            &queue,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
        assert!(state.authoritative_snapshot().get(&GrainId::new("g1")).is_some());
    }

    #[tokio::test]
    async fn accept_existing_registrations_losing_entry_triggers_reconciliation() {
        let state = Arc::new(DirectoryState::new(Partition::new()));
        state.set_running(true);
        state.with_authoritative(|p| {
            p.register(GrainId::new("g1"), addr("g1", "s1"), RegistrationRank::new(9, 0, SiloAddress::new("s1")));
        });

        let queue = OperationQueue::new(DirectoryManagerConfig::default(), Arc::new(NoDelayScheduler));
        let catalog = Arc::new(CountingCatalog { calls: AtomicUsize::new(0) });

        enqueue_accept_existing_registrations(
            vec![(GrainId::new("g1"), addr("g1", "s2"), RegistrationRank::new(1, 0, SiloAddress::new("s2")))],
            Arc::clone(&state),
            Arc::new(AlwaysActive),
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            &queue,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1, "the losing address's silo should get exactly one batched DeleteActivations call");
        assert_eq!(state.authoritative_snapshot().get(&GrainId::new("g1")).unwrap().addresses[0], addr("g1", "s1"));
    }

    #[tokio::test]
    async fn accept_existing_registrations_skips_entirely_when_not_running() {
        let state = Arc::new(DirectoryState::new(Partition::new()));
        let queue = OperationQueue::new(DirectoryManagerConfig::default(), Arc::new(NoDelayScheduler));
        let catalog = Arc::new(CountingCatalog { calls: AtomicUsize::new(0) });

        enqueue_accept_existing_registrations(
            vec![(GrainId::new("g1"), addr("g1", "s2"), RegistrationRank::new(1, 0, SiloAddress::new("s2")))],
            Arc::clone(&state),
            Arc::new(AlwaysActive),
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            &queue,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(state.authoritative_snapshot().is_empty(), "not-running directory must skip the op entirely");
    }
}
