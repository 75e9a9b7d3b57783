//! Event handlers for ring membership changes.
//!
//! `process_silo_added` and `process_silo_removed` are the two entry
//! points a host runtime calls when it observes a ring topology change
//! (`spec.md` §4.3, §4.2). Both are synchronous — per §7's "no exception
//! escapes the operation executor" policy they never return an error —
//! and any RPC they need enqueues a unit of work instead of blocking;
//! `reset_followers` is the one exception, firing its RPC fully
//! detached rather than through the bounded-retry queue (§4.4).

use std::collections::HashMap;
use std::sync::Arc;

use directory_core::{GrainAddress, GrainId, SiloAddress};
use tracing::warn;

use crate::queue::{OperationQueue, QueuedOp};
use crate::reconciler::destroy_duplicate_activations;
use crate::state::DirectoryState;
use crate::traits::{Catalog, RemoteDirectory, Ring, Scheduler, SiloStatusOracle};

/// `spec.md` §4.4 `ResetFollowers`: clears this silo's entire follower set
/// and, for each one evicted, fires a one-shot, no-retry
/// `RemoveHandoffPartition(self)` RPC at it via the scheduler. Called at
/// the start of both `ProcessSiloAdd` and `ProcessSiloRemove` — the
/// follower set is rebuilt by subsequent external registrations, not by
/// this crate.
pub fn reset_followers(
    self_silo: &SiloAddress,
    state: &DirectoryState,
    remote: &Arc<dyn RemoteDirectory>,
    scheduler: &Arc<dyn Scheduler>,
) {
    for follower in state.take_followers() {
        remove_old_follower(self_silo.clone(), follower, Arc::clone(remote), Arc::clone(scheduler));
    }
}

fn remove_old_follower(
    self_silo: SiloAddress,
    follower: SiloAddress,
    remote: Arc<dyn RemoteDirectory>,
    scheduler: Arc<dyn Scheduler>,
) {
    scheduler.spawn_detached(Box::pin(async move {
        if let Err(err) = remote.remove_handoff_partition(&follower, self_silo).await {
            warn!(follower = %follower, error = %err, "fire-and-forget RemoveHandoffPartition failed; not retried");
        }
    }));
}

/// `spec.md` §4.3: a new silo joined the ring.
///
/// 1. `ResetFollowers()`.
/// 2. If `added` is not one of our successors, this event is not our
///    concern.
/// 3. If `added` is our immediate successor: split off every authoritative
///    entry `added` now owns (non-destructively) and enqueue
///    `ProcessAddedSiloAsync` to ship it and, on success, retire it.
/// 4. Otherwise (`added` is a later successor — Scenario 6): find `added`'s
///    predecessor `predA`. If we hold a mirror for `predA`, destructively
///    split off the entries `predA` no longer owns and install them as our
///    mirror for `added`. If we don't, there's nothing to split from — log
///    and skip, no RPC.
/// 5. Evict one stale mirrored entry no longer in our successor set.
#[allow(clippy::too_many_arguments)]
pub fn process_silo_added(
    self_silo: SiloAddress,
    added: SiloAddress,
    state: Arc<DirectoryState>,
    ring: Arc<dyn Ring>,
    oracle: Arc<dyn SiloStatusOracle>,
    remote: Arc<dyn RemoteDirectory>,
    scheduler: Arc<dyn Scheduler>,
    queue: Arc<OperationQueue>,
) {
    reset_followers(&self_silo, &state, &remote, &scheduler);

    let successors = ring.find_successors(&self_silo, 1);
    if !successors.contains(&added) {
        return;
    }

    if successors.first() == Some(&added) {
        let ring_for_predicate = Arc::clone(&ring);
        let owner_self = self_silo.clone();
        let split_part = state.with_authoritative(|p| p.split(|g| ring_for_predicate.calculate_owner(g) != owner_self, false));

        let list: Vec<GrainAddress> = split_part.to_list().into_iter().map(|(_, info)| info.addresses[0].clone()).collect();
        if !list.is_empty() {
            enqueue_process_added_silo(added.clone(), list, Arc::clone(&state), Arc::clone(&oracle), Arc::clone(&remote), &queue);
        }
    } else {
        match ring.find_predecessors(&added, 1).into_iter().next() {
            Some(pred_a) => {
                let pred_a_owner = pred_a.clone();
                let split_part = state.with_mirrored(&pred_a, |p| p.split(|g| ring.calculate_owner(g) != pred_a_owner, true));
                match split_part {
                    Some(split) => state.set_mirrored(added.clone(), split),
                    None => warn!(pred_a = %pred_a, added = %added, "no mirrored copy for the new successor's predecessor; skipping split"),
                }
            }
            None => {}
        }
    }

    if let Some(stale) = state.find_stale_mirrored(&successors) {
        state.remove_mirrored(&stale);
    }
}

#[allow(clippy::too_many_arguments)]
fn enqueue_process_added_silo(
    added: SiloAddress,
    list: Vec<GrainAddress>,
    state: Arc<DirectoryState>,
    oracle: Arc<dyn SiloStatusOracle>,
    remote: Arc<dyn RemoteDirectory>,
    queue: &Arc<OperationQueue>,
) {
    let label = format!("process-added-silo[{added}]");
    queue.enqueue(QueuedOp::new(
        label,
        Arc::new(move || {
            let state = Arc::clone(&state);
            let oracle = Arc::clone(&oracle);
            let remote = Arc::clone(&remote);
            let added = added.clone();
            let list = list.clone();
            Box::pin(async move {
                if !state.is_running() {
                    return Ok(());
                }
                if !oracle.is_active(&added) {
                    warn!(silo = %added, "target silo no longer active; dropping split without retry");
                    return Ok(());
                }

                remote.accept_split_partition(&added, list.clone()).await?;

                let grain_ids: Vec<GrainId> = list.iter().map(|addr| addr.grain_id.clone()).collect();
                state.with_authoritative(|p| {
                    for grain_id in &grain_ids {
                        p.remove(grain_id);
                    }
                });
                Ok(())
            })
        }),
    ));
}

/// `spec.md` §4.2: a silo left the ring (gracefully or via failure
/// detection).
///
/// 1. `ResetFollowers()`.
/// 2. If `removed` is not in our mirrored set, nothing to take over.
/// 3. Find `removed`'s current predecessor on the ring. If it's us, absorb
///    the mirrored copy into our own authoritative partition. Otherwise,
///    enrich the mirror we (may) hold for that predecessor instead — we
///    are not the new owner, just another link in the forwarding chain.
/// 4. Drop the mirrored copy for `removed`.
/// 5. Hand any duplicates the merge surfaced to the reconciler, via the
///    operation queue (destruction is an RPC, so it must be retryable).
#[allow(clippy::too_many_arguments)]
pub fn process_silo_removed(
    self_silo: &SiloAddress,
    removed: &SiloAddress,
    state: &Arc<DirectoryState>,
    ring: &Arc<dyn Ring>,
    remote: &Arc<dyn RemoteDirectory>,
    scheduler: &Arc<dyn Scheduler>,
    catalog: &Arc<dyn Catalog>,
    oracle: &Arc<dyn SiloStatusOracle>,
    queue: &Arc<OperationQueue>,
) {
    reset_followers(self_silo, state, remote, scheduler);

    let Some(partition_copy) = state.mirrored_snapshot(removed) else {
        return;
    };

    let predecessor = ring.find_predecessors(removed, 1).into_iter().next();

    let duplicates = if predecessor.as_ref() == Some(self_silo) {
        state.with_authoritative(|p| p.merge(&partition_copy))
    } else if let Some(predecessor) = predecessor {
        state.merge_mirrored_or_insert(&predecessor, &partition_copy)
    } else {
        HashMap::new()
    };

    state.remove_mirrored(removed);

    if !duplicates.is_empty() {
        enqueue_duplicate_destruction(duplicates, Arc::clone(state), Arc::clone(catalog), Arc::clone(oracle), queue);
    }
}

fn enqueue_duplicate_destruction(
    duplicates: HashMap<SiloAddress, Vec<GrainAddress>>,
    state: Arc<DirectoryState>,
    catalog: Arc<dyn Catalog>,
    oracle: Arc<dyn SiloStatusOracle>,
    queue: &Arc<OperationQueue>,
) {
    queue.enqueue(QueuedOp::new(
        "destroy-duplicate-activations",
        Arc::new(move || {
            let duplicates = duplicates.clone();
            let state = Arc::clone(&state);
            let catalog = Arc::clone(&catalog);
            let oracle = Arc::clone(&oracle);
            Box::pin(async move {
                if !state.is_running() {
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
