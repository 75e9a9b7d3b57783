//! Duplicate activation reconciler (`spec.md` §4.6).
//!
//! Callers of [`directory_core::Partition::merge`] / `register` collect the
//! losing activations they surface into a `silo -> list<GrainAddress>` map.
//! `destroy_duplicate_activations` walks that map once: for each silo still
//! reported [`crate::traits::SiloStatus::Active`] by the membership oracle,
//! it issues exactly one batched `DeleteActivations` RPC against that
//! silo's catalog; a silo no longer active is skipped (there is nothing to
//! tell it — the activation is already gone with the silo, and a
//! subsequent membership event will clean up). Either way the entry is
//! consumed from the working map, with no per-entry retry loop inside —
//! the whole operation is handed back to its caller, which is itself a
//! queued, retryable unit of work.

use std::collections::HashMap;

use directory_core::{DeleteActivationsReason, GrainAddress, SiloAddress};
use tracing::{info, warn};

use crate::error::DirectoryError;
use crate::traits::{Catalog, SiloStatusOracle};

const DUPLICATE_REASON_MESSAGE: &str = "duplicate registration reconciled in favor of another silo";

/// Destroys every activation in `duplicates`, batched one RPC per silo.
///
/// Returns the `(silo, error)` pairs for silos whose `DeleteActivations`
/// call failed, so the caller can decide whether the surrounding operation
/// as a whole should be retried.
pub async fn destroy_duplicate_activations(
    duplicates: HashMap<SiloAddress, Vec<GrainAddress>>,
    oracle: &dyn SiloStatusOracle,
    catalog: &dyn Catalog,
) -> Vec<(SiloAddress, DirectoryError)> {
    let mut errors = Vec::new();

    for (silo, grains) in duplicates {
        if !oracle.is_active(&silo) {
            warn!(silo = %silo, grains = grains.len(), "skipping duplicate destruction on a silo the oracle no longer reports active");
            continue;
        }

        info!(silo = %silo, grains = grains.len(), "destroying duplicate activations");
        if let Err(err) = catalog
            .delete_activations(&silo, grains, DeleteActivationsReason::DuplicateActivation, DUPLICATE_REASON_MESSAGE)
            .await
        {
            errors.push((silo, err));
        }
    }

    errors
}
