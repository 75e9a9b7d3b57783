//! Wire messages exchanged between directory partition managers during
//! handoff and registration reconciliation.
//!
//! Follows the teacher crate's `cluster::messages` convention: one
//! internally-tagged enum per message family, `camelCase` field names, so
//! these serialize identically whatever transport carries them.

use serde::{Deserialize, Serialize};

use crate::partition::Partition;
use crate::types::{GrainAddress, GrainId, SiloAddress};

/// Why a set of activations is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteActivationsReason {
    /// A duplicate registration was reconciled and the losing activation
    /// must be deactivated.
    DuplicateActivation,
    /// The owning silo is gone and the activation cannot be reached.
    SiloUnreachable,
    /// The activation's directory entry expired or was explicitly evicted.
    CacheInvalidation,
}

/// Messages accepted by a directory partition manager from a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectoryMessage {
    /// Full- or delta-copy handoff of a partition from its owner to a
    /// follower, per `spec.md` §4.5.
    AcceptHandoffPartition(AcceptHandoffPartitionPayload),

    /// Instructs a follower to drop its mirrored copy of a source silo's
    /// partition, typically once that silo is confirmed dead.
    RemoveHandoffPartition(RemoveHandoffPartitionPayload),

    /// Reconciles registrations a follower already holds against the
    /// authoritative partition after a handoff, per §4.5.1.
    AcceptExistingRegistrations(AcceptExistingRegistrationsPayload),

    /// Delivers the entries that moved to a new owner after a ring split,
    /// per the Design Notes open question on split idempotence: receivers
    /// must treat repeated delivery of the same list as a no-op.
    AcceptSplitPartition(AcceptSplitPartitionPayload),

    /// Requests deactivation of every listed activation on the receiving
    /// silo's catalog, batched into one RPC per target silo rather than
    /// one per activation (`spec.md` §4.6).
    DeleteActivations(DeleteActivationsPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptHandoffPartitionPayload {
    pub source: SiloAddress,
    /// `false` for a full copy; `true` for an incremental delta since the
    /// last handoff from `source`.
    pub is_delta: bool,
    pub partition: Partition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveHandoffPartitionPayload {
    pub source: SiloAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptExistingRegistrationsPayload {
    pub source: SiloAddress,
    pub registrations: Vec<(GrainId, GrainAddress)>,
}

/// `list` is `splitPart.toList()` — a flat list of addresses, not the
/// `Partition` itself (`spec.md` §4.3 step 3 / §6 `RemoteDirectory`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptSplitPartitionPayload {
    pub source: SiloAddress,
    pub list: Vec<GrainAddress>,
}

/// One batched `DeleteActivations` RPC targets a single silo with every
/// grain address the duplicate reconciler decided to destroy there
/// (`spec.md` §4.6: "one batched RPC per silo", not one per activation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteActivationsPayload {
    pub grains: Vec<GrainAddress>,
    pub reason: DeleteActivationsReason,
    pub message: String,
}
