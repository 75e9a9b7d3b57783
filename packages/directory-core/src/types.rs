//! Grain directory domain types: identities and the registration rank used
//! for deterministic merge tie-breaking.
//!
//! These are data-only types; the consistent-hash ring that maps a
//! [`GrainId`] to an owning [`SiloAddress`] is an external collaborator
//! (see `directory-manager::traits::Ring`) and is not modeled here.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// GrainId
// ---------------------------------------------------------------------------

/// Opaque grain identity. Hashable and totally ordered so it can key a
/// partition map and be positioned on the consistent-hash ring by an
/// external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrainId(pub String);

impl GrainId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for GrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SiloAddress
// ---------------------------------------------------------------------------

/// Opaque peer identity. Distinct from [`GrainId`] even though both wrap a
/// string, so the two can never be confused at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiloAddress(pub String);

impl SiloAddress {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SiloAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ActivationId
// ---------------------------------------------------------------------------

/// Identity of one grain activation, distinguishing successive activations
/// of the same grain on the same or different silos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationId(pub Uuid);

impl ActivationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActivationId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RegistrationRank
// ---------------------------------------------------------------------------

/// Deterministic tie-breaker for competing registrations of the same grain.
///
/// Shaped like the teacher crate's HLC `Timestamp` (physical millis, logical
/// counter, then node identity) for the same reason: a total order that
/// degrades gracefully when two registrations land in the same millisecond.
/// Ordering is `millis`, then `counter`, then `silo` — higher wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationRank {
    pub millis: u64,
    pub counter: u32,
    pub silo: SiloAddress,
}

impl RegistrationRank {
    #[must_use]
    pub fn new(millis: u64, counter: u32, silo: SiloAddress) -> Self {
        Self {
            millis,
            counter,
            silo,
        }
    }
}

impl Ord for RegistrationRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis
            .cmp(&other.millis)
            .then_with(|| self.counter.cmp(&other.counter))
            .then_with(|| self.silo.cmp(&other.silo))
    }
}

impl PartialOrd for RegistrationRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// GrainAddress
// ---------------------------------------------------------------------------

/// A single registered activation: which grain, on which silo, as which
/// activation. Equality is on the full tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrainAddress {
    pub grain_id: GrainId,
    pub silo: SiloAddress,
    pub activation_id: ActivationId,
}

impl GrainAddress {
    #[must_use]
    pub fn new(grain_id: GrainId, silo: SiloAddress, activation_id: ActivationId) -> Self {
        Self {
            grain_id,
            silo,
            activation_id,
        }
    }
}

// ---------------------------------------------------------------------------
// GrainInfo
// ---------------------------------------------------------------------------

/// The partition-local record for a [`GrainId`].
///
/// `addresses` holds exactly one entry in the steady state: `merge` and
/// `register` on [`crate::partition::Partition`] both resolve a rank
/// collision immediately, handing the losing address to the duplicate
/// reconciler (see `directory-manager::reconciler`) rather than keeping it
/// on the record. `is_single_activation` / `toList()` exist for callers
/// that still want to guard against a non-single entry reaching them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainInfo {
    pub addresses: Vec<GrainAddress>,
    pub rank: RegistrationRank,
}

impl GrainInfo {
    #[must_use]
    pub fn single(address: GrainAddress, rank: RegistrationRank) -> Self {
        Self {
            addresses: vec![address],
            rank,
        }
    }

    /// `true` when this record has settled to exactly one activation.
    #[must_use]
    pub fn is_single_activation(&self) -> bool {
        self.addresses.len() == 1
    }
}
