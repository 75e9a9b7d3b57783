//! Data model and wire messages for the directory partition handoff
//! subsystem: grain/silo identities, the per-silo partition store, and the
//! handoff/registration messages exchanged between directory managers.
//!
//! The consistent-hash ring and the runtime (silo membership, scheduling,
//! RPC) are external collaborators, not modeled in this crate — see
//! `directory-manager::traits`.

pub mod messages;
pub mod partition;
pub mod types;

pub use messages::{
    AcceptExistingRegistrationsPayload, AcceptHandoffPartitionPayload, AcceptSplitPartitionPayload,
    DeleteActivationsPayload, DeleteActivationsReason, DirectoryMessage,
    RemoveHandoffPartitionPayload,
};
pub use partition::Partition;
pub use types::{ActivationId, GrainAddress, GrainId, GrainInfo, RegistrationRank, SiloAddress};
