//! Partition store: the map of [`GrainId`] to [`GrainInfo`] owned by one
//! silo's share of the directory, plus the operations used during handoff
//! (copy, merge, split) and normal registration (set, update, remove).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{GrainAddress, GrainId, GrainInfo, RegistrationRank};

/// One silo's slice of the grain directory.
///
/// Internally a plain `HashMap`; concurrent access across call paths is the
/// caller's responsibility (`directory-manager` wraps the authoritative
/// partition in a `parking_lot::Mutex` and mirrored copies in a `DashMap`
/// keyed by source silo — see its `state` module).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Partition {
    entries: HashMap<GrainId, GrainInfo>,
}

impl Partition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, grain_id: &GrainId) -> Option<&GrainInfo> {
        self.entries.get(grain_id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &GrainId> {
        self.entries.keys()
    }

    /// Registers a single incoming address against any existing entry for
    /// `grain_id`, applying the same tie-break rule as [`Partition::merge`].
    /// Returns the winning address — the caller compares it against the one
    /// it passed in to tell whether its own registration lost
    /// (`spec.md` §4.5.1).
    pub fn register(&mut self, grain_id: GrainId, address: GrainAddress, rank: RegistrationRank) -> GrainAddress {
        match self.entries.get(&grain_id) {
            None => {
                self.entries.insert(grain_id, GrainInfo::single(address.clone(), rank));
                address
            }
            Some(existing) => {
                let incoming = GrainInfo::single(address.clone(), rank);
                if Self::incoming_wins(existing, &incoming) {
                    self.entries.insert(grain_id, incoming);
                    address
                } else {
                    existing.addresses[0].clone()
                }
            }
        }
    }

    /// Replace every entry in `self` with `other`'s entries wholesale (a
    /// full-copy handoff, `spec.md` §4.1 `set(dict)`).
    pub fn set(&mut self, other: Partition) {
        self.entries = other.entries;
    }

    /// Merge `other`'s entries into `self`, key by key; the incoming record
    /// always supersedes whatever is already there, with no rank
    /// comparison (`spec.md` §4.1 `update(dict)`). This is the delta-handoff
    /// primitive, distinct from [`Partition::merge`]'s tie-break semantics.
    pub fn update(&mut self, other: &Partition) {
        for (grain_id, info) in &other.entries {
            self.entries.insert(grain_id.clone(), info.clone());
        }
    }

    /// Remove and return the entry for `grain_id`, if present.
    pub fn remove(&mut self, grain_id: &GrainId) -> Option<GrainInfo> {
        self.entries.remove(grain_id)
    }

    /// Single-activation entries only — the subset exposed across handoff
    /// and registration APIs.
    #[must_use]
    pub fn to_list(&self) -> Vec<(GrainId, GrainInfo)> {
        self.entries
            .iter()
            .filter(|(_, info)| info.is_single_activation())
            .map(|(id, info)| (id.clone(), info.clone()))
            .collect()
    }

    /// Merge `other` into `self`, entry by entry, returning every losing
    /// activation grouped by the silo that hosts it (`spec.md` §4.1
    /// `merge(other) -> duplicates`).
    ///
    /// Tie-break rule (fixed, see `DESIGN.md`): on a key collision, the
    /// entry with the higher [`RegistrationRank`] wins; if ranks are
    /// exactly equal, the entry whose rank's silo sorts higher
    /// (lexicographic) wins. The losing entry's addresses are removed from
    /// the partition and returned so the caller can hand them to the
    /// duplicate reconciler (`spec.md` §4.6) instead of silently dropping
    /// them. This keeps merge commutative and idempotent regardless of
    /// which side is called `self`.
    #[must_use]
    pub fn merge(&mut self, other: &Partition) -> HashMap<crate::types::SiloAddress, Vec<GrainAddress>> {
        let mut duplicates: HashMap<crate::types::SiloAddress, Vec<GrainAddress>> = HashMap::new();

        for (grain_id, incoming) in &other.entries {
            match self.entries.get(grain_id).cloned() {
                None => {
                    self.entries.insert(grain_id.clone(), incoming.clone());
                }
                Some(existing) => {
                    let (winner, loser) = if Self::incoming_wins(&existing, incoming) {
                        (incoming.clone(), existing)
                    } else {
                        (existing, incoming.clone())
                    };
                    for addr in loser.addresses {
                        duplicates.entry(addr.silo.clone()).or_default().push(addr);
                    }
                    self.entries.insert(grain_id.clone(), winner);
                }
            }
        }

        duplicates
    }

    fn incoming_wins(existing: &GrainInfo, incoming: &GrainInfo) -> bool {
        match incoming.rank.cmp(&existing.rank) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => incoming.rank.silo > existing.rank.silo,
        }
    }

    /// Splits off every entry whose [`GrainId`] satisfies `predicate` (a
    /// ring-ownership test supplied by the caller; the ring itself is an
    /// external collaborator, see `directory-manager::traits::Ring`).
    ///
    /// When `modify_original` is `true`, matching entries are removed from
    /// `self` immediately (used wherever the source is free to drop its
    /// copy as soon as the split is computed). When `false`, `self` is left
    /// untouched and the split-off partition is a clone — used where a
    /// handoff must be acknowledged by its peer before the source gives up
    /// its copy (`spec.md` §4.1 `split(predicate, modifyOriginal)`).
    #[must_use]
    pub fn split<F>(&mut self, predicate: F, modify_original: bool) -> Partition
    where
        F: Fn(&GrainId) -> bool,
    {
        if modify_original {
            let (moved, kept): (HashMap<_, _>, HashMap<_, _>) =
                self.entries.drain().partition(|(grain_id, _)| predicate(grain_id));
            self.entries = kept;
            Partition { entries: moved }
        } else {
            Partition {
                entries: self
                    .entries
                    .iter()
                    .filter(|(grain_id, _)| predicate(grain_id))
                    .map(|(id, info)| (id.clone(), info.clone()))
                    .collect(),
            }
        }
    }

    /// Removes every key present in `keys` from `self`. Used to retire
    /// entries only after a handoff peer has acknowledged them.
    pub fn remove_keys<'a, I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = &'a GrainId>,
    {
        for key in keys {
            self.entries.remove(key);
        }
    }
}
