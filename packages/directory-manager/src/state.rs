//! Concurrent state owned by one silo's directory partition manager.
//!
//! Per the Design Notes decision to replace a blanket manager mutex with
//! single-owner discipline: `DashMap` covers the mirrored copies (the only
//! place local event handling and remotely-invoked receivers can race on
//! the same key), `parking_lot::RwLock` covers the ordered follower list,
//! and the authoritative partition sits behind a `parking_lot::Mutex` since
//! none of its call sites hold the lock across an `.await`. Mirrors the
//! teacher's `ClusterPartitionTable` (`DashMap<u32, PartitionMeta>` plus an
//! `AtomicU64` version) and `PhiAccrualFailureDetector`'s
//! `parking_lot::RwLock<HashMap<..>>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use directory_core::{GrainAddress, Partition, SiloAddress};
use parking_lot::{Mutex, RwLock};

/// The directory state owned by one silo.
pub struct DirectoryState {
    /// This silo's own share of the directory — the partition it is
    /// authoritative for.
    authoritative: Mutex<Partition>,
    /// Mirrored copies of other silos' partitions, held while this silo is
    /// somewhere in their follower/forwarding chain. Keyed by the
    /// partition's source silo (`spec.md` §3 invariant I1).
    mirrored: DashMap<SiloAddress, Partition>,
    /// This silo's own followers, in successor order (nearest first).
    /// Reset to empty at the start of every membership event
    /// (`spec.md` §4.4 `ResetFollowers`); repopulated externally as peers
    /// (re-)register themselves as followers, which is out of this crate's
    /// scope.
    followers: RwLock<Vec<SiloAddress>>,
    /// Mirrors `localDirectory.Running` (`spec.md` §5): queued async
    /// operations check this on entry and return early once it flips to
    /// `false`. Synchronous entry points are unaffected — they always run.
    running: AtomicBool,
}

impl DirectoryState {
    #[must_use]
    pub fn new(authoritative: Partition) -> Self {
        Self {
            authoritative: Mutex::new(authoritative),
            mirrored: DashMap::new(),
            followers: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Runs `f` with exclusive access to the authoritative partition. Never
    /// call this from a scope that also awaits — see module docs.
    pub fn with_authoritative<R>(&self, f: impl FnOnce(&mut Partition) -> R) -> R {
        let mut guard = self.authoritative.lock();
        f(&mut guard)
    }

    #[must_use]
    pub fn authoritative_snapshot(&self) -> Partition {
        self.authoritative.lock().clone()
    }

    /// Inserts or replaces the mirrored copy kept for `source`.
    pub fn set_mirrored(&self, source: SiloAddress, partition: Partition) {
        self.mirrored.insert(source, partition);
    }

    #[must_use]
    pub fn has_mirrored(&self, source: &SiloAddress) -> bool {
        self.mirrored.contains_key(source)
    }

    /// Runs `f` with exclusive access to the mirrored copy kept for
    /// `source`, if any.
    pub fn with_mirrored<R>(&self, source: &SiloAddress, f: impl FnOnce(&mut Partition) -> R) -> Option<R> {
        self.mirrored.get_mut(source).map(|mut entry| f(&mut entry))
    }

    /// Merges `incoming` onto the mirrored copy kept for `target`
    /// (`spec.md` §4.1 `merge`), creating an empty copy first if `target`
    /// was not already tracked — there is nothing to report as a duplicate
    /// in that case.
    #[must_use]
    pub fn merge_mirrored_or_insert(
        &self,
        target: &SiloAddress,
        incoming: &Partition,
    ) -> HashMap<SiloAddress, Vec<GrainAddress>> {
        match self.mirrored.get_mut(target) {
            Some(mut existing) => existing.merge(incoming),
            None => {
                self.mirrored.insert(target.clone(), incoming.clone());
                HashMap::new()
            }
        }
    }

    /// Ensures a mirrored entry exists for `source` (synthesizing an empty
    /// one if absent — `spec.md` §4.5/P6) and runs `f` against it. `f`
    /// receives whether the entry already existed before this call.
    pub fn mirrored_entry_or_create<R>(&self, source: &SiloAddress, f: impl FnOnce(&mut Partition, bool) -> R) -> R {
        let existed = self.mirrored.contains_key(source);
        let mut entry = self.mirrored.entry(source.clone()).or_insert_with(Partition::new);
        f(&mut entry, existed)
    }

    /// Removes the mirrored copy kept for `source`, if any. Idempotent:
    /// calling this when nothing is tracked for `source` is not an error
    /// (`spec.md` §4.5).
    pub fn remove_mirrored(&self, source: &SiloAddress) -> Option<Partition> {
        self.mirrored.remove(source).map(|(_, p)| p)
    }

    #[must_use]
    pub fn mirrored_snapshot(&self, source: &SiloAddress) -> Option<Partition> {
        self.mirrored.get(source).map(|entry| entry.clone())
    }

    /// The first mirrored key not present in `keep` — used by
    /// `process_silo_added` to evict one stale entry per add event
    /// (`spec.md` §4.3 step 5, Design Notes: "one per event is sufficient").
    #[must_use]
    pub fn find_stale_mirrored(&self, keep: &[SiloAddress]) -> Option<SiloAddress> {
        self.mirrored.iter().map(|entry| entry.key().clone()).find(|key| !keep.contains(key))
    }

    #[must_use]
    pub fn followers(&self) -> Vec<SiloAddress> {
        self.followers.read().clone()
    }

    /// Appends `silo` to the end of the follower chain if absent. Follower
    /// registration is externally driven (`spec.md` §4.4: "Followers are
    /// added externally"); this just gives a host runtime somewhere to put
    /// that registration.
    pub fn add_follower(&self, silo: SiloAddress) {
        let mut guard = self.followers.write();
        if !guard.contains(&silo) {
            guard.push(silo);
        }
    }

    /// Drains and returns the entire follower list, leaving it empty —
    /// `spec.md` §4.4 `ResetFollowers`, called at the start of both
    /// `ProcessSiloAdd` and `ProcessSiloRemove`.
    pub fn take_followers(&self) -> Vec<SiloAddress> {
        std::mem::take(&mut *self.followers.write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory_core::{ActivationId, GrainId, RegistrationRank};

    fn sample_partition(grain: &str, silo: &str) -> Partition {
        let mut p = Partition::new();
        p.register(
            GrainId::new(grain),
            GrainAddress::new(GrainId::new(grain), SiloAddress::new(silo), ActivationId::new()),
            RegistrationRank::new(1, 0, SiloAddress::new(silo)),
        );
        p
    }

    #[test]
    fn merge_mirrored_or_insert_creates_entry_when_absent() {
        let state = DirectoryState::new(Partition::new());
        let delta = sample_partition("g1", "s1");
        let duplicates = state.merge_mirrored_or_insert(&SiloAddress::new("s1"), &delta);
        assert!(duplicates.is_empty());
        assert_eq!(state.mirrored_snapshot(&SiloAddress::new("s1")).unwrap().len(), 1);
    }

    #[test]
    fn merge_mirrored_or_insert_merges_onto_existing_copy() {
        let state = DirectoryState::new(Partition::new());
        state.set_mirrored(SiloAddress::new("s1"), Partition::new());
        let delta = sample_partition("g1", "s1");
        let duplicates = state.merge_mirrored_or_insert(&SiloAddress::new("s1"), &delta);
        assert!(duplicates.is_empty());
        assert_eq!(state.mirrored_snapshot(&SiloAddress::new("s1")).unwrap().len(), 1);
    }

    #[test]
    fn mirrored_entry_or_create_reports_whether_it_already_existed() {
        let state = DirectoryState::new(Partition::new());
        let existed = state.mirrored_entry_or_create(&SiloAddress::new("s1"), |_, existed| existed);
        assert!(!existed);
        let existed_again = state.mirrored_entry_or_create(&SiloAddress::new("s1"), |_, existed| existed);
        assert!(existed_again);
    }

    #[test]
    fn find_stale_mirrored_finds_key_not_in_keep_list() {
        let state = DirectoryState::new(Partition::new());
        state.set_mirrored(SiloAddress::new("s1"), Partition::new());
        state.set_mirrored(SiloAddress::new("s2"), Partition::new());

        let stale = state.find_stale_mirrored(&[SiloAddress::new("s2")]);
        assert_eq!(stale, Some(SiloAddress::new("s1")));
    }

    #[test]
    fn find_stale_mirrored_returns_none_when_all_kept() {
        let state = DirectoryState::new(Partition::new());
        state.set_mirrored(SiloAddress::new("s1"), Partition::new());
        assert!(state.find_stale_mirrored(&[SiloAddress::new("s1")]).is_none());
    }

    #[test]
    fn followers_preserve_insertion_order_and_dedupe() {
        let state = DirectoryState::new(Partition::new());
        state.add_follower(SiloAddress::new("s1"));
        state.add_follower(SiloAddress::new("s2"));
        state.add_follower(SiloAddress::new("s1"));
        assert_eq!(state.followers(), vec![SiloAddress::new("s1"), SiloAddress::new("s2")]);
    }

    #[test]
    fn take_followers_drains_the_list() {
        let state = DirectoryState::new(Partition::new());
        state.add_follower(SiloAddress::new("s1"));
        let taken = state.take_followers();
        assert_eq!(taken, vec![SiloAddress::new("s1")]);
        assert!(state.followers().is_empty());
    }

    #[test]
    fn with_authoritative_mutates_in_place() {
        let state = DirectoryState::new(Partition::new());
        state.with_authoritative(|p| {
            p.register(
                GrainId::new("g1"),
                GrainAddress::new(GrainId::new("g1"), SiloAddress::new("s0"), ActivationId::new()),
                RegistrationRank::new(1, 0, SiloAddress::new("s0")),
            );
        });
        assert_eq!(state.authoritative_snapshot().len(), 1);
    }

    #[test]
    fn running_flag_defaults_to_false() {
        let state = DirectoryState::new(Partition::new());
        assert!(!state.is_running());
        state.set_running(true);
        assert!(state.is_running());
    }
}
