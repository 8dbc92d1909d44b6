//! Concurrent store of registered instruments.
//!
//! Two `DashMap`s hold instruments by id: `applying` for installs in flight
//! (including deferred ones) and `live` for instruments whose patch is
//! installed. Readers never block each other. The three transitions that move
//! an id between stores ([`reserve`](InstrumentRegistry::reserve),
//! [`promote`](InstrumentRegistry::promote),
//! [`detach`](InstrumentRegistry::detach)) serialize on one short
//! `parking_lot` lock, so an id is in at most one store at any instant and a
//! removal can never slip between "leave applying" and "enter live".

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use liveprobe_core::{InstrumentId, LiveInstrument, LocationKey};

use crate::active::ActiveInstrument;

/// Applying and live stores keyed by instrument id.
#[derive(Default)]
pub struct InstrumentRegistry {
    live: DashMap<InstrumentId, Arc<ActiveInstrument>>,
    applying: DashMap<InstrumentId, Arc<ActiveInstrument>>,
    transition: Mutex<()>,
}

impl InstrumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a new instrument into the applying store, or hand back the
    /// entry already registered under its id.
    pub fn reserve(
        &self,
        active: Arc<ActiveInstrument>,
    ) -> Result<Arc<ActiveInstrument>, Arc<ActiveInstrument>> {
        let _guard = self.transition.lock();
        if let Some(existing) = self.get(active.id()) {
            return Err(existing);
        }
        let _ = self
            .applying
            .insert(active.id().clone(), Arc::clone(&active));
        Ok(active)
    }

    /// Move an applying instrument to the live store. `None` if it was
    /// detached meanwhile.
    pub fn promote(&self, id: &str) -> Option<Arc<ActiveInstrument>> {
        let _guard = self.transition.lock();
        let active = self.applying.get(id).map(|e| Arc::clone(e.value()))?;
        if active.is_removal_requested() {
            return None;
        }
        let _ = self.applying.remove(id);
        active.mark_live();
        let _ = self.live.insert(active.id().clone(), Arc::clone(&active));
        Some(active)
    }

    /// Take the instrument out of whichever store holds it.
    pub fn detach(&self, id: &str) -> Option<Arc<ActiveInstrument>> {
        let _guard = self.transition.lock();
        let (_, active) = self
            .live
            .remove(id)
            .or_else(|| self.applying.remove(id))?;
        let _ = active.request_removal();
        Some(active)
    }

    /// Entry in either store.
    pub fn get(&self, id: &str) -> Option<Arc<ActiveInstrument>> {
        self.live
            .get(id)
            .or_else(|| self.applying.get(id))
            .map(|e| Arc::clone(e.value()))
    }

    /// Live entry.
    pub fn get_live(&self, id: &str) -> Option<Arc<ActiveInstrument>> {
        self.live.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Applying entry.
    pub fn get_applying(&self, id: &str) -> Option<Arc<ActiveInstrument>> {
        self.applying.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Whether the id is applying or live.
    pub fn contains(&self, id: &str) -> bool {
        self.live.contains_key(id) || self.applying.contains_key(id)
    }

    /// Instruments at `location` in either store (see [`LocationKey::matches`]).
    pub fn find_by_location(&self, location: &LocationKey) -> Vec<Arc<ActiveInstrument>> {
        let mut seen = HashSet::new();
        self.applying
            .iter()
            .chain(self.live.iter())
            .filter(|e| e.value().location().matches(location))
            .filter(|e| seen.insert(e.key().clone()))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Copy of the live store's instruments.
    pub fn snapshot(&self) -> Vec<LiveInstrument> {
        self.live
            .iter()
            .map(|e| e.value().instrument().clone())
            .collect()
    }

    /// Ids in either store whose `expires_at` has passed at `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<InstrumentId> {
        self.applying
            .iter()
            .chain(self.live.iter())
            .filter(|e| e.value().instrument().is_expired_at(now))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Number of live instruments.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Number of instruments still applying.
    pub fn applying_count(&self) -> usize {
        self.applying.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let _guard = self.transition.lock();
        for entry in self.applying.iter().chain(self.live.iter()) {
            let _ = entry.value().request_removal();
        }
        self.applying.clear();
        self.live.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn active(id: &str, unit: &str, line: u32) -> Arc<ActiveInstrument> {
        Arc::new(
            ActiveInstrument::new(LiveInstrument::breakpoint(id, LocationKey::new(unit, line)))
                .unwrap(),
        )
    }

    #[test]
    fn reserve_then_promote() {
        let reg = InstrumentRegistry::new();
        assert!(reg.reserve(active("a", "U", 10)).is_ok());
        assert_eq!(reg.applying_count(), 1);
        assert!(reg.get_live("a").is_none());

        let live = reg.promote("a").unwrap();
        assert!(live.is_live());
        assert_eq!(reg.applying_count(), 0);
        assert_eq!(reg.live_count(), 1);
        assert!(reg.get_applying("a").is_none());
    }

    #[test]
    fn duplicate_reserve_returns_existing() {
        let reg = InstrumentRegistry::new();
        let first = reg.reserve(active("a", "U", 10)).unwrap();
        let dup = reg.reserve(active("a", "U", 99)).unwrap_err();
        assert!(Arc::ptr_eq(&first, &dup));
        let _ = reg.promote("a");
        let dup = reg.reserve(active("a", "U", 99)).unwrap_err();
        assert_eq!(dup.location().line, 10);
    }

    #[test]
    fn detach_during_apply_blocks_promotion() {
        let reg = InstrumentRegistry::new();
        let _ = reg.reserve(active("a", "U", 10)).unwrap();
        let detached = reg.detach("a").unwrap();
        assert!(!detached.is_live());
        assert!(reg.promote("a").is_none());
        assert!(!reg.contains("a"));
    }

    #[test]
    fn detach_live_reports_live() {
        let reg = InstrumentRegistry::new();
        let _ = reg.reserve(active("a", "U", 10)).unwrap();
        let _ = reg.promote("a");
        let detached = reg.detach("a").unwrap();
        assert!(detached.is_live());
        assert!(detached.is_removal_requested());
        assert!(reg.detach("a").is_none());
    }

    #[test]
    fn find_by_location_unions_both_stores() {
        let reg = InstrumentRegistry::new();
        let _ = reg.reserve(active("a", "U", 10)).unwrap();
        let _ = reg.promote("a");
        let _ = reg.reserve(active("c", "U", 10)).unwrap();
        let _ = reg.reserve(active("d", "U", 11)).unwrap();
        let _ = reg.reserve(active("e", "U$Inner", 10)).unwrap();

        let mut ids: Vec<_> = reg
            .find_by_location(&LocationKey::new("U", 10))
            .iter()
            .map(|a| a.id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c", "e"]);
    }

    #[test]
    fn snapshot_is_a_copy_of_live_only() {
        let reg = InstrumentRegistry::new();
        let _ = reg.reserve(active("a", "U", 10)).unwrap();
        let _ = reg.promote("a");
        let _ = reg.reserve(active("b", "U", 10)).unwrap();
        let snap = reg.snapshot();
        let _ = reg.detach("a");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id.as_str(), "a");
    }

    #[test]
    fn expired_scans_both_stores() {
        let now = Utc.timestamp_millis_opt(10_000).unwrap();
        let past = Utc.timestamp_millis_opt(5_000).unwrap();
        let future = Utc.timestamp_millis_opt(50_000).unwrap();
        let reg = InstrumentRegistry::new();
        let mk = |id: &str, at| {
            Arc::new(
                ActiveInstrument::new(
                    LiveInstrument::breakpoint(id, LocationKey::new("U", 1)).with_expires_at(at),
                )
                .unwrap(),
            )
        };
        let _ = reg.reserve(mk("old-live", past)).unwrap();
        let _ = reg.promote("old-live");
        let _ = reg.reserve(mk("old-applying", past)).unwrap();
        let _ = reg.reserve(mk("fresh", future)).unwrap();

        let mut expired: Vec<_> = reg.expired(now).into_iter().map(String::from).collect();
        expired.sort();
        assert_eq!(expired, vec!["old-applying", "old-live"]);
    }

    #[test]
    fn clear_marks_removal() {
        let reg = InstrumentRegistry::new();
        let a = reg.reserve(active("a", "U", 10)).unwrap();
        reg.clear();
        assert!(a.is_removal_requested());
        assert_eq!(reg.live_count() + reg.applying_count(), 0);
    }

    #[test]
    fn concurrent_reserve_admits_one() {
        let reg = Arc::new(InstrumentRegistry::new());
        let wins: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let reg = Arc::clone(&reg);
                    s.spawn(move || usize::from(reg.reserve(active("dup", "U", 1)).is_ok()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(wins, 1);
    }
}
