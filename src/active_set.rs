use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::decoder_state::DecoderState;

// -------------------------------------------------------------------------------------------------

/// A small fixed-capacity set of `DecoderState` slots (§2, §4.3).
///
/// Each slot is an `AtomicPtr<DecoderState>`; a non-null value is an owning pointer released
/// into the slot via `Box::into_raw` on insert, and reclaimed via `Box::from_raw` on removal.
/// `current`/`next_after` only ever dereference a pointer they have just loaded and never take
/// ownership of it, so they are safe to call concurrently with `try_insert` (worker thread) and
/// `reclaim_if_marked` (collector thread) without any lock: a slot can only go non-null -> null
/// from the collector, and the collector only clears a slot whose state the render path itself
/// marked `ready_for_collection`, so no render pass still in flight can be holding a reference to
/// a state the collector is about to free (§4.6).
pub struct ActiveSet {
    slots: [AtomicPtr<DecoderState>; Self::CAPACITY],
}

impl ActiveSet {
    pub const CAPACITY: usize = 8;

    pub fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// Attempt to claim an empty slot for `state`. Returns `false` (and hands `state` back) if
    /// every slot is occupied.
    pub fn try_insert(&self, state: Box<DecoderState>) -> Result<(), Box<DecoderState>> {
        let ptr = Box::into_raw(state);
        for slot in &self.slots {
            if slot
                .compare_exchange(ptr::null_mut(), ptr, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
        // Safety: `ptr` was never published to any slot, so we still exclusively own it.
        Err(unsafe { Box::from_raw(ptr) })
    }

    fn loaded_slots(&self) -> impl Iterator<Item = &DecoderState> + '_ {
        self.slots.iter().filter_map(|slot| {
            let ptr = slot.load(Ordering::Acquire);
            if ptr.is_null() {
                None
            } else {
                // Safety: see struct-level comment.
                Some(unsafe { &*ptr })
            }
        })
    }

    /// The smallest-timestamp state that is neither fully rendered nor ready for collection.
    pub fn current(&self) -> Option<&DecoderState> {
        self.loaded_slots()
            .filter(|state| !state.ready_for_collection() && !state.is_fully_rendered())
            .min_by_key(|state| state.timestamp)
    }

    /// The smallest-timestamp state whose timestamp is strictly greater than `ts`, ignoring
    /// collection-ready ones.
    pub fn next_after(&self, ts: u64) -> Option<&DecoderState> {
        self.loaded_slots()
            .filter(|state| state.timestamp > ts && !state.ready_for_collection())
            .min_by_key(|state| state.timestamp)
    }

    /// Scan for slots whose state is `ready_for_collection`, CAS them back to empty, and drop
    /// the reclaimed states. Returns the number reclaimed. Only ever called from the Collector
    /// thread.
    pub fn reclaim_if_marked(&self) -> usize {
        let mut reclaimed = 0;
        for slot in &self.slots {
            let ptr = slot.load(Ordering::Acquire);
            if ptr.is_null() {
                continue;
            }
            // Safety: still valid, nobody else has reclaimed it yet (only this thread reclaims).
            let ready = unsafe { (*ptr).ready_for_collection() };
            if !ready {
                continue;
            }
            if slot
                .compare_exchange(ptr, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Safety: this slot held an owning pointer released via `Box::into_raw`, and we
                // just exclusively claimed it back via CAS.
                drop(unsafe { Box::from_raw(ptr) });
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Number of occupied slots. Used by tests and by `PlayerController::stop` to know whether
    /// there is anything left to mark.
    pub fn len(&self) -> usize {
        self.loaded_slots().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to every occupied state. Used by `Stop()` to mark every active decoder.
    pub fn for_each(&self, mut f: impl FnMut(&DecoderState)) {
        for state in self.loaded_slots() {
            f(state);
        }
    }
}

impl Default for ActiveSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveSet {
    fn drop(&mut self) {
        for slot in &self.slots {
            let ptr = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !ptr.is_null() {
                // Safety: each non-null slot still holds the single owning pointer for its state.
                drop(unsafe { Box::from_raw(ptr) });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PcmFormat;
    use crate::test_support::ToneDecoder;

    fn state(ts: u64) -> Box<DecoderState> {
        Box::new(DecoderState::new(
            Box::new(ToneDecoder::new(PcmFormat::new(1, 1000), 1000)),
            ts,
            64,
        ))
    }

    #[test]
    fn current_picks_smallest_timestamp_among_live_states() {
        let set = ActiveSet::new();
        set.try_insert(state(20)).unwrap();
        set.try_insert(state(10)).unwrap();
        set.try_insert(state(30)).unwrap();
        assert_eq!(set.current().unwrap().timestamp, 10);
    }

    #[test]
    fn current_skips_fully_rendered_and_collection_ready_states() {
        let set = ActiveSet::new();
        set.try_insert(state(10)).unwrap();
        set.try_insert(state(20)).unwrap();
        // Mark the earliest one finished; the other should become current.
        set.current().unwrap().set_total_frames(0);
        assert_eq!(set.current().unwrap().timestamp, 20);
    }

    #[test]
    fn next_after_walks_in_timestamp_order() {
        let set = ActiveSet::new();
        set.try_insert(state(10)).unwrap();
        set.try_insert(state(20)).unwrap();
        set.try_insert(state(30)).unwrap();
        assert_eq!(set.next_after(10).unwrap().timestamp, 20);
        assert_eq!(set.next_after(20).unwrap().timestamp, 30);
        assert!(set.next_after(30).is_none());
    }

    #[test]
    fn insert_fails_once_all_eight_slots_are_full() {
        let set = ActiveSet::new();
        for i in 0..ActiveSet::CAPACITY as u64 {
            set.try_insert(state(i)).unwrap();
        }
        assert!(set.try_insert(state(999)).is_err());
    }

    #[test]
    fn reclaim_only_removes_marked_states() {
        let set = ActiveSet::new();
        set.try_insert(state(10)).unwrap();
        set.try_insert(state(20)).unwrap();
        assert_eq!(set.reclaim_if_marked(), 0);
        set.current().unwrap().mark_ready_for_collection();
        assert_eq!(set.reclaim_if_marked(), 1);
        assert_eq!(set.len(), 1);
        assert_eq!(set.current().unwrap().timestamp, 20);
    }
}
