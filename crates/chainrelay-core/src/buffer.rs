//! Transient per-kind occurrence counters.
//!
//! The buffer only has to carry counts to the next flush; payloads are
//! forwarded to subscribers immediately and then discarded.

use indexmap::IndexMap;
use std::sync::Mutex;
use tracing::warn;

use crate::types::EventKind;

/// Counter store drained at every flush boundary.
///
/// `push` and `drain_all` must be mutually exclusive: an increment lands
/// either in the current drain or in the next one, never in both and never in
/// neither.
pub trait EventBuffer: Send + Sync {
    /// Count one occurrence of `kind`. Returns `false` if `kind` is not tracked.
    fn push(&self, kind: &EventKind) -> bool;

    /// Occurrences of `kind` buffered since the last drain.
    fn count_of(&self, kind: &EventKind) -> u64;

    /// Atomically take every nonzero counter and reset it to zero.
    /// Entries come back in tracked order.
    fn drain_all(&self) -> IndexMap<EventKind, u64>;

    /// The fixed set of kinds this buffer counts.
    fn tracked_kinds(&self) -> Vec<EventKind>;
}

/// In-process `EventBuffer` guarded by a single mutex.
pub struct MemoryEventBuffer {
    counts: Mutex<IndexMap<EventKind, u64>>,
}

impl MemoryEventBuffer {
    pub fn new(tracked: impl IntoIterator<Item = EventKind>) -> Self {
        let counts = tracked.into_iter().map(|k| (k, 0)).collect();
        Self {
            counts: Mutex::new(counts),
        }
    }

    /// Sum of all buffered counters.
    pub fn total(&self) -> u64 {
        self.counts.lock().unwrap().values().sum()
    }
}

impl EventBuffer for MemoryEventBuffer {
    fn push(&self, kind: &EventKind) -> bool {
        match self.counts.lock().unwrap().get_mut(kind) {
            Some(count) => {
                *count += 1;
                true
            }
            None => {
                warn!(kind = %kind, "push for untracked event kind ignored");
                false
            }
        }
    }

    fn count_of(&self, kind: &EventKind) -> u64 {
        self.counts.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    fn drain_all(&self) -> IndexMap<EventKind, u64> {
        let mut counts = self.counts.lock().unwrap();
        let mut drained = IndexMap::new();
        for (kind, count) in counts.iter_mut() {
            if *count > 0 {
                drained.insert(kind.clone(), std::mem::take(count));
            }
        }
        drained
    }

    fn tracked_kinds(&self) -> Vec<EventKind> {
        self.counts.lock().unwrap().keys().cloned().collect()
    }
}
