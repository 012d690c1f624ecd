//! Session Buffer - bounded per-PID history of decoded readings

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use mecha_core::{Pid, Reading, Timestamp};

/// Per-PID ring of the N most recent readings
///
/// Eviction is strict FIFO per PID. `now` for window queries is the latest
/// `observed_at` pushed to the buffer, never the wall clock.
#[derive(Debug, Clone)]
pub struct SessionBuffer {
    capacity: usize,
    rings: BTreeMap<Pid, VecDeque<Reading>>,
    latest_observed: Option<Timestamp>,
}

impl SessionBuffer {
    /// Create a buffer holding at most `capacity` readings per PID
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: BTreeMap::new(),
            latest_observed: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a reading, evicting the oldest one for its PID when full
    pub fn push(&mut self, reading: Reading) {
        if self
            .latest_observed
            .map_or(true, |latest| reading.observed_at > latest)
        {
            self.latest_observed = Some(reading.observed_at);
        }

        let capacity = self.capacity;
        let ring = self
            .rings
            .entry(reading.pid)
            .or_insert_with(|| VecDeque::with_capacity(capacity.min(64)));
        if ring.len() == capacity {
            ring.pop_front();
        }
        ring.push_back(reading);
    }

    /// Readings of `pid` within `[now - duration, now]`, ascending by time
    pub fn window(&self, pid: Pid, duration: Duration) -> Vec<Reading> {
        match self.latest_observed {
            Some(now) => self.range(pid, window_start(now, duration), now),
            None => Vec::new(),
        }
    }

    /// Readings of `pid` within `[start, end]`, ascending by time
    pub fn range(&self, pid: Pid, start: Timestamp, end: Timestamp) -> Vec<Reading> {
        let Some(ring) = self.rings.get(&pid) else {
            return Vec::new();
        };
        let mut readings: Vec<Reading> = ring
            .iter()
            .filter(|r| r.observed_at >= start && r.observed_at <= end)
            .cloned()
            .collect();
        // Stable: equal timestamps keep arrival order
        readings.sort_by_key(|r| r.observed_at);
        readings
    }

    /// Readings of every PID within `[start, end]`, grouped by PID
    pub fn range_all(&self, start: Timestamp, end: Timestamp) -> Vec<Reading> {
        self.rings
            .keys()
            .flat_map(|pid| self.range(*pid, start, end))
            .collect()
    }

    /// Readings of every PID within `duration` of `now`, grouped by PID
    pub fn window_all(&self, duration: Duration) -> Vec<Reading> {
        match self.latest_observed {
            Some(now) => self.range_all(window_start(now, duration), now),
            None => Vec::new(),
        }
    }

    /// Most recently pushed reading for `pid`
    pub fn latest(&self, pid: Pid) -> Option<&Reading> {
        self.rings.get(&pid).and_then(|ring| ring.back())
    }

    /// Most recent reading of every PID, ordered by PID
    pub fn latest_all(&self) -> Vec<Reading> {
        self.rings
            .values()
            .filter_map(|ring| ring.back().cloned())
            .collect()
    }

    /// PIDs with at least one buffered reading
    pub fn pids(&self) -> Vec<Pid> {
        self.rings.keys().copied().collect()
    }

    /// Total buffered readings across all PIDs
    pub fn len(&self) -> usize {
        self.rings.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.values().all(VecDeque::is_empty)
    }

    /// Latest `observed_at` seen by this buffer
    pub fn now(&self) -> Option<Timestamp> {
        self.latest_observed
    }
}

/// `now - duration`, saturating at the earliest representable time
fn window_start(now: Timestamp, duration: Duration) -> Timestamp {
    now.checked_sub_signed(duration)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
