//! One-shot timers polled by the host's event loop.
//!
//! Each timer carries a payload that is handed back when it fires. Nothing
//! runs on its own: the host calls [`TimerQueue::process_expired`] from its
//! loop, the same way it pumps any other timer source.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

/// An entry in the timer queue (min-heap by fire time).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.fire_time.cmp(&self.fire_time)
    }
}

/// A queue of pending one-shot timers with payloads.
pub struct TimerQueue<T> {
    timers: SlotMap<TimerId, T>,
    queue: BinaryHeap<TimerQueueEntry>,
}

impl<T> TimerQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    /// Start a timer that fires once after `duration`.
    pub fn start_one_shot(&mut self, duration: Duration, payload: T) -> TimerId {
        self.start_one_shot_at(Instant::now() + duration, payload)
    }

    /// Start a timer that fires once at `fire_time`.
    pub fn start_one_shot_at(&mut self, fire_time: Instant, payload: T) -> TimerId {
        let id = self.timers.insert(payload);
        self.queue.push(TimerQueueEntry { id, fire_time });
        id
    }

    /// Stop a timer, returning its payload if it had not fired yet.
    pub fn stop(&mut self, id: TimerId) -> Option<T> {
        self.timers.remove(id)
    }

    /// Check if a timer is still pending.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// Get the duration until the next timer fires, if any.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }

        self.queue
            .peek()
            .map(|entry| entry.fire_time.saturating_duration_since(Instant::now()))
    }

    /// Fire all timers due now.
    pub fn process_expired(&mut self) -> Vec<(TimerId, T)> {
        self.process_expired_at(Instant::now())
    }

    /// Fire all timers due at `now`.
    #[tracing::instrument(skip(self), target = "horizon_lattice_query::timer", level = "trace")]
    pub fn process_expired_at(&mut self, now: Instant) -> Vec<(TimerId, T)> {
        let mut fired = Vec::new();

        while let Some(entry) = self.queue.peek() {
            if entry.fire_time > now {
                break;
            }
            let Some(entry) = self.queue.pop() else {
                break;
            };

            // Stopped timers leave stale heap entries behind.
            let Some(payload) = self.timers.remove(entry.id) else {
                continue;
            };

            tracing::trace!(target: targets::TIMER, id = ?entry.id, "timer fired");
            fired.push((entry.id, payload));
        }

        fired
    }

    /// Get the number of pending timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Stop every timer.
    pub fn clear(&mut self) {
        self.timers.clear();
        self.queue.clear();
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
