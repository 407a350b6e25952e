//! Fixed-slot ring buffer decoupling jittery producers from the periodic
//! consumer.
//!
//! The ring holds `N >= 2` [`TimestepRecord`] slots with a lagging read
//! pointer. The permanent invariant is
//!
//! ```text
//! write_index == (read_index + 1) % N
//! ```
//!
//! so the record producers are mid-writing is never the one being read, and
//! there are `N - 1` other slots between the current write slot and its next
//! reuse. A producer more than `N - 1` ticks late therefore overwrites a
//! stale sample silently instead of corrupting a slot under read: staleness
//! is bounded to `N` ticks, bought with `O(N)` records of memory.
//!
//! Only the single consumer calls [`TimestepRingBuffer::advance`]; producers
//! never move the pointers and never block. The read index is an atomic so
//! producer threads observe pointer motion without a lock.

use crate::error::{AppResult, RoverError};
use crate::record::TimestepRecord;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Multi-producer / single-consumer ring of timestep records.
#[derive(Debug)]
pub struct TimestepRingBuffer {
    slots: Vec<TimestepRecord>,
    read_index: AtomicUsize,
}

impl TimestepRingBuffer {
    /// Creates a ring with `slots` records. Two is the minimum: one slot
    /// open for writing, one closed for reading.
    pub fn new(slots: usize) -> AppResult<Self> {
        if slots < 2 {
            return Err(RoverError::Precondition(format!(
                "ring buffer needs at least 2 slots, got {slots}"
            )));
        }
        let mut records = Vec::with_capacity(slots);
        records.resize_with(slots, TimestepRecord::new);
        Ok(Self {
            slots: records,
            read_index: AtomicUsize::new(0),
        })
    }

    /// Number of slots in the ring.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot currently closed for reading.
    pub fn read_index(&self) -> usize {
        self.read_index.load(Ordering::Acquire)
    }

    /// Index of the slot currently open for writing.
    pub fn write_index(&self) -> usize {
        (self.read_index() + 1) % self.slots.len()
    }

    /// The record producers append to right now.
    pub fn current_write(&self) -> &TimestepRecord {
        &self.slots[self.write_index()]
    }

    /// The record the consumer may read. Immutable by contract: only the
    /// consumer's `reset` (via [`advance`](Self::advance)) ever clears it.
    pub fn current_read(&self) -> &TimestepRecord {
        &self.slots[self.read_index()]
    }

    /// Moves both pointers forward by one slot. Consumer-only; called
    /// exactly once per scheduler tick.
    ///
    /// The slot that becomes the new write target is reset *before* the
    /// pointer move is published, so producers can never append to a slot
    /// that still carries stale samples.
    pub fn advance(&self) {
        let slots = self.slots.len();
        let new_read = (self.read_index.load(Ordering::Relaxed) + 1) % slots;
        let new_write = (new_read + 1) % slots;
        self.slots[new_write].reset();
        self.read_index.store(new_read, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{timestamp_micros, WheelSample};
    use std::sync::Arc;

    fn wheel(left: i64) -> WheelSample {
        WheelSample {
            timestamp_us: timestamp_micros(),
            left_count: left,
            right_count: left,
        }
    }

    #[test]
    fn rejects_rings_smaller_than_two() {
        assert!(TimestepRingBuffer::new(0).is_err());
        assert!(TimestepRingBuffer::new(1).is_err());
        assert!(TimestepRingBuffer::new(2).is_ok());
    }

    #[test]
    fn write_index_tracks_read_index_for_any_size() {
        for slots in 2..=7 {
            let ring = TimestepRingBuffer::new(slots).unwrap();
            for _ in 0..3 * slots {
                assert_eq!(ring.write_index(), (ring.read_index() + 1) % slots);
                ring.advance();
            }
        }
    }

    #[test]
    fn advance_exposes_previous_write_slot_to_reader() {
        let ring = TimestepRingBuffer::new(4).unwrap();
        for k in 0..10 {
            ring.current_write().append_wheel(wheel(k));
            ring.advance();
            let snap = ring.current_read().snapshot();
            assert_eq!(snap.wheel.len(), 1, "tick {k}");
            assert_eq!(snap.wheel[0].left_count, k);
        }
    }

    #[test]
    fn stale_slot_is_reset_before_reuse() {
        let slots = 3;
        let ring = TimestepRingBuffer::new(slots).unwrap();
        // Producer writes once, then goes quiet for a full revolution.
        ring.current_write().append_wheel(wheel(42));
        for _ in 0..slots {
            ring.advance();
        }
        // The slot that carried the stale sample is the write target again
        // and must have been wiped; nothing ever errors.
        assert!(ring.current_write().snapshot().is_empty());
    }

    #[test]
    fn per_channel_order_survives_concurrent_producers() {
        let ring = Arc::new(TimestepRingBuffer::new(3).unwrap());
        let writer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for i in 0..500 {
                    ring.current_write().append_wheel(wheel(i));
                }
            })
        };
        writer.join().unwrap();
        ring.advance();
        let snap = ring.current_read().snapshot();
        let counts: Vec<i64> = snap.wheel.iter().map(|w| w.left_count).collect();
        let mut sorted = counts.clone();
        sorted.sort_unstable();
        assert_eq!(counts, sorted, "append order must equal capture order");
        assert_eq!(counts.len(), 500);
    }
}
