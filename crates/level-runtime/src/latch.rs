//! Latched digit values shared between the sampler and the aggregator.
//!
//! # Threading Model
//!
//! - **Sampler thread**: the only writer, via `set()`
//! - **Aggregator**: reads via `get()` / `snapshot()`, never writes
//!
//! Each slot is an independent atomic byte. There is no cross-slot
//! consistency: a snapshot may combine digits latched during different
//! display passes, which shows up as an occasional transient reading and is
//! never reported as an error.

use crossbeam_utils::CachePadded;
use level_common::{DigitSlot, BLANK_DIGIT, DIGIT_COUNT, VALUE_MASK};
use static_assertions::assert_impl_all;
use std::sync::atomic::{AtomicU8, Ordering};

/// Most recent value seen for each digit slot.
///
/// Slots start blank and keep their value until the sampler observes the
/// slot's enable line again.
pub struct DigitLatchSet {
    slots: CachePadded<[AtomicU8; DIGIT_COUNT]>,
}

assert_impl_all!(DigitLatchSet: Send, Sync);

impl std::fmt::Debug for DigitLatchSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitLatchSet")
            .field("slots", &self.snapshot())
            .finish()
    }
}

impl Default for DigitLatchSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DigitLatchSet {
    /// Create a latch set with every slot blank.
    pub fn new() -> Self {
        Self {
            slots: CachePadded::new([
                AtomicU8::new(BLANK_DIGIT),
                AtomicU8::new(BLANK_DIGIT),
                AtomicU8::new(BLANK_DIGIT),
            ]),
        }
    }

    /// Latched value of `slot`, always in `0..=15`.
    #[inline]
    pub fn get(&self, slot: DigitSlot) -> u8 {
        // Relaxed: single writer, and each slot is observed on its own.
        self.slots[slot.index()].load(Ordering::Relaxed)
    }

    /// All three slots, hundreds first. Slots are loaded one by one.
    #[inline]
    pub fn snapshot(&self) -> [u8; DIGIT_COUNT] {
        DigitSlot::ALL.map(|slot| self.get(slot))
    }

    /// Latch `value` into `slot`; only the low four bits are kept.
    ///
    /// **Called by: sampler thread only**
    #[inline]
    pub(crate) fn set(&self, slot: DigitSlot, value: u8) {
        self.slots[slot.index()].store(value & VALUE_MASK as u8, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_blank() {
        let latches = DigitLatchSet::new();
        assert_eq!(latches.snapshot(), [BLANK_DIGIT; DIGIT_COUNT]);
    }

    #[test]
    fn test_set_only_touches_one_slot() {
        let latches = DigitLatchSet::new();
        latches.set(DigitSlot::Tens, 4);
        assert_eq!(latches.get(DigitSlot::Tens), 4);
        assert_eq!(latches.get(DigitSlot::Hundreds), BLANK_DIGIT);
        assert_eq!(latches.get(DigitSlot::Units), BLANK_DIGIT);
    }

    #[test]
    fn test_values_stay_in_range() {
        let latches = DigitLatchSet::new();
        latches.set(DigitSlot::Units, 0xF7);
        assert_eq!(latches.get(DigitSlot::Units), 7);
    }

    #[test]
    fn test_concurrent_single_writer_single_reader() {
        use std::sync::Arc;
        use std::thread;

        let latches = Arc::new(DigitLatchSet::new());
        let writer_latches = Arc::clone(&latches);

        let writer = thread::spawn(move || {
            for i in 0..10_000u32 {
                for slot in DigitSlot::ALL {
                    writer_latches.set(slot, (i % 10) as u8);
                }
            }
        });

        for _ in 0..10_000 {
            for value in latches.snapshot() {
                assert!(value <= 15, "latched value out of range: {value}");
            }
        }

        writer.join().unwrap();
        assert_eq!(latches.snapshot(), [9, 9, 9]);
    }
}
