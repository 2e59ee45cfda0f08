//! Wire protocol of the multiplexed three-digit level display.
//!
//! The indicator drives seven lines. Four carry a binary-coded digit value
//! and three are one-hot enables, one per digit position. A frame is only
//! meaningful while an enable line is asserted; there is no other framing.
//!
//! ```text
//!  bit:   6    5    4    3   2   1   0
//!        L3   L2   L1    D   C   B   A
//!        └─ enable ─┘    └── value ──┘
//!       units tens hundreds
//! ```
//!
//! Value `15` on an enabled slot means the digit is blank (leading-zero
//! suppression on the display) and counts as zero in a reading.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of digit positions on the display.
pub const DIGIT_COUNT: usize = 3;

/// Number of monitored lines (4 value + 3 enable).
pub const BUS_WIDTH: usize = 7;

/// Mask of the value bits in a snapshot.
pub const VALUE_MASK: u32 = 0x0F;

/// Bit position of the first enable line.
pub const ENABLE_SHIFT: u32 = 4;

/// Mask of the enable bits in a snapshot.
pub const ENABLE_MASK: u32 = 0b111 << ENABLE_SHIFT;

/// Digit value the display uses for a blank position.
pub const BLANK_DIGIT: u8 = 15;

/// One of the three positions of the displayed reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitSlot {
    /// Leftmost digit, enabled by L1.
    Hundreds = 0,
    /// Middle digit, enabled by L2.
    Tens = 1,
    /// Rightmost digit, enabled by L3.
    Units = 2,
}

impl DigitSlot {
    /// All slots in display order.
    pub const ALL: [DigitSlot; DIGIT_COUNT] = [Self::Hundreds, Self::Tens, Self::Units];

    /// Index of the slot (0 = hundreds).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Slot for an index, if in range.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Hundreds),
            1 => Some(Self::Tens),
            2 => Some(Self::Units),
            _ => None,
        }
    }

    /// Decimal weight of the position.
    #[inline]
    #[must_use]
    pub const fn weight(self) -> u16 {
        match self {
            Self::Hundreds => 100,
            Self::Tens => 10,
            Self::Units => 1,
        }
    }

    /// Bit of this slot's enable line within a snapshot.
    #[inline]
    #[must_use]
    pub const fn enable_bit(self) -> u32 {
        1 << (ENABLE_SHIFT + self as u32)
    }
}

impl fmt::Display for DigitSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hundreds => write!(f, "hundreds"),
            Self::Tens => write!(f, "tens"),
            Self::Units => write!(f, "units"),
        }
    }
}

/// All monitored lines sampled at one instant, one bit per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusSnapshot(pub u32);

impl BusSnapshot {
    /// Snapshot with every line low.
    pub const IDLE: Self = Self(0);

    /// Raw bit-field.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The 4-bit value field.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        (self.0 & VALUE_MASK) as u8
    }

    /// The enable lines as a 3-bit mask (bit 0 = hundreds).
    #[inline]
    #[must_use]
    pub const fn enable_mask(self) -> u8 {
        ((self.0 & ENABLE_MASK) >> ENABLE_SHIFT) as u8
    }

    /// Whether the enable line for `slot` is asserted.
    #[inline]
    #[must_use]
    pub const fn is_enabled(self, slot: DigitSlot) -> bool {
        self.0 & slot.enable_bit() != 0
    }

    /// Slots whose enable line is asserted, in display order.
    pub fn enabled_slots(self) -> impl Iterator<Item = DigitSlot> {
        DigitSlot::ALL
            .into_iter()
            .filter(move |slot| self.is_enabled(*slot))
    }

    /// Build a well-formed frame presenting `value` on `slot`.
    ///
    /// Only the low four bits of `value` are used.
    #[must_use]
    pub const fn compose(slot: DigitSlot, value: u8) -> Self {
        Self(slot.enable_bit() | (value as u32 & VALUE_MASK))
    }

    /// Pack individual line levels, line `i` becoming bit `i`.
    ///
    /// Lines beyond the bus width are ignored.
    #[must_use]
    pub fn from_lines(lines: &[bool]) -> Self {
        let bits = lines
            .iter()
            .take(BUS_WIDTH)
            .enumerate()
            .filter(|(_, high)| **high)
            .fold(0u32, |acc, (i, _)| acc | (1 << i));
        Self(bits)
    }
}

impl From<u32> for BusSnapshot {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for BusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#09b}", self.0)
    }
}

/// Numeric reading of the display, always within `0..=999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(u16);

impl Reading {
    /// Largest reading the display can show.
    pub const MAX: Reading = Reading(999);

    /// Combine three latched digit values into a reading.
    ///
    /// Blank digits count as zero. Values 10..=14 are not produced by a
    /// healthy display; they are weighted as-is and the sum saturates at
    /// [`Reading::MAX`].
    #[must_use]
    pub fn from_latches(latches: [u8; DIGIT_COUNT]) -> Self {
        let sum: u16 = DigitSlot::ALL
            .iter()
            .map(|slot| digit_value(latches[slot.index()]) * slot.weight())
            .sum();
        Self(sum.min(Self::MAX.0))
    }

    /// Build a reading from a plain number, saturating at [`Reading::MAX`].
    #[must_use]
    pub fn saturating(value: u16) -> Self {
        Self(value.min(Self::MAX.0))
    }

    /// Numeric value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Reading> for u16 {
    fn from(reading: Reading) -> Self {
        reading.0
    }
}

/// Numeric contribution of a latched digit value (blank reads as 0).
#[inline]
#[must_use]
pub const fn digit_value(latched: u8) -> u16 {
    if latched == BLANK_DIGIT {
        0
    } else {
        latched as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_fields() {
        let snap = BusSnapshot(0b001_0101);
        assert_eq!(snap.value(), 5);
        assert_eq!(snap.enable_mask(), 0b001);
        assert!(snap.is_enabled(DigitSlot::Hundreds));
        assert!(!snap.is_enabled(DigitSlot::Tens));
        assert!(!snap.is_enabled(DigitSlot::Units));
    }

    #[test]
    fn test_compose_is_one_hot() {
        for slot in DigitSlot::ALL {
            for value in 0..=15u8 {
                let snap = BusSnapshot::compose(slot, value);
                assert_eq!(snap.value(), value);
                assert_eq!(snap.enable_mask().count_ones(), 1);
                assert_eq!(snap.enabled_slots().collect::<Vec<_>>(), vec![slot]);
            }
        }
    }

    #[test]
    fn test_compose_truncates_value() {
        assert_eq!(BusSnapshot::compose(DigitSlot::Tens, 0x1F).value(), 0x0F);
    }

    #[test]
    fn test_from_lines() {
        // A and C high, L3 high
        let lines = [true, false, true, false, false, false, true];
        let snap = BusSnapshot::from_lines(&lines);
        assert_eq!(snap.value(), 0b0101);
        assert_eq!(snap.enabled_slots().collect::<Vec<_>>(), vec![DigitSlot::Units]);

        // Extra lines ignored
        let wide = [true; 12];
        assert_eq!(BusSnapshot::from_lines(&wide).bits(), 0x7F);
    }

    #[test]
    fn test_reading_plain_digits() {
        assert_eq!(Reading::from_latches([1, 2, 3]).value(), 123);
        assert_eq!(Reading::from_latches([9, 9, 9]), Reading::MAX);
        assert_eq!(Reading::from_latches([0, 0, 0]).value(), 0);
    }

    #[test]
    fn test_reading_blank_substitution() {
        assert_eq!(Reading::from_latches([15, 3, 7]).value(), 37);
        assert_eq!(Reading::from_latches([15, 15, 15]).value(), 0);
        assert_eq!(Reading::from_latches([1, 5, 15]).value(), 150);
    }

    #[test]
    fn test_reading_saturates_on_malformed_digits() {
        assert_eq!(Reading::from_latches([14, 0, 0]), Reading::MAX);
        assert_eq!(Reading::from_latches([0, 12, 0]).value(), 120);
    }

    #[test]
    fn test_slot_index_roundtrip() {
        for slot in DigitSlot::ALL {
            assert_eq!(DigitSlot::from_index(slot.index()), Some(slot));
        }
        assert_eq!(DigitSlot::from_index(3), None);
    }

    #[test]
    fn test_reading_serializes_as_number() {
        let json = serde_json::to_string(&Reading::from_latches([4, 2, 15])).unwrap();
        assert_eq!(json, "420");
    }
}
