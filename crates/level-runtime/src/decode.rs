//! Pure decoding of bus snapshots into latch updates.

use level_common::{BusSnapshot, DigitSlot};

/// What one new snapshot means for the latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Snapshot identical to the previous one; nothing to do.
    Unchanged,
    /// The bus changed but no digit is enabled (inter-digit gap).
    NoDigit,
    /// One digit is presenting its value.
    Digit {
        /// Enabled slot.
        slot: DigitSlot,
        /// Value on the value lines.
        value: u8,
    },
    /// More than one enable line is asserted. Every enabled slot takes the
    /// value, as the hardware offers no way to tell which one is genuine.
    Ghosted {
        /// Enable mask (bit 0 = hundreds).
        mask: u8,
        /// Value on the value lines.
        value: u8,
    },
}

impl Transition {
    /// Whether the bus changed, which counts as activity.
    #[inline]
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Latch writes this transition calls for.
    pub fn latches(&self) -> impl Iterator<Item = (DigitSlot, u8)> {
        let (mask, value) = match *self {
            Self::Unchanged | Self::NoDigit => (0, 0),
            Self::Digit { slot, value } => (1 << slot.index(), value),
            Self::Ghosted { mask, value } => (mask, value),
        };
        DigitSlot::ALL
            .into_iter()
            .filter(move |slot| mask & (1 << slot.index()) != 0)
            .map(move |slot| (slot, value))
    }
}

/// Decode `current` against the snapshot seen just before it.
///
/// Only a snapshot that differs from `previous` is a transition. Any
/// enabled slot in a changed snapshot is latched, including a slot that
/// was already enabled but whose value lines moved.
pub fn decode(previous: BusSnapshot, current: BusSnapshot) -> Transition {
    if current == previous {
        return Transition::Unchanged;
    }

    let mask = current.enable_mask();
    let value = current.value();

    match mask.count_ones() {
        0 => Transition::NoDigit,
        1 => match DigitSlot::from_index(mask.trailing_zeros() as usize) {
            Some(slot) => Transition::Digit { slot, value },
            None => Transition::NoDigit,
        },
        _ => Transition::Ghosted { mask, value },
    }
}
