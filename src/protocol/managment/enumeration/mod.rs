//! Bookkeeping for one enumeration window: which CANIDs have been heard on
//! the bus, and which free identifier to claim once the window closes.
use crate::protocol::transport::{can_id::CanId, ENUM_ARRAY_SIZE, MAX_CANID};

/// Outcome of an enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanIdResult {
    /// A free identifier was found.
    Ok(CanId),
    /// Every identifier in range was in use.
    Fail,
}

/// One bit per CANID in `0..=MAX_CANID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnumerationBitmap {
    bits: [u8; ENUM_ARRAY_SIZE],
}

impl Default for EnumerationBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl EnumerationBitmap {
    /// Empty window. CANID 0 is never claimable and starts marked.
    pub const fn new() -> Self {
        let mut bits = [0u8; ENUM_ARRAY_SIZE];
        bits[0] = 0x01;
        Self { bits }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Record `can_id` as heard on the bus.
    pub fn mark(&mut self, can_id: u8) {
        if can_id <= MAX_CANID {
            self.bits[(can_id / 8) as usize] |= 1 << (can_id % 8);
        }
    }

    pub fn is_used(&self, can_id: u8) -> bool {
        can_id > MAX_CANID || self.bits[(can_id / 8) as usize] & (1 << (can_id % 8)) != 0
    }

    /// Lowest identifier in `1..=max` not heard during the window.
    pub fn lowest_free(&self, max: u8) -> CanIdResult {
        let max = max.min(MAX_CANID);
        (1..=max)
            .find(|candidate| !self.is_used(*candidate))
            .and_then(|free| CanId::new(free).ok())
            .map_or(CanIdResult::Fail, CanIdResult::Ok)
    }
}
