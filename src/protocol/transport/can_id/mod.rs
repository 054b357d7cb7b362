//! Node CAN identifiers (CANID) and the 11-bit arbitration field that
//! carries them: four priority bits followed by the seven-bit CANID.
use embedded_can::StandardId;

use crate::core::Priority;
use crate::error::CanIdError;
use crate::protocol::transport::MAX_CANID;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Identifier owned by a node, always within `1..=MAX_CANID`.
/// Zero is never a valid CANID: it means "not enumerated".
pub struct CanId(u8);

impl CanId {
    /// Validate a raw identifier.
    pub const fn new(value: u8) -> Result<Self, CanIdError> {
        if value == 0 || value > MAX_CANID {
            Err(CanIdError::OutOfRange { value })
        } else {
            Ok(Self(value))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for CanId {
    type Error = CanIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

//==================================================================================ARBITRATION_ID
/// Priority bits used by enumeration requests and replies.
pub const ENUMERATION_PRIORITY_BITS: u8 = 0b0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw 11-bit standard identifier of a VLCB frame.
pub struct ArbitrationId(pub u16);

impl ArbitrationId {
    /// Combine priority bits and a source CANID (0 when not enumerated).
    pub const fn new(priority_bits: u8, source: u8) -> Self {
        Self((((priority_bits & 0x0F) as u16) << 7) | (source & MAX_CANID) as u16)
    }

    /// Identifier for a message of the given priority.
    pub const fn for_message(priority: Priority, source: u8) -> Self {
        Self::new(priority.arbitration_bits(), source)
    }

    /// Identifier for enumeration traffic (highest urgency).
    pub const fn for_enumeration(source: u8) -> Self {
        Self::new(ENUMERATION_PRIORITY_BITS, source)
    }

    /// Four priority bits.
    pub const fn priority_bits(&self) -> u8 {
        ((self.0 >> 7) & 0x0F) as u8
    }

    pub const fn priority(&self) -> Priority {
        Priority::from_arbitration_bits(self.priority_bits())
    }

    /// Raw seven-bit source field, possibly 0.
    pub const fn source(&self) -> u8 {
        (self.0 & MAX_CANID as u16) as u8
    }

    /// Source as a validated CANID, `None` for an unenumerated sender.
    pub fn source_can_id(&self) -> Option<CanId> {
        CanId::new(self.source()).ok()
    }

    /// Convert to the `embedded-can` representation.
    pub fn to_standard(self) -> Option<StandardId> {
        StandardId::new(self.0)
    }
}

impl From<StandardId> for ArbitrationId {
    fn from(id: StandardId) -> Self {
        Self(id.as_raw())
    }
}
