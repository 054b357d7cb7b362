//! Data types shared by every layer of the node: the opcode-level
//! [`Message`], its bus [`Priority`], service identifiers and the
//! diagnostic value exchanged with `DGN` responses.
use crate::error::MessageError;
use crate::protocol::transport::can_id::CanId;

/// Maximum number of payload bytes following the opcode in a classic CAN frame.
pub const MAX_PAYLOAD: usize = 7;

//==================================================================================OPCODES
/// Opcodes handled or emitted by the node core.
pub mod opcodes {
    pub const HLT: u8 = 0x02;
    pub const ARST: u8 = 0x07;
    pub const RESTP: u8 = 0x0A;
    pub const NERD: u8 = 0x57;
    pub const ENUM: u8 = 0x5D;
    pub const CMDERR: u8 = 0x6F;
    pub const NVRD: u8 = 0x71;
    pub const RQNPN: u8 = 0x73;
    pub const CANID: u8 = 0x75;
    pub const RQSD: u8 = 0x78;
    pub const RDGN: u8 = 0x87;
    pub const NVANS: u8 = 0x97;
    pub const PARAN: u8 = 0x9B;
    pub const HEARTB: u8 = 0xAB;
    pub const SD: u8 = 0xAC;
    pub const GRSP: u8 = 0xAF;
    pub const REQEV: u8 = 0xB2;
    pub const DGN: u8 = 0xC7;
    pub const ESD: u8 = 0xE7;
}

/// Result codes carried by `GRSP` and `CMDERR`.
pub mod grsp {
    pub const OK: u8 = 0;
    pub const CMDERR_INV_CMD: u8 = 1;
    pub const INVALID_SERVICE: u8 = 252;
    pub const INVALID_DIAGNOSTIC: u8 = 253;
}

//==================================================================================SERVICE_ID
/// Stable identifier of a service type, as reported by service discovery.
pub type ServiceId = u8;

pub mod service_id {
    use super::ServiceId;

    /// Wildcard used by requests that address every registered service.
    pub const ALL: ServiceId = 0;
    pub const MNS: ServiceId = 1;
    pub const NV: ServiceId = 2;
    pub const CAN: ServiceId = 3;
    pub const TEACH: ServiceId = 4;
    pub const PRODUCER: ServiceId = 5;
    pub const CONSUMER: ServiceId = 6;
    pub const EVENT_ACK: ServiceId = 9;
    pub const BOOT: ServiceId = 10;
    pub const NONE: ServiceId = 0xFF;
}

//==================================================================================PRIORITY
/// Bus priority of a message. Ordering follows arbitration precedence:
/// `Low < Normal < Above < High`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Low,
    Normal,
    Above,
    High,
}

impl Priority {
    /// Four-bit priority field placed above the CANID in the 11-bit identifier.
    pub const fn arbitration_bits(self) -> u8 {
        match self {
            Priority::Low => 0b0111,
            Priority::Normal => 0b0110,
            Priority::Above => 0b0101,
            Priority::High => 0b0100,
        }
    }

    /// Inverse of [`Priority::arbitration_bits`]. Anything more urgent than
    /// `High` (enumeration traffic) maps to `High`.
    pub const fn from_arbitration_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0b0000..=0b0100 => Priority::High,
            0b0101 => Priority::Above,
            0b0110 => Priority::Normal,
            _ => Priority::Low,
        }
    }

    /// Default priority of an opcode.
    ///
    /// Emergency track commands (`HLT`, `ARST`, `RESTP`) go out high, the rest
    /// of the track-control block above normal, other short commands normal
    /// and all configuration/event traffic low.
    pub const fn for_opcode(opcode: u8) -> Self {
        match opcode {
            opcodes::HLT | opcodes::ARST | opcodes::RESTP => Priority::High,
            0x03..=0x06 | 0x08..=0x09 => Priority::Above,
            0x00..=0x3F => Priority::Normal,
            _ => Priority::Low,
        }
    }
}

//==================================================================================MESSAGE
/// Opcode-level view of a CAN frame: priority, opcode and up to seven payload bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    pub priority: Priority,
    pub opcode: u8,
    /// Payload bytes following the opcode. Only `len` of them are meaningful;
    /// a `len` above [`MAX_PAYLOAD`] is read as `MAX_PAYLOAD`.
    pub data: [u8; MAX_PAYLOAD],
    pub len: usize,
    /// CANID of the sender, filled on receive; ignored on send.
    pub source: Option<CanId>,
}

impl Message {
    /// Build an outbound message using the opcode's default priority.
    pub fn new(opcode: u8, payload: &[u8]) -> Result<Self, MessageError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(MessageError::PayloadTooLong { len: payload.len() });
        }
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            priority: Priority::for_opcode(opcode),
            opcode,
            data,
            len: payload.len(),
            source: None,
        })
    }

    /// Build a message addressed by node number: the two first payload bytes
    /// carry `node_number` (big-endian), followed by `rest`.
    pub fn with_node_number(opcode: u8, node_number: u16, rest: &[u8]) -> Result<Self, MessageError> {
        if rest.len() > MAX_PAYLOAD - 2 {
            return Err(MessageError::PayloadTooLong {
                len: rest.len() + 2,
            });
        }
        let mut payload = [0u8; MAX_PAYLOAD];
        payload[..2].copy_from_slice(&node_number.to_be_bytes());
        payload[2..2 + rest.len()].copy_from_slice(rest);
        Self::new(opcode, &payload[..2 + rest.len()])
    }

    /// Override the default priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(MAX_PAYLOAD)]
    }

    /// True when at least `min` payload bytes are present.
    pub fn check_len(&self, min: usize) -> bool {
        self.len >= min
    }

    /// Node number carried in the first two payload bytes, if present.
    pub fn node_number(&self) -> Option<u16> {
        if self.check_len(2) {
            Some(u16::from_be_bytes([self.data[0], self.data[1]]))
        } else {
            None
        }
    }
}

//==================================================================================DIAGNOSTICS
/// Sixteen-bit diagnostic value, transmitted big-endian in `DGN`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagnosticValue(pub u16);

impl DiagnosticValue {
    pub fn hi(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn lo(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

/// Outcome of offering a message to a service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Processed {
    /// The service claimed the message; propagation stops.
    Processed,
    NotProcessed,
}

//==================================================================================NODE
/// Identity data that services and timed-response callbacks need to build replies.
#[derive(Clone, Copy, Debug)]
pub struct NodeInfo {
    /// Node number assigned by the configuration tool (0 when unset).
    pub node_number: u16,
    /// Node parameter block, index 0 is parameter 1.
    pub parameters: &'static [u8],
}

impl NodeInfo {
    pub const fn new(node_number: u16, parameters: &'static [u8]) -> Self {
        Self {
            node_number,
            parameters,
        }
    }

    /// True when `message` carries this node's number in its first two payload bytes.
    pub fn is_addressed_by(&self, message: &Message) -> bool {
        message.node_number() == Some(self.node_number)
    }

    /// Parameter `index` (1-based), or 0 when not defined.
    pub fn parameter(&self, index: u8) -> u8 {
        if index == 0 {
            return self.parameters.len().min(u8::MAX as usize) as u8;
        }
        self.parameters
            .get(index as usize - 1)
            .copied()
            .unwrap_or(0)
    }
}
