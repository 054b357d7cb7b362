//! In-memory representation of a VLCB CAN frame and its conversion to and
//! from opcode-level [`Message`]s.
use embedded_can::{Frame, Id, StandardId};

use crate::core::{Message, MAX_PAYLOAD};
use crate::protocol::transport::can_id::ArbitrationId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Classic CAN frame with a standard identifier.
pub struct CanFrame {
    /// 11-bit identifier (priority bits + source CANID).
    pub id: ArbitrationId,
    /// Remote transmission request flag (enumeration requests).
    pub rtr: bool,
    /// Payload buffer. Classic CAN frames always provide eight bytes.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Zero-length remote frame asking every node to report its CANID.
    pub fn enumeration_request(source: u8) -> Self {
        Self {
            id: ArbitrationId::for_enumeration(source),
            rtr: true,
            data: [0; 8],
            len: 0,
        }
    }

    /// Zero-length data frame answering an enumeration request.
    pub fn enumeration_response(source: u8) -> Self {
        Self {
            id: ArbitrationId::for_enumeration(source),
            rtr: false,
            data: [0; 8],
            len: 0,
        }
    }

    /// Encode a message sourced from `source`.
    pub fn from_message(message: &Message, source: u8) -> Self {
        let payload = message.payload();
        let mut data = [0u8; 8];
        data[0] = message.opcode;
        data[1..1 + payload.len()].copy_from_slice(payload);
        Self {
            id: ArbitrationId::for_message(message.priority, source),
            rtr: false,
            data,
            len: payload.len() + 1,
        }
    }

    /// Decode into a message. Remote and zero-length frames carry no opcode
    /// and yield `None`.
    pub fn to_message(&self) -> Option<Message> {
        if self.rtr || self.len == 0 {
            return None;
        }
        let len = (self.len - 1).min(MAX_PAYLOAD);
        let mut data = [0u8; MAX_PAYLOAD];
        data[..len].copy_from_slice(&self.data[1..1 + len]);
        Some(Message {
            priority: self.id.priority(),
            opcode: self.data[0],
            data,
            len,
            source: self.id.source_can_id(),
        })
    }

    /// True for frames used only by the enumeration protocol.
    pub fn is_enumeration_traffic(&self) -> bool {
        self.rtr || self.len == 0
    }
}

//==================================================================================EMBEDDED_CAN
impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let Id::Standard(id) = id.into() else {
            return None;
        };
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id: id.into(),
            rtr: false,
            data: buf,
            len: data.len(),
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        let Id::Standard(id) = id.into() else {
            return None;
        };
        if dlc > 8 {
            return None;
        }
        Some(Self {
            id: id.into(),
            rtr: true,
            data: [0; 8],
            len: dlc,
        })
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    fn id(&self) -> Id {
        // Priority and source fields never exceed eleven bits.
        Id::Standard(self.id.to_standard().unwrap_or(StandardId::ZERO))
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        if self.rtr {
            &[]
        } else {
            &self.data[..self.len]
        }
    }
}
