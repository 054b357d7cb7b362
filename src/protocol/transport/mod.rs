//! VLCB CAN transport layer: 11-bit identifier layout, CAN frame
//! representation, the ISR-shared link, the queued transport itself and the
//! hardware abstraction traits.
//!
//! ## Timing and addressing constants
//!
//! These constants are the defaults used by [`TransportConfig::default`].
//! Firmware may override any of them at construction time.

pub mod can_frame;
pub mod can_id;
pub mod can_link;
pub mod can_transport;
pub mod traits;

use embassy_time::Duration;

use crate::protocol::transport::traits::nv_store::FlashAddress;

/// Highest CANID representable in the 7-bit source field.
pub const MAX_CANID: u8 = 0x7F;

/// Size of the "seen" bitmap used during enumeration (one bit per CANID).
pub const ENUM_ARRAY_SIZE: usize = (MAX_CANID as usize / 8) + 1;

/// Highest CANID self-enumeration may pick.
///
/// Identifiers 100 to 127 are left for fixed-address devices such as
/// command stations and programming tools.
pub const MAX_ENUMERATED_CANID: u8 = 99;

/// Identifier adopted when enumeration finds no free CANID.
pub const CANID_DEFAULT: u8 = 1;

/// Persisted value meaning "no CANID yet".
pub const CANID_UNSET: u8 = 0;

/// Listening window after the enumeration request (ms).
///
/// Every node on the bus answers the request with a zero-length frame; at
/// 125 kbit/s a full bus of replies drains in well under 100 ms.
pub const ENUMERATION_TIMEOUT_MS: u64 = 100;

/// Backoff between detecting a CANID conflict and starting enumeration (ms).
///
/// Any enumeration request heard during the backoff restarts it, so only
/// one of several colliding nodes enumerates at a time.
pub const ENUMERATION_HOLDOFF_MS: u64 = 200;

/// Number of retries after a lost arbitration before a send is reported failed.
pub const LARB_RETRIES: u8 = 10;

/// Maximum time a frame may wait in the transmit queue (ms).
pub const CAN_TX_TIMEOUT_MS: u64 = 1000;

/// Runtime transport policy. `Default` uses the module constants.
#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    /// Retries after lost arbitration.
    pub larb_retries: u8,
    /// Maximum queueing time of an outbound frame.
    pub tx_timeout: Duration,
    /// Enumeration listening window.
    pub enumeration_timeout: Duration,
    /// Base backoff before a conflict-triggered enumeration.
    pub enumeration_holdoff: Duration,
    /// Extra backoff spread in ms; the node adds `holdoff_seed % (spread + 1)`.
    pub holdoff_spread_ms: u64,
    /// Per-node seed for the backoff spread (serial number, hardware id, ...).
    pub holdoff_seed: u32,
    /// Fallback identifier after a failed enumeration.
    pub default_can_id: u8,
    /// Upper bound of the identifiers enumeration may pick.
    pub max_enumerated_can_id: u8,
    /// NVM location of the persisted CANID.
    pub can_id_address: FlashAddress,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            larb_retries: LARB_RETRIES,
            tx_timeout: Duration::from_millis(CAN_TX_TIMEOUT_MS),
            enumeration_timeout: Duration::from_millis(ENUMERATION_TIMEOUT_MS),
            enumeration_holdoff: Duration::from_millis(ENUMERATION_HOLDOFF_MS),
            holdoff_spread_ms: 0,
            holdoff_seed: 0,
            default_can_id: CANID_DEFAULT,
            max_enumerated_can_id: MAX_ENUMERATED_CANID,
            can_id_address: 0,
        }
    }
}

impl TransportConfig {
    /// Effective conflict backoff for this node.
    pub fn holdoff(&self) -> Duration {
        let spread = (self.holdoff_seed as u64) % self.holdoff_spread_ms.saturating_add(1);
        self.enumeration_holdoff + Duration::from_millis(spread)
    }
}
