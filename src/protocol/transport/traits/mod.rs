//! Abstraction traits used by the transport layer: CAN controller halves,
//! time sources, non-volatile storage and the object-safe [`Transport`]
//! seen by services.
//!
//! [`Transport`]: transport::Transport
pub mod can_rx;
pub mod can_tx;
pub mod clock;
pub mod nv_store;
pub mod poll_timer;
pub mod transport;
