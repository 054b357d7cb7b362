//! `vlcb-can` library: the core of a VLCB node on a CAN bus in a `no_std`
//! environment. The crate exposes the CAN transport with CANID
//! self-enumeration, the service registry and message dispatcher, and the
//! paced timed-response scheduler used for bulk replies.
#![no_std]
//==================================================================================
/// Core data types shared by every layer (messages, priorities, service ids).
pub mod core;
/// Domain and low-level errors (message construction, transmission,
/// persistence, registry setup).
pub mod error;
/// VLCB protocol implementation: CAN transport, CANID management,
/// service dispatch and timed responses.
pub mod protocol;
//==================================================================================
