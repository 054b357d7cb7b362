//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (message construction,
//! transmission, persistence, registry setup, timed responses).
use embedded_can::ErrorKind;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while building a [`Message`](crate::core::Message).
pub enum MessageError {
    /// More than seven payload bytes were supplied.
    #[error("Payload too long: {len} bytes")]
    PayloadTooLong { len: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while building a CAN identifier.
pub enum CanIdError {
    /// Value outside `1..=MAX_CANID`.
    #[error("CANID out of range: {value}")]
    OutOfRange { value: u8 },
}

//==================================================================================SEND_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Refusal reported by the CAN controller for a single transmit attempt.
pub enum TxError {
    /// Hardware transmit buffers are full; try again later.
    #[error("Transmit buffers busy")]
    Busy,
    /// Another node won arbitration for this frame.
    #[error("Lost arbitration")]
    LostArbitration,
    /// The controller signalled a bus error while sending.
    #[error("Bus error: {0:?}")]
    Bus(ErrorKind),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Reasons why [`Transport::send`](crate::protocol::transport::traits::transport::Transport::send)
/// reports a failed send.
pub enum SendError {
    /// Arbitration was lost on every retry.
    #[error("Arbitration lost after all retries")]
    ArbitrationLost,
    /// The frame waited in the transmit queue longer than the transmit timeout.
    #[error("Transmit timeout")]
    Timeout,
    /// The controller reported a bus error.
    #[error("Bus error: {0:?}")]
    Bus(ErrorKind),
    /// The transmit queue is full; the message was dropped.
    #[error("Transmit buffer overrun")]
    BufferOverrun,
}

//==================================================================================NVM_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Failures of the non-volatile byte store.
pub enum NvmError {
    /// Address outside the store.
    #[error("Address out of range: {address:#X}")]
    OutOfRange { address: u32 },
    /// The underlying flash/EEPROM refused the write.
    #[error("Write failed at {address:#X}")]
    WriteFailed { address: u32 },
}

//==================================================================================REGISTRY_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while registering services at startup.
pub enum RegistryError {
    /// Every registry slot is taken.
    #[error("Service registry full")]
    Full,
    /// A service with the same identifier is already registered.
    #[error("Service {id} already registered")]
    DuplicateService { id: u8 },
}

//==================================================================================TIMED_RESPONSE_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised when starting a timed response.
pub enum TimedResponseError {
    /// All response slots hold active contexts of other requesters.
    #[error("No free timed response slot")]
    NoFreeSlot,
    /// The request asks for zero items.
    #[error("Empty timed response")]
    Empty,
}
