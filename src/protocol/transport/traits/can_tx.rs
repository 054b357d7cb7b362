//! Transmit half of a CAN controller, owned by the poll loop.
use crate::error::TxError;
use crate::protocol::transport::can_frame::CanFrame;
use embedded_can::ErrorKind;

/// Controller operating modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanOpMode {
    NormalFd = 0,
    Disable = 1,
    InternalLoopback = 2,
    ListenOnly = 3,
    Configuration = 4,
    ExternalLoopback = 5,
    Normal2_0 = 6,
    RestrictedOperation = 7,
}

/// Outcome of an operation-mode request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpModeStatus {
    Success,
    /// The transition is not allowed from the current mode.
    Fail,
    /// The controller failed while switching.
    SysErrorOccurred,
}

/// Non-blocking transmit contract.
pub trait CanTx {
    /// Hand one frame to the controller. Must not block: a full hardware
    /// buffer is reported as [`TxError::Busy`].
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TxError>;

    /// Mode the controller currently runs in.
    fn operation_mode(&self) -> CanOpMode;

    /// Switch the controller to `mode`.
    fn request_operation_mode(&mut self, mode: CanOpMode) -> Result<(), ErrorKind>;

    /// Raw controller status (error counters or error state register),
    /// reported as the CAN `Status` diagnostic. 0 when not available.
    fn status(&self) -> u16 {
        0
    }
}
