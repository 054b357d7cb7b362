//! Receive half of a CAN controller, drained from interrupt context.
use crate::protocol::transport::can_frame::CanFrame;
use embedded_can::ErrorKind;

/// Non-blocking receive contract.
pub trait CanRx {
    /// Next frame from the hardware FIFO, `Ok(None)` when it is empty.
    /// [`ErrorKind::Overrun`] reports frames lost inside the controller.
    fn receive(&mut self) -> Result<Option<CanFrame>, ErrorKind>;
}
