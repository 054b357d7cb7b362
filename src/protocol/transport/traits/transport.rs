//! Object-safe view of the transport handed to services and the timed
//! response scheduler. [`CanTransport`](crate::protocol::transport::can_transport::CanTransport)
//! is the CAN implementation.
use crate::core::Message;
use crate::error::{CanIdError, SendError};
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::traits::can_tx::{CanOpMode, OpModeStatus};

pub trait Transport {
    /// Queue or transmit `message` under the current CANID.
    ///
    /// `Ok(())` means the frame was sent or accepted into the transmit queue.
    /// A queued message that later fails is reported by [`take_failure`].
    ///
    /// [`take_failure`]: Transport::take_failure
    fn send(&mut self, message: &Message) -> Result<(), SendError>;

    /// True when a message sent now would go straight to the controller:
    /// a CANID is owned, no enumeration window is open and nothing is queued.
    fn is_ready(&self) -> bool {
        self.can_id().is_some() && !self.is_enumerating()
    }

    /// Most recent failure of a message that [`send`](Transport::send) had
    /// accepted into the queue, cleared by the call.
    fn take_failure(&mut self) -> Option<SendError> {
        None
    }

    /// Next application message, if one is pending. Never blocks.
    fn receive(&mut self) -> Option<Message>;

    /// Advance enumeration and drain the transmit queue.
    fn poll(&mut self);

    /// Restore the persisted CANID, or enumerate when there is none.
    fn power_up(&mut self);

    /// Forget the persisted CANID and enumerate again.
    fn factory_reset(&mut self);

    /// CANID currently owned, `None` while unenumerated.
    fn can_id(&self) -> Option<CanId>;

    /// True while a self-enumeration is pending or in progress.
    fn is_enumerating(&self) -> bool;

    /// Start a self-enumeration immediately.
    fn request_enumeration(&mut self);

    /// Adopt and persist `value` as the CANID.
    fn set_can_id(&mut self, value: u8) -> Result<CanId, CanIdError>;

    fn operation_mode(&self) -> CanOpMode;

    fn set_operation_mode(&mut self, mode: CanOpMode) -> OpModeStatus;
}
