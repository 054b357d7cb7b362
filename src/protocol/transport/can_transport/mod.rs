//! CAN implementation of [`Transport`].
//!
//! Outbound messages go straight to the controller when nothing is queued
//! and a CANID is owned; otherwise they wait in a bounded transmit queue
//! that [`Transport::poll`] drains. Inbound frames are popped from the
//! [`CanLink`] filled by the interrupt, filtered through the
//! [`CanIdManager`], and only application traffic is returned.
//!
//! Queued messages are encoded when they leave, so a CANID change while
//! messages are pending simply sources them from the new identifier. A
//! queued message that later times out or fails is reported through
//! [`Transport::take_failure`]; once the head of the queue has waited past
//! the transmit timeout, further sends fail with [`SendError::Timeout`].
use embassy_time::Instant;
use heapless::Deque;

use crate::core::Message;
use crate::error::{CanIdError, SendError, TxError};
use crate::protocol::managment::{
    can_id_manager::{CanIdManager, EnumerationState, EnumerationStep, FrameVerdict},
    enumeration::CanIdResult,
};
use crate::protocol::transport::{
    can_frame::CanFrame,
    can_id::CanId,
    can_link::{
        diagnostics::{CanDiagnostic, CanDiagnostics},
        CanLink,
    },
    traits::{
        can_tx::{CanOpMode, CanTx, OpModeStatus},
        clock::TickClock,
        nv_store::NvStore,
        transport::Transport,
    },
    TransportConfig, CANID_UNSET,
};

#[derive(Clone, Copy, Debug)]
struct PendingMessage {
    message: Message,
    queued_at: Instant,
}

/// Result of handing one frame to the controller, arbitration retries included.
enum Attempt {
    Sent,
    Busy,
    Failed(SendError),
}

/// CAN transport owning the transmit half of the controller.
pub struct CanTransport<'a, H, S, K, const RX: usize, const TX: usize>
where
    H: CanTx,
    S: NvStore,
    K: TickClock,
{
    hw: H,
    nvm: S,
    clock: K,
    link: &'a CanLink<RX>,
    config: TransportConfig,
    can_id: CanIdManager,
    tx_queue: Deque<PendingMessage, TX>,
    answer_pending: bool,
    queued_failure: Option<SendError>,
}

impl<'a, H, S, K, const RX: usize, const TX: usize> CanTransport<'a, H, S, K, RX, TX>
where
    H: CanTx,
    S: NvStore,
    K: TickClock,
{
    /// Build an unenumerated transport; call [`Transport::power_up`] before use.
    pub fn new(hw: H, nvm: S, clock: K, link: &'a CanLink<RX>, config: TransportConfig) -> Self {
        Self {
            hw,
            nvm,
            clock,
            link,
            can_id: CanIdManager::new(&config),
            config,
            tx_queue: Deque::new(),
            answer_pending: false,
            queued_failure: None,
        }
    }

    pub fn link(&self) -> &'a CanLink<RX> {
        self.link
    }

    pub fn diagnostics(&self) -> &'a CanDiagnostics {
        self.link.diagnostics()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn enumeration_state(&self) -> EnumerationState {
        self.can_id.state()
    }

    /// Messages waiting in the transmit queue.
    pub fn tx_usage(&self) -> usize {
        self.tx_queue.len()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn nv_store(&self) -> &S {
        &self.nvm
    }

    //==================================================================================TX
    /// Send one frame, retrying lost arbitration up to `larb_retries` times.
    fn transmit_frame(&mut self, frame: &CanFrame) -> Attempt {
        let link = self.link;
        let diagnostics = link.diagnostics();
        let mut retries = 0u8;

        loop {
            match self.hw.transmit(frame) {
                Ok(()) => {
                    diagnostics.increment(CanDiagnostic::TxMessages);
                    return Attempt::Sent;
                }
                Err(TxError::Busy) => return Attempt::Busy,
                Err(TxError::LostArbitration) => {
                    if retries >= self.config.larb_retries {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("Send failed: arbitration lost {} times", retries + 1);

                        diagnostics.increment(CanDiagnostic::TxErrors);
                        return Attempt::Failed(SendError::ArbitrationLost);
                    }
                    retries += 1;
                    diagnostics.increment(CanDiagnostic::LostArbitration);
                }
                Err(TxError::Bus(kind)) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Send failed: bus error");

                    diagnostics.increment(CanDiagnostic::TxErrors);
                    diagnostics.increment(CanDiagnostic::ErrorFramesGenerated);
                    return Attempt::Failed(SendError::Bus(kind));
                }
            }
        }
    }

    fn enqueue(&mut self, message: Message, now: Instant) -> Result<(), SendError> {
        let pending = PendingMessage {
            message,
            queued_at: now,
        };
        let result = match self.tx_queue.push_back(pending) {
            Ok(()) => Ok(()),
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("CAN transmit queue overrun, message dropped");

                self.link
                    .diagnostics()
                    .increment(CanDiagnostic::TxBufferOverrun);
                Err(SendError::BufferOverrun)
            }
        };
        self.update_tx_usage();
        result
    }

    /// Drop the messages at the head of the queue that waited longer than
    /// the transmit timeout. Returns `true` when at least one was dropped.
    fn expire_tx(&mut self, now: Instant) -> bool {
        let timeout = self.config.tx_timeout;
        let mut expired = false;

        while let Some(pending) = self.tx_queue.front().copied() {
            if now <= pending.queued_at + timeout {
                break;
            }
            #[cfg(feature = "defmt")]
            defmt::warn!("Dropping message {:#X}: transmit timeout", pending.message.opcode);

            self.tx_queue.pop_front();
            self.link.diagnostics().increment(CanDiagnostic::TxErrors);
            self.queued_failure = Some(SendError::Timeout);
            expired = true;
        }
        if expired {
            self.update_tx_usage();
        }
        expired
    }

    /// Drop expired messages, then transmit until the controller is busy.
    fn drain_tx(&mut self, now: Instant) {
        while let Some(pending) = self.tx_queue.front().copied() {
            if self.expire_tx(now) {
                continue;
            }

            let Some(can_id) = self.can_id.current().filter(|_| self.can_id.can_transmit()) else {
                break;
            };
            let frame = CanFrame::from_message(&pending.message, can_id.get());
            match self.transmit_frame(&frame) {
                Attempt::Busy => break,
                Attempt::Sent => {
                    self.tx_queue.pop_front();
                }
                Attempt::Failed(err) => {
                    self.tx_queue.pop_front();
                    self.queued_failure = Some(err);
                }
            }
        }
        self.update_tx_usage();
    }

    fn update_tx_usage(&self) {
        self.link
            .diagnostics()
            .set(CanDiagnostic::TxBufferUsage, self.tx_queue.len() as u16);
    }

    //==================================================================================ENUMERATION
    fn answer_request(&mut self) {
        let Some(can_id) = self.can_id.current() else {
            self.answer_pending = false;
            return;
        };
        let frame = CanFrame::enumeration_response(can_id.get());
        self.answer_pending = matches!(self.transmit_frame(&frame), Attempt::Busy);
    }

    fn persist_can_id(&mut self, value: u8) {
        if let Err(_err) = self.nvm.write(self.config.can_id_address, value) {
            #[cfg(feature = "defmt")]
            defmt::warn!("Unable to persist CANID {}", value);
        }
    }
}

impl<'a, H, S, K, const RX: usize, const TX: usize> Transport for CanTransport<'a, H, S, K, RX, TX>
where
    H: CanTx,
    S: NvStore,
    K: TickClock,
{
    fn send(&mut self, message: &Message) -> Result<(), SendError> {
        let now = self.clock.now();

        // A stale queue head means the bus has not drained for a full timeout.
        if self.expire_tx(now) {
            return Err(SendError::Timeout);
        }

        if self.tx_queue.is_empty() && self.can_id.can_transmit() {
            if let Some(can_id) = self.can_id.current() {
                let frame = CanFrame::from_message(message, can_id.get());
                return match self.transmit_frame(&frame) {
                    Attempt::Sent => Ok(()),
                    Attempt::Busy => self.enqueue(*message, now),
                    Attempt::Failed(err) => Err(err),
                };
            }
        }
        self.enqueue(*message, now)
    }

    fn is_ready(&self) -> bool {
        self.tx_queue.is_empty() && self.can_id.can_transmit()
    }

    fn take_failure(&mut self) -> Option<SendError> {
        self.queued_failure.take()
    }

    fn receive(&mut self) -> Option<Message> {
        let link = self.link;

        while let Some(frame) = link.pop_received() {
            let now = self.clock.now();
            match self.can_id.on_frame(&frame, now, link.diagnostics()) {
                FrameVerdict::Deliver => {
                    if let Some(message) = frame.to_message() {
                        return Some(message);
                    }
                }
                FrameVerdict::Consumed => {}
                FrameVerdict::Answer(_) => self.answer_request(),
            }
        }
        None
    }

    fn poll(&mut self) {
        let now = self.clock.now();
        let link = self.link;

        link.diagnostics()
            .set(CanDiagnostic::Status, self.hw.status());

        if self.answer_pending {
            self.answer_request();
        }

        match self.can_id.poll(now, link.diagnostics()) {
            EnumerationStep::Nothing => {}
            EnumerationStep::SendRequest { source } => {
                let request = CanFrame::enumeration_request(source);
                if let Attempt::Sent = self.transmit_frame(&request) {
                    self.can_id.request_sent(now);
                }
            }
            EnumerationStep::Finished(CanIdResult::Ok(can_id)) => self.persist_can_id(can_id.get()),
            EnumerationStep::Finished(CanIdResult::Fail) => {}
        }

        self.drain_tx(now);
    }

    fn power_up(&mut self) {
        let stored = self
            .nvm
            .read(self.config.can_id_address)
            .ok()
            .and_then(|value| CanId::new(value).ok());

        match stored {
            Some(can_id) => {
                #[cfg(feature = "defmt")]
                defmt::info!("Restored CANID {}", can_id.get());
                self.can_id.assign(can_id);
            }
            None => self.can_id.start(),
        }
    }

    fn factory_reset(&mut self) {
        self.persist_can_id(CANID_UNSET);
        self.link.diagnostics().reset();
        self.can_id.forget();
        self.can_id.start();
    }

    fn can_id(&self) -> Option<CanId> {
        self.can_id.current()
    }

    fn is_enumerating(&self) -> bool {
        self.can_id.is_enumerating()
    }

    fn request_enumeration(&mut self) {
        self.can_id.start();
    }

    fn set_can_id(&mut self, value: u8) -> Result<CanId, CanIdError> {
        let can_id = CanId::new(value)?;
        self.can_id.assign(can_id);
        self.persist_can_id(value);
        self.link
            .diagnostics()
            .increment(CanDiagnostic::CanIdChanges);
        Ok(can_id)
    }

    fn operation_mode(&self) -> CanOpMode {
        self.hw.operation_mode()
    }

    /// Leaving `Configuration` is the only way into an operating mode; from
    /// any other mode only `Disable` and `Configuration` are reachable.
    fn set_operation_mode(&mut self, mode: CanOpMode) -> OpModeStatus {
        let current = self.hw.operation_mode();
        if current != CanOpMode::Configuration
            && !matches!(mode, CanOpMode::Disable | CanOpMode::Configuration)
        {
            return OpModeStatus::Fail;
        }
        match self.hw.request_operation_mode(mode) {
            Ok(()) => OpModeStatus::Success,
            Err(_) => OpModeStatus::SysErrorOccurred,
        }
    }
}
