/// Test doubles simulating CAN controllers, a shared bus, a clock and NVM
/// during integration tests.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use embassy_time::Instant;
use embedded_can::ErrorKind;
use vlcb_can::{
    core::{opcodes, Message, Processed, ServiceId},
    error::{NvmError, TxError},
    protocol::{
        service::{Context, Service},
        timed_response::{ResponseRequest, ResponseTarget},
        transport::{
            can_frame::CanFrame,
            can_id::ArbitrationId,
            can_link::CanLink,
            can_transport::CanTransport,
            traits::{
                can_rx::CanRx,
                can_tx::{CanOpMode, CanTx},
                clock::TickClock,
                nv_store::{FlashAddress, NvStore},
                poll_timer::PollTimer,
            },
            TransportConfig,
        },
    },
};

#[allow(dead_code)]
pub const RX_CAP: usize = 16;
#[allow(dead_code)]
pub const TX_CAP: usize = 8;

#[allow(dead_code)]
pub type TestTransport<'a> = CanTransport<'a, MockTx, MemoryNvm, MockClock, RX_CAP, TX_CAP>;

//==================================================================================CLOCK
#[derive(Clone, Default)]
#[allow(dead_code)]
/// Manually advanced clock shared by every node of a test.
pub struct MockClock {
    millis: Rc<Cell<u64>>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.millis.set(self.millis.get() + millis);
    }

    pub fn millis(&self) -> u64 {
        self.millis.get()
    }
}

impl TickClock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.millis.get())
    }
}

#[derive(Clone, Copy)]
#[allow(dead_code)]
/// Clock following the host's monotonic time, for async tests.
pub struct WallClock {
    start: std::time::Instant,
}

#[allow(dead_code)]
impl WallClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl TickClock for WallClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.start.elapsed().as_millis() as u64)
    }
}

#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to pace the async runner in tests.
pub struct TokioTimer;

impl PollTimer for TokioTimer {
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl core::future::Future<Output = ()> + 'a {
        tokio::time::sleep(tokio::time::Duration::from_millis(millis as u64))
    }
}

//==================================================================================NVM
#[derive(Clone)]
#[allow(dead_code)]
/// Byte store backed by RAM; clones share the same contents.
pub struct MemoryNvm {
    bytes: Rc<RefCell<[u8; 64]>>,
}

#[allow(dead_code)]
impl MemoryNvm {
    pub fn new() -> Self {
        Self {
            bytes: Rc::new(RefCell::new([0; 64])),
        }
    }

    /// Store holding `can_id` at the default CANID address.
    pub fn with_can_id(can_id: u8) -> Self {
        let nvm = Self::new();
        nvm.bytes.borrow_mut()[0] = can_id;
        nvm
    }

    pub fn byte(&self, address: FlashAddress) -> u8 {
        self.bytes.borrow()[address as usize]
    }
}

impl NvStore for MemoryNvm {
    fn read(&self, address: FlashAddress) -> Result<u8, NvmError> {
        self.bytes
            .borrow()
            .get(address as usize)
            .copied()
            .ok_or(NvmError::OutOfRange { address })
    }

    fn write(&mut self, address: FlashAddress, value: u8) -> Result<(), NvmError> {
        let mut bytes = self.bytes.borrow_mut();
        let slot = bytes
            .get_mut(address as usize)
            .ok_or(NvmError::OutOfRange { address })?;
        *slot = value;
        Ok(())
    }
}

//==================================================================================TX
#[allow(dead_code)]
struct TxState {
    sent: Vec<CanFrame>,
    attempts: usize,
    script: VecDeque<Result<(), TxError>>,
    busy: bool,
    mode: CanOpMode,
    mode_error: Option<ErrorKind>,
    status: u16,
}

#[derive(Clone)]
#[allow(dead_code)]
/// Scriptable transmit half. Clones share state so a test keeps a handle
/// after moving the controller into a transport.
pub struct MockTx {
    state: Rc<RefCell<TxState>>,
}

#[allow(dead_code)]
impl MockTx {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(TxState {
                sent: Vec::new(),
                attempts: 0,
                script: VecDeque::new(),
                busy: false,
                mode: CanOpMode::Normal2_0,
                mode_error: None,
                status: 0,
            })),
        }
    }

    /// Outcomes of the next transmit attempts; afterwards frames go out.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Result<(), TxError>>) {
        self.state.borrow_mut().script.extend(outcomes);
    }

    /// Report `Busy` on every attempt while set.
    pub fn set_busy(&self, busy: bool) {
        self.state.borrow_mut().busy = busy;
    }

    pub fn fail_mode_changes(&self, error: ErrorKind) {
        self.state.borrow_mut().mode_error = Some(error);
    }

    /// Value reported by the controller status register.
    pub fn set_status(&self, status: u16) {
        self.state.borrow_mut().status = status;
    }

    pub fn attempts(&self) -> usize {
        self.state.borrow().attempts
    }

    pub fn sent(&self) -> Vec<CanFrame> {
        self.state.borrow().sent.clone()
    }

    /// Frames sent since the last call.
    pub fn take_sent(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.state.borrow_mut().sent)
    }

    /// Messages (data frames with an opcode) sent since the last call.
    pub fn take_messages(&self) -> Vec<Message> {
        self.take_sent()
            .iter()
            .filter_map(CanFrame::to_message)
            .collect()
    }
}

impl CanTx for MockTx {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TxError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        if state.busy {
            return Err(TxError::Busy);
        }
        let outcome = state.script.pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            state.sent.push(*frame);
        }
        outcome
    }

    fn operation_mode(&self) -> CanOpMode {
        self.state.borrow().mode
    }

    fn request_operation_mode(&mut self, mode: CanOpMode) -> Result<(), ErrorKind> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.mode_error {
            return Err(error);
        }
        state.mode = mode;
        Ok(())
    }

    fn status(&self) -> u16 {
        self.state.borrow().status
    }
}

//==================================================================================RX
#[derive(Clone, Default)]
#[allow(dead_code)]
/// Receive FIFO filled by the test and drained by the interrupt hook.
pub struct MockRx {
    fifo: Arc<Mutex<VecDeque<Result<CanFrame, ErrorKind>>>>,
}

#[allow(dead_code)]
impl MockRx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arrive(&self, frame: CanFrame) {
        self.fifo.lock().unwrap().push_back(Ok(frame));
    }

    pub fn fault(&self, error: ErrorKind) {
        self.fifo.lock().unwrap().push_back(Err(error));
    }

    pub fn pending(&self) -> usize {
        self.fifo.lock().unwrap().len()
    }
}

impl CanRx for MockRx {
    fn receive(&mut self) -> Result<Option<CanFrame>, ErrorKind> {
        match self.fifo.lock().unwrap().pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }
}

//==================================================================================BUS
#[allow(dead_code)]
/// Deliver every frame sent by one node to the receive queue of every other
/// node, as a shared CAN bus would.
pub fn exchange(taps: &[(&MockTx, &CanLink<RX_CAP>)]) {
    for (index, (tx, _)) in taps.iter().enumerate() {
        for frame in tx.take_sent() {
            for (other, (_, link)) in taps.iter().enumerate() {
                if other != index {
                    link.push_received(frame);
                }
            }
        }
    }
}

#[allow(dead_code)]
/// Transport over the mock controller with the default configuration.
pub fn transport<'a>(
    link: &'a CanLink<RX_CAP>,
    tx: &MockTx,
    nvm: &MemoryNvm,
    clock: &MockClock,
) -> TestTransport<'a> {
    CanTransport::new(
        tx.clone(),
        nvm.clone(),
        clock.clone(),
        link,
        TransportConfig::default(),
    )
}

#[allow(dead_code)]
/// Data frame sourced from `source` carrying `opcode` and `payload`.
pub fn data_frame(source: u8, opcode: u8, payload: &[u8]) -> CanFrame {
    let message = Message::new(opcode, payload).unwrap();
    CanFrame::from_message(&message, source)
}

#[allow(dead_code)]
/// Zero-length enumeration answer from `source`.
pub fn enumeration_answer(source: u8) -> CanFrame {
    CanFrame {
        id: ArbitrationId::for_enumeration(source),
        rtr: false,
        data: [0; 8],
        len: 0,
    }
}

//==================================================================================SERVICES
#[allow(dead_code)]
/// Minimal node-query service starting the built-in timed responses:
/// `RQSD` (service discovery), `RDGN` (diagnostics) and `RQNPN` (parameters).
pub struct QueryService;

impl Service for QueryService {
    fn id(&self) -> ServiceId {
        vlcb_can::core::service_id::MNS
    }

    fn version(&self) -> u8 {
        1
    }

    fn process_message(&mut self, message: &Message, ctx: &mut Context<'_>) -> Processed {
        if !ctx.node.is_addressed_by(message) {
            return Processed::NotProcessed;
        }
        let requester = message.source.map_or(0, |id| id.get() as u16);
        let request = match message.opcode {
            opcodes::RQSD => ResponseRequest::service_discovery(requester),
            opcodes::RDGN => match message.payload().get(2) {
                Some(0) | None => ResponseRequest::diagnostics(requester, ResponseTarget::AllServices),
                Some(&service) => ResponseRequest::diagnostics(requester, ResponseTarget::Service(service)),
            },
            opcodes::RQNPN => ResponseRequest::parameters(requester),
            _ => return Processed::NotProcessed,
        };
        let _ = ctx.responses.request(request, ctx.now);
        Processed::Processed
    }
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Shared log of what recording services observed.
pub struct Journal {
    entries: Rc<RefCell<Vec<(ServiceId, &'static str, u8)>>>,
}

#[allow(dead_code)]
impl Journal {
    pub fn record(&self, id: ServiceId, hook: &'static str, opcode: u8) {
        self.entries.borrow_mut().push((id, hook, opcode));
    }

    pub fn entries(&self) -> Vec<(ServiceId, &'static str, u8)> {
        self.entries.borrow().clone()
    }

    pub fn hooks(&self, hook: &'static str) -> Vec<ServiceId> {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, name, _)| *name == hook)
            .map(|(id, _, _)| *id)
            .collect()
    }
}

#[allow(dead_code)]
/// Service logging every hook and claiming the opcodes it is given.
pub struct RecordingService {
    pub id: ServiceId,
    pub claims: &'static [u8],
    pub journal: Journal,
}

impl Service for RecordingService {
    fn id(&self) -> ServiceId {
        self.id
    }

    fn version(&self) -> u8 {
        1
    }

    fn power_up(&mut self, _ctx: &mut Context<'_>) {
        self.journal.record(self.id, "power_up", 0);
    }

    fn factory_reset(&mut self, _ctx: &mut Context<'_>) {
        self.journal.record(self.id, "factory_reset", 0);
    }

    fn process_message(&mut self, message: &Message, _ctx: &mut Context<'_>) -> Processed {
        self.journal.record(self.id, "process", message.opcode);
        if self.claims.contains(&message.opcode) {
            Processed::Processed
        } else {
            Processed::NotProcessed
        }
    }

    fn poll(&mut self, _ctx: &mut Context<'_>) {
        self.journal.record(self.id, "poll", 0);
    }
}
