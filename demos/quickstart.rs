//! # Quickstart
//!
//! Two VLCB nodes on a simulated host bus:
//! - both self-enumerate and claim a CANID
//! - node B asks node A to change its CANID with `CANID`
//! - node A acknowledges with `GRSP`, and B's application service prints it
//!
//! Received frames go through the interrupt path (`IsrTable` and
//! `CanInterrupt`) exactly as they would on a microcontroller.
//!
//! ```bash
//! cargo run --example quickstart
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use embassy_time::Instant;
use embedded_can::ErrorKind;
use static_cell::StaticCell;
use vlcb_can::{
    core::{opcodes, Message, NodeInfo, Processed, ServiceId},
    error::{NvmError, TxError},
    protocol::{
        dispatch::Dispatcher,
        service::{isr::IsrTable, Context, RegistryBuilder, Service},
        services::can_service::{CanInterrupt, CanService},
        transport::{
            can_frame::CanFrame,
            can_link::{diagnostics::CanDiagnostic, CanLink},
            can_transport::CanTransport,
            traits::{
                can_rx::CanRx,
                can_tx::{CanOpMode, CanTx},
                clock::TickClock,
                nv_store::{FlashAddress, NvStore},
                transport::Transport,
            },
            TransportConfig,
        },
    },
};

const RX: usize = 16;
const TX: usize = 8;

// Shared with interrupt context, so they live in statics as on a target.
static LINK_A: CanLink<RX> = CanLink::new();
static LINK_B: CanLink<RX> = CanLink::new();
static IRQ_A: StaticCell<CanInterrupt<'static, BusRx, RX>> = StaticCell::new();
static IRQ_B: StaticCell<CanInterrupt<'static, BusRx, RX>> = StaticCell::new();
static ISR_TABLE: StaticCell<IsrTable<'static, 2>> = StaticCell::new();

// ======================================================================
// Host doubles for the node hardware
// ======================================================================

/// Monotonic clock based on the host's `Instant`.
#[derive(Clone, Copy)]
struct HostClock(std::time::Instant);

impl TickClock for HostClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.0.elapsed().as_millis() as u64)
    }
}

/// Transmit half writing into the node's outbox; the bus loop delivers it.
struct BusTx {
    outbox: Rc<RefCell<Vec<CanFrame>>>,
    mode: CanOpMode,
}

impl CanTx for BusTx {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TxError> {
        self.outbox.borrow_mut().push(*frame);
        Ok(())
    }

    fn operation_mode(&self) -> CanOpMode {
        self.mode
    }

    fn request_operation_mode(&mut self, mode: CanOpMode) -> Result<(), ErrorKind> {
        self.mode = mode;
        Ok(())
    }
}

/// Receive FIFO of the simulated controller.
#[derive(Clone, Default)]
struct BusRx(Arc<Mutex<VecDeque<CanFrame>>>);

impl CanRx for BusRx {
    fn receive(&mut self) -> Result<Option<CanFrame>, ErrorKind> {
        let mut fifo = self.0.lock().map_err(|_| ErrorKind::Other)?;
        Ok(fifo.pop_front())
    }
}

/// Sixteen bytes of "EEPROM".
#[derive(Default)]
struct Eeprom([u8; 16]);

impl NvStore for Eeprom {
    fn read(&self, address: FlashAddress) -> Result<u8, NvmError> {
        self.0
            .get(address as usize)
            .copied()
            .ok_or(NvmError::OutOfRange { address })
    }

    fn write(&mut self, address: FlashAddress, value: u8) -> Result<(), NvmError> {
        let slot = self
            .0
            .get_mut(address as usize)
            .ok_or(NvmError::OutOfRange { address })?;
        *slot = value;
        Ok(())
    }
}

// ======================================================================
// Application service printing the replies it sees
// ======================================================================

struct Console {
    name: &'static str,
}

impl Service for Console {
    fn id(&self) -> ServiceId {
        0x80
    }

    fn version(&self) -> u8 {
        1
    }

    fn process_message(&mut self, message: &Message, _ctx: &mut Context<'_>) -> Processed {
        if message.opcode != opcodes::GRSP {
            return Processed::NotProcessed;
        }
        println!(
            "   [{}] GRSP from CANID {:?}: {:02X?}",
            self.name,
            message.source.map(|id| id.get()),
            message.payload()
        );
        Processed::Processed
    }
}

type Node<'a> = CanTransport<'a, BusTx, Eeprom, HostClock, RX, TX>;

fn node<'a>(link: &'a CanLink<RX>, outbox: &Rc<RefCell<Vec<CanFrame>>>, clock: HostClock) -> Node<'a> {
    let hw = BusTx {
        outbox: outbox.clone(),
        mode: CanOpMode::Normal2_0,
    };
    let config = TransportConfig {
        holdoff_spread_ms: 50,
        ..TransportConfig::default()
    };
    CanTransport::new(hw, Eeprom::default(), clock, link, config)
}

/// Host wiring of the two nodes: outbox and receive FIFO per node, plus the
/// interrupt table raised after every delivery.
struct Bus<'b, 'i> {
    a: (&'b Rc<RefCell<Vec<CanFrame>>>, &'b BusRx),
    b: (&'b Rc<RefCell<Vec<CanFrame>>>, &'b BusRx),
    isr: &'b IsrTable<'i, 2>,
}

impl Bus<'_, '_> {
    fn deliver(from: &Rc<RefCell<Vec<CanFrame>>>, to: &BusRx) {
        let frames: Vec<CanFrame> = from.borrow_mut().drain(..).collect();
        if let Ok(mut fifo) = to.0.lock() {
            fifo.extend(frames);
        }
    }

    /// Poll both nodes every millisecond of host time for `millis` ms.
    fn run(
        &self,
        a: &mut Dispatcher<'_, Node<'_>, HostClock, 2>,
        b: &mut Dispatcher<'_, Node<'_>, HostClock, 2>,
        millis: u64,
    ) {
        let until = std::time::Instant::now() + std::time::Duration::from_millis(millis);
        while std::time::Instant::now() < until {
            a.poll();
            b.poll();
            Self::deliver(self.a.0, self.b.1);
            Self::deliver(self.b.0, self.a.1);
            self.isr.high_isr();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}

fn main() {
    println!("=== vlcb-can Quickstart ===\n");

    let clock = HostClock(std::time::Instant::now());
    let (link_a, link_b) = (&LINK_A, &LINK_B);
    let (out_a, out_b) = (Rc::default(), Rc::default());
    let (rx_a, rx_b) = (BusRx::default(), BusRx::default());

    // Interrupt side: one CAN receive hook per node.
    let isr = ISR_TABLE.init(IsrTable::new());
    let irq_a: &'static CanInterrupt<'static, BusRx, RX> =
        IRQ_A.init(CanInterrupt::new(rx_a.clone(), link_a));
    let irq_b: &'static CanInterrupt<'static, BusRx, RX> =
        IRQ_B.init(CanInterrupt::new(rx_b.clone(), link_b));
    if isr.register(irq_a).and_then(|_| isr.register(irq_b)).is_err() {
        eprintln!("interrupt table too small");
        return;
    }
    let isr: &IsrTable<'static, 2> = isr;

    // Poll side: services and dispatchers.
    let node_a = NodeInfo::new(256, &[165, 0, 1]);
    let node_b = NodeInfo::new(257, &[165, 0, 2]);
    let mut can_a = CanService::new(link_a);
    let mut console_a = Console { name: "A" };
    let mut can_b = CanService::new(link_b);
    let mut console_b = Console { name: "B" };

    let registry_a = match RegistryBuilder::<2>::new()
        .register(&mut can_a)
        .and_then(|builder| builder.register(&mut console_a))
    {
        Ok(builder) => builder.build(),
        Err(e) => {
            eprintln!("registry A: {e}");
            return;
        }
    };
    let registry_b = match RegistryBuilder::<2>::new()
        .register(&mut can_b)
        .and_then(|builder| builder.register(&mut console_b))
    {
        Ok(builder) => builder.build(),
        Err(e) => {
            eprintln!("registry B: {e}");
            return;
        }
    };
    let mut a = Dispatcher::new(node(link_a, &out_a, clock), clock, registry_a, node_a);
    let mut b = Dispatcher::new(node(link_b, &out_b, clock), clock, registry_b, node_b);

    let bus = Bus {
        a: (&out_a, &rx_a),
        b: (&out_b, &rx_b),
        isr,
    };

    // ======================================================================
    // 1. Power up: both nodes start without a CANID and enumerate
    // ======================================================================
    println!("1. Powering up two fresh nodes");
    a.power_up();
    bus.run(&mut a, &mut b, 50);
    b.power_up();
    bus.run(&mut a, &mut b, 400);
    println!(
        "   A owns CANID {:?}, B owns CANID {:?}\n",
        a.transport().can_id().map(|id| id.get()),
        b.transport().can_id().map(|id| id.get())
    );

    // ======================================================================
    // 2. B moves A to CANID 42
    // ======================================================================
    println!("2. B sends CANID(256, 42)");
    match Message::with_node_number(opcodes::CANID, node_a.node_number, &[42]) {
        Ok(request) => {
            if let Err(e) = b.transport_mut().send(&request) {
                eprintln!("   send failed: {e}");
            }
        }
        Err(e) => eprintln!("   bad message: {e}"),
    }
    bus.run(&mut a, &mut b, 50);
    println!(
        "   A now owns CANID {:?}\n",
        a.transport().can_id().map(|id| id.get())
    );

    // ======================================================================
    // 3. Diagnostics
    // ======================================================================
    println!("3. CAN diagnostics of node A");
    let counters = link_a.diagnostics();
    for counter in [
        CanDiagnostic::RxMessages,
        CanDiagnostic::TxMessages,
        CanDiagnostic::CanIdEnumerations,
        CanDiagnostic::CanIdChanges,
    ] {
        println!("   {:?}: {}", counter, counters.get(counter));
    }
    println!("   unhandled messages: {}", a.unhandled_messages());
}
