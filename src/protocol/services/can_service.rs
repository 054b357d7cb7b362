//! The CAN service: explicit CANID management opcodes, the CAN diagnostics
//! and the receive interrupt hook.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::core::{grsp, opcodes, service_id, DiagnosticValue, Message, Processed, ServiceId};
use crate::protocol::service::{isr::IsrHook, Context, Service};
use crate::protocol::transport::can_link::{diagnostics::CAN_DIAGNOSTIC_COUNT, CanLink};
use crate::protocol::transport::traits::can_rx::CanRx;

/// Version reported by service discovery.
pub const CAN_SERVICE_VERSION: u8 = 1;

//==================================================================================SERVICE
/// Registered service handling `ENUM` and `CANID` and exposing the CAN counters.
pub struct CanService<'a, const RX: usize> {
    link: &'a CanLink<RX>,
}

impl<'a, const RX: usize> CanService<'a, RX> {
    pub const fn new(link: &'a CanLink<RX>) -> Self {
        Self { link }
    }

    fn respond(ctx: &mut Context<'_>, opcode: u8, status: u8) {
        let reply = Message::with_node_number(
            opcodes::GRSP,
            ctx.node.node_number,
            &[opcode, service_id::CAN, status],
        );
        if let Ok(reply) = reply {
            // A failed send is already counted by the transport.
            let _ = ctx.transport.send(&reply);
        }
    }
}

impl<'a, const RX: usize> Service for CanService<'a, RX> {
    fn id(&self) -> ServiceId {
        service_id::CAN
    }

    fn version(&self) -> u8 {
        CAN_SERVICE_VERSION
    }

    fn process_message(&mut self, message: &Message, ctx: &mut Context<'_>) -> Processed {
        if !ctx.node.is_addressed_by(message) {
            return Processed::NotProcessed;
        }

        match message.opcode {
            opcodes::ENUM => {
                #[cfg(feature = "defmt")]
                defmt::info!("Enumeration requested over the bus");

                ctx.transport.request_enumeration();
                Processed::Processed
            }
            opcodes::CANID => {
                let status = match message.payload().get(2) {
                    Some(&value) => match ctx.transport.set_can_id(value) {
                        Ok(_) => grsp::OK,
                        Err(_) => grsp::CMDERR_INV_CMD,
                    },
                    None => grsp::CMDERR_INV_CMD,
                };
                Self::respond(ctx, opcodes::CANID, status);
                Processed::Processed
            }
            _ => Processed::NotProcessed,
        }
    }

    fn diagnostic(&self, index: u8) -> Option<DiagnosticValue> {
        match index {
            0 => Some(DiagnosticValue(CAN_DIAGNOSTIC_COUNT as u16)),
            index => self.link.diagnostics().value(index),
        }
    }

    fn diagnostic_count(&self) -> u8 {
        CAN_DIAGNOSTIC_COUNT as u8
    }
}

//==================================================================================INTERRUPT
/// Interrupt hook moving frames from the controller FIFO into the [`CanLink`].
///
/// ```rust,ignore
/// static LINK: CanLink<16> = CanLink::new();
/// static CAN_IRQ: StaticCell<CanInterrupt<'static, Fifo, 16>> = StaticCell::new();
///
/// let irq = CAN_IRQ.init(CanInterrupt::new(fifo, &LINK));
/// isr_table.register(irq)?;
/// ```
pub struct CanInterrupt<'a, R: CanRx, const RX: usize> {
    hw: Mutex<CriticalSectionRawMutex, RefCell<R>>,
    link: &'a CanLink<RX>,
}

impl<'a, R: CanRx, const RX: usize> CanInterrupt<'a, R, RX> {
    pub const fn new(hw: R, link: &'a CanLink<RX>) -> Self {
        Self {
            hw: Mutex::new(RefCell::new(hw)),
            link,
        }
    }

    /// Run `f` on the receive hardware outside of interrupt context.
    /// `None` when the hardware is already borrowed.
    pub fn with_hardware<T>(&self, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.hw
            .lock(|hw| hw.try_borrow_mut().ok().map(|mut hw| f(&mut hw)))
    }

    /// Drain the controller FIFO. Bounded to one queue's worth of frames
    /// plus one so a babbling controller cannot pin the interrupt.
    fn drain(&self) {
        let link = self.link;
        self.hw.lock(|hw| {
            let Ok(mut hw) = hw.try_borrow_mut() else {
                return;
            };
            for _ in 0..=RX {
                match hw.receive() {
                    Ok(Some(frame)) => {
                        link.push_received(frame);
                    }
                    Ok(None) => break,
                    Err(error) => link.record_rx_error(error),
                }
            }
        });
    }
}

impl<'a, R, const RX: usize> IsrHook for CanInterrupt<'a, R, RX>
where
    R: CanRx + Send,
{
    fn high_isr(&self) {
        self.drain();
    }
}
