//! Message dispatcher: the per-cycle control loop of a node.
//!
//! Each [`Dispatcher::poll`] advances the transport (enumeration, transmit
//! queue), emits at most one timed-response frame, polls every service and
//! finally offers at most one received message to the services in registry
//! order. The first service returning [`Processed::Processed`] stops
//! propagation; a message nobody claims is counted and dropped.
//!
//! Interrupt work does not go through the dispatcher: see
//! [`IsrTable`](crate::protocol::service::isr::IsrTable).
pub mod runner;

use embassy_time::Duration;

use crate::core::{Message, NodeInfo, Processed};
use crate::protocol::service::{Context, ServiceDirectory, ServiceRegistry};
use crate::protocol::timed_response::TimedResponseScheduler;
use crate::protocol::transport::traits::{clock::TickClock, transport::Transport};

/// Outcome of one dispatch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchOutcome {
    /// No message was waiting.
    Idle,
    /// The message was claimed by the service at this registry position.
    Handled(usize),
    /// The message matched no service.
    Unhandled,
}

/// Node core tying a transport, a frozen service registry and the timed
/// response scheduler together.
pub struct Dispatcher<'a, T, K, const N: usize>
where
    T: Transport,
    K: TickClock,
{
    transport: T,
    clock: K,
    registry: ServiceRegistry<'a, N>,
    responses: TimedResponseScheduler,
    node: NodeInfo,
    unhandled: u32,
}

impl<'a, T, K, const N: usize> Dispatcher<'a, T, K, N>
where
    T: Transport,
    K: TickClock,
{
    pub fn new(transport: T, clock: K, registry: ServiceRegistry<'a, N>, node: NodeInfo) -> Self {
        Self {
            transport,
            clock,
            registry,
            responses: TimedResponseScheduler::new(),
            node,
            unhandled: 0,
        }
    }

    /// Startup sequence: the transport restores (or enumerates) its CANID,
    /// then every service runs its `power_up` hook in registry order.
    pub fn power_up(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("Node {} powering up", self.node.node_number);

        self.responses.cancel_all();
        self.transport.power_up();

        let mut ctx = Context {
            transport: &mut self.transport,
            responses: &mut self.responses,
            node: &mut self.node,
            now: self.clock.now(),
        };
        for index in 0..self.registry.len() {
            if let Some(service) = self.registry.service_mut(index) {
                service.power_up(&mut ctx);
            }
        }
    }

    /// One cooperative cycle. Never blocks.
    pub fn poll(&mut self) -> DispatchOutcome {
        let now = self.clock.now();

        self.transport.poll();
        self.responses
            .poll(now, &self.registry, &self.node, &mut self.transport);

        let mut ctx = Context {
            transport: &mut self.transport,
            responses: &mut self.responses,
            node: &mut self.node,
            now,
        };
        for index in 0..self.registry.len() {
            if let Some(service) = self.registry.service_mut(index) {
                service.poll(&mut ctx);
            }
        }

        let Some(message) = ctx.transport.receive() else {
            return DispatchOutcome::Idle;
        };
        self.dispatch(&message)
    }

    /// Offer `message` to the services in registry order, stopping at the first claim.
    pub fn dispatch(&mut self, message: &Message) -> DispatchOutcome {
        let mut ctx = Context {
            transport: &mut self.transport,
            responses: &mut self.responses,
            node: &mut self.node,
            now: self.clock.now(),
        };
        for index in 0..self.registry.len() {
            let Some(service) = self.registry.service_mut(index) else {
                continue;
            };
            if service.process_message(message, &mut ctx) == Processed::Processed {
                return DispatchOutcome::Handled(index);
            }
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("Unhandled opcode {=u8:#04x}", message.opcode);

        self.unhandled = self.unhandled.saturating_add(1);
        DispatchOutcome::Unhandled
    }

    /// Factory reset: every service's hook in registry order, then the
    /// transport forgets its CANID and enumerates again.
    pub fn factory_reset_all(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::warn!("Factory reset");

        self.responses.cancel_all();
        let mut ctx = Context {
            transport: &mut self.transport,
            responses: &mut self.responses,
            node: &mut self.node,
            now: self.clock.now(),
        };
        for index in 0..self.registry.len() {
            if let Some(service) = self.registry.service_mut(index) {
                service.factory_reset(&mut ctx);
            }
        }
        self.transport.factory_reset();
        self.unhandled = 0;
    }

    /// Minimum gap between timed-response frames, shared by all responses.
    pub fn set_timed_response_delay(&mut self, millis: u64) {
        self.responses.set_delay(Duration::from_millis(millis));
    }

    pub fn set_node_number(&mut self, node_number: u16) {
        self.node.node_number = node_number;
    }

    /// Messages no service claimed since power-up or the last factory reset.
    pub fn unhandled_messages(&self) -> u32 {
        self.unhandled
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    pub fn registry(&self) -> &ServiceRegistry<'a, N> {
        &self.registry
    }

    pub fn responses(&self) -> &TimedResponseScheduler {
        &self.responses
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
