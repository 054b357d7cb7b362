//! Service abstraction and the startup-time registry.
//!
//! A service is a pluggable protocol feature (CAN, MNS, NV, event teach, ...)
//! implementing [`Service`]. Every hook has a no-op default, so a service
//! only overrides what it handles. Services are registered once through a
//! [`RegistryBuilder`]; the resulting [`ServiceRegistry`] is frozen and its
//! order is the dispatch precedence.
pub mod isr;

use embassy_time::Instant;

use crate::core::{DiagnosticValue, Message, NodeInfo, Processed, ServiceId};
use crate::error::RegistryError;
use crate::protocol::timed_response::TimedResponseScheduler;
use crate::protocol::transport::traits::transport::Transport;

//==================================================================================CONTEXT
/// Everything a service may touch while handling a hook.
pub struct Context<'c> {
    pub transport: &'c mut dyn Transport,
    pub responses: &'c mut TimedResponseScheduler,
    pub node: &'c mut NodeInfo,
    /// Time of the current poll cycle.
    pub now: Instant,
}

//==================================================================================SERVICE
/// Capability set of a service.
pub trait Service {
    /// Stable service type identifier.
    fn id(&self) -> ServiceId;

    /// Version reported by service discovery.
    fn version(&self) -> u8;

    /// Called once at startup, after the transport restored its CANID.
    fn power_up(&mut self, _ctx: &mut Context<'_>) {}

    /// Restore factory defaults.
    fn factory_reset(&mut self, _ctx: &mut Context<'_>) {}

    /// Offer a received message. Returning [`Processed::Processed`] stops propagation.
    fn process_message(&mut self, _message: &Message, _ctx: &mut Context<'_>) -> Processed {
        Processed::NotProcessed
    }

    /// Called once per dispatch cycle.
    fn poll(&mut self, _ctx: &mut Context<'_>) {}

    /// Extended service descriptor byte `id` (`ESD`).
    fn esd_data(&self, _id: u8) -> u8 {
        0
    }

    /// Diagnostic `index`. Index 0 is the number of diagnostics, `None`
    /// past the last one.
    fn diagnostic(&self, _index: u8) -> Option<DiagnosticValue> {
        None
    }

    /// Number of diagnostics; 0 when the service reports none.
    fn diagnostic_count(&self) -> u8 {
        0
    }
}

/// Read-only indexed view of the registered services.
pub trait ServiceDirectory {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Service at registry position `index`.
    fn service(&self, index: usize) -> Option<&dyn Service>;

    /// Registry position of the service with identifier `id`.
    fn index_of(&self, id: ServiceId) -> Option<usize> {
        (0..self.len()).find(|index| self.service(*index).map(|s| s.id()) == Some(id))
    }
}

//==================================================================================REGISTRY
/// Startup-only registration phase.
pub struct RegistryBuilder<'a, const N: usize> {
    services: [Option<&'a mut dyn Service>; N],
    len: usize,
}

impl<'a, const N: usize> Default for RegistryBuilder<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> RegistryBuilder<'a, N> {
    pub fn new() -> Self {
        Self {
            services: core::array::from_fn(|_| None),
            len: 0,
        }
    }

    /// Append `service`; registration order is dispatch order.
    pub fn register(mut self, service: &'a mut dyn Service) -> Result<Self, RegistryError> {
        let id = service.id();
        if self.services[..self.len]
            .iter()
            .flatten()
            .any(|existing| existing.id() == id)
        {
            return Err(RegistryError::DuplicateService { id });
        }
        let slot = self.services.get_mut(self.len).ok_or(RegistryError::Full)?;
        *slot = Some(service);
        self.len += 1;
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> ServiceRegistry<'a, N> {
        ServiceRegistry {
            services: self.services,
            len: self.len,
        }
    }
}

/// Ordered, immutable set of services.
pub struct ServiceRegistry<'a, const N: usize> {
    services: [Option<&'a mut dyn Service>; N],
    len: usize,
}

impl<'a, const N: usize> ServiceRegistry<'a, N> {
    /// Service with identifier `id`, if registered.
    pub fn find_service(&self, id: ServiceId) -> Option<&(dyn Service + 'a)> {
        self.iter().find(|service| service.id() == id)
    }

    /// Registry position of `id`, if registered.
    pub fn find_service_index(&self, id: ServiceId) -> Option<usize> {
        self.iter().position(|service| service.id() == id)
    }

    pub fn have(&self, id: ServiceId) -> bool {
        self.find_service_index(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn Service + 'a)> + '_ {
        self.services[..self.len].iter().flatten().map(|service| &**service)
    }

    pub(crate) fn service_mut(&mut self, index: usize) -> Option<&mut (dyn Service + 'a)> {
        match self.services.get_mut(index) {
            Some(Some(service)) => Some(&mut **service),
            _ => None,
        }
    }
}

impl<'a, const N: usize> ServiceDirectory for ServiceRegistry<'a, N> {
    fn len(&self) -> usize {
        self.len
    }

    fn service(&self, index: usize) -> Option<&dyn Service> {
        match self.services[..self.len].get(index) {
            Some(Some(service)) => Some(&**service),
            _ => None,
        }
    }
}
