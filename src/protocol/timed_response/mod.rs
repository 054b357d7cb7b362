//! Paced multi-frame replies.
//!
//! Bulk answers (diagnostic dumps, service discovery, parameter lists, ...)
//! are not sent as a burst. A service starts a timed response with
//! [`TimedResponseScheduler::request`]; each dispatch cycle the scheduler
//! asks the request's callback for the next frame and sends it, never
//! faster than one frame per configured gap across all active responses.
//!
//! Frames are paced on the bus, not on the queue: while the transport is
//! not ready (enumerating, or still holding queued frames) no response
//! advances, and the paused time does not count towards abandonment.
//!
//! Each requester owns at most one slot. A slot moves
//! `Idle -> Active -> (Complete | Abandoned)`; a finished slot is reused
//! (back to `Active`) by the next request. Re-requesting while `Active`
//! replaces the running response.
pub mod callbacks;

use core::fmt;

use embassy_time::{Duration, Instant};

use crate::core::{Message, NodeInfo, ServiceId};
use crate::error::TimedResponseError;
use crate::protocol::service::{Service, ServiceDirectory};
use crate::protocol::transport::traits::transport::Transport;

/// Default minimum gap between two response frames (ms).
pub const TIMED_RESPONSE_DELAY_MS: u64 = 5;

/// Default inactivity timeout after which a stalled response is abandoned (ms).
pub const TIMED_RESPONSE_ABANDON_MS: u64 = 2000;

/// Number of concurrent responses (one per requester).
pub const MAX_TIMED_RESPONSES: usize = 4;

/// Opaque requester key chosen by the service starting the response.
pub type Requester = u16;

//==================================================================================REQUEST
/// Kind of bulk reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseKind {
    /// Start-of-day event dump.
    Sod = 1,
    /// Taught events (`NERD`).
    Nerd = 2,
    /// Service discovery (`RQSD`).
    Rqsd = 3,
    /// Diagnostics (`RDGN`).
    Rdgn = 4,
    /// Event variables (`REQEV`).
    Reqev = 5,
    /// Node variables (`NVRD`).
    Nvrd = 6,
    /// Node parameters (`RQNPN`).
    Rqnpn = 7,
    /// No response.
    None = 0xFF,
}

/// What the callback iterates over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseTarget {
    /// Node-wide data; no service attached.
    Node,
    /// One service.
    Service(ServiceId),
    /// Every registered service in order, the step restarting at 0 for each.
    AllServices,
}

/// Answer of a callback for the current step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStep {
    /// Send this frame and advance.
    Emit(Message),
    /// Nothing left for the current target.
    Finished,
    /// Data not available yet; ask again on a later cycle.
    Retry,
}

/// Data handed to a callback.
pub struct ResponseContext<'r> {
    pub services: &'r dyn ServiceDirectory,
    pub node: &'r NodeInfo,
    /// Registry position of the current service, `None` for node-wide targets.
    pub service_index: Option<usize>,
    /// Zero-based item index within the current target.
    pub step: u8,
}

impl<'r> ResponseContext<'r> {
    pub fn service(&self) -> Option<&'r dyn Service> {
        let services = self.services;
        self.service_index.and_then(|index| services.service(index))
    }
}

/// Produces the frame for one step.
pub type ResponseCallback = fn(&ResponseRequest, &ResponseContext<'_>) -> ResponseStep;

/// A bounded multi-frame reply.
#[derive(Clone, Copy)]
pub struct ResponseRequest {
    pub kind: ResponseKind,
    pub requester: Requester,
    pub target: ResponseTarget,
    /// Items per target; the response completes when the step reaches it.
    pub item_count: u8,
    pub callback: ResponseCallback,
}

impl fmt::Debug for ResponseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRequest")
            .field("kind", &self.kind)
            .field("requester", &self.requester)
            .field("target", &self.target)
            .field("item_count", &self.item_count)
            .finish()
    }
}

//==================================================================================STATE
/// Public view of a requester's slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseState {
    Idle,
    /// Running; `step` is the next item index.
    Active { kind: ResponseKind, step: u8 },
    Complete(ResponseKind),
    Abandoned(ResponseKind),
}

#[derive(Clone, Copy, Debug)]
struct ActiveResponse {
    request: ResponseRequest,
    service_cursor: usize,
    step: u8,
    last_progress: Instant,
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Idle,
    Active(ActiveResponse),
    Complete { requester: Requester, kind: ResponseKind },
    Abandoned { requester: Requester, kind: ResponseKind },
}

impl Slot {
    fn requester(&self) -> Option<Requester> {
        match self {
            Slot::Idle => None,
            Slot::Active(active) => Some(active.request.requester),
            Slot::Complete { requester, .. } | Slot::Abandoned { requester, .. } => Some(*requester),
        }
    }

    fn abandon(&mut self) {
        if let Slot::Active(active) = *self {
            #[cfg(feature = "defmt")]
            defmt::warn!("Timed response {} abandoned", active.request.kind);

            *self = Slot::Abandoned {
                requester: active.request.requester,
                kind: active.request.kind,
            };
        }
    }
}

/// Outcome of asking a response for its next frame.
enum Progress {
    Emit(Message),
    Wait,
    Done,
    /// The targeted service is not registered.
    Missing,
}

//==================================================================================SCHEDULER
/// Scheduler owning every response slot.
#[derive(Debug)]
pub struct TimedResponseScheduler {
    slots: [Slot; MAX_TIMED_RESPONSES],
    gap: Duration,
    abandon_after: Duration,
    last_emit: Option<Instant>,
    paused_since: Option<Instant>,
    next_slot: usize,
}

impl Default for TimedResponseScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimedResponseScheduler {
    pub const fn new() -> Self {
        Self {
            slots: [Slot::Idle; MAX_TIMED_RESPONSES],
            gap: Duration::from_millis(TIMED_RESPONSE_DELAY_MS),
            abandon_after: Duration::from_millis(TIMED_RESPONSE_ABANDON_MS),
            last_emit: None,
            paused_since: None,
            next_slot: 0,
        }
    }

    /// Minimum gap between two frames, shared by all responses.
    pub fn set_delay(&mut self, gap: Duration) {
        self.gap = gap;
    }

    pub fn delay(&self) -> Duration {
        self.gap
    }

    pub fn set_abandon_timeout(&mut self, timeout: Duration) {
        self.abandon_after = timeout;
    }

    /// Start `request`, replacing whatever its requester had running.
    pub fn request(&mut self, request: ResponseRequest, now: Instant) -> Result<(), TimedResponseError> {
        if request.item_count == 0 {
            return Err(TimedResponseError::Empty);
        }

        let index = self
            .slots
            .iter()
            .position(|slot| slot.requester() == Some(request.requester))
            .or_else(|| {
                self.slots
                    .iter()
                    .position(|slot| !matches!(slot, Slot::Active(_)))
            })
            .ok_or(TimedResponseError::NoFreeSlot)?;

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Timed response {} started for requester {}",
            request.kind,
            request.requester
        );

        self.slots[index] = Slot::Active(ActiveResponse {
            request,
            service_cursor: 0,
            step: 0,
            last_progress: now,
        });
        Ok(())
    }

    /// Abandon the requester's running response. Returns `false` when none was running.
    pub fn cancel(&mut self, requester: Requester) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Slot::Active(a) if a.request.requester == requester))
        {
            Some(slot) => {
                slot.abandon();
                true
            }
            None => false,
        }
    }

    /// Abandon every running response.
    pub fn cancel_all(&mut self) {
        self.slots.iter_mut().for_each(Slot::abandon);
    }

    pub fn state(&self, requester: Requester) -> ResponseState {
        let slot = self
            .slots
            .iter()
            .find(|slot| slot.requester() == Some(requester));
        match slot {
            None | Some(Slot::Idle) => ResponseState::Idle,
            Some(Slot::Active(active)) => ResponseState::Active {
                kind: active.request.kind,
                step: active.step,
            },
            Some(Slot::Complete { kind, .. }) => ResponseState::Complete(*kind),
            Some(Slot::Abandoned { kind, .. }) => ResponseState::Abandoned(*kind),
        }
    }

    pub fn is_active(&self) -> bool {
        self.slots.iter().any(|slot| matches!(slot, Slot::Active(_)))
    }

    /// Emit at most one frame. Returns `true` when a frame was sent.
    pub fn poll(
        &mut self,
        now: Instant,
        services: &dyn ServiceDirectory,
        node: &NodeInfo,
        transport: &mut dyn Transport,
    ) -> bool {
        if !transport.is_ready() {
            self.paused_since.get_or_insert(now);
            return false;
        }
        if let Some(since) = self.paused_since.take() {
            self.resume(now - since);
        }

        let abandon_after = self.abandon_after;
        for slot in self.slots.iter_mut() {
            let expired =
                matches!(slot, Slot::Active(active) if now >= active.last_progress + abandon_after);
            if expired {
                slot.abandon();
            }
        }

        if let Some(last) = self.last_emit {
            if now < last + self.gap {
                return false;
            }
        }

        for offset in 0..MAX_TIMED_RESPONSES {
            let index = (self.next_slot + offset) % MAX_TIMED_RESPONSES;
            let Slot::Active(mut active) = self.slots[index] else {
                continue;
            };

            match Self::advance(&mut active, services, node) {
                Progress::Emit(message) => {
                    if transport.send(&message).is_err() {
                        // Kept as is: the same step is produced again next cycle.
                        self.slots[index] = Slot::Active(active);
                        continue;
                    }
                    active.step = active.step.saturating_add(1);
                    active.last_progress = now;
                    self.last_emit = Some(now);
                    self.next_slot = (index + 1) % MAX_TIMED_RESPONSES;
                    self.slots[index] = if active.request.target != ResponseTarget::AllServices
                        && active.step >= active.request.item_count
                    {
                        Self::completed(&active)
                    } else {
                        Slot::Active(active)
                    };
                    return true;
                }
                Progress::Wait => self.slots[index] = Slot::Active(active),
                Progress::Done => self.slots[index] = Self::completed(&active),
                Progress::Missing => {
                    self.slots[index] = Slot::Abandoned {
                        requester: active.request.requester,
                        kind: active.request.kind,
                    };
                }
            }
        }
        false
    }

    /// Push every inactivity deadline back by the time spent paused.
    fn resume(&mut self, paused: Duration) {
        #[cfg(feature = "defmt")]
        defmt::debug!("Timed responses resume after {} ms", paused.as_millis());

        for slot in self.slots.iter_mut() {
            if let Slot::Active(active) = slot {
                active.last_progress += paused;
            }
        }
    }

    fn completed(active: &ActiveResponse) -> Slot {
        #[cfg(feature = "defmt")]
        defmt::debug!("Timed response {} complete", active.request.kind);

        Slot::Complete {
            requester: active.request.requester,
            kind: active.request.kind,
        }
    }

    /// Ask the callback for the next frame, moving across services for
    /// `AllServices` targets.
    fn advance(active: &mut ActiveResponse, services: &dyn ServiceDirectory, node: &NodeInfo) -> Progress {
        let every_service = active.request.target == ResponseTarget::AllServices;

        loop {
            let service_index = match active.request.target {
                ResponseTarget::Node => None,
                ResponseTarget::Service(id) => match services.index_of(id) {
                    Some(index) => Some(index),
                    None => return Progress::Missing,
                },
                ResponseTarget::AllServices => {
                    if active.service_cursor >= services.len() {
                        return Progress::Done;
                    }
                    Some(active.service_cursor)
                }
            };

            let step = if active.step >= active.request.item_count {
                ResponseStep::Finished
            } else {
                let context = ResponseContext {
                    services,
                    node,
                    service_index,
                    step: active.step,
                };
                (active.request.callback)(&active.request, &context)
            };

            match step {
                ResponseStep::Emit(message) => return Progress::Emit(message),
                ResponseStep::Retry => return Progress::Wait,
                ResponseStep::Finished if every_service => {
                    active.service_cursor += 1;
                    active.step = 0;
                }
                ResponseStep::Finished => return Progress::Done,
            }
        }
    }
}
