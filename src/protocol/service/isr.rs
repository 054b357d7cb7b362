//! Interrupt entry points.
//!
//! Hooks run in interrupt context, preempting the poll loop. They only take
//! `&self`, must not block, and may only touch state designed for it (the
//! [`CanLink`](crate::protocol::transport::can_link::CanLink) receive queue
//! and diagnostic counters).
use crate::error::RegistryError;

/// Work a service performs from interrupt context.
pub trait IsrHook: Sync {
    fn high_isr(&self) {}
    fn low_isr(&self) {}
}

/// Fixed table of hooks invoked by the board's interrupt vectors.
///
/// ```rust,ignore
/// static ISR_TABLE: StaticCell<IsrTable<'static, 2>> = StaticCell::new();
///
/// let table = ISR_TABLE.init(IsrTable::new());
/// table.register(&CAN_INTERRUPT)?;
/// ```
pub struct IsrTable<'a, const N: usize> {
    hooks: [Option<&'a dyn IsrHook>; N],
    len: usize,
}

impl<'a, const N: usize> Default for IsrTable<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> IsrTable<'a, N> {
    pub const fn new() -> Self {
        Self {
            hooks: [None; N],
            len: 0,
        }
    }

    /// Add a hook. Only valid before interrupts are enabled.
    pub fn register(&mut self, hook: &'a dyn IsrHook) -> Result<(), RegistryError> {
        let slot = self.hooks.get_mut(self.len).ok_or(RegistryError::Full)?;
        *slot = Some(hook);
        self.len += 1;
        Ok(())
    }

    /// High-priority interrupt: every hook's `high_isr`, in registration order.
    pub fn high_isr(&self) {
        for hook in self.hooks.iter().flatten() {
            hook.high_isr();
        }
    }

    /// Low-priority interrupt: every hook's `low_isr`, in registration order.
    pub fn low_isr(&self) {
        for hook in self.hooks.iter().flatten() {
            hook.low_isr();
        }
    }
}
