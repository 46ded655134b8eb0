//! Interrupt handling module
//!
//! The PMIC's interrupt sources form three nested domains:
//!
//! - the root controller, two 8-bit status/mask groups read directly by the
//!   dispatcher;
//! - the topsys domain, one 8-bit event group behind a root aggregate bit;
//! - the GPIO domain, one interrupt per pin behind another root aggregate bit.
//!
//! Every domain follows the same two-phase contract: mask and unmask only
//! touch an in-memory shadow, and [`InterruptDomain::commit`] (or a batch's
//! `sync_unlock`) reconciles the device with it over the bus. A child domain
//! reaches its parent through a [`Cascade`] so that the parent's aggregate
//! bit is enabled exactly while some child irq is.
//!
//! Lock order is child before parent: the topsys and GPIO domains may call
//! into the root while holding their own lock, never the other way round.

use alloc::sync::Arc;
use bitflags::bitflags;

use crate::{Error, Result};

pub mod chip;
pub mod gpio;
pub mod handler;
pub mod topsys;

// Re-export commonly used types
pub use chip::{InterruptGroup, RootController, RootIrq, RootIrqDescriptor};
pub use gpio::GpioController;
pub use handler::{DispatchStats, Dispatcher, IrqTree};
pub use topsys::TopsysController;

/// Host interrupt number type
pub type IrqNumber = u32;

/// Interrupt number relative to its domain's base
pub type HwIrq = u32;

/// Interrupt domain levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainKind {
    /// Root status/mask groups
    Root,
    /// Topsys event group
    Topsys,
    /// GPIO pins
    Gpio,
}

bitflags! {
    /// Interrupt trigger types
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqTrigger: u8 {
        /// Rising edge
        const EDGE_RISING = 1 << 0;
        /// Falling edge
        const EDGE_FALLING = 1 << 1;
        /// Both edges
        const EDGE_BOTH = Self::EDGE_RISING.bits() | Self::EDGE_FALLING.bits();
        /// High level
        const LEVEL_HIGH = 1 << 2;
        /// Low level
        const LEVEL_LOW = 1 << 3;
    }
}

impl IrqTrigger {
    /// Whether this is exactly one of rising, falling or both edges
    pub fn is_edge(self) -> bool {
        self == IrqTrigger::EDGE_RISING
            || self == IrqTrigger::EDGE_FALLING
            || self == IrqTrigger::EDGE_BOTH
    }
}

/// One level of the interrupt cascade.
///
/// `enable` and `disable` only update the enabled shadow; they never touch
/// the bus. `commit` writes whatever differs from the last committed state.
pub trait InterruptDomain: Send + Sync {
    /// Domain level
    fn kind(&self) -> DomainKind;

    /// Number of irqs in this domain
    fn irq_count(&self) -> u32;

    /// Mark an irq enabled in the shadow
    fn enable(&self, hwirq: HwIrq);

    /// Mark an irq disabled in the shadow
    fn disable(&self, hwirq: HwIrq);

    /// Whether the shadow has the irq enabled
    fn is_enabled(&self, hwirq: HwIrq) -> bool;

    /// Write shadow changes to the device
    ///
    /// With `force`, registers are rewritten even when the shadow matches
    /// the last committed value.
    fn commit(&self, force: bool) -> Result<()>;

    /// Pending irqs as a bitmap indexed by hwirq
    ///
    /// Bus failures read as "nothing pending".
    fn read_status(&self) -> u32;

    /// Mark an irq as a wakeup source
    fn set_wake(&self, hwirq: HwIrq, on: bool) -> Result<()>;

    /// Keep an irq enabled on behalf of event subscribers
    ///
    /// Subscriber demand is tracked apart from the host's own enable state,
    /// so neither side can mask an irq the other still needs. Only domains
    /// that source events support this.
    fn set_event_demand(&self, hwirq: HwIrq, on: bool) -> Result<()> {
        let _ = (hwirq, on);
        Err(Error::NotSupported)
    }

    /// Enable or disable an irq and commit right away
    fn request(&self, hwirq: HwIrq, enable: bool) -> Result<()> {
        if enable {
            self.enable(hwirq);
        } else {
            self.disable(hwirq);
        }
        self.commit(false)
    }
}

/// Link from a child domain to its aggregate bit in the parent
#[derive(Clone)]
pub struct Cascade {
    parent: Arc<dyn InterruptDomain>,
    hwirq: HwIrq,
}

impl Cascade {
    /// Attach to `hwirq` of `parent`
    pub fn new(parent: Arc<dyn InterruptDomain>, hwirq: HwIrq) -> Self {
        Self { parent, hwirq }
    }

    /// The parent's aggregate irq
    pub fn hwirq(&self) -> HwIrq {
        self.hwirq
    }

    /// Enable or disable the aggregate bit and commit the parent
    pub fn set_enabled(&self, enable: bool) -> Result<()> {
        log::debug!(
            "{} {:?} aggregate irq {}",
            if enable { "enabling" } else { "disabling" },
            self.parent.kind(),
            self.hwirq
        );
        self.parent.request(self.hwirq, enable)
    }

    /// Mark the aggregate bit as a wakeup source
    pub fn set_wake(&self, on: bool) -> Result<()> {
        self.parent.set_wake(self.hwirq, on)
    }
}

/// Receiver for leaf interrupts found during dispatch
pub trait IrqSink: Send + Sync {
    /// Handle one pending, enabled interrupt
    fn handle_irq(&self, irq: IrqNumber);
}

/// The host-side interrupt line the PMIC is wired to
pub trait HostLine: Send + Sync {
    /// Keep the line from firing again
    fn disable(&self);

    /// Let the line fire again
    fn enable(&self);

    /// Arm or disarm the line as a system wakeup source
    fn set_wake(&self, on: bool);
}
