//! Configuration management
//!
//! Board-level settings for the PMIC: where each interrupt domain's numbers
//! start in the host's irq space and how many GPIO pins are wired up.

use crate::core::irq::chip::ROOT_IRQ_COUNT;
use crate::core::irq::topsys::TOPSYS_IRQ_COUNT;
use crate::core::irq::{DomainKind, HwIrq, IrqNumber};
use crate::{Error, Result};

/// Maximum number of GPIO pins (one 8-bit status register)
pub const MAX_GPIO_PINS: usize = 8;

/// Maximum number of distinct devices that can vote for wakeup
pub const MAX_WAKEUP_VOTERS: usize = 16;

/// Irq number base for each domain.
///
/// Every domain owns a contiguous range `base..base + size`; the three
/// ranges must not overlap. The first number of the topsys range is
/// reserved for the domain's aggregate marker bit and is not an irq.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqLayout {
    /// First irq number of the root domain
    pub root_base: IrqNumber,
    /// First irq number of the topsys domain
    pub topsys_base: IrqNumber,
    /// First irq number of the GPIO domain
    pub gpio_base: IrqNumber,
    /// Number of GPIO pins
    pub gpio_pins: u32,
}

impl IrqLayout {
    /// Number of irq numbers owned by a domain
    pub fn size(&self, kind: DomainKind) -> u32 {
        match kind {
            DomainKind::Root => ROOT_IRQ_COUNT as u32,
            DomainKind::Topsys => TOPSYS_IRQ_COUNT as u32,
            DomainKind::Gpio => self.gpio_pins,
        }
    }

    /// First irq number of a domain
    pub fn base(&self, kind: DomainKind) -> IrqNumber {
        match kind {
            DomainKind::Root => self.root_base,
            DomainKind::Topsys => self.topsys_base,
            DomainKind::Gpio => self.gpio_base,
        }
    }

    /// Whether `hwirq` is an irq of `kind`
    pub fn contains(&self, kind: DomainKind, hwirq: HwIrq) -> bool {
        hwirq < self.size(kind) && !(kind == DomainKind::Topsys && hwirq == 0)
    }

    /// Host irq number of `hwirq` within `kind`
    ///
    /// # Panics
    /// Panics if `hwirq` is outside the domain or reserved.
    pub fn irq(&self, kind: DomainKind, hwirq: HwIrq) -> IrqNumber {
        assert!(
            self.contains(kind, hwirq),
            "hwirq {} out of range for {:?} domain",
            hwirq,
            kind
        );
        self.base(kind) + hwirq
    }

    /// Split a host irq number into its domain and offset
    ///
    /// Reserved numbers decode as `None`.
    pub fn decode(&self, irq: IrqNumber) -> Option<(DomainKind, HwIrq)> {
        [DomainKind::Root, DomainKind::Topsys, DomainKind::Gpio]
            .into_iter()
            .find_map(|kind| {
                let hwirq = irq.checked_sub(self.base(kind))?;
                self.contains(kind, hwirq).then_some((kind, hwirq))
            })
    }

    fn overlaps(&self, a: DomainKind, b: DomainKind) -> bool {
        let (a_start, a_end) = (self.base(a), self.base(a) + self.size(a));
        let (b_start, b_end) = (self.base(b), self.base(b) + self.size(b));
        a_start < b_end && b_start < a_end
    }
}

impl Default for IrqLayout {
    fn default() -> Self {
        Self {
            root_base: 0,
            topsys_base: 16,
            gpio_base: 24,
            gpio_pins: 4,
        }
    }
}

/// Global PMIC configuration
#[derive(Debug, Clone, Default)]
pub struct PmicConfig {
    /// Irq number layout
    pub layout: IrqLayout,
}

impl PmicConfig {
    /// Create a configuration with the given layout
    pub fn new(layout: IrqLayout) -> Self {
        Self { layout }
    }

    /// Check the layout for overlapping ranges and pin count limits
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        if layout.gpio_pins == 0 || layout.gpio_pins as usize > MAX_GPIO_PINS {
            log::error!("unsupported GPIO pin count {}", layout.gpio_pins);
            return Err(Error::InvalidConfig);
        }

        let pairs = [
            (DomainKind::Root, DomainKind::Topsys),
            (DomainKind::Root, DomainKind::Gpio),
            (DomainKind::Topsys, DomainKind::Gpio),
        ];
        for (a, b) in pairs {
            if layout.overlaps(a, b) {
                log::error!("{:?} and {:?} irq ranges overlap", a, b);
                return Err(Error::InvalidConfig);
            }
        }

        Ok(())
    }
}
