//! GPIO interrupt domain
//!
//! One interrupt per pin. A pin's interrupt is configured through the edge
//! select field of its control register, so enabling and masking a pin both
//! come down to rewriting that field: the selected edges while the pin is
//! enabled, none while it is masked. The requested trigger is kept across
//! masking.

use crate::config::MAX_GPIO_PINS;
use crate::core::irq::{Cascade, DomainKind, HwIrq, InterruptDomain, IrqNumber, IrqSink, IrqTrigger};
use crate::core::sync::{SpinLock, SpinLockGuard};
use crate::drivers::regs::{GPIO_CTRL_INT_EDGE, GPIO_STATUS};
use crate::drivers::BusHandle;
use crate::{Error, Result};

/// Edge select code for a trigger
fn edge_code(trigger: IrqTrigger) -> u8 {
    if trigger == IrqTrigger::EDGE_BOTH {
        3
    } else if trigger == IrqTrigger::EDGE_FALLING {
        2
    } else if trigger == IrqTrigger::EDGE_RISING {
        1
    } else {
        0
    }
}

struct GpioState {
    /// Pins whose interrupt should be enabled
    enabled: u8,
    /// Enabled pins whose configuration reached the device
    committed: u8,
    /// Pins whose configuration changed since the last sync
    dirty: u8,
    /// Pins whose last control write failed
    stale: u8,
    /// Requested trigger per pin
    triggers: [IrqTrigger; MAX_GPIO_PINS],
    /// Edge select code on the device per pin
    written: [u8; MAX_GPIO_PINS],
    wake: u8,
    /// Aggregate bit as last committed to the parent
    parent_enabled: bool,
    /// Aggregate wake flag as last pushed to the parent
    parent_wake: bool,
    initialized: bool,
}

impl GpioState {
    /// Record a pin's enable state as reflected on the device
    fn settle(&mut self, bit: u8) {
        self.committed = (self.committed & !bit) | (self.enabled & bit);
    }

    fn composed(&self, pin: usize) -> u8 {
        if self.enabled & (1 << pin) != 0 {
            edge_code(self.triggers[pin])
        } else {
            0
        }
    }
}

/// GPIO interrupt controller
pub struct GpioController {
    bus: BusHandle,
    base: IrqNumber,
    pins: u32,
    parent: Cascade,
    state: SpinLock<GpioState>,
}

impl GpioController {
    /// Create the domain with `pins` pins, cascaded into `parent`
    ///
    /// # Panics
    /// Panics if `pins` is zero or above [`MAX_GPIO_PINS`].
    pub fn new(bus: BusHandle, base: IrqNumber, pins: u32, parent: Cascade) -> Self {
        assert!(
            pins > 0 && pins as usize <= MAX_GPIO_PINS,
            "unsupported GPIO pin count {}",
            pins
        );
        Self {
            bus,
            base,
            pins,
            parent,
            state: SpinLock::new(GpioState {
                enabled: 0,
                committed: 0,
                dirty: 0,
                stale: 0,
                triggers: [IrqTrigger::empty(); MAX_GPIO_PINS],
                written: [0; MAX_GPIO_PINS],
                wake: 0,
                parent_enabled: false,
                parent_wake: false,
                initialized: false,
            }),
        }
    }

    /// Clear the edge select of every pin on the device
    ///
    /// # Panics
    /// Panics when called twice.
    pub fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        assert!(!state.initialized, "GPIO interrupt domain initialized twice");
        state.initialized = true;
        state.enabled = 0;
        state.dirty = self.pin_mask();
        self.sync_locked(&mut state, true)?;
        log::info!(
            "GPIO interrupt domain initialized, {} pins, irq base {}",
            self.pins,
            self.base
        );
        Ok(())
    }

    /// Host irq number of a pin
    pub fn irq_number(&self, pin: HwIrq) -> IrqNumber {
        self.pin_bit(pin);
        self.base + pin
    }

    /// Requested trigger of a pin
    pub fn trigger(&self, pin: HwIrq) -> IrqTrigger {
        self.pin_bit(pin);
        self.state.lock().triggers[pin as usize]
    }

    /// Set a pin's trigger type
    ///
    /// Only rising, falling or both edges are accepted. Takes effect at the
    /// next sync.
    pub fn set_type(&self, pin: HwIrq, trigger: IrqTrigger) -> Result<()> {
        let mut state = self.state.lock();
        self.set_type_locked(&mut state, pin, trigger)
    }

    /// Pins with a pending configuration change
    pub fn dirty_pins(&self) -> u8 {
        self.state.lock().dirty
    }

    /// Enabled pins whose configuration reached the device
    pub fn committed_pins(&self) -> u8 {
        self.state.lock().committed
    }

    /// Start a batch of pin changes
    pub fn bus_lock(&self) -> GpioBatch<'_> {
        GpioBatch {
            ctrl: self,
            state: self.state.lock(),
        }
    }

    /// Dispatch pending, enabled pins to `sink`
    ///
    /// Returns the number of pins delivered.
    pub fn handle_nested(&self, sink: &dyn IrqSink) -> usize {
        let pending = self.read_status() as u8;
        let active = pending & self.state.lock().enabled;

        let mut delivered = 0;
        for pin in 0..self.pins {
            if active & (1 << pin) != 0 {
                sink.handle_irq(self.base + pin);
                delivered += 1;
            }
        }
        delivered
    }

    fn pin_mask(&self) -> u8 {
        ((1u16 << self.pins) - 1) as u8
    }

    fn pin_bit(&self, pin: HwIrq) -> u8 {
        assert!(pin < self.pins, "GPIO pin {} out of range", pin);
        1 << pin
    }

    fn set_type_locked(&self, state: &mut GpioState, pin: HwIrq, trigger: IrqTrigger) -> Result<()> {
        let bit = self.pin_bit(pin);
        if !trigger.is_edge() {
            log::warn!("GPIO pin {}: unsupported trigger {:?}", pin, trigger);
            return Err(Error::InvalidArgument);
        }
        state.triggers[pin as usize] = trigger;
        state.dirty |= bit;
        Ok(())
    }

    fn set_enabled_locked(&self, state: &mut GpioState, pin: HwIrq, enable: bool) {
        let bit = self.pin_bit(pin);
        if enable {
            state.enabled |= bit;
        } else {
            state.enabled &= !bit;
        }
        state.dirty |= bit;
    }

    /// Flush dirty pins to their control registers
    ///
    /// The aggregate bit in the parent is held off while control registers
    /// are rewritten and comes back only if some pin ended up enabled. A pin
    /// is enabled whether or not it has a trigger type; without one its
    /// edge select stays 0 until `set_type`. A pin whose write fails stays
    /// dirty; the first error is returned after the remaining pins were
    /// attempted.
    fn sync_locked(&self, state: &mut GpioState, force: bool) -> Result<()> {
        let mut pending = 0u8;
        for pin in 0..self.pins as usize {
            let bit = 1 << pin;
            if state.dirty & bit == 0 {
                continue;
            }
            if state.enabled & bit != 0 && state.triggers[pin].is_empty() {
                log::warn!("GPIO pin {} enabled without a trigger type", pin);
            }
            if force || state.stale & bit != 0 || state.composed(pin) != state.written[pin] {
                pending |= bit;
            } else {
                // Nothing to write, the device already matches
                state.dirty &= !bit;
                state.settle(bit);
            }
        }

        if pending != 0 {
            if state.parent_enabled {
                self.parent.set_enabled(false)?;
                state.parent_enabled = false;
            }

            let mut first_err = None;
            for pin in 0..self.pins as usize {
                let bit = 1 << pin;
                if pending & bit == 0 {
                    continue;
                }
                let code = state.composed(pin);
                match self.bus.write_field(GPIO_CTRL_INT_EDGE.offset(pin as u8), code) {
                    Ok(()) => {
                        log::debug!("GPIO pin {} edge select <- {}", pin, code);
                        state.written[pin] = code;
                        state.settle(bit);
                        state.dirty &= !bit;
                        state.stale &= !bit;
                    }
                    Err(e) => {
                        log::error!("GPIO pin {} control write failed: {}", pin, e);
                        state.stale |= bit;
                        first_err.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_err {
                self.sync_parent(state)?;
                return Err(e);
            }
        }

        self.sync_parent(state)
    }

    fn sync_parent(&self, state: &mut GpioState) -> Result<()> {
        let want_parent = state.committed != 0;
        if want_parent != state.parent_enabled {
            self.parent.set_enabled(want_parent)?;
            state.parent_enabled = want_parent;
        }

        let want_wake = state.wake != 0;
        if want_wake != state.parent_wake {
            self.parent.set_wake(want_wake)?;
            state.parent_wake = want_wake;
        }
        Ok(())
    }

    fn set_wake_locked(&self, state: &mut GpioState, pin: HwIrq, on: bool) {
        let bit = self.pin_bit(pin);
        if on {
            state.wake |= bit;
        } else {
            state.wake &= !bit;
        }
    }
}

impl InterruptDomain for GpioController {
    fn kind(&self) -> DomainKind {
        DomainKind::Gpio
    }

    fn irq_count(&self) -> u32 {
        self.pins
    }

    fn enable(&self, hwirq: HwIrq) {
        let mut state = self.state.lock();
        self.set_enabled_locked(&mut state, hwirq, true);
    }

    fn disable(&self, hwirq: HwIrq) {
        let mut state = self.state.lock();
        self.set_enabled_locked(&mut state, hwirq, false);
    }

    fn is_enabled(&self, hwirq: HwIrq) -> bool {
        let bit = self.pin_bit(hwirq);
        self.state.lock().enabled & bit != 0
    }

    fn commit(&self, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        if force {
            state.dirty |= self.pin_mask();
        }
        self.sync_locked(&mut state, force)
    }

    fn read_status(&self) -> u32 {
        match self.bus.read(GPIO_STATUS) {
            Ok(status) => (status & self.pin_mask()) as u32,
            Err(e) => {
                log::warn!("GPIO status read failed: {}", e);
                0
            }
        }
    }

    fn set_wake(&self, hwirq: HwIrq, on: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.set_wake_locked(&mut state, hwirq, on);
        self.sync_parent(&mut state)
    }
}

/// A batch of GPIO pin changes
pub struct GpioBatch<'a> {
    ctrl: &'a GpioController,
    state: SpinLockGuard<'a, GpioState>,
}

impl<'a> GpioBatch<'a> {
    /// Mask a pin
    pub fn mask(&mut self, pin: HwIrq) {
        self.ctrl.set_enabled_locked(&mut self.state, pin, false);
    }

    /// Unmask a pin
    pub fn unmask(&mut self, pin: HwIrq) {
        self.ctrl.set_enabled_locked(&mut self.state, pin, true);
    }

    /// Set a pin's trigger type
    pub fn set_type(&mut self, pin: HwIrq, trigger: IrqTrigger) -> Result<()> {
        self.ctrl.set_type_locked(&mut self.state, pin, trigger)
    }

    /// Mark a pin as a wakeup source
    pub fn set_wake(&mut self, pin: HwIrq, on: bool) {
        self.ctrl.set_wake_locked(&mut self.state, pin, on);
    }

    /// Write every dirty pin and release the lock
    pub fn sync_unlock(mut self) -> Result<()> {
        self.ctrl.sync_locked(&mut self.state, false)
    }
}
