//! Root interrupt controller
//!
//! Two 8-bit status/mask register groups. Each root irq is one bit of one
//! group; two of them are the aggregate bits of the topsys and GPIO
//! domains. The mask registers use 1 = masked.

use alloc::sync::Arc;

use crate::core::irq::{DomainKind, HostLine, HwIrq, InterruptDomain, IrqNumber};
use crate::core::sync::{SpinLock, SpinLockGuard};
use crate::drivers::regs::{IRQ_MASK0, IRQ_MASK1, IRQ_STATUS0, IRQ_STATUS1, IRQ_VALID0, IRQ_VALID1};
use crate::drivers::{BusHandle, RegAddr};
use crate::Result;

/// Number of root groups
pub const ROOT_GROUP_COUNT: usize = 2;

/// Number of root irqs
pub const ROOT_IRQ_COUNT: usize = 10;

/// A status/mask register pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptGroup {
    /// Status register, clear on read
    pub status: RegAddr,
    /// Mask register, 1 = masked
    pub mask: RegAddr,
    /// Bits that exist in this group
    pub valid: u8,
}

/// Root groups, indexed by group id
pub static ROOT_GROUPS: [InterruptGroup; ROOT_GROUP_COUNT] = [
    InterruptGroup {
        status: IRQ_STATUS0,
        mask: IRQ_MASK0,
        valid: IRQ_VALID0,
    },
    InterruptGroup {
        status: IRQ_STATUS1,
        mask: IRQ_MASK1,
        valid: IRQ_VALID1,
    },
];

/// Location of a root irq
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootIrqDescriptor {
    /// Index into [`ROOT_GROUPS`]
    pub group: usize,
    /// The irq's bit in that group
    pub mask: u8,
}

/// Root interrupt sources, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RootIrq {
    /// Aggregate of the topsys domain
    Topsys = 0,
    /// Aggregate of the GPIO domain
    Gpio = 1,
    /// Charger
    Charger = 2,
    /// Fuel gauge
    FuelGauge = 3,
    /// RTC alarm
    Rtc = 4,
    /// Watchdog
    Watchdog = 5,
    /// Buck regulator fault
    BuckFault = 6,
    /// LDO regulator fault
    LdoFault = 7,
    /// Thermal warning
    Thermal = 8,
    /// LED driver
    Led = 9,
}

impl RootIrq {
    /// All root irqs in dispatch order
    pub const ALL: [RootIrq; ROOT_IRQ_COUNT] = [
        RootIrq::Topsys,
        RootIrq::Gpio,
        RootIrq::Charger,
        RootIrq::FuelGauge,
        RootIrq::Rtc,
        RootIrq::Watchdog,
        RootIrq::BuckFault,
        RootIrq::LdoFault,
        RootIrq::Thermal,
        RootIrq::Led,
    ];

    /// Root irq for a hwirq
    pub fn from_hwirq(hwirq: HwIrq) -> Option<Self> {
        Self::ALL.get(hwirq as usize).copied()
    }

    /// The irq's offset in the root domain
    pub const fn hwirq(self) -> HwIrq {
        self as HwIrq
    }

    /// Group and bit of this irq
    pub const fn descriptor(self) -> RootIrqDescriptor {
        let (group, bit) = match self {
            RootIrq::Topsys => (0, 0),
            RootIrq::Gpio => (0, 1),
            RootIrq::Charger => (0, 2),
            RootIrq::FuelGauge => (0, 3),
            RootIrq::Rtc => (0, 4),
            RootIrq::Watchdog => (0, 5),
            RootIrq::BuckFault => (1, 0),
            RootIrq::LdoFault => (1, 1),
            RootIrq::Thermal => (1, 2),
            RootIrq::Led => (1, 3),
        };
        RootIrqDescriptor { group, mask: 1 << bit }
    }
}

/// Enabled/committed shadow pair for one 8-bit mask register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskShadow {
    /// What should be unmasked
    enabled: u8,
    /// What is unmasked on the device
    committed: u8,
    /// Bits that exist in the register
    valid: u8,
    /// The last write failed; the device state is unknown
    stale: bool,
}

impl MaskShadow {
    /// All bits disabled
    pub const fn new(valid: u8) -> Self {
        Self {
            enabled: 0,
            committed: 0,
            valid,
            stale: false,
        }
    }

    /// Enabled shadow
    pub fn enabled(&self) -> u8 {
        self.enabled
    }

    /// Committed shadow
    pub fn committed(&self) -> u8 {
        self.committed
    }

    /// Whether the last commit failed
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Set bits in the enabled shadow
    pub fn enable(&mut self, bits: u8) {
        self.enabled |= bits & self.valid;
    }

    /// Clear bits in the enabled shadow
    pub fn disable(&mut self, bits: u8) {
        self.enabled &= !bits;
    }

    /// Clear the whole enabled shadow
    pub fn clear(&mut self) {
        self.enabled = 0;
    }

    /// Mask register value to write, if a write is needed
    pub fn pending_write(&self, force: bool) -> Option<u8> {
        (force || self.stale || self.enabled != self.committed).then(|| !self.enabled & self.valid)
    }

    /// Write the mask register if needed and track the outcome
    ///
    /// Returns whether a write was issued. A failed write leaves the shadow
    /// stale so the next commit rewrites the register unconditionally.
    pub fn commit(&mut self, bus: &BusHandle, reg: RegAddr, force: bool) -> Result<bool> {
        let Some(value) = self.pending_write(force) else {
            return Ok(false);
        };

        match bus.write(reg, value) {
            Ok(()) => {
                log::debug!("mask register {:#04x} <- {:#04x}", reg, value);
                self.committed = self.enabled;
                self.stale = false;
                Ok(true)
            }
            Err(e) => {
                log::error!("mask register {:#04x} write failed: {}", reg, e);
                self.stale = true;
                Err(e)
            }
        }
    }
}

/// Root controller shadow state
struct RootState {
    /// One shadow per group
    shadows: [MaskShadow; ROOT_GROUP_COUNT],
    /// Wakeup sources, bit per hwirq
    wake: u16,
    /// Wake flag as last pushed to the host line
    line_wake: bool,
    /// Hardware initialized
    initialized: bool,
}

/// Root interrupt controller
pub struct RootController {
    bus: BusHandle,
    base: IrqNumber,
    groups: &'static [InterruptGroup; ROOT_GROUP_COUNT],
    wake_line: Option<Arc<dyn HostLine>>,
    state: SpinLock<RootState>,
}

impl RootController {
    /// Create a root controller whose irqs start at `base`
    pub fn new(bus: BusHandle, base: IrqNumber) -> Self {
        Self {
            bus,
            base,
            groups: &ROOT_GROUPS,
            wake_line: None,
            state: SpinLock::new(RootState {
                shadows: [
                    MaskShadow::new(ROOT_GROUPS[0].valid),
                    MaskShadow::new(ROOT_GROUPS[1].valid),
                ],
                wake: 0,
                line_wake: false,
                initialized: false,
            }),
        }
    }

    /// Arm `line` as a system wakeup source while any root irq is one
    pub fn with_wake_line(mut self, line: Arc<dyn HostLine>) -> Self {
        self.wake_line = Some(line);
        self
    }

    /// Mask every root irq on the device
    ///
    /// # Panics
    /// Panics when called twice.
    pub fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        assert!(!state.initialized, "root interrupt controller initialized twice");
        state.initialized = true;
        for group in 0..ROOT_GROUP_COUNT {
            state.shadows[group].clear();
            self.commit_group_locked(&mut state, group, true)?;
        }
        log::info!("root interrupt controller initialized, irq base {}", self.base);
        Ok(())
    }

    /// Host irq number of a root irq
    pub fn irq_number(&self, irq: RootIrq) -> IrqNumber {
        self.base + irq.hwirq()
    }

    /// Read one group's status register
    ///
    /// A bus failure reads as nothing pending.
    pub fn read_group_status(&self, group: usize) -> u8 {
        let desc = &self.groups[group];
        match self.bus.read(desc.status) {
            Ok(status) => status & desc.valid,
            Err(e) => {
                log::warn!("root group {} status read failed: {}", group, e);
                0
            }
        }
    }

    /// Read every group's status register
    pub fn read_all_status(&self) -> [u8; ROOT_GROUP_COUNT] {
        let mut status = [0u8; ROOT_GROUP_COUNT];
        for (group, value) in status.iter_mut().enumerate() {
            *value = self.read_group_status(group);
        }
        status
    }

    /// Commit one group
    pub fn commit_group(&self, group: usize, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.commit_group_locked(&mut state, group, force)
    }

    /// Enabled shadow of a group
    pub fn enabled_shadow(&self, group: usize) -> u8 {
        self.state.lock().shadows[group].enabled()
    }

    /// Committed shadow of a group
    pub fn committed_shadow(&self, group: usize) -> u8 {
        self.state.lock().shadows[group].committed()
    }

    /// Whether an irq is a wakeup source
    pub fn wake_enabled(&self, irq: RootIrq) -> bool {
        self.state.lock().wake & (1 << irq.hwirq()) != 0
    }

    /// Start a batch of mask changes
    pub fn bus_lock(&self) -> RootBatch<'_> {
        RootBatch {
            ctrl: self,
            state: self.state.lock(),
        }
    }

    fn commit_group_locked(&self, state: &mut RootState, group: usize, force: bool) -> Result<()> {
        state.shadows[group].commit(&self.bus, self.groups[group].mask, force)?;
        Ok(())
    }

    fn sync_wake_locked(&self, state: &mut RootState) {
        let want = state.wake != 0;
        if want == state.line_wake {
            return;
        }
        if let Some(line) = &self.wake_line {
            log::debug!("{} host line wakeup", if want { "arming" } else { "disarming" });
            line.set_wake(want);
        }
        state.line_wake = want;
    }

    fn commit_locked(&self, state: &mut RootState, force: bool) -> Result<()> {
        let mut result = Ok(());
        for group in 0..ROOT_GROUP_COUNT {
            if let Err(e) = self.commit_group_locked(state, group, force) {
                result = Err(e);
            }
        }
        result
    }
}

fn descriptor(hwirq: HwIrq) -> RootIrqDescriptor {
    match RootIrq::from_hwirq(hwirq) {
        Some(irq) => irq.descriptor(),
        None => panic!("root hwirq {} out of range", hwirq),
    }
}

impl InterruptDomain for RootController {
    fn kind(&self) -> DomainKind {
        DomainKind::Root
    }

    fn irq_count(&self) -> u32 {
        ROOT_IRQ_COUNT as u32
    }

    fn enable(&self, hwirq: HwIrq) {
        let desc = descriptor(hwirq);
        self.state.lock().shadows[desc.group].enable(desc.mask);
    }

    fn disable(&self, hwirq: HwIrq) {
        let desc = descriptor(hwirq);
        self.state.lock().shadows[desc.group].disable(desc.mask);
    }

    fn is_enabled(&self, hwirq: HwIrq) -> bool {
        let desc = descriptor(hwirq);
        self.state.lock().shadows[desc.group].enabled() & desc.mask != 0
    }

    fn commit(&self, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.commit_locked(&mut state, force)
    }

    fn read_status(&self) -> u32 {
        let status = self.read_all_status();
        RootIrq::ALL
            .iter()
            .filter(|irq| {
                let desc = irq.descriptor();
                status[desc.group] & desc.mask != 0
            })
            .fold(0, |pending, irq| pending | (1 << irq.hwirq()))
    }

    fn set_wake(&self, hwirq: HwIrq, on: bool) -> Result<()> {
        descriptor(hwirq);
        let mut state = self.state.lock();
        if on {
            state.wake |= 1 << hwirq;
        } else {
            state.wake &= !(1 << hwirq);
        }
        self.sync_wake_locked(&mut state);
        Ok(())
    }
}

/// A batch of root mask changes, flushed by [`sync_unlock`](Self::sync_unlock)
pub struct RootBatch<'a> {
    ctrl: &'a RootController,
    state: SpinLockGuard<'a, RootState>,
}

impl<'a> RootBatch<'a> {
    /// Mask an irq in the shadow
    pub fn mask(&mut self, hwirq: HwIrq) {
        let desc = descriptor(hwirq);
        self.state.shadows[desc.group].disable(desc.mask);
    }

    /// Unmask an irq in the shadow
    pub fn unmask(&mut self, hwirq: HwIrq) {
        let desc = descriptor(hwirq);
        self.state.shadows[desc.group].enable(desc.mask);
    }

    /// Mark an irq as a wakeup source
    pub fn set_wake(&mut self, hwirq: HwIrq, on: bool) {
        descriptor(hwirq);
        if on {
            self.state.wake |= 1 << hwirq;
        } else {
            self.state.wake &= !(1 << hwirq);
        }
    }

    /// Write every changed group and release the lock
    pub fn sync_unlock(mut self) -> Result<()> {
        self.ctrl.sync_wake_locked(&mut self.state);
        self.ctrl.commit_locked(&mut self.state, false)
    }
}
