//! Topsys interrupt domain
//!
//! One 8-bit status/mask register pair behind a root aggregate bit. Bit 0 of
//! the enabled shadow marks the domain itself as in use; bits 1..7 are the
//! system events (power key, battery, ...).
//!
//! An event is unmasked while the host has it enabled or some event
//! subscriber needs it. The two are tracked separately so that neither can
//! mask an event the other still relies on.

use crate::core::irq::chip::MaskShadow;
use crate::core::irq::{Cascade, DomainKind, HwIrq, InterruptDomain, IrqNumber, IrqSink};
use crate::core::sync::{SpinLock, SpinLockGuard};
use crate::drivers::regs::{TOPSYS_MASK, TOPSYS_STATUS};
use crate::drivers::BusHandle;
use crate::Result;

/// Number of topsys irq numbers, including the reserved bit 0
pub const TOPSYS_IRQ_COUNT: usize = 8;

/// Aggregate marker bit
const AGGREGATE: u8 = 1 << 0;

/// Power key pressed
pub const TOPSYS_PWRKEY_PRESS: HwIrq = 1;
/// Power key released
pub const TOPSYS_PWRKEY_RELEASE: HwIrq = 2;
/// Battery voltage critically low
pub const TOPSYS_VBAT_CRITICAL: HwIrq = 3;
/// Power key held past the long-press threshold
pub const TOPSYS_PWRKEY_LONG: HwIrq = 4;

struct TopsysState {
    shadow: MaskShadow,
    /// Events unmasked by the host
    host: u8,
    /// Events kept enabled for event subscribers
    demand: u8,
    /// Aggregate bit as last committed to the parent
    parent_enabled: bool,
    wake: u8,
    /// Aggregate wake flag as last pushed to the parent
    parent_wake: bool,
    initialized: bool,
}

impl TopsysState {
    fn enable(&mut self, hwirq: HwIrq) {
        self.host |= event_bit(hwirq);
        self.refresh();
    }

    fn disable(&mut self, hwirq: HwIrq) {
        self.host &= !event_bit(hwirq);
        self.refresh();
    }

    fn set_demand(&mut self, hwirq: HwIrq, on: bool) {
        let bit = event_bit(hwirq);
        if on {
            self.demand |= bit;
        } else {
            self.demand &= !bit;
        }
        self.refresh();
    }

    /// Rebuild the enabled shadow from the host and subscriber bitmaps
    ///
    /// The aggregate bit is set while any event is enabled and cleared with
    /// the last one.
    fn refresh(&mut self) {
        let events = self.host | self.demand;
        self.shadow.clear();
        if events != 0 {
            self.shadow.enable(AGGREGATE | events);
        }
    }

    fn set_wake(&mut self, hwirq: HwIrq, on: bool) {
        let bit = event_bit(hwirq);
        if on {
            self.wake |= bit;
        } else {
            self.wake &= !bit;
        }
    }
}

fn event_bit(hwirq: HwIrq) -> u8 {
    assert!(
        hwirq != 0 && (hwirq as usize) < TOPSYS_IRQ_COUNT,
        "topsys hwirq {} out of range",
        hwirq
    );
    1 << hwirq
}

/// Topsys interrupt controller
pub struct TopsysController {
    bus: BusHandle,
    base: IrqNumber,
    parent: Cascade,
    state: SpinLock<TopsysState>,
}

impl TopsysController {
    /// Create the domain, cascaded into `parent`
    pub fn new(bus: BusHandle, base: IrqNumber, parent: Cascade) -> Self {
        Self {
            bus,
            base,
            parent,
            state: SpinLock::new(TopsysState {
                shadow: MaskShadow::new(0xFF),
                host: 0,
                demand: 0,
                parent_enabled: false,
                wake: 0,
                parent_wake: false,
                initialized: false,
            }),
        }
    }

    /// Mask every topsys event on the device
    ///
    /// # Panics
    /// Panics when called twice.
    pub fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        assert!(!state.initialized, "topsys interrupt domain initialized twice");
        state.initialized = true;
        state.host = 0;
        state.demand = 0;
        state.shadow.clear();
        state.shadow.commit(&self.bus, TOPSYS_MASK, true)?;
        log::info!("topsys interrupt domain initialized, irq base {}", self.base);
        Ok(())
    }

    /// Host irq number of a topsys event
    pub fn irq_number(&self, hwirq: HwIrq) -> IrqNumber {
        event_bit(hwirq);
        self.base + hwirq
    }

    /// Enabled shadow, aggregate bit included
    pub fn enabled_shadow(&self) -> u8 {
        self.state.lock().shadow.enabled()
    }

    /// Committed shadow, aggregate bit included
    pub fn committed_shadow(&self) -> u8 {
        self.state.lock().shadow.committed()
    }

    /// Whether the host has the event unmasked
    ///
    /// Unlike [`InterruptDomain::is_enabled`] this ignores events kept
    /// enabled only for subscribers.
    pub fn host_enabled(&self, hwirq: HwIrq) -> bool {
        let bit = event_bit(hwirq);
        self.state.lock().host & bit != 0
    }

    /// Start a batch of mask changes
    pub fn bus_lock(&self) -> TopsysBatch<'_> {
        TopsysBatch {
            ctrl: self,
            state: self.state.lock(),
        }
    }

    /// Dispatch pending, enabled events to `sink`
    ///
    /// The status register is read even when nothing is enabled so that
    /// latched bits get cleared. Returns the number of events delivered.
    pub fn handle_nested(&self, sink: &dyn IrqSink) -> usize {
        let pending = self.read_status() as u8;
        let enabled = self.state.lock().shadow.enabled();
        let active = pending & enabled & !AGGREGATE;
        if pending & !active != 0 {
            log::debug!("topsys: ignoring masked status {:#04x}", pending & !active);
        }

        let mut delivered = 0;
        for hwirq in 1..TOPSYS_IRQ_COUNT as HwIrq {
            if active & (1 << hwirq) != 0 {
                sink.handle_irq(self.base + hwirq);
                delivered += 1;
            }
        }
        delivered
    }

    fn commit_locked(&self, state: &mut TopsysState, force: bool) -> Result<()> {
        state.shadow.commit(&self.bus, TOPSYS_MASK, force)?;

        let want_parent = state.shadow.committed() != 0;
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
}

impl InterruptDomain for TopsysController {
    fn kind(&self) -> DomainKind {
        DomainKind::Topsys
    }

    fn irq_count(&self) -> u32 {
        TOPSYS_IRQ_COUNT as u32
    }

    fn enable(&self, hwirq: HwIrq) {
        self.state.lock().enable(hwirq);
    }

    fn disable(&self, hwirq: HwIrq) {
        self.state.lock().disable(hwirq);
    }

    fn is_enabled(&self, hwirq: HwIrq) -> bool {
        let bit = event_bit(hwirq);
        self.state.lock().shadow.enabled() & bit != 0
    }

    fn commit(&self, force: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.commit_locked(&mut state, force)
    }

    fn read_status(&self) -> u32 {
        match self.bus.read(TOPSYS_STATUS) {
            Ok(status) => (status & !AGGREGATE) as u32,
            Err(e) => {
                log::warn!("topsys status read failed: {}", e);
                0
            }
        }
    }

    fn set_wake(&self, hwirq: HwIrq, on: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.set_wake(hwirq, on);
        self.commit_locked(&mut state, false)
    }

    fn set_event_demand(&self, hwirq: HwIrq, on: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.set_demand(hwirq, on);
        self.commit_locked(&mut state, false)
    }
}

/// A batch of topsys mask changes
pub struct TopsysBatch<'a> {
    ctrl: &'a TopsysController,
    state: SpinLockGuard<'a, TopsysState>,
}

impl<'a> TopsysBatch<'a> {
    /// Mask an event in the shadow
    pub fn mask(&mut self, hwirq: HwIrq) {
        self.state.disable(hwirq);
    }

    /// Unmask an event in the shadow
    pub fn unmask(&mut self, hwirq: HwIrq) {
        self.state.enable(hwirq);
    }

    /// Mark an event as a wakeup source
    pub fn set_wake(&mut self, hwirq: HwIrq, on: bool) {
        self.state.set_wake(hwirq, on);
    }

    /// Write the mask register if it changed, cascade to the parent and
    /// release the lock
    pub fn sync_unlock(mut self) -> Result<()> {
        self.ctrl.commit_locked(&mut self.state, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::irq::chip::{RootController, RootIrq};
    use crate::drivers::regs::IRQ_MASK0;
    use crate::emulator::EmulatedPmic;
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    struct Recorder(SpinLock<Vec<IrqNumber>>);

    impl IrqSink for Recorder {
        fn handle_irq(&self, irq: IrqNumber) {
            self.0.lock().push(irq);
        }
    }

    fn setup() -> (EmulatedPmic, Arc<RootController>, TopsysController) {
        let pmic = EmulatedPmic::new();
        let bus = BusHandle::new(pmic.clone());
        let root = Arc::new(RootController::new(bus.clone(), 0));
        let topsys = TopsysController::new(
            bus,
            16,
            Cascade::new(root.clone(), RootIrq::Topsys.hwirq()),
        );
        root.init().unwrap();
        topsys.init().unwrap();
        pmic.clear_log();
        (pmic, root, topsys)
    }

    #[test]
    fn test_first_enable_sets_aggregate() {
        let (pmic, root, topsys) = setup();
        topsys.request(TOPSYS_VBAT_CRITICAL, true).unwrap();

        assert_eq!(topsys.enabled_shadow(), 0b0000_1001);
        assert_eq!(pmic.writes(), [(TOPSYS_MASK, 0xF6), (IRQ_MASK0, 0x3E)]);
        assert!(root.is_enabled(RootIrq::Topsys.hwirq()));
    }

    #[test]
    fn test_last_disable_clears_aggregate() {
        let (pmic, root, topsys) = setup();
        topsys.request(TOPSYS_PWRKEY_PRESS, true).unwrap();
        topsys.request(TOPSYS_PWRKEY_RELEASE, true).unwrap();
        pmic.clear_log();

        topsys.request(TOPSYS_PWRKEY_PRESS, false).unwrap();
        assert_eq!(pmic.writes(), [(TOPSYS_MASK, 0xFA)]);

        topsys.request(TOPSYS_PWRKEY_RELEASE, false).unwrap();
        assert_eq!(topsys.enabled_shadow(), 0);
        assert_eq!(
            pmic.writes(),
            [(TOPSYS_MASK, 0xFA), (TOPSYS_MASK, 0xFF), (IRQ_MASK0, 0x3F)]
        );
        assert!(!root.is_enabled(RootIrq::Topsys.hwirq()));
    }

    #[test]
    fn test_batch_is_one_write() {
        let (pmic, _root, topsys) = setup();
        let mut batch = topsys.bus_lock();
        batch.unmask(TOPSYS_PWRKEY_PRESS);
        batch.unmask(TOPSYS_PWRKEY_RELEASE);
        batch.unmask(TOPSYS_PWRKEY_LONG);
        batch.mask(TOPSYS_PWRKEY_RELEASE);
        batch.sync_unlock().unwrap();

        assert_eq!(pmic.writes_to(TOPSYS_MASK), [!0b0001_0011u8]);
        assert_eq!(pmic.writes_to(IRQ_MASK0).len(), 1);
    }

    #[test]
    fn test_mask_unmask_no_writes() {
        let (pmic, _root, topsys) = setup();
        topsys.request(TOPSYS_PWRKEY_LONG, true).unwrap();
        pmic.clear_log();
        let before = topsys.enabled_shadow();

        let mut batch = topsys.bus_lock();
        batch.mask(TOPSYS_PWRKEY_LONG);
        batch.unmask(TOPSYS_PWRKEY_LONG);
        batch.sync_unlock().unwrap();

        assert_eq!(topsys.enabled_shadow(), before);
        assert!(pmic.writes().is_empty());
    }

    #[test]
    fn test_nested_dispatch_skips_masked() {
        let (pmic, _root, topsys) = setup();
        topsys.request(TOPSYS_VBAT_CRITICAL, true).unwrap();
        pmic.raise(TOPSYS_STATUS, 0b0000_1110);

        let sink = Recorder(SpinLock::new(Vec::new()));
        assert_eq!(topsys.handle_nested(&sink), 1);
        assert_eq!(*sink.0.lock(), [16 + TOPSYS_VBAT_CRITICAL]);
        // Masked bits were still cleared
        assert_eq!(pmic.reg(TOPSYS_STATUS), 0);
    }

    #[test]
    fn test_parent_failure_is_retried() {
        let (pmic, root, topsys) = setup();
        pmic.fail_writes_to(IRQ_MASK0, true);
        assert!(topsys.request(TOPSYS_PWRKEY_PRESS, true).is_err());
        assert_eq!(topsys.committed_shadow(), 0b0000_0011);

        pmic.fail_writes_to(IRQ_MASK0, false);
        topsys.commit(false).unwrap();
        assert_eq!(pmic.writes_to(IRQ_MASK0), [0x3E]);
        assert_eq!(root.committed_shadow(0), 0x01);
    }

    #[test]
    fn test_subscriber_demand_keeps_host_enable() {
        let (pmic, _root, topsys) = setup();
        topsys.request(TOPSYS_PWRKEY_PRESS, true).unwrap();
        topsys.set_event_demand(TOPSYS_PWRKEY_PRESS, true).unwrap();
        topsys.set_event_demand(TOPSYS_PWRKEY_PRESS, false).unwrap();

        assert!(topsys.is_enabled(TOPSYS_PWRKEY_PRESS));
        assert!(topsys.host_enabled(TOPSYS_PWRKEY_PRESS));
        assert_eq!(pmic.writes_to(TOPSYS_MASK), [0xFC]);
    }

    #[test]
    fn test_host_mask_keeps_subscriber_demand() {
        let (pmic, root, topsys) = setup();
        topsys.set_event_demand(TOPSYS_VBAT_CRITICAL, true).unwrap();
        topsys.request(TOPSYS_VBAT_CRITICAL, true).unwrap();
        topsys.request(TOPSYS_VBAT_CRITICAL, false).unwrap();

        assert!(topsys.is_enabled(TOPSYS_VBAT_CRITICAL));
        assert!(!topsys.host_enabled(TOPSYS_VBAT_CRITICAL));
        assert_eq!(pmic.writes_to(TOPSYS_MASK), [0xF6]);

        topsys.set_event_demand(TOPSYS_VBAT_CRITICAL, false).unwrap();
        assert_eq!(topsys.enabled_shadow(), 0);
        assert!(!root.is_enabled(RootIrq::Topsys.hwirq()));
    }

    #[test]
    fn test_wake_cascades_to_root() {
        let (_pmic, root, topsys) = setup();
        topsys.set_wake(TOPSYS_PWRKEY_PRESS, true).unwrap();
        assert!(root.wake_enabled(RootIrq::Topsys));
        topsys.set_wake(TOPSYS_PWRKEY_PRESS, false).unwrap();
        assert!(!root.wake_enabled(RootIrq::Topsys));
    }

    #[test]
    fn test_status_read_failure() {
        let (pmic, _root, topsys) = setup();
        topsys.request(TOPSYS_PWRKEY_PRESS, true).unwrap();
        pmic.raise(TOPSYS_STATUS, 0x02);
        pmic.fail_reads_from(TOPSYS_STATUS, true);

        let sink = Recorder(SpinLock::new(Vec::new()));
        assert_eq!(topsys.handle_nested(&sink), 0);
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    #[should_panic]
    fn test_aggregate_bit_is_not_an_irq() {
        let (_pmic, _root, topsys) = setup();
        topsys.enable(0);
    }
}
