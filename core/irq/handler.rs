//! Threaded interrupt dispatch
//!
//! The PMIC signals the host on a single line. Raising that line only
//! disables it and queues a dispatch request; the bus work happens later
//! in [`Dispatcher::service`], called from a worker that is allowed to
//! block. Servicing reads every root status group, walks the root irqs in
//! table order and recurses into the topsys and GPIO domains for their
//! aggregate bits.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use heapless::spsc::Queue;

use crate::core::irq::chip::{RootController, RootIrq};
use crate::core::irq::gpio::GpioController;
use crate::core::irq::topsys::TopsysController;
use crate::core::irq::{HostLine, InterruptDomain, IrqSink};
use crate::core::sync::SpinLock;

/// The three interrupt domains, as seen by the dispatcher
#[derive(Clone)]
pub struct IrqTree {
    /// Root controller
    pub root: Arc<RootController>,
    /// Topsys domain
    pub topsys: Arc<TopsysController>,
    /// GPIO domain
    pub gpio: Arc<GpioController>,
}

impl IrqTree {
    /// Read all root groups and deliver every pending, enabled irq
    ///
    /// Status groups are read whether or not anything in them is enabled,
    /// which clears latched bits of masked sources. Returns the number of
    /// leaf irqs delivered.
    pub fn fanout(&self, sink: &dyn IrqSink) -> usize {
        let status = self.root.read_all_status();

        let mut delivered = 0;
        for irq in RootIrq::ALL {
            let desc = irq.descriptor();
            if status[desc.group] & desc.mask == 0 {
                continue;
            }
            if !self.root.is_enabled(irq.hwirq()) {
                log::debug!("root irq {:?} pending but masked", irq);
                continue;
            }
            delivered += match irq {
                RootIrq::Topsys => self.topsys.handle_nested(sink),
                RootIrq::Gpio => self.gpio.handle_nested(sink),
                leaf => {
                    sink.handle_irq(self.root.irq_number(leaf));
                    1
                }
            };
        }
        delivered
    }
}

/// One assertion of the host line waiting to be serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Running count of accepted requests
    pub sequence: u32,
}

/// Dispatcher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Line assertions seen
    pub raised: u32,
    /// Assertions folded into an already queued request
    pub coalesced: u32,
    /// Requests serviced
    pub serviced: u32,
    /// Leaf irqs delivered
    pub delivered: u32,
}

/// Single-line threaded dispatcher
pub struct Dispatcher {
    line: Arc<dyn HostLine>,
    /// Holds at most one request
    requests: SpinLock<Queue<DispatchRequest, 2>>,
    stopped: AtomicBool,
    stats: SpinLock<DispatchStats>,
}

impl Dispatcher {
    /// Create a dispatcher for `line`
    pub fn new(line: Arc<dyn HostLine>) -> Self {
        Self {
            line,
            requests: SpinLock::new(Queue::new()),
            stopped: AtomicBool::new(false),
            stats: SpinLock::new(DispatchStats::default()),
        }
    }

    /// Host line asserted
    ///
    /// Disables the line and queues a request. Returns false when a request
    /// was already queued or the dispatcher is shut down. Never touches the
    /// bus.
    pub fn raise(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }

        let mut requests = self.requests.lock();
        let mut stats = self.stats.lock();
        stats.raised += 1;
        if requests.is_full() {
            stats.coalesced += 1;
            return false;
        }

        self.line.disable();
        let request = DispatchRequest {
            sequence: stats.raised - stats.coalesced,
        };
        // Cannot fail, fullness was checked under the same lock
        let _ = requests.enqueue(request);
        true
    }

    /// Whether a request is waiting
    pub fn is_pending(&self) -> bool {
        !self.requests.lock().is_empty()
    }

    /// Service one queued request
    ///
    /// Returns `None` if nothing was queued, otherwise the number of leaf
    /// irqs delivered. The line is re-enabled once fanout completes.
    pub fn service(&self, tree: &IrqTree, sink: &dyn IrqSink) -> Option<usize> {
        let request = self.requests.lock().dequeue()?;
        log::debug!("servicing dispatch request {}", request.sequence);

        let delivered = tree.fanout(sink);
        {
            let mut stats = self.stats.lock();
            stats.serviced += 1;
            stats.delivered += delivered as u32;
        }

        if !self.stopped.load(Ordering::Acquire) {
            self.line.enable();
        }
        Some(delivered)
    }

    /// Service requests until none is queued
    ///
    /// Returns the total number of leaf irqs delivered.
    pub fn run(&self, tree: &IrqTree, sink: &dyn IrqSink) -> usize {
        let mut delivered = 0;
        while let Some(count) = self.service(tree, sink) {
            delivered += count;
        }
        delivered
    }

    /// Stop accepting requests and drop any queued one
    ///
    /// The host line is left disabled.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        let mut requests = self.requests.lock();
        while requests.dequeue().is_some() {}
        log::info!("interrupt dispatcher stopped");
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Get dispatcher statistics
    pub fn get_stats(&self) -> DispatchStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::irq::topsys::{TOPSYS_PWRKEY_PRESS, TOPSYS_VBAT_CRITICAL};
    use crate::core::irq::{Cascade, IrqNumber, IrqTrigger};
    use crate::drivers::regs::{GPIO_STATUS, IRQ_STATUS0, IRQ_STATUS1, TOPSYS_STATUS};
    use crate::drivers::BusHandle;
    use crate::emulator::EmulatedPmic;
    use alloc::vec::Vec;
    use core::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Line {
        enabled: AtomicBool,
        toggles: AtomicU32,
    }

    impl HostLine for Line {
        fn disable(&self) {
            self.enabled.store(false, Ordering::SeqCst);
            self.toggles.fetch_add(1, Ordering::SeqCst);
        }

        fn enable(&self) {
            self.enabled.store(true, Ordering::SeqCst);
            self.toggles.fetch_add(1, Ordering::SeqCst);
        }

        fn set_wake(&self, _on: bool) {}
    }

    #[derive(Default)]
    struct Recorder(SpinLock<Vec<IrqNumber>>);

    impl IrqSink for Recorder {
        fn handle_irq(&self, irq: IrqNumber) {
            self.0.lock().push(irq);
        }
    }

    fn setup() -> (EmulatedPmic, IrqTree) {
        let pmic = EmulatedPmic::new();
        let bus = BusHandle::new(pmic.clone());
        let root = Arc::new(RootController::new(bus.clone(), 0));
        let topsys = Arc::new(TopsysController::new(
            bus.clone(),
            16,
            Cascade::new(root.clone(), RootIrq::Topsys.hwirq()),
        ));
        let gpio = Arc::new(GpioController::new(
            bus,
            24,
            4,
            Cascade::new(root.clone(), RootIrq::Gpio.hwirq()),
        ));
        root.init().unwrap();
        topsys.init().unwrap();
        gpio.init().unwrap();
        pmic.clear_log();
        (pmic, IrqTree { root, topsys, gpio })
    }

    #[test]
    fn test_fanout_in_table_order() {
        let (pmic, tree) = setup();
        tree.root.enable(RootIrq::Thermal.hwirq());
        tree.root.enable(RootIrq::Charger.hwirq());
        tree.root.commit(false).unwrap();
        tree.topsys.request(TOPSYS_PWRKEY_PRESS, true).unwrap();
        tree.gpio.set_type(1, IrqTrigger::EDGE_RISING).unwrap();
        tree.gpio.request(1, true).unwrap();

        pmic.raise(IRQ_STATUS0, 0b0000_0111);
        pmic.raise(IRQ_STATUS1, 0b0000_0100);
        pmic.raise(TOPSYS_STATUS, 0b0000_0010);
        pmic.raise(GPIO_STATUS, 0b0000_0010);

        let sink = Recorder::default();
        assert_eq!(tree.fanout(&sink), 4);
        assert_eq!(*sink.0.lock(), [17, 25, 2, 8]);
    }

    #[test]
    fn test_fanout_clears_masked_sources() {
        let (pmic, tree) = setup();
        pmic.raise(IRQ_STATUS0, 0b0010_0000);
        pmic.raise(IRQ_STATUS1, 0b0000_1000);

        let sink = Recorder::default();
        assert_eq!(tree.fanout(&sink), 0);
        assert_eq!(pmic.reg(IRQ_STATUS0), 0);
        assert_eq!(pmic.reg(IRQ_STATUS1), 0);
    }

    #[test]
    fn test_masked_aggregate_skips_nested_read() {
        let (pmic, tree) = setup();
        pmic.raise(IRQ_STATUS0, 0b0000_0001);
        pmic.raise(TOPSYS_STATUS, 1 << TOPSYS_VBAT_CRITICAL);

        let sink = Recorder::default();
        assert_eq!(tree.fanout(&sink), 0);
        assert_eq!(pmic.reg(TOPSYS_STATUS), 1 << TOPSYS_VBAT_CRITICAL);
    }

    #[test]
    fn test_raise_and_service() {
        let (pmic, tree) = setup();
        let line = Arc::new(Line::default());
        let dispatcher = Dispatcher::new(line.clone());
        tree.root.request(RootIrq::Rtc.hwirq(), true).unwrap();
        pmic.raise(IRQ_STATUS0, 0b0001_0000);

        assert!(dispatcher.raise());
        assert!(!line.enabled.load(Ordering::SeqCst));
        assert!(!dispatcher.raise());
        assert!(dispatcher.is_pending());

        let sink = Recorder::default();
        assert_eq!(dispatcher.service(&tree, &sink), Some(1));
        assert!(line.enabled.load(Ordering::SeqCst));
        assert_eq!(dispatcher.service(&tree, &sink), None);
        assert_eq!(*sink.0.lock(), [4]);

        let stats = dispatcher.get_stats();
        assert_eq!(stats.raised, 2);
        assert_eq!(stats.coalesced, 1);
        assert_eq!(stats.serviced, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[test]
    fn test_run_drains_queue() {
        let (_pmic, tree) = setup();
        let dispatcher = Dispatcher::new(Arc::new(Line::default()));
        let sink = Recorder::default();

        assert_eq!(dispatcher.run(&tree, &sink), 0);
        dispatcher.raise();
        assert_eq!(dispatcher.run(&tree, &sink), 0);
        assert!(!dispatcher.is_pending());
        assert_eq!(dispatcher.get_stats().serviced, 1);
    }

    #[test]
    fn test_shutdown_drops_requests() {
        let (_pmic, tree) = setup();
        let line = Arc::new(Line::default());
        let dispatcher = Dispatcher::new(line.clone());

        dispatcher.raise();
        dispatcher.shutdown();
        assert!(dispatcher.is_stopped());
        assert!(!dispatcher.raise());

        let sink = Recorder::default();
        assert_eq!(dispatcher.service(&tree, &sink), None);
        assert!(!line.enabled.load(Ordering::SeqCst));
        assert_eq!(line.toggles.load(Ordering::SeqCst), 1);
    }
}
