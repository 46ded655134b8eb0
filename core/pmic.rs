//! PMIC chip context
//!
//! Owns the three interrupt domains, the dispatcher, the event registry and
//! the wakeup voter list for one chip. Host code addresses interrupts by the
//! numbers laid out in [`IrqLayout`] and never sees the register map.

use alloc::sync::Arc;

use crate::config::{IrqLayout, PmicConfig};
use crate::core::event::{DomainEventGate, EventHandle, EventHandler, EventId, EventRegistry};
use crate::core::irq::chip::{RootBatch, RootController, RootIrq};
use crate::core::irq::gpio::{GpioBatch, GpioController};
use crate::core::irq::handler::{DispatchStats, Dispatcher, IrqTree};
use crate::core::irq::topsys::{TopsysBatch, TopsysController};
use crate::core::irq::{
    Cascade, DomainKind, HostLine, HwIrq, InterruptDomain, IrqNumber, IrqSink, IrqTrigger,
};
use crate::core::wakeup::{DeviceId, WakeupSink, WakeupVoterList};
use crate::drivers::power::{PowerCommand, PowerControl};
use crate::drivers::BusHandle;
use crate::{Error, Result};

/// Publishes events for dispatched irqs, then hands them to the host
///
/// A topsys event that is only unmasked for subscribers is not passed on to
/// the host.
struct EventBridge {
    layout: IrqLayout,
    events: Arc<EventRegistry>,
    topsys: Arc<TopsysController>,
    sink: Arc<dyn IrqSink>,
}

impl IrqSink for EventBridge {
    fn handle_irq(&self, irq: IrqNumber) {
        if let Some((kind, hwirq)) = self.layout.decode(irq) {
            if let Some(event) = EventId::from_source(kind, hwirq) {
                self.events.notify(event);
            }
            if kind == DomainKind::Topsys && !self.topsys.host_enabled(hwirq) {
                return;
            }
        }
        self.sink.handle_irq(irq);
    }
}

/// One PMIC
pub struct Pmic {
    config: PmicConfig,
    tree: IrqTree,
    dispatcher: Dispatcher,
    events: Arc<EventRegistry>,
    wakeup: WakeupVoterList,
    power: PowerControl,
    bridge: EventBridge,
}

impl Pmic {
    /// Build the chip context
    ///
    /// No bus traffic happens until [`init`](Self::init). `line` is the host
    /// line the PMIC drives and is armed for wakeup while any interrupt is a
    /// wakeup source, `sink` receives every dispatched irq the host enabled
    /// and `wakeup_sink` carries out wakeup votes.
    pub fn new(
        bus: BusHandle,
        config: PmicConfig,
        line: Arc<dyn HostLine>,
        sink: Arc<dyn IrqSink>,
        wakeup_sink: Arc<dyn WakeupSink>,
    ) -> Result<Self> {
        config.validate()?;
        let layout = config.layout;

        let root = Arc::new(
            RootController::new(bus.clone(), layout.root_base).with_wake_line(line.clone()),
        );
        let topsys = Arc::new(TopsysController::new(
            bus.clone(),
            layout.topsys_base,
            Cascade::new(root.clone(), RootIrq::Topsys.hwirq()),
        ));
        let gpio = Arc::new(GpioController::new(
            bus.clone(),
            layout.gpio_base,
            layout.gpio_pins,
            Cascade::new(root.clone(), RootIrq::Gpio.hwirq()),
        ));

        let events = Arc::new(EventRegistry::with_gate(Arc::new(DomainEventGate::new(
            topsys.clone(),
        ))));
        let bridge = EventBridge {
            layout,
            events: events.clone(),
            topsys: topsys.clone(),
            sink,
        };

        Ok(Self {
            config,
            tree: IrqTree { root, topsys, gpio },
            dispatcher: Dispatcher::new(line),
            bridge,
            power: PowerControl::new(bus),
            events,
            wakeup: WakeupVoterList::new(wakeup_sink),
        })
    }

    /// Put every domain into its all-masked reset state
    ///
    /// # Panics
    /// Panics when called twice.
    pub fn init(&self) -> Result<()> {
        self.tree.root.init()?;
        self.tree.topsys.init()?;
        self.tree.gpio.init()?;
        log::info!("PMIC interrupt controller ready");
        Ok(())
    }

    /// Irq number layout
    pub fn layout(&self) -> &IrqLayout {
        &self.config.layout
    }

    /// Host irq number of `hwirq` in `kind`
    pub fn irq(&self, kind: DomainKind, hwirq: HwIrq) -> IrqNumber {
        self.config.layout.irq(kind, hwirq)
    }

    /// The interrupt domains
    pub fn tree(&self) -> &IrqTree {
        &self.tree
    }

    /// Domain owning `kind`
    pub fn domain(&self, kind: DomainKind) -> Arc<dyn InterruptDomain> {
        match kind {
            DomainKind::Root => self.tree.root.clone(),
            DomainKind::Topsys => self.tree.topsys.clone(),
            DomainKind::Gpio => self.tree.gpio.clone(),
        }
    }

    /// Start a batch of changes for the domain owning `irq`
    ///
    /// # Panics
    /// Panics if `irq` does not belong to this PMIC.
    pub fn bus_lock(&self, irq: IrqNumber) -> IrqBatch<'_> {
        let (kind, hwirq) = self.decode(irq);
        let inner = match kind {
            DomainKind::Root => DomainBatch::Root(self.tree.root.bus_lock()),
            DomainKind::Topsys => DomainBatch::Topsys(self.tree.topsys.bus_lock()),
            DomainKind::Gpio => DomainBatch::Gpio(self.tree.gpio.bus_lock()),
        };
        IrqBatch { hwirq, inner }
    }

    /// Enable `irq` and commit right away
    pub fn enable_irq(&self, irq: IrqNumber) -> Result<()> {
        let (kind, hwirq) = self.decode(irq);
        self.domain(kind).request(hwirq, true)
    }

    /// Disable `irq` and commit right away
    pub fn disable_irq(&self, irq: IrqNumber) -> Result<()> {
        let (kind, hwirq) = self.decode(irq);
        self.domain(kind).request(hwirq, false)
    }

    /// Host line asserted; see [`Dispatcher::raise`]
    pub fn raise(&self) -> bool {
        self.dispatcher.raise()
    }

    /// Service one queued dispatch request
    pub fn service(&self) -> Option<usize> {
        self.dispatcher.service(&self.tree, &self.bridge)
    }

    /// Service every queued dispatch request
    pub fn run(&self) -> usize {
        self.dispatcher.run(&self.tree, &self.bridge)
    }

    /// Stop dispatching
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }

    /// Dispatcher statistics
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.get_stats()
    }

    /// Event registry
    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    /// Subscribe to an event
    pub fn event_register(&self, event: EventId, handler: Arc<dyn EventHandler>) -> Result<EventHandle> {
        self.events.register(event, handler)
    }

    /// Drop a subscription
    pub fn event_unregister(&self, handle: EventHandle) -> Result<()> {
        self.events.unregister(handle)
    }

    /// Wakeup voter list
    pub fn wakeup(&self) -> &WakeupVoterList {
        &self.wakeup
    }

    /// Add or withdraw a device's wakeup vote
    pub fn wakeup_vote(&self, device: DeviceId, enable: bool) -> Result<()> {
        self.wakeup.vote(device, enable)
    }

    /// Request a software power transition
    ///
    /// Issues the command to the device, then publishes the matching event
    /// to subscribers. Nothing is published when the command could not be
    /// written. `command` must carry exactly one command bit.
    pub fn request_power(&self, command: PowerCommand) -> Result<()> {
        let event = command.event().ok_or(Error::InvalidArgument)?;
        log::info!("power transition {:?} requested", event);
        self.power.issue(command)?;
        self.events.notify(event);
        Ok(())
    }

    fn decode(&self, irq: IrqNumber) -> (DomainKind, HwIrq) {
        match self.config.layout.decode(irq) {
            Some(decoded) => decoded,
            None => panic!("irq {} does not belong to this PMIC", irq),
        }
    }
}

enum DomainBatch<'a> {
    Root(RootBatch<'a>),
    Topsys(TopsysBatch<'a>),
    Gpio(GpioBatch<'a>),
}

/// A batch of changes for one irq, holding its domain's lock
///
/// Changes only touch the domain's shadow state until
/// [`sync_unlock`](Self::sync_unlock).
pub struct IrqBatch<'a> {
    hwirq: HwIrq,
    inner: DomainBatch<'a>,
}

impl<'a> IrqBatch<'a> {
    /// Mask the irq
    pub fn mask(&mut self) {
        match &mut self.inner {
            DomainBatch::Root(batch) => batch.mask(self.hwirq),
            DomainBatch::Topsys(batch) => batch.mask(self.hwirq),
            DomainBatch::Gpio(batch) => batch.mask(self.hwirq),
        }
    }

    /// Unmask the irq
    pub fn unmask(&mut self) {
        match &mut self.inner {
            DomainBatch::Root(batch) => batch.unmask(self.hwirq),
            DomainBatch::Topsys(batch) => batch.unmask(self.hwirq),
            DomainBatch::Gpio(batch) => batch.unmask(self.hwirq),
        }
    }

    /// Set the trigger type
    ///
    /// Only GPIO pins are configurable. Root and topsys irqs accept an
    /// empty trigger (keep the default) and reject anything else.
    pub fn set_type(&mut self, trigger: IrqTrigger) -> Result<()> {
        match &mut self.inner {
            DomainBatch::Gpio(batch) => batch.set_type(self.hwirq, trigger),
            _ if trigger.is_empty() => Ok(()),
            _ => Err(Error::NotSupported),
        }
    }

    /// Mark the irq as a wakeup source
    pub fn set_wake(&mut self, on: bool) {
        match &mut self.inner {
            DomainBatch::Root(batch) => batch.set_wake(self.hwirq, on),
            DomainBatch::Topsys(batch) => batch.set_wake(self.hwirq, on),
            DomainBatch::Gpio(batch) => batch.set_wake(self.hwirq, on),
        }
    }

    /// Flush the batch to the device and release the domain lock
    pub fn sync_unlock(self) -> Result<()> {
        match self.inner {
            DomainBatch::Root(batch) => batch.sync_unlock(),
            DomainBatch::Topsys(batch) => batch.sync_unlock(),
            DomainBatch::Gpio(batch) => batch.sync_unlock(),
        }
    }
}
