//! Semantic event publish/subscribe
//!
//! Consumers subscribe to events such as "power key pressed" without knowing
//! which register bit carries them. A registry can be given a gate so that an
//! event's source interrupt is enabled while the event has subscribers.
//! Subscriber demand is kept apart from the host's own enable state, see
//! [`InterruptDomain::set_event_demand`].

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::core::irq::topsys::{
    TOPSYS_PWRKEY_LONG, TOPSYS_PWRKEY_PRESS, TOPSYS_PWRKEY_RELEASE, TOPSYS_VBAT_CRITICAL,
};
use crate::core::irq::{DomainKind, HwIrq, InterruptDomain};
use crate::core::sync::SpinLock;
use crate::{Error, Result};

/// Events published by the PMIC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    /// Power key pressed
    PowerKeyPress,
    /// Power key released
    PowerKeyRelease,
    /// Power key held down
    PowerKeyLongPress,
    /// Battery voltage critically low
    BatteryCriticalLow,
    /// Software-requested partial restart
    SwRestart,
    /// Software-requested full shutdown
    SwShutdown,
    /// Software-requested factory-ship state
    FactoryShip,
}

impl EventId {
    /// Every event
    pub const ALL: [EventId; 7] = [
        EventId::PowerKeyPress,
        EventId::PowerKeyRelease,
        EventId::PowerKeyLongPress,
        EventId::BatteryCriticalLow,
        EventId::SwRestart,
        EventId::SwShutdown,
        EventId::FactoryShip,
    ];

    /// Interrupt that signals this event, if any
    ///
    /// Software events have no interrupt source.
    pub fn source(self) -> Option<(DomainKind, HwIrq)> {
        match self {
            EventId::PowerKeyPress => Some((DomainKind::Topsys, TOPSYS_PWRKEY_PRESS)),
            EventId::PowerKeyRelease => Some((DomainKind::Topsys, TOPSYS_PWRKEY_RELEASE)),
            EventId::PowerKeyLongPress => Some((DomainKind::Topsys, TOPSYS_PWRKEY_LONG)),
            EventId::BatteryCriticalLow => Some((DomainKind::Topsys, TOPSYS_VBAT_CRITICAL)),
            EventId::SwRestart | EventId::SwShutdown | EventId::FactoryShip => None,
        }
    }

    /// Event signalled by an interrupt, if any
    pub fn from_source(kind: DomainKind, hwirq: HwIrq) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|event| event.source() == Some((kind, hwirq)))
    }
}

/// Event subscriber
pub trait EventHandler: Send + Sync {
    /// Called once per published event
    fn on_event(&self, event: EventId);
}

impl<F: Fn(EventId) + Send + Sync> EventHandler for F {
    fn on_event(&self, event: EventId) {
        self(event)
    }
}

/// Enables an event's source while the event has subscribers
pub trait EventGate: Send + Sync {
    /// Enable or disable the source of `event`
    fn set_event_enabled(&self, event: EventId, enable: bool) -> Result<()>;
}

/// Gate that drives subscriber demand for the sources in one domain
pub struct DomainEventGate {
    domain: Arc<dyn InterruptDomain>,
}

impl DomainEventGate {
    /// Gate the events whose source is in `domain`
    pub fn new(domain: Arc<dyn InterruptDomain>) -> Self {
        Self { domain }
    }
}

impl EventGate for DomainEventGate {
    fn set_event_enabled(&self, event: EventId, enable: bool) -> Result<()> {
        match event.source() {
            Some((kind, hwirq)) if kind == self.domain.kind() => {
                self.domain.set_event_demand(hwirq, enable)
            }
            _ => Ok(()),
        }
    }
}

/// Subscription handle returned by [`EventRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u32);

struct Entry {
    handle: EventHandle,
    event: EventId,
    handler: Arc<dyn EventHandler>,
}

/// Event registry
pub struct EventRegistry {
    entries: SpinLock<Vec<Entry>>,
    next_handle: AtomicU32,
    gate: Option<Arc<dyn EventGate>>,
}

impl EventRegistry {
    /// Create an empty registry without a gate
    pub fn new() -> Self {
        Self {
            entries: SpinLock::new(Vec::new()),
            next_handle: AtomicU32::new(1),
            gate: None,
        }
    }

    /// Create an empty registry that gates event sources through `gate`
    pub fn with_gate(gate: Arc<dyn EventGate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    /// Subscribe `handler` to `event`
    ///
    /// The same handler may be registered more than once; every
    /// registration is called. If the event's source cannot be enabled the
    /// subscription is dropped again and the error returned.
    pub fn register(&self, event: EventId, handler: Arc<dyn EventHandler>) -> Result<EventHandle> {
        let mut entries = self.entries.lock();
        entries.try_reserve(1).map_err(|_| Error::OutOfMemory)?;

        let first = !entries.iter().any(|entry| entry.event == event);
        let handle = EventHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        entries.push(Entry {
            handle,
            event,
            handler,
        });

        if first {
            if let Err(e) = self.gate_event(event, true) {
                entries.pop();
                // Withdraw the demand so a later commit does not unmask it
                let _ = self.gate_event(event, false);
                return Err(e);
            }
        }
        log::debug!("registered handler {:?} for {:?}", handle, event);
        Ok(handle)
    }

    /// Remove a subscription
    ///
    /// The subscription is gone even when disabling the event's source
    /// fails; that error is still returned.
    pub fn unregister(&self, handle: EventHandle) -> Result<()> {
        let mut entries = self.entries.lock();
        let Some(pos) = entries.iter().position(|entry| entry.handle == handle) else {
            log::warn!("unregister of unknown event handler {:?}", handle);
            return Err(Error::NotFound);
        };

        let entry = entries.remove(pos);
        log::debug!("unregistered handler {:?} for {:?}", handle, entry.event);
        if !entries.iter().any(|other| other.event == entry.event) {
            self.gate_event(entry.event, false)?;
        }
        Ok(())
    }

    /// Call every handler subscribed to `event`
    ///
    /// Handlers run without the registry lock held and may register or
    /// unregister. Returns the number of handlers called.
    pub fn notify(&self, event: EventId) -> usize {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| entry.handler.clone())
            .collect();

        for handler in &handlers {
            handler.on_event(event);
        }
        handlers.len()
    }

    /// Number of subscriptions to `event`
    pub fn subscribers(&self, event: EventId) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.event == event)
            .count()
    }

    fn gate_event(&self, event: EventId, enable: bool) -> Result<()> {
        let Some(gate) = &self.gate else {
            return Ok(());
        };
        gate.set_event_enabled(event, enable).map_err(|e| {
            log::error!(
                "failed to {} source of {:?}: {}",
                if enable { "enable" } else { "disable" },
                event,
                e
            );
            e
        })
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::BusError;
    use core::sync::atomic::AtomicBool;
    use test_case::test_case;

    #[derive(Default)]
    struct Counter(AtomicU32);

    impl EventHandler for Counter {
        fn on_event(&self, _event: EventId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingGate {
        calls: SpinLock<Vec<(EventId, bool)>>,
        broken: AtomicBool,
    }

    impl EventGate for RecordingGate {
        fn set_event_enabled(&self, event: EventId, enable: bool) -> Result<()> {
            self.calls.lock().push((event, enable));
            if self.broken.load(Ordering::SeqCst) {
                return Err(Error::Bus(BusError::Io));
            }
            Ok(())
        }
    }

    #[test_case(EventId::PowerKeyPress, TOPSYS_PWRKEY_PRESS)]
    #[test_case(EventId::PowerKeyRelease, TOPSYS_PWRKEY_RELEASE)]
    #[test_case(EventId::PowerKeyLongPress, TOPSYS_PWRKEY_LONG)]
    #[test_case(EventId::BatteryCriticalLow, TOPSYS_VBAT_CRITICAL)]
    fn test_source_mapping(event: EventId, hwirq: HwIrq) {
        assert_eq!(event.source(), Some((DomainKind::Topsys, hwirq)));
        assert_eq!(EventId::from_source(DomainKind::Topsys, hwirq), Some(event));
    }

    #[test]
    fn test_software_events_have_no_source() {
        assert_eq!(EventId::SwShutdown.source(), None);
        assert_eq!(EventId::from_source(DomainKind::Gpio, TOPSYS_PWRKEY_PRESS), None);
    }

    #[test]
    fn test_notify_matching_only() {
        let registry = EventRegistry::new();
        let press = Arc::new(Counter::default());
        let low = Arc::new(Counter::default());
        registry.register(EventId::PowerKeyPress, press.clone()).unwrap();
        registry.register(EventId::PowerKeyPress, press.clone()).unwrap();
        registry.register(EventId::BatteryCriticalLow, low.clone()).unwrap();

        assert_eq!(registry.notify(EventId::PowerKeyPress), 2);
        assert_eq!(press.0.load(Ordering::SeqCst), 2);
        assert_eq!(low.0.load(Ordering::SeqCst), 0);
        assert_eq!(registry.notify(EventId::SwRestart), 0);
    }

    #[test]
    fn test_unregister() {
        let registry = EventRegistry::new();
        let counter = Arc::new(Counter::default());
        let handle = registry.register(EventId::FactoryShip, counter.clone()).unwrap();

        registry.unregister(handle).unwrap();
        assert_eq!(registry.notify(EventId::FactoryShip), 0);
        assert_eq!(registry.unregister(handle), Err(Error::NotFound));
    }

    #[test]
    fn test_closure_handler() {
        let registry = EventRegistry::new();
        let seen = Arc::new(SpinLock::new(Vec::new()));
        let events = seen.clone();
        registry
            .register(
                EventId::PowerKeyRelease,
                Arc::new(move |event: EventId| events.lock().push(event)),
            )
            .unwrap();

        registry.notify(EventId::PowerKeyRelease);
        assert_eq!(*seen.lock(), [EventId::PowerKeyRelease]);
    }

    #[test]
    fn test_gate_follows_first_and_last_subscriber() {
        let gate = Arc::new(RecordingGate::default());
        let registry = EventRegistry::with_gate(gate.clone());
        let counter: Arc<dyn EventHandler> = Arc::new(Counter::default());

        let a = registry.register(EventId::PowerKeyPress, counter.clone()).unwrap();
        let b = registry.register(EventId::PowerKeyPress, counter.clone()).unwrap();
        registry.unregister(a).unwrap();
        assert_eq!(*gate.calls.lock(), [(EventId::PowerKeyPress, true)]);

        registry.unregister(b).unwrap();
        assert_eq!(
            *gate.calls.lock(),
            [(EventId::PowerKeyPress, true), (EventId::PowerKeyPress, false)]
        );
        assert_eq!(registry.subscribers(EventId::PowerKeyPress), 0);
    }

    #[test]
    fn test_register_rolls_back_when_gate_fails() {
        let gate = Arc::new(RecordingGate::default());
        let registry = EventRegistry::with_gate(gate.clone());
        let counter = Arc::new(Counter::default());
        gate.broken.store(true, Ordering::SeqCst);

        let result = registry.register(EventId::BatteryCriticalLow, counter.clone());
        assert_eq!(result, Err(Error::Bus(BusError::Io)));
        assert_eq!(registry.subscribers(EventId::BatteryCriticalLow), 0);
        assert_eq!(registry.notify(EventId::BatteryCriticalLow), 0);
        assert_eq!(
            *gate.calls.lock(),
            [(EventId::BatteryCriticalLow, true), (EventId::BatteryCriticalLow, false)]
        );

        gate.broken.store(false, Ordering::SeqCst);
        registry.register(EventId::BatteryCriticalLow, counter).unwrap();
        assert_eq!(registry.subscribers(EventId::BatteryCriticalLow), 1);
    }

    #[test]
    fn test_unregister_reports_gate_failure() {
        let gate = Arc::new(RecordingGate::default());
        let registry = EventRegistry::with_gate(gate.clone());
        let handle = registry
            .register(EventId::PowerKeyLongPress, Arc::new(Counter::default()))
            .unwrap();
        gate.broken.store(true, Ordering::SeqCst);

        assert_eq!(registry.unregister(handle), Err(Error::Bus(BusError::Io)));
        assert_eq!(registry.subscribers(EventId::PowerKeyLongPress), 0);
        assert_eq!(registry.unregister(handle), Err(Error::NotFound));
    }
}
