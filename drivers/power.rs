//! Software power transitions
//!
//! Restart, shutdown and factory-ship are requested by writing command bits
//! to the power control register. The hardware acts only on a 0 -> 1 edge of
//! those bits, so every request first clears the command field and then
//! writes the command.

use bitflags::bitflags;

use super::regs::PWR_CTRL_CMD;
use super::BusHandle;
use crate::core::event::EventId;
use crate::Result;

bitflags! {
    /// Command bits of the power control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PowerCommand: u8 {
        /// Full shutdown
        const SHUTDOWN = 1 << 0;
        /// Partial restart
        const RESTART = 1 << 1;
        /// Lowest-power shipping state
        const FACTORY_SHIP = 1 << 2;
    }
}

impl PowerCommand {
    /// Command carried out for a software power event
    pub fn for_event(event: EventId) -> Option<Self> {
        match event {
            EventId::SwRestart => Some(PowerCommand::RESTART),
            EventId::SwShutdown => Some(PowerCommand::SHUTDOWN),
            EventId::FactoryShip => Some(PowerCommand::FACTORY_SHIP),
            _ => None,
        }
    }

    /// Software event that requests this command
    ///
    /// `None` unless exactly one command bit is set.
    pub fn event(self) -> Option<EventId> {
        EventId::ALL
            .into_iter()
            .find(|event| Self::for_event(*event) == Some(self))
    }
}

/// Issues power transition commands
pub struct PowerControl {
    bus: BusHandle,
}

impl PowerControl {
    /// Create a power controller on the given bus
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }

    /// Issue a command with the clear-then-set protocol
    pub fn issue(&self, command: PowerCommand) -> Result<()> {
        log::info!("issuing power command {:?}", command);
        let result = self
            .bus
            .write_field(PWR_CTRL_CMD, 0)
            .and_then(|()| self.bus.write_field(PWR_CTRL_CMD, command.bits()));
        if let Err(e) = &result {
            log::error!("power command {:?} failed: {}", command, e);
        }
        result
    }
}
