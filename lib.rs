//! pmic-irq - Interrupt plumbing for a multi-function PMIC
//!
//! This library exposes the many interrupt sources of a power-management
//! chip as ordinary host interrupt lines. Masking and status inspection go
//! over a slow, blocking register bus, so every mask change is recorded in
//! an in-memory shadow and flushed to the device at a single
//! synchronization point.
//!
//! # Module Organization
//!
//! - [`core::irq`]: the root, topsys and GPIO interrupt domains and the
//!   threaded dispatcher
//! - [`core::event`]: semantic event publish/subscribe
//! - [`core::wakeup`]: reference-counted wakeup voting
//! - [`core::pmic`]: the chip context that owns all of the above
//! - [`drivers`]: register bus access, register fields and power control
//! - [`emulator`]: an in-memory PMIC register file

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Configuration
pub mod config;

// Core interrupt, event and wakeup machinery
pub mod core;

// Register bus and device-facing drivers
pub mod drivers;

// Device emulation
pub mod emulator;


// Re-export key types for convenience
pub use crate::config::{IrqLayout, PmicConfig};
pub use crate::core::event::{EventHandle, EventHandler, EventId, EventRegistry};
pub use crate::core::irq::{DomainKind, HostLine, HwIrq, InterruptDomain, IrqNumber, IrqSink, IrqTrigger};
pub use crate::core::pmic::{IrqBatch, Pmic};
pub use crate::core::wakeup::{DeviceId, WakeupSink, WakeupVoterList};
pub use crate::drivers::{BusError, BusHandle, RegisterBus};

/// pmic-irq version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common error type for pmic-irq
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    InvalidArgument,
    /// Out of memory
    OutOfMemory,
    /// Not found
    NotFound,
    /// Operation not supported by this domain
    NotSupported,
    /// Invalid configuration
    InvalidConfig,
    /// Register bus error
    Bus(BusError),
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Error::Bus(err)
    }
}

impl ::core::fmt::Display for Error {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::OutOfMemory => f.write_str("out of memory"),
            Error::NotFound => f.write_str("not found"),
            Error::NotSupported => f.write_str("operation not supported"),
            Error::InvalidConfig => f.write_str("invalid configuration"),
            Error::Bus(err) => write!(f, "bus error: {:?}", err),
        }
    }
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;
