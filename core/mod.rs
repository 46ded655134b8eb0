//! Core modules
//!
//! This module contains the interrupt domains, the event registry, the
//! wakeup voter list and the chip context tying them together.

pub mod event;
pub mod irq;
pub mod pmic;
pub mod sync;
pub mod wakeup;
