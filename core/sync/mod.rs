//! Synchronization primitives
//!
//! Locks shared by the interrupt domains, the registries and the bus handle.

pub mod spinlock;

// Re-export SpinLock for convenience
pub use spinlock::{SpinLock, SpinLockGuard};
