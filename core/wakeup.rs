//! Wakeup voting
//!
//! Devices that rely on the PMIC to wake the system vote for it. The chip
//! stays armed as a wakeup source while at least one device holds a vote;
//! each voting device also gets its own wakeup flag.

use alloc::sync::Arc;
use heapless::Vec;

use crate::config::MAX_WAKEUP_VOTERS;
use crate::core::sync::SpinLock;
use crate::{Error, Result};

/// Identity of a voting device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

/// Where wakeup votes take effect
pub trait WakeupSink: Send + Sync {
    /// Arm or disarm the PMIC as a system wakeup source
    fn set_chip_wakeup(&self, enable: bool);

    /// Arm or disarm a device's own wakeup flag
    fn set_device_wakeup(&self, device: DeviceId, enable: bool);
}

struct WakeupVoter {
    device: DeviceId,
}

/// Reference-counted list of wakeup voters
pub struct WakeupVoterList {
    voters: SpinLock<Vec<WakeupVoter, MAX_WAKEUP_VOTERS>>,
    sink: Arc<dyn WakeupSink>,
}

impl WakeupVoterList {
    /// Create an empty list reporting to `sink`
    pub fn new(sink: Arc<dyn WakeupSink>) -> Self {
        Self {
            voters: SpinLock::new(Vec::new()),
            sink,
        }
    }

    /// Add or withdraw `device`'s vote
    ///
    /// Voting twice the same way is a no-op. Fails with
    /// [`Error::OutOfMemory`] when the list is full.
    pub fn vote(&self, device: DeviceId, enable: bool) -> Result<()> {
        let mut voters = self.voters.lock();
        let pos = voters.iter().position(|voter| voter.device == device);

        match (enable, pos) {
            (true, None) => {
                if voters.is_full() {
                    log::warn!("wakeup voter list full, rejecting {:?}", device);
                    return Err(Error::OutOfMemory);
                }
                if voters.is_empty() {
                    log::debug!("arming chip wakeup");
                    self.sink.set_chip_wakeup(true);
                }
                self.sink.set_device_wakeup(device, true);
                // Cannot fail, fullness was checked above
                let _ = voters.push(WakeupVoter { device });
            }
            (false, Some(pos)) => {
                voters.swap_remove(pos);
                self.sink.set_device_wakeup(device, false);
                if voters.is_empty() {
                    log::debug!("disarming chip wakeup");
                    self.sink.set_chip_wakeup(false);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether any device holds a vote
    pub fn is_armed(&self) -> bool {
        !self.voters.lock().is_empty()
    }

    /// Number of voting devices
    pub fn count(&self) -> usize {
        self.voters.lock().len()
    }

    /// Whether `device` holds a vote
    pub fn has_vote(&self, device: DeviceId) -> bool {
        self.voters.lock().iter().any(|voter| voter.device == device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec as StdVec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Chip(bool),
        Device(DeviceId, bool),
    }

    #[derive(Default)]
    struct Recorder(SpinLock<StdVec<Call>>);

    impl WakeupSink for Recorder {
        fn set_chip_wakeup(&self, enable: bool) {
            self.0.lock().push(Call::Chip(enable));
        }

        fn set_device_wakeup(&self, device: DeviceId, enable: bool) {
            self.0.lock().push(Call::Device(device, enable));
        }
    }

    fn chip_calls(sink: &Recorder) -> StdVec<bool> {
        sink.0
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Chip(on) => Some(*on),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_reference_counted_across_devices() {
        let sink = Arc::new(Recorder::default());
        let list = WakeupVoterList::new(sink.clone());
        for id in 0..5 {
            list.vote(DeviceId(id), true).unwrap();
        }
        for id in 0..4 {
            list.vote(DeviceId(id), false).unwrap();
            assert!(list.is_armed());
        }
        assert_eq!(chip_calls(&sink), [true]);

        list.vote(DeviceId(4), false).unwrap();
        assert!(!list.is_armed());
        assert_eq!(chip_calls(&sink), [true, false]);
    }

    #[test]
    fn test_duplicate_votes_are_noops() {
        let sink = Arc::new(Recorder::default());
        let list = WakeupVoterList::new(sink.clone());
        let dev = DeviceId(7);

        list.vote(dev, false).unwrap();
        list.vote(dev, true).unwrap();
        list.vote(dev, true).unwrap();
        assert_eq!(list.count(), 1);

        list.vote(dev, false).unwrap();
        list.vote(dev, false).unwrap();
        assert_eq!(
            *sink.0.lock(),
            [
                Call::Chip(true),
                Call::Device(dev, true),
                Call::Device(dev, false),
                Call::Chip(false),
            ]
        );
    }

    #[test]
    fn test_full_list_rejects() {
        let sink = Arc::new(Recorder::default());
        let list = WakeupVoterList::new(sink.clone());
        for id in 0..MAX_WAKEUP_VOTERS as u32 {
            list.vote(DeviceId(id), true).unwrap();
        }
        let extra = DeviceId(MAX_WAKEUP_VOTERS as u32);
        assert_eq!(list.vote(extra, true), Err(Error::OutOfMemory));
        assert!(!list.has_vote(extra));
        assert!(!sink.0.lock().contains(&Call::Device(extra, true)));
    }
}
