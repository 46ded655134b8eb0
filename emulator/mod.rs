//! Device emulator module
//!
//! An in-memory PMIC register file implementing [`RegisterBus`]. It keeps
//! a log of every write, clears status registers on read like the real
//! chip, and can be told to fail transfers to particular registers. Clones
//! share the same register file, so one clone can be handed to the driver
//! while another inspects it.

use crate::core::sync::SpinLock;
use crate::drivers::regs::CLEAR_ON_READ;
use crate::drivers::{BusError, RegAddr, RegisterBus};
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Emulated device state
struct EmulatorState {
    /// Register contents
    regs: [u8; 256],
    /// Registers that reset to zero after being read
    clear_on_read: [bool; 256],
    /// Registers whose reads fail
    fail_reads: [bool; 256],
    /// Registers whose writes fail
    fail_writes: [bool; 256],
    /// Every successful write, in order
    writes: Vec<(RegAddr, u8)>,
    /// Number of successful reads
    reads: usize,
}

/// Emulated PMIC register file
#[derive(Clone)]
pub struct EmulatedPmic {
    state: Arc<SpinLock<EmulatorState>>,
}

impl EmulatedPmic {
    /// Create an emulated PMIC with all registers zero
    pub fn new() -> Self {
        let mut clear_on_read = [false; 256];
        for reg in CLEAR_ON_READ {
            clear_on_read[reg as usize] = true;
        }

        Self {
            state: Arc::new(SpinLock::new(EmulatorState {
                regs: [0; 256],
                clear_on_read,
                fail_reads: [false; 256],
                fail_writes: [false; 256],
                writes: Vec::new(),
                reads: 0,
            })),
        }
    }

    /// Current value of a register
    pub fn reg(&self, reg: RegAddr) -> u8 {
        self.state.lock().regs[reg as usize]
    }

    /// Set a register without logging a write
    pub fn set_reg(&self, reg: RegAddr, value: u8) {
        self.state.lock().regs[reg as usize] = value;
    }

    /// Latch pending bits in a status register
    pub fn raise(&self, reg: RegAddr, bits: u8) {
        self.state.lock().regs[reg as usize] |= bits;
    }

    /// Make reads of `reg` fail (or succeed again)
    pub fn fail_reads_from(&self, reg: RegAddr, fail: bool) {
        self.state.lock().fail_reads[reg as usize] = fail;
    }

    /// Make writes to `reg` fail (or succeed again)
    pub fn fail_writes_to(&self, reg: RegAddr, fail: bool) {
        self.state.lock().fail_writes[reg as usize] = fail;
    }

    /// All successful writes since the last [`clear_log`](Self::clear_log)
    pub fn writes(&self) -> Vec<(RegAddr, u8)> {
        self.state.lock().writes.clone()
    }

    /// Values written to one register, in order
    pub fn writes_to(&self, reg: RegAddr) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Number of successful reads since the last [`clear_log`](Self::clear_log)
    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    /// Forget logged reads and writes
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.reads = 0;
    }
}

impl Default for EmulatedPmic {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for EmulatedPmic {
    fn read(&mut self, reg: RegAddr) -> Result<u8, BusError> {
        let mut state = self.state.lock();
        let idx = reg as usize;
        if state.fail_reads[idx] {
            return Err(BusError::Io);
        }
        let value = state.regs[idx];
        if state.clear_on_read[idx] {
            state.regs[idx] = 0;
        }
        state.reads += 1;
        Ok(value)
    }

    fn write(&mut self, reg: RegAddr, value: u8) -> Result<(), BusError> {
        let mut state = self.state.lock();
        let idx = reg as usize;
        if state.fail_writes[idx] {
            return Err(BusError::Io);
        }
        state.regs[idx] = value;
        state.writes.push((reg, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::regs::{IRQ_STATUS0, TOPSYS_MASK};

    #[test]
    fn test_status_clears_on_read() {
        let mut pmic = EmulatedPmic::new();
        pmic.raise(IRQ_STATUS0, 0x05);
        assert_eq!(pmic.read(IRQ_STATUS0).unwrap(), 0x05);
        assert_eq!(pmic.read(IRQ_STATUS0).unwrap(), 0);
    }

    #[test]
    fn test_write_log_and_failures() {
        let mut pmic = EmulatedPmic::new();
        pmic.write(TOPSYS_MASK, 0xF6).unwrap();
        pmic.fail_writes_to(TOPSYS_MASK, true);
        assert_eq!(pmic.write(TOPSYS_MASK, 0xFF), Err(BusError::Io));

        assert_eq!(pmic.writes(), [(TOPSYS_MASK, 0xF6)]);
        assert_eq!(pmic.reg(TOPSYS_MASK), 0xF6);

        pmic.clear_log();
        assert!(pmic.writes().is_empty());
    }
}
