//! Device drivers module
//!
//! Register-level access to the PMIC. The physical bus lives outside this
//! crate behind the [`RegisterBus`] trait; everything else talks to the
//! device through a shared [`BusHandle`].

use crate::core::sync::SpinLock;
use crate::Result;
use alloc::boxed::Box;
use alloc::sync::Arc;

#[cfg(feature = "embedded-hal")]
pub mod i2c;
pub mod power;
pub mod regfield;
pub mod regs;

pub use regfield::RegField;

/// Register address on the PMIC
pub type RegAddr = u8;

/// Bus transaction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The device did not acknowledge
    Nack,
    /// Lost arbitration on a multi-master bus
    ArbitrationLoss,
    /// Any other transfer failure
    Io,
}

/// Synchronous register bus.
///
/// Every call may block; none of them may be issued from hard interrupt
/// context.
pub trait RegisterBus: Send {
    /// Read one register
    fn read(&mut self, reg: RegAddr) -> core::result::Result<u8, BusError>;

    /// Write one register
    fn write(&mut self, reg: RegAddr, value: u8) -> core::result::Result<(), BusError>;

    /// Read consecutive registers starting at `reg`
    fn bulk_read(&mut self, reg: RegAddr, buf: &mut [u8]) -> core::result::Result<(), BusError> {
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = self.read(reg.wrapping_add(offset as u8))?;
        }
        Ok(())
    }

    /// Write consecutive registers starting at `reg`
    fn bulk_write(&mut self, reg: RegAddr, data: &[u8]) -> core::result::Result<(), BusError> {
        for (offset, byte) in data.iter().enumerate() {
            self.write(reg.wrapping_add(offset as u8), *byte)?;
        }
        Ok(())
    }
}

/// Shared, serialized handle to the register bus
#[derive(Clone)]
pub struct BusHandle {
    inner: Arc<SpinLock<Box<dyn RegisterBus>>>,
}

impl BusHandle {
    /// Wrap a bus implementation
    pub fn new<B: RegisterBus + 'static>(bus: B) -> Self {
        Self {
            inner: Arc::new(SpinLock::new(Box::new(bus))),
        }
    }

    /// Read one register
    pub fn read(&self, reg: RegAddr) -> Result<u8> {
        Ok(self.inner.lock().read(reg)?)
    }

    /// Write one register
    pub fn write(&self, reg: RegAddr, value: u8) -> Result<()> {
        Ok(self.inner.lock().write(reg, value)?)
    }

    /// Read consecutive registers
    pub fn bulk_read(&self, reg: RegAddr, buf: &mut [u8]) -> Result<()> {
        Ok(self.inner.lock().bulk_read(reg, buf)?)
    }

    /// Write consecutive registers
    pub fn bulk_write(&self, reg: RegAddr, data: &[u8]) -> Result<()> {
        Ok(self.inner.lock().bulk_write(reg, data)?)
    }

    /// Read-modify-write the bits selected by `mask`
    ///
    /// The bus stays locked between the read and the write.
    pub fn update_bits(&self, reg: RegAddr, mask: u8, value: u8) -> Result<()> {
        let mut bus = self.inner.lock();
        let current = bus.read(reg)?;
        bus.write(reg, (current & !mask) | (value & mask))?;
        Ok(())
    }

    /// Read a register field
    pub fn read_field(&self, field: RegField) -> Result<u8> {
        Ok(field.get(self.read(field.reg)?))
    }

    /// Write a register field, preserving the other bits of its register
    pub fn write_field(&self, field: RegField, value: u8) -> Result<()> {
        self.update_bits(field.reg, field.mask(), field.set(0, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::EmulatedPmic;
    use crate::Error;

    #[test]
    fn test_update_bits_preserves_other_bits() {
        let pmic = EmulatedPmic::new();
        pmic.set_reg(0x20, 0b1010_0101);
        let bus = BusHandle::new(pmic.clone());

        bus.update_bits(0x20, 0b0000_1111, 0b0000_0011).unwrap();
        assert_eq!(pmic.reg(0x20), 0b1010_0011);
    }

    #[test]
    fn test_field_access() {
        let pmic = EmulatedPmic::new();
        pmic.set_reg(0x21, 0b1100_0001);
        let bus = BusHandle::new(pmic.clone());
        let field = RegField::new(0x21, 4, 2);

        assert_eq!(bus.read_field(field).unwrap(), 0);
        bus.write_field(field, 0b10).unwrap();
        assert_eq!(pmic.reg(0x21), 0b1110_0001);
        assert_eq!(bus.read_field(field).unwrap(), 0b10);
    }

    #[test]
    fn test_bulk_access() {
        let pmic = EmulatedPmic::new();
        let bus = BusHandle::new(pmic.clone());

        bus.bulk_write(0x60, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 3];
        bus.bulk_read(0x60, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_bus_errors_convert() {
        let pmic = EmulatedPmic::new();
        pmic.fail_writes_to(0x22, true);
        let bus = BusHandle::new(pmic);

        assert_eq!(bus.write(0x22, 1), Err(Error::Bus(BusError::Io)));
    }
}
