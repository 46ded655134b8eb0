//! `embedded-hal` I2C adapter
//!
//! Lets any [`embedded_hal::i2c::I2c`] implementation serve as the PMIC's
//! register bus. Registers are addressed with a one-byte index written
//! before each transfer.

use embedded_hal::i2c::{ErrorKind, I2c, Operation, SevenBitAddress};

use super::{BusError, RegAddr, RegisterBus};

/// Register bus over an I2C controller
pub struct I2cRegisterBus<I> {
    i2c: I,
    address: SevenBitAddress,
}

impl<I> I2cRegisterBus<I> {
    /// Bind to the device at `address`
    pub fn new(i2c: I, address: SevenBitAddress) -> Self {
        Self { i2c, address }
    }

    /// Release the underlying controller
    pub fn release(self) -> I {
        self.i2c
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(err: E) -> BusError {
    match err.kind() {
        ErrorKind::NoAcknowledge(_) => BusError::Nack,
        ErrorKind::ArbitrationLoss => BusError::ArbitrationLoss,
        _ => BusError::Io,
    }
}

impl<I: I2c + Send> RegisterBus for I2cRegisterBus<I> {
    fn read(&mut self, reg: RegAddr) -> Result<u8, BusError> {
        let mut buf = [0u8];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(bus_error)?;
        Ok(buf[0])
    }

    fn write(&mut self, reg: RegAddr, value: u8) -> Result<(), BusError> {
        self.i2c.write(self.address, &[reg, value]).map_err(bus_error)
    }

    fn bulk_read(&mut self, reg: RegAddr, buf: &mut [u8]) -> Result<(), BusError> {
        self.i2c.write_read(self.address, &[reg], buf).map_err(bus_error)
    }

    fn bulk_write(&mut self, reg: RegAddr, data: &[u8]) -> Result<(), BusError> {
        // Adjacent write operations go out without a repeated start
        self.i2c
            .transaction(self.address, &mut [Operation::Write(&[reg]), Operation::Write(data)])
            .map_err(bus_error)
    }
}
