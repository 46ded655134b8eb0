//! Typed register fields
//!
//! A [`RegField`] names a contiguous run of bits inside one 8-bit register.
//! All bit-field reads and writes in the crate go through these descriptors
//! instead of hand-written shift/mask pairs.

use super::RegAddr;

/// Bit field descriptor: register, bit offset and width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegField {
    /// Register holding the field
    pub reg: RegAddr,
    /// Lowest bit of the field
    pub shift: u8,
    /// Field width in bits
    pub width: u8,
}

impl RegField {
    /// Describe a field
    ///
    /// # Panics
    /// Panics if the field does not fit in an 8-bit register.
    pub const fn new(reg: RegAddr, shift: u8, width: u8) -> Self {
        assert!(width > 0 && shift + width <= 8, "field does not fit in 8 bits");
        Self { reg, shift, width }
    }

    /// Mask of the field's bits in its register
    pub const fn mask(&self) -> u8 {
        (((1u16 << self.width) - 1) as u8) << self.shift
    }

    /// Extract the field from a raw register value
    pub const fn get(&self, raw: u8) -> u8 {
        (raw & self.mask()) >> self.shift
    }

    /// Replace the field in a raw register value
    ///
    /// Bits of `value` wider than the field are dropped.
    pub const fn set(&self, raw: u8, value: u8) -> u8 {
        (raw & !self.mask()) | ((value << self.shift) & self.mask())
    }

    /// The same field in the register `offset` places further on
    pub const fn offset(&self, offset: u8) -> Self {
        Self::new(self.reg + offset, self.shift, self.width)
    }
}
