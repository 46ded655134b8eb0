//! PMIC register map (interrupt and power-control registers only)

use super::{RegAddr, RegField};

/// Power transition command field
pub const PWR_CTRL: RegAddr = 0x0E;
pub const PWR_CTRL_CMD: RegField = RegField::new(PWR_CTRL, 0, 3);

/// Root interrupt group 0: topsys, GPIO, charger, fuel gauge, RTC, watchdog
pub const IRQ_STATUS0: RegAddr = 0x30;
pub const IRQ_MASK0: RegAddr = 0x31;
pub const IRQ_VALID0: u8 = 0x3F;

/// Root interrupt group 1: buck fault, LDO fault, thermal, LED
pub const IRQ_STATUS1: RegAddr = 0x32;
pub const IRQ_MASK1: RegAddr = 0x33;
pub const IRQ_VALID1: u8 = 0x0F;

/// Topsys event group
pub const TOPSYS_STATUS: RegAddr = 0x40;
pub const TOPSYS_MASK: RegAddr = 0x41;

/// GPIO pending status, one bit per pin
pub const GPIO_STATUS: RegAddr = 0x48;

/// Per-pin control registers start here, one register per pin
pub const GPIO_CTRL_BASE: RegAddr = 0x50;

/// Interrupt edge select inside a pin control register
///
/// 0 = none, 1 = rising, 2 = falling, 3 = both.
pub const GPIO_CTRL_INT_EDGE: RegField = RegField::new(GPIO_CTRL_BASE, 4, 2);

/// Status registers that clear on read
pub const CLEAR_ON_READ: [RegAddr; 4] = [IRQ_STATUS0, IRQ_STATUS1, TOPSYS_STATUS, GPIO_STATUS];
