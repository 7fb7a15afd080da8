// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M System Control Space debug registers
//!
//! These live in the target's memory map and are reached through the MEM-AP,
//! unlike the DP and AP registers.

use crate::arm::register::MemoryMappedRegister;
use crate::{register_bit, register_data};

/// Debug Halting Control and Status Register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dhcsr(u32);

register_data!(Dhcsr);

impl MemoryMappedRegister for Dhcsr {
    const ADDRESS: u32 = 0xE000_EDF0;
}

impl Dhcsr {
    /// Must be in the upper halfword of any write or the write is ignored
    pub const DBGKEY: u32 = 0xA05F_0000;

    pub const C_DEBUGEN: u32 = 1 << 0;
    pub const C_HALT: u32 = 1 << 1;
    pub const C_STEP: u32 = 1 << 2;
    pub const C_MASKINTS: u32 = 1 << 3;
    pub const S_REGRDY: u32 = 1 << 16;
    pub const S_HALT: u32 = 1 << 17;
    pub const S_SLEEP: u32 = 1 << 18;
    pub const S_LOCKUP: u32 = 1 << 19;
    pub const S_RETIRE_ST: u32 = 1 << 24;
    pub const S_RESET_ST: u32 = 1 << 25;

    /// A write value carrying the debug key and nothing else.
    pub fn with_key() -> Self {
        Self(Self::DBGKEY)
    }

    /// Key, debug enabled, core halted.
    pub fn halt_request() -> Self {
        Self(Self::DBGKEY | Self::C_DEBUGEN | Self::C_HALT)
    }

    /// Key, debug enabled, core running.
    pub fn continue_request() -> Self {
        Self(Self::DBGKEY | Self::C_DEBUGEN)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    register_bit!(c_debugen, set_c_debugen, Self::C_DEBUGEN);
    register_bit!(c_halt, set_c_halt, Self::C_HALT);
    register_bit!(c_step, set_c_step, Self::C_STEP);
    register_bit!(c_maskints, set_c_maskints, Self::C_MASKINTS);

    pub fn is_halted(&self) -> bool {
        self.0 & Self::S_HALT != 0
    }

    pub fn is_sleeping(&self) -> bool {
        self.0 & Self::S_SLEEP != 0
    }

    pub fn is_locked_up(&self) -> bool {
        self.0 & Self::S_LOCKUP != 0
    }

    pub fn is_register_ready(&self) -> bool {
        self.0 & Self::S_REGRDY != 0
    }

    /// The core has been reset since DHCSR was last read.  Clears on read.
    pub fn reset_sticky(&self) -> bool {
        self.0 & Self::S_RESET_ST != 0
    }

    pub fn retire_sticky(&self) -> bool {
        self.0 & Self::S_RETIRE_ST != 0
    }
}

/// Debug Core Register Selector Register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dcrsr(u32);

register_data!(Dcrsr);

impl MemoryMappedRegister for Dcrsr {
    const ADDRESS: u32 = 0xE000_EDF4;
}

impl Dcrsr {
    pub const REGWNR: u32 = 1 << 16;
    const REGSEL_MASK: u32 = 0x7F;

    /// Selects core register `regsel` for a read or (with `write`) a write
    pub fn select(regsel: u8, write: bool) -> Self {
        let mut value = regsel as u32 & Self::REGSEL_MASK;
        if write {
            value |= Self::REGWNR;
        }
        Self(value)
    }
}

/// Debug Core Register Data Register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dcrdr(u32);

register_data!(Dcrdr);

impl MemoryMappedRegister for Dcrdr {
    const ADDRESS: u32 = 0xE000_EDF8;
}

/// Debug Exception and Monitor Control Register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demcr(u32);

register_data!(Demcr);

impl MemoryMappedRegister for Demcr {
    const ADDRESS: u32 = 0xE000_EDFC;
}

impl Demcr {
    pub const VC_CORERESET: u32 = 1 << 0;
    pub const TRCENA: u32 = 1 << 24;

    register_bit!(vc_corereset, set_vc_corereset, Self::VC_CORERESET);
    register_bit!(trcena, set_trcena, Self::TRCENA);
}

/// Application Interrupt and Reset Control Register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aircr(u32);

register_data!(Aircr);

impl MemoryMappedRegister for Aircr {
    const ADDRESS: u32 = 0xE000_ED0C;
}

impl Aircr {
    /// Must be in the upper halfword of any write
    pub const VECTKEY: u32 = 0x05FA_0000;
    pub const VECTCLRACTIVE: u32 = 1 << 1;
    pub const SYSRESETREQ: u32 = 1 << 2;

    /// Requests a system reset of the whole MCU, not just the core.
    pub fn system_reset_request() -> Self {
        Self(Self::VECTKEY | Self::SYSRESETREQ)
    }

    pub fn sysresetreq(&self) -> bool {
        self.0 & Self::SYSRESETREQ != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dhcsr_requests() {
        assert_eq!(Dhcsr::with_key().value(), 0xA05F_0000);
        assert_eq!(Dhcsr::halt_request().value(), 0xA05F_0003);
        assert_eq!(Dhcsr::continue_request().value(), 0xA05F_0001);
        assert!(Dhcsr::halt_request().c_halt());
        assert!(!Dhcsr::continue_request().c_halt());
    }

    #[test]
    fn dhcsr_status() {
        let status = Dhcsr::from(0x0203_0003);
        assert!(status.is_halted());
        assert!(status.reset_sticky());
        assert!(!status.is_locked_up());
        assert!(!status.is_sleeping());
        assert!(!Dhcsr::from(0x0000_0001).is_halted());
    }

    #[test]
    fn aircr_reset() {
        assert_eq!(u32::from(Aircr::system_reset_request()), 0x05FA_0004);
    }

    #[test]
    fn addresses() {
        assert_eq!(Dhcsr::ADDRESS, 0xE000_EDF0);
        assert_eq!(Dcrsr::ADDRESS, 0xE000_EDF4);
        assert_eq!(Dcrdr::ADDRESS, 0xE000_EDF8);
        assert_eq!(Demcr::ADDRESS, 0xE000_EDFC);
        assert_eq!(Aircr::ADDRESS, 0xE000_ED0C);
        assert_eq!(u32::from(Dcrsr::select(15, true)), 0x0001_000F);
    }
}
