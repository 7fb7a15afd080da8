// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SW-DP registers
//!
//! The SW-DP decodes only `A[3:2]`, so there are four addresses.  0x00 is
//! IDCODE when read and ABORT when written.

use crate::arm::register::{DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::{register_bit, register_data};

/// IDCODE register descriptor (read-only)
pub struct IdCodeRegister;

impl RegisterDescriptor for IdCodeRegister {
    const ADDRESS: u8 = 0x00;
    type Value = IdCode;
}
impl ReadableRegister for IdCodeRegister {}
impl DpRegister for IdCodeRegister {}

/// Debug port identification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdCode(u32);

register_data!(IdCode);

impl IdCode {
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// JEP106 designer code, bits [11:1].  ARM is 0x23B.
    pub fn designer(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// Part number, bits [27:12]
    pub fn partno(&self) -> u16 {
        ((self.0 >> 12) & 0xFFFF) as u16
    }

    /// Revision, bits [31:28]
    pub fn revision(&self) -> u8 {
        (self.0 >> 28) as u8
    }

    /// A disconnected or unpowered SWDIO line reads back all 0s or all 1s.
    pub fn is_plausible(&self) -> bool {
        self.0 != 0 && self.0 != 0xFFFF_FFFF && self.0 & 1 == 1
    }
}

/// ABORT register descriptor (write-only)
pub struct AbortRegister;

impl RegisterDescriptor for AbortRegister {
    const ADDRESS: u8 = 0x00;
    type Value = Abort;
}
impl WritableRegister for AbortRegister {}
impl DpRegister for AbortRegister {}

/// ABORT register data, used to clear sticky error flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Abort(u32);

register_data!(Abort, w);

impl Abort {
    pub const DAPABORT: u32 = 1 << 0;
    pub const STKCMPCLR: u32 = 1 << 1;
    pub const STKERRCLR: u32 = 1 << 2;
    pub const WDERRCLR: u32 = 1 << 3;
    pub const ORUNERRCLR: u32 = 1 << 4;

    /// Every flag.  Aborts any AP transaction in progress and clears all
    /// sticky errors.
    pub const ALL: u32 = Self::DAPABORT
        | Self::STKCMPCLR
        | Self::STKERRCLR
        | Self::WDERRCLR
        | Self::ORUNERRCLR;

    pub fn new() -> Self {
        Self(0)
    }

    /// Builds an ABORT value from raw flags, ignoring reserved bits.
    pub fn from_flags(flags: u32) -> Self {
        Self(flags & Self::ALL)
    }

    /// Clear everything.
    pub fn clear_all() -> Self {
        Self(Self::ALL)
    }

    register_bit!(dapabort, set_dapabort, Self::DAPABORT);
    register_bit!(stkcmpclr, set_stkcmpclr, Self::STKCMPCLR);
    register_bit!(stkerrclr, set_stkerrclr, Self::STKERRCLR);
    register_bit!(wderrclr, set_wderrclr, Self::WDERRCLR);
    register_bit!(orunerrclr, set_orunerrclr, Self::ORUNERRCLR);
}

/// CTRL/STAT register descriptor
pub struct CtrlStatRegister;

impl RegisterDescriptor for CtrlStatRegister {
    const ADDRESS: u8 = 0x04;
    type Value = CtrlStat;
}
impl ReadableRegister for CtrlStatRegister {}
impl WritableRegister for CtrlStatRegister {}
impl DpRegister for CtrlStatRegister {}

/// CTRL/STAT register data - power control and sticky status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CtrlStat(u32);

register_data!(CtrlStat);

impl CtrlStat {
    pub const STICKYORUN: u32 = 1 << 1;
    pub const STICKYCMP: u32 = 1 << 4;
    pub const STICKYERR: u32 = 1 << 5;
    pub const WDATAERR: u32 = 1 << 7;
    pub const CDBGRSTREQ: u32 = 1 << 26;
    pub const CDBGRSTACK: u32 = 1 << 27;
    pub const CDBGPWRUPREQ: u32 = 1 << 28;
    pub const CDBGPWRUPACK: u32 = 1 << 29;
    pub const CSYSPWRUPREQ: u32 = 1 << 30;
    pub const CSYSPWRUPACK: u32 = 1 << 31;

    const STICKY_MASK: u32 = Self::STICKYORUN | Self::STICKYCMP | Self::STICKYERR | Self::WDATAERR;

    pub fn new() -> Self {
        Self(0)
    }

    /// The value written during power-up: request debug and system power,
    /// and a debug reset.
    pub fn power_up_request() -> Self {
        Self(Self::CDBGPWRUPREQ | Self::CSYSPWRUPREQ | Self::CDBGRSTREQ)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    register_bit!(cdbgrstreq, set_cdbgrstreq, Self::CDBGRSTREQ);
    register_bit!(cdbgpwrupreq, set_cdbgpwrupreq, Self::CDBGPWRUPREQ);
    register_bit!(csyspwrupreq, set_csyspwrupreq, Self::CSYSPWRUPREQ);

    pub fn cdbgpwrupack(&self) -> bool {
        self.0 & Self::CDBGPWRUPACK != 0
    }

    pub fn csyspwrupack(&self) -> bool {
        self.0 & Self::CSYSPWRUPACK != 0
    }

    /// Both debug and system power domains have acknowledged power up.
    pub fn is_powered(&self) -> bool {
        self.cdbgpwrupack() && self.csyspwrupack()
    }

    pub fn has_sticky_error(&self) -> bool {
        self.0 & Self::STICKY_MASK != 0
    }
}

/// SELECT register descriptor
pub struct SelectRegister;

impl RegisterDescriptor for SelectRegister {
    const ADDRESS: u8 = 0x08;
    type Value = Select;
}
impl ReadableRegister for SelectRegister {}
impl WritableRegister for SelectRegister {}
impl DpRegister for SelectRegister {}

/// SELECT register data - chooses the AP and AP register bank used by
/// subsequent AP accesses.
///
/// ```text
///   31      24 23        8 7        4 3         0
///  +----------+-----------+----------+-----------+
///  |  APSEL   | reserved  | APBANKSEL| DPBANKSEL |
///  +----------+-----------+----------+-----------+
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Select(u32);

register_data!(Select);

impl Select {
    const APSEL_SHIFT: u32 = 24;
    const APSEL_MASK: u32 = 0xFF;
    const APBANKSEL_MASK: u32 = 0xF0;
    const DPBANKSEL_MASK: u32 = 0x0F;

    pub fn new() -> Self {
        Self(0)
    }

    /// Builds a SELECT value for an AP and a register bank.  `bank` is an
    /// AP register address; only bits [7:4] are kept.
    pub fn from_ap_bank(ap: u8, bank: u8) -> Self {
        let mut select = Self::new();
        select.set_apsel(ap);
        select.set_apbanksel(bank);
        select
    }

    pub fn apsel(&self) -> u8 {
        ((self.0 >> Self::APSEL_SHIFT) & Self::APSEL_MASK) as u8
    }

    pub fn set_apsel(&mut self, ap: u8) -> &mut Self {
        self.0 = (self.0 & !(Self::APSEL_MASK << Self::APSEL_SHIFT))
            | ((ap as u32) << Self::APSEL_SHIFT);
        self
    }

    /// Returns the bank as a register address (0x00, 0x10, .. 0xF0)
    pub fn apbanksel(&self) -> u8 {
        (self.0 & Self::APBANKSEL_MASK) as u8
    }

    pub fn set_apbanksel(&mut self, bank: u8) -> &mut Self {
        self.0 = (self.0 & !Self::APBANKSEL_MASK) | (bank as u32 & Self::APBANKSEL_MASK);
        self
    }

    pub fn dpbanksel(&self) -> u8 {
        (self.0 & Self::DPBANKSEL_MASK) as u8
    }
}

/// RDBUFF register descriptor (read-only)
pub struct RdBuffRegister;

impl RegisterDescriptor for RdBuffRegister {
    const ADDRESS: u8 = 0x0C;
    type Value = RdBuff;
}
impl ReadableRegister for RdBuffRegister {}
impl DpRegister for RdBuffRegister {}

/// RDBUFF holds the result of the last posted AP read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdBuff(u32);

register_data!(RdBuff);

impl RdBuff {
    pub fn value(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, 0x00, 0x0000_0000 ; "ap 0 bank 0")]
    #[test_case(0, 0xF0, 0x0000_00F0 ; "ap 0 idr bank")]
    #[test_case(1, 0x10, 0x0100_0010 ; "ap 1 bank 1")]
    #[test_case(0, 0xFC, 0x0000_00F0 ; "register offset is masked")]
    fn select_packs_ap_and_bank(ap: u8, bank: u8, raw: u32) {
        let select = Select::from_ap_bank(ap, bank);
        assert_eq!(u32::from(select), raw);
        assert_eq!(select.apsel(), ap);
        assert_eq!(select.apbanksel(), bank & 0xF0);
        assert_eq!(select.dpbanksel(), 0);
    }

    #[test]
    fn power_up_request_bits() {
        let ctrl = CtrlStat::power_up_request();
        assert_eq!(ctrl.value(), 0x5400_0000);
        assert!(ctrl.cdbgpwrupreq());
        assert!(ctrl.csyspwrupreq());
        assert!(ctrl.cdbgrstreq());
        assert!(!ctrl.is_powered());
        assert!(CtrlStat::from(0xF000_0000).is_powered());
    }

    #[test]
    fn abort_clear_all() {
        assert_eq!(u32::from(Abort::clear_all()), 0x1F);
        assert_eq!(u32::from(Abort::from_flags(0xFFFF_FFFF)), 0x1F);

        let mut abort = Abort::new();
        abort.set_stkerrclr(true).set_orunerrclr(true);
        assert_eq!(u32::from(abort), 0x14);
    }

    #[test]
    fn idcode_fields() {
        let idcode = IdCode::from_u32(0x1BA0_1477);
        assert_eq!(idcode.designer(), 0x23B);
        assert_eq!(idcode.partno(), 0xBA01);
        assert_eq!(idcode.revision(), 1);
        assert!(idcode.is_plausible());
        assert!(!IdCode::from_u32(0xFFFF_FFFF).is_plausible());
        assert!(!IdCode::from_u32(0).is_plausible());
    }
}
