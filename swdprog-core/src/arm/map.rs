// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! MEM-AP registers used to reach the target's address space

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::register_data;

/// Control/Status Word register descriptor
pub struct CswRegister;

impl RegisterDescriptor for CswRegister {
    const ADDRESS: u8 = 0x00;
    type Value = Csw;
}
impl ReadableRegister for CswRegister {}
impl WritableRegister for CswRegister {}
impl ApRegister for CswRegister {}

/// Control/Status Word register data
///
/// Only the transfer size and address increment fields are changed by
/// swdprog.  Everything above the low byte (HPROT, master type etc) is
/// implementation defined and left as the target reset it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csw(u32);

register_data!(Csw);

impl Csw {
    const SIZE_MASK: u32 = 0b111;
    const ADDRINC_SHIFT: u32 = 4;
    const ADDRINC_MASK: u32 = 0b11;
    const DEVICE_EN: u32 = 1 << 6;
    const TR_IN_PROG: u32 = 1 << 7;

    /// The bits swdprog configures.
    pub const LOW_BYTE_MASK: u32 = 0xFF;

    pub const SIZE_8BIT: u32 = 0b000;
    pub const SIZE_16BIT: u32 = 0b001;
    pub const SIZE_32BIT: u32 = 0b010;

    pub const ADDRINC_OFF: u32 = 0b00;
    pub const ADDRINC_SINGLE: u32 = 0b01;

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn size(&self) -> u32 {
        self.0 & Self::SIZE_MASK
    }

    pub fn set_size(&mut self, size: u32) -> &mut Self {
        self.0 = (self.0 & !Self::SIZE_MASK) | (size & Self::SIZE_MASK);
        self
    }

    pub fn addrinc(&self) -> u32 {
        (self.0 >> Self::ADDRINC_SHIFT) & Self::ADDRINC_MASK
    }

    pub fn set_addrinc(&mut self, addrinc: u32) -> &mut Self {
        self.0 = (self.0 & !(Self::ADDRINC_MASK << Self::ADDRINC_SHIFT))
            | ((addrinc & Self::ADDRINC_MASK) << Self::ADDRINC_SHIFT);
        self
    }

    pub fn device_en(&self) -> bool {
        self.0 & Self::DEVICE_EN != 0
    }

    pub fn tr_in_prog(&self) -> bool {
        self.0 & Self::TR_IN_PROG != 0
    }

    /// Replaces the low byte with `low`, keeping the upper 24 bits.
    pub fn with_low_byte(&self, low: u8) -> Self {
        Self((self.0 & !Self::LOW_BYTE_MASK) | low as u32)
    }

    /// Low byte for a single, non-incrementing transfer of `size`.
    pub fn fixed_address_low_byte(size: u32) -> u8 {
        let mut csw = Csw(0);
        csw.set_size(size).set_addrinc(Self::ADDRINC_OFF);
        csw.0 as u8
    }
}

/// Transfer Address Register descriptor
pub struct TarRegister;

impl RegisterDescriptor for TarRegister {
    const ADDRESS: u8 = 0x04;
    type Value = Tar;
}
impl ReadableRegister for TarRegister {}
impl WritableRegister for TarRegister {}
impl ApRegister for TarRegister {}

/// Target address for the next DRW access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tar(u32);

register_data!(Tar);

impl Tar {
    pub fn address(&self) -> u32 {
        self.0
    }
}

/// Data Read/Write register descriptor
pub struct DrwRegister;

impl RegisterDescriptor for DrwRegister {
    const ADDRESS: u8 = 0x0C;
    type Value = Drw;
}
impl ReadableRegister for DrwRegister {}
impl WritableRegister for DrwRegister {}
impl ApRegister for DrwRegister {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drw(u32);

register_data!(Drw);

impl Drw {
    pub fn data(&self) -> u32 {
        self.0
    }

    /// Places a halfword in the byte lane the bus expects for `addr`.
    ///
    /// With a 16-bit CSW size, the MEM-AP presents DRW bits [15:0] for
    /// `addr % 4 == 0` and bits [31:16] for `addr % 4 == 2`.
    pub fn halfword_lane(addr: u32, halfword: u16) -> Self {
        Self((halfword as u32) << ((addr % 4) * 8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn csw_low_byte_preserves_upper_bits() {
        let csw = Csw::from(0x2300_0052);
        let fixed16 = csw.with_low_byte(Csw::fixed_address_low_byte(Csw::SIZE_16BIT));
        assert_eq!(fixed16.value(), 0x2300_0001);
        assert_eq!(fixed16.size(), Csw::SIZE_16BIT);
        assert_eq!(fixed16.addrinc(), Csw::ADDRINC_OFF);

        let fixed32 = fixed16.with_low_byte(Csw::fixed_address_low_byte(Csw::SIZE_32BIT));
        assert_eq!(fixed32.value(), 0x2300_0002);
    }

    #[test_case(0x0800_0000, 0x2211, 0x0000_2211 ; "low lane")]
    #[test_case(0x0800_0002, 0x4433, 0x4433_0000 ; "high lane")]
    #[test_case(0x0800_0004, 0x0055, 0x0000_0055 ; "next word low lane")]
    fn halfword_lanes(addr: u32, halfword: u16, raw: u32) {
        assert_eq!(Drw::halfword_lane(addr, halfword).data(), raw);
    }
}
