// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Generic Access Port registers

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor};
use crate::register_data;

/// AP Identification Register descriptor (read-only, bank 0xF0)
pub struct IdrRegister;

impl RegisterDescriptor for IdrRegister {
    const ADDRESS: u8 = 0xFC;
    type Value = Idr;
}
impl ReadableRegister for IdrRegister {}
impl ApRegister for IdrRegister {}

/// AP Identification Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idr(u32);

register_data!(Idr);

impl Idr {
    const CLASS_SHIFT: u32 = 13;
    const CLASS_MASK: u32 = 0xF;
    const CLASS_MEM_AP: u32 = 0x8;

    pub fn value(&self) -> u32 {
        self.0
    }

    /// An IDR of zero means there is no AP at this index.
    pub fn is_present(&self) -> bool {
        self.0 != 0
    }

    pub fn class(&self) -> u8 {
        ((self.0 >> Self::CLASS_SHIFT) & Self::CLASS_MASK) as u8
    }

    pub fn is_mem_ap(&self) -> bool {
        self.class() as u32 == Self::CLASS_MEM_AP
    }

    pub fn revision(&self) -> u8 {
        (self.0 >> 28) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stm32f1_ahb_ap() {
        // AHB-AP on a Cortex-M3
        let idr = Idr::from(0x2477_0011);
        assert!(idr.is_present());
        assert!(idr.is_mem_ap());
        assert_eq!(idr.revision(), 2);
        assert!(!Idr::from(0).is_present());
    }
}
