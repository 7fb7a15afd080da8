// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdprog-core - STM32F1 flash controller (FPEC) registers
//!
//! The FPEC only accepts 16-bit writes to flash, and must be unlocked by
//! writing two keys to `FLASH_KEYR` before CR can be changed.  A wrong key
//! locks CR until the next reset.

use crate::arm::register::MemoryMappedRegister;
use crate::{register_bit, register_data};

/// Base of the flash memory in the target's address space.  Image offsets
/// are relative to this.
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Base of the flash interface registers
pub const FLASH_REG_BASE: u32 = 0x4002_2000;

/// Page size on low and medium density parts.  High density and
/// connectivity line parts use 2KB pages.
pub const PAGE_SIZE_1K: u32 = 1024;
pub const PAGE_SIZE_2K: u32 = 2048;

/// Value of an erased flash halfword
pub const ERASED_HALFWORD: u16 = 0xFFFF;

/// FLASH_ACR - access control (latency, prefetch)
pub struct FlashAcr;

impl MemoryMappedRegister for FlashAcr {
    const ADDRESS: u32 = FLASH_REG_BASE;
}

/// FLASH_KEYR - FPEC unlock keys are written here
pub struct FlashKeyr;

impl MemoryMappedRegister for FlashKeyr {
    const ADDRESS: u32 = FLASH_REG_BASE + 0x04;
}

impl FlashKeyr {
    pub const KEY1: u32 = 0x4567_0123;
    pub const KEY2: u32 = 0xCDEF_89AB;
}

/// FLASH_OPTKEYR - option byte unlock keys
pub struct FlashOptKeyr;

impl MemoryMappedRegister for FlashOptKeyr {
    const ADDRESS: u32 = FLASH_REG_BASE + 0x08;
}

/// FLASH_SR - status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashSr(u32);

register_data!(FlashSr);

impl MemoryMappedRegister for FlashSr {
    const ADDRESS: u32 = FLASH_REG_BASE + 0x0C;
}

impl FlashSr {
    pub const BSY: u32 = 1 << 0;
    pub const PGERR: u32 = 1 << 2;
    pub const WRPRTERR: u32 = 1 << 4;
    pub const EOP: u32 = 1 << 5;

    /// Error flags.  These are cleared by writing 1 to them.
    pub const ERROR_MASK: u32 = Self::PGERR | Self::WRPRTERR;

    pub fn is_busy(&self) -> bool {
        self.0 & Self::BSY != 0
    }

    /// Programming error - the target halfword wasn't erased first
    pub fn pgerr(&self) -> bool {
        self.0 & Self::PGERR != 0
    }

    /// Write protection error
    pub fn wrprterr(&self) -> bool {
        self.0 & Self::WRPRTERR != 0
    }

    pub fn eop(&self) -> bool {
        self.0 & Self::EOP != 0
    }

    pub fn has_error(&self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }

    /// The value to write back to clear any set error and EOP flags.
    pub fn clear_flags(&self) -> Self {
        Self(self.0 & (Self::ERROR_MASK | Self::EOP))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// FLASH_CR - control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashCr(u32);

register_data!(FlashCr);

impl MemoryMappedRegister for FlashCr {
    const ADDRESS: u32 = FLASH_REG_BASE + 0x10;
}

impl FlashCr {
    pub const PG: u32 = 1 << 0;
    pub const PER: u32 = 1 << 1;
    pub const MER: u32 = 1 << 2;
    pub const OPTPG: u32 = 1 << 4;
    pub const OPTER: u32 = 1 << 5;
    pub const STRT: u32 = 1 << 6;
    pub const LOCK: u32 = 1 << 7;

    pub fn new() -> Self {
        Self(0)
    }

    /// Programming mode
    pub fn program() -> Self {
        Self(Self::PG)
    }

    /// Mass erase selected, not yet started
    pub fn mass_erase() -> Self {
        Self(Self::MER)
    }

    /// Page erase selected, not yet started
    pub fn page_erase() -> Self {
        Self(Self::PER)
    }

    /// Starts whichever erase is selected.
    pub fn start(mut self) -> Self {
        self.0 |= Self::STRT;
        self
    }

    pub fn lock() -> Self {
        Self(Self::LOCK)
    }

    register_bit!(pg, set_pg, Self::PG);
    register_bit!(per, set_per, Self::PER);
    register_bit!(mer, set_mer, Self::MER);
    register_bit!(strt, set_strt, Self::STRT);
    register_bit!(locked, set_locked, Self::LOCK);
}

/// FLASH_AR - address of the page to erase
pub struct FlashAr;

impl MemoryMappedRegister for FlashAr {
    const ADDRESS: u32 = FLASH_REG_BASE + 0x14;
}

/// FLASH_OBR - option byte status, including read protection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashObr(u32);

register_data!(FlashObr);

impl MemoryMappedRegister for FlashObr {
    const ADDRESS: u32 = FLASH_REG_BASE + 0x1C;
}

impl FlashObr {
    const RDPRT: u32 = 1 << 1;

    pub fn read_protected(&self) -> bool {
        self.0 & Self::RDPRT != 0
    }
}

/// FLASH_WRPR - write protection, one bit per group of pages.  A 0 bit
/// means protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashWrpr(u32);

register_data!(FlashWrpr);

impl MemoryMappedRegister for FlashWrpr {
    const ADDRESS: u32 = FLASH_REG_BASE + 0x20;
}

impl FlashWrpr {
    pub fn any_protected(&self) -> bool {
        self.0 != 0xFFFF_FFFF
    }
}

/// Converts an image offset to a target address, if it fits.
pub fn flash_address(offset: u32) -> Option<u32> {
    FLASH_BASE.checked_add(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn register_addresses() {
        assert_eq!(FlashAcr::ADDRESS, 0x4002_2000);
        assert_eq!(FlashKeyr::ADDRESS, 0x4002_2004);
        assert_eq!(FlashOptKeyr::ADDRESS, 0x4002_2008);
        assert_eq!(FlashSr::ADDRESS, 0x4002_200C);
        assert_eq!(FlashCr::ADDRESS, 0x4002_2010);
        assert_eq!(FlashAr::ADDRESS, 0x4002_2014);
        assert_eq!(FlashObr::ADDRESS, 0x4002_201C);
        assert_eq!(FlashWrpr::ADDRESS, 0x4002_2020);
    }

    #[test]
    fn control_values() {
        assert_eq!(u32::from(FlashCr::mass_erase()), 0x04);
        assert_eq!(u32::from(FlashCr::mass_erase().start()), 0x44);
        assert_eq!(u32::from(FlashCr::page_erase().start()), 0x42);
        assert_eq!(u32::from(FlashCr::program()), 0x01);
        assert!(FlashCr::lock().locked());
    }

    #[test]
    fn status_flags() {
        let sr = FlashSr::from(0x0000_0035);
        assert!(sr.is_busy());
        assert!(sr.has_error());
        assert!(sr.eop());
        assert_eq!(sr.clear_flags().value(), 0x34);
        assert!(!FlashSr::from(FlashSr::EOP).has_error());
    }

    #[test]
    fn offsets() {
        assert_eq!(flash_address(0x400), Some(0x0800_0400));
        assert_eq!(flash_address(u32::MAX), None);
    }
}
