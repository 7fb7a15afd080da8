// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The target's memory map, as seen through the MEM-AP
//!
//! [`Bus`] routes word, halfword and byte accesses to flash, the flash
//! controller (FPEC), the Cortex-M debug registers, or sparse RAM.

use std::collections::HashMap;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::arm::register::MemoryMappedRegister;
use swdprog_core::arm::scs::{Aircr, Dcrdr, Dcrsr, Demcr, Dhcsr};
use swdprog_core::stm::{
    ERASED_HALFWORD, FLASH_BASE, FlashAcr, FlashAr, FlashCr, FlashKeyr, FlashObr, FlashSr,
    FlashWrpr,
};

use crate::{DummyConfig, FlashFault};

// FLASH_OBR and FLASH_WRPR reset values on an unprotected part
const OBR_UNPROTECTED: u32 = 0x03FF_FFFC;
const WRPR_UNPROTECTED: u32 = 0xFFFF_FFFF;

const FLASH_REGION_SIZE: u32 = 0x0010_0000;

/// How many more reads of a status register report "busy".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Busy {
    Idle,
    For(u32),
    Forever,
}

impl Busy {
    fn from_reads(reads: Option<u32>) -> Self {
        match reads {
            Some(0) => Busy::Idle,
            Some(n) => Busy::For(n),
            None => Busy::Forever,
        }
    }

    // Consumes one read, returning whether it reports busy.
    fn poll(&mut self) -> bool {
        match self {
            Busy::Idle => false,
            Busy::Forever => true,
            Busy::For(n) => {
                *n -= 1;
                if *n == 0 {
                    *self = Busy::Idle;
                }
                true
            }
        }
    }

    fn is_busy(&self) -> bool {
        *self != Busy::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    halted: bool,
    stale_reads: Option<u32>,
}

/// Cortex-M core and debug registers.
#[derive(Debug, Clone)]
pub(crate) struct Core {
    pub debugen: bool,
    pub halt: bool,
    pub maskints: bool,
    pub halted: bool,
    pending: Option<Pending>,
    pub reset_st: bool,
    pub stale_reads: Option<u32>,
    pub dhcsr_reads: usize,
    pub demcr: u32,
    pub dcrsr: u32,
    pub dcrdr: u32,
    pub system_resets: u32,
}

impl Core {
    fn new(stale_reads: Option<u32>) -> Self {
        Self {
            debugen: false,
            halt: false,
            maskints: false,
            halted: false,
            pending: None,
            reset_st: false,
            stale_reads,
            dhcsr_reads: 0,
            demcr: 0,
            dcrsr: 0,
            dcrdr: 0,
            system_resets: 0,
        }
    }

    fn write_dhcsr(&mut self, value: u32) {
        if value & 0xFFFF_0000 != Dhcsr::DBGKEY {
            debug!("DHCSR write without DBGKEY ignored: 0x{value:08X}");
            return;
        }

        self.debugen = value & Dhcsr::C_DEBUGEN != 0;
        self.halt = self.debugen && value & Dhcsr::C_HALT != 0;
        self.maskints = self.debugen && value & Dhcsr::C_MASKINTS != 0;

        if self.halt != self.halted {
            self.pending = Some(Pending {
                halted: self.halt,
                stale_reads: self.stale_reads,
            });
        } else {
            self.pending = None;
        }
    }

    fn read_dhcsr(&mut self) -> u32 {
        self.dhcsr_reads += 1;

        if let Some(pending) = self.pending {
            match pending.stale_reads {
                Some(0) => {
                    self.halted = pending.halted;
                    self.pending = None;
                }
                Some(n) => {
                    self.pending = Some(Pending {
                        stale_reads: Some(n - 1),
                        ..pending
                    })
                }
                None => (),
            }
        }

        let mut value = Dhcsr::S_REGRDY;
        if self.debugen {
            value |= Dhcsr::C_DEBUGEN;
        }
        if self.halt {
            value |= Dhcsr::C_HALT;
        }
        if self.maskints {
            value |= Dhcsr::C_MASKINTS;
        }
        if self.halted {
            value |= Dhcsr::S_HALT;
        }
        if self.reset_st {
            value |= Dhcsr::S_RESET_ST;
            self.reset_st = false;
        }
        value
    }

    // Debug enable and DEMCR live in the debug power domain and survive a
    // system reset.
    fn system_reset(&mut self) {
        self.system_resets += 1;
        self.pending = None;
        self.reset_st = true;
        self.halt = self.debugen && self.demcr & Demcr::VC_CORERESET != 0;
        self.halted = self.halt;
    }
}

/// STM32F1 flash program/erase controller.
#[derive(Debug, Clone)]
pub(crate) struct Fpec {
    pub locked: bool,
    key1_seen: bool,
    key_lockout: bool,
    pub cr: u32,
    pub sr: u32,
    pub ar: u32,
    pub acr: u32,
    pub busy: Busy,
    pub erase_busy_reads: Option<u32>,
    pub program_busy_reads: Option<u32>,
    pub fault: Option<FlashFault>,
    pub mass_erases: u32,
    pub page_erases: u32,
    pub halfword_writes: Vec<(u32, u16)>,
}

impl Fpec {
    fn new(config: &DummyConfig) -> Self {
        Self {
            locked: true,
            key1_seen: false,
            key_lockout: false,
            cr: 0,
            sr: 0,
            ar: 0,
            acr: 0x30,
            busy: Busy::Idle,
            erase_busy_reads: config.erase_busy_reads,
            program_busy_reads: config.program_busy_reads,
            fault: None,
            mass_erases: 0,
            page_erases: 0,
            halfword_writes: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.locked = true;
        self.key1_seen = false;
        self.key_lockout = false;
        self.cr = 0;
        self.sr = 0;
        self.busy = Busy::Idle;
    }

    pub fn read_cr(&self) -> u32 {
        if self.locked {
            self.cr | FlashCr::LOCK
        } else {
            self.cr
        }
    }

    /// SR without consuming a busy read.
    pub fn peek_sr(&self) -> u32 {
        if self.busy.is_busy() {
            self.sr | FlashSr::BSY
        } else {
            self.sr
        }
    }

    fn read_sr(&mut self) -> u32 {
        if self.busy.poll() {
            self.sr | FlashSr::BSY
        } else {
            self.sr
        }
    }

    fn write_sr(&mut self, value: u32) {
        self.sr &= !(value & (FlashSr::ERROR_MASK | FlashSr::EOP));
    }

    fn write_keyr(&mut self, value: u32) {
        if self.key_lockout || !self.locked {
            debug!("FLASH_KEYR write ignored: 0x{value:08X}");
            return;
        }

        match (self.key1_seen, value) {
            (false, FlashKeyr::KEY1) => self.key1_seen = true,
            (true, FlashKeyr::KEY2) => {
                debug!("Flash unlocked");
                self.key1_seen = false;
                self.locked = false;
            }
            _ => {
                warn!("Wrong FPEC key 0x{value:08X}, locked until reset");
                self.key1_seen = false;
                self.key_lockout = true;
            }
        }
    }

    fn write_cr(&mut self, value: u32, flash: &mut [u8], page_size: u32) {
        if self.locked {
            debug!("FLASH_CR write while locked ignored: 0x{value:08X}");
            return;
        }

        if value & FlashCr::LOCK != 0 {
            debug!("Flash locked");
            self.locked = true;
            self.cr = 0;
            return;
        }

        self.cr = value
            & (FlashCr::PG | FlashCr::PER | FlashCr::MER | FlashCr::OPTPG | FlashCr::OPTER);

        if value & FlashCr::STRT == 0 {
            return;
        }

        if self.fault == Some(FlashFault::WriteProtected) {
            debug!("Erase refused, write protected");
            self.sr |= FlashSr::WRPRTERR;
            return;
        }

        let range = if self.cr & FlashCr::MER != 0 {
            self.mass_erases += 1;
            0..flash.len()
        } else if self.cr & FlashCr::PER != 0 {
            self.page_erases += 1;
            let page = self.ar.wrapping_sub(FLASH_BASE) / page_size;
            let start = (page * page_size) as usize;
            start.min(flash.len())..(start + page_size as usize).min(flash.len())
        } else {
            return;
        };

        trace!("Erasing flash 0x{:X}..0x{:X}", range.start, range.end);
        flash[range].fill(0xFF);
        self.sr |= FlashSr::EOP;
        self.busy = Busy::from_reads(self.erase_busy_reads);
    }

    fn program(&mut self, offset: usize, halfword: u16, flash: &mut [u8]) {
        if self.locked || self.cr & FlashCr::PG == 0 {
            warn!("Flash halfword write at 0x{offset:X} without PG set ignored");
            return;
        }

        self.halfword_writes.push((offset as u32, halfword));

        let Some(cell) = flash.get_mut(offset..offset + 2) else {
            warn!("Flash halfword write at 0x{offset:X} out of range");
            self.sr |= FlashSr::PGERR;
            return;
        };

        let current = u16::from_le_bytes([cell[0], cell[1]]);
        if current != ERASED_HALFWORD && halfword != 0 {
            debug!("Programming non-erased halfword at 0x{offset:X}");
            self.sr |= FlashSr::PGERR;
            return;
        }

        cell.copy_from_slice(&halfword.to_le_bytes());
        self.sr |= FlashSr::EOP;
        self.busy = Busy::from_reads(self.program_busy_reads);
    }
}

/// Everything behind the MEM-AP.
#[derive(Debug, Clone)]
pub(crate) struct Bus {
    pub flash: Vec<u8>,
    pub ram: HashMap<u32, u32>,
    pub core: Core,
    pub fpec: Fpec,
    page_size: u32,
}

impl Bus {
    pub fn new(config: &DummyConfig) -> Self {
        Self {
            flash: vec![0xFF; config.flash_size],
            ram: HashMap::new(),
            core: Core::new(config.core_stale_reads),
            fpec: Fpec::new(config),
            page_size: config.page_size,
        }
    }

    // Offset into flash for `addr`, if it is in the flash region.  The
    // region is larger than the flash itself.
    fn flash_offset(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(FLASH_BASE)?;
        (offset < FLASH_REGION_SIZE).then_some(offset as usize)
    }

    pub fn read_word(&mut self, addr: u32) -> u32 {
        let addr = addr & !0x3;

        if let Some(offset) = self.flash_offset(addr) {
            let mut bytes = [0xFF; 4];
            for (i, byte) in bytes.iter_mut().enumerate() {
                if let Some(&b) = self.flash.get(offset + i) {
                    *byte = b;
                }
            }
            return u32::from_le_bytes(bytes);
        }

        match addr {
            Dhcsr::ADDRESS => self.core.read_dhcsr(),
            Dcrsr::ADDRESS => self.core.dcrsr,
            Dcrdr::ADDRESS => self.core.dcrdr,
            Demcr::ADDRESS => self.core.demcr,
            Aircr::ADDRESS => 0xFA05_0000,
            FlashAcr::ADDRESS => self.fpec.acr,
            FlashKeyr::ADDRESS => 0,
            FlashSr::ADDRESS => self.fpec.read_sr(),
            FlashCr::ADDRESS => self.fpec.read_cr(),
            FlashAr::ADDRESS => self.fpec.ar,
            FlashObr::ADDRESS => OBR_UNPROTECTED,
            FlashWrpr::ADDRESS => WRPR_UNPROTECTED,
            _ => self.ram.get(&addr).copied().unwrap_or(0),
        }
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        let addr = addr & !0x3;

        if let Some(offset) = self.flash_offset(addr) {
            warn!("32-bit flash write at 0x{offset:X} ignored");
            return;
        }

        match addr {
            Dhcsr::ADDRESS => self.core.write_dhcsr(value),
            Dcrsr::ADDRESS => self.core.dcrsr = value,
            Dcrdr::ADDRESS => self.core.dcrdr = value,
            Demcr::ADDRESS => self.core.demcr = value,
            Aircr::ADDRESS => {
                let aircr = Aircr::from(value);
                if value & 0xFFFF_0000 == Aircr::VECTKEY && aircr.sysresetreq() {
                    debug!("System reset requested");
                    self.system_reset();
                }
            }
            FlashAcr::ADDRESS => self.fpec.acr = value,
            FlashKeyr::ADDRESS => self.fpec.write_keyr(value),
            FlashSr::ADDRESS => self.fpec.write_sr(value),
            FlashCr::ADDRESS => self.fpec.write_cr(value, &mut self.flash, self.page_size),
            FlashAr::ADDRESS => self.fpec.ar = value,
            _ => {
                self.ram.insert(addr, value);
            }
        }
    }

    pub fn write_halfword(&mut self, addr: u32, value: u16) {
        let addr = addr & !0x1;

        if let Some(offset) = self.flash_offset(addr) {
            self.fpec.program(offset, value, &mut self.flash);
            return;
        }

        let shift = (addr & 0x2) * 8;
        let word = self.ram.get(&(addr & !0x3)).copied().unwrap_or(0);
        let word = (word & !(0xFFFF << shift)) | ((value as u32) << shift);
        self.ram.insert(addr & !0x3, word);
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        if self.flash_offset(addr).is_some() {
            warn!("Byte flash write at 0x{addr:08X} ignored");
            return;
        }

        let shift = (addr & 0x3) * 8;
        let word = self.ram.get(&(addr & !0x3)).copied().unwrap_or(0);
        let word = (word & !(0xFF << shift)) | ((value as u32) << shift);
        self.ram.insert(addr & !0x3, word);
    }

    pub fn system_reset(&mut self) {
        self.core.system_reset();
        self.fpec.reset();
    }
}
