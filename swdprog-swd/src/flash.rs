// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F1 flash programming
//!
//! Adds flash operations to [`DebugInterface`].  All offsets are relative to
//! the start of flash, [`FLASH_BASE`].
//!
//! The flash controller (FPEC) has to be unlocked with
//! [`DebugInterface::unlock_flash()`] before it can be erased or programmed,
//! and only accepts halfword writes.  The core should be halted first, so
//! it isn't executing from flash while it changes.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::BitChannel;
use swdprog_core::stm::{FLASH_BASE, FlashAr, FlashCr, FlashKeyr, FlashSr, flash_address};
use swdprog_core::arm::register::MemoryMappedRegister;

use crate::SwdError;
use crate::debug::DebugInterface;

/// Number of FLASH_SR polls while waiting for an erase.
pub const ERASE_POLL_ATTEMPTS: u32 = 10;

/// Delay between erase polls.  With [`ERASE_POLL_ATTEMPTS`] this allows a
/// mass erase roughly a second, well above the ~40ms typical for an F103.
pub const ERASE_POLL_INTERVAL_MS: u32 = 100;

/// Number of FLASH_SR polls after each halfword is programmed.  Programming
/// takes ~50us, and each poll is several SWD transactions, so this is
/// generous at any realistic clock rate.
pub const PROGRAM_POLL_ATTEMPTS: u32 = 1000;

/// Flash unlock state, for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashState {
    /// Set once both unlock keys have been accepted.
    pub unlocked: bool,
}

impl<C: BitChannel> DebugInterface<C> {
    /// Whether the flash has been unlocked in this session.
    pub fn is_unlocked(&self) -> bool {
        self.flash.unlocked
    }

    /// Reads the word at `offset` into flash, as 4 little-endian bytes.
    pub fn read_word(&mut self, offset: u32) -> Result<[u8; 4], SwdError> {
        let addr = to_address(offset)?;
        Ok(self.swd.read_register(addr)?.to_le_bytes())
    }

    /// Reads `size` bytes of flash starting at `offset`.
    ///
    /// Flash is read a word at a time, so the returned buffer is `size`
    /// rounded up to a multiple of 4.
    pub fn read(&mut self, offset: u32, size: usize) -> Result<Vec<u8>, SwdError> {
        let rounded = size.div_ceil(4) * 4;
        let mut data = Vec::with_capacity(rounded);

        for n in (0..rounded).step_by(4) {
            let word = self.read_word(offset_plus(offset, n)?)?;
            data.extend_from_slice(&word);
        }

        Ok(data)
    }

    /// Unlocks the flash controller for erasing and programming, by writing
    /// the two FLASH_KEYR keys.
    ///
    /// Returns:
    /// - `Ok(())`: if the flash is now unlocked.
    /// - `Err(SwdError::NotWritable)`: if the keys were written but
    ///   FLASH_CR is still locked.  The FPEC stays locked until the next
    ///   reset after a bad key sequence.
    /// - `Err(SwdError)`: if either key write failed.
    pub fn unlock_flash(&mut self) -> Result<(), SwdError> {
        let cr = self.swd.read_mem_register::<FlashCr>()?;
        if !cr.locked() {
            debug!("Flash already unlocked");
            self.flash.unlocked = true;
            return Ok(());
        }

        debug!("Unlocking flash");
        self.swd.write_register(FlashKeyr::ADDRESS, FlashKeyr::KEY1)?;
        self.swd.write_register(FlashKeyr::ADDRESS, FlashKeyr::KEY2)?;

        let cr = self.swd.read_mem_register::<FlashCr>()?;
        if cr.locked() {
            warn!("Flash still locked after writing keys: FLASH_CR {cr}");
            return Err(SwdError::NotWritable);
        }

        self.flash.unlocked = true;
        Ok(())
    }

    /// Locks the flash controller again.
    pub fn lock_flash(&mut self) -> Result<(), SwdError> {
        debug!("Locking flash");
        self.flash.unlocked = false;
        self.swd.write_mem_register(FlashCr::lock())
    }

    /// Whether the flash controller is busy with an erase or program.
    pub fn is_busy(&mut self) -> Result<bool, SwdError> {
        Ok(self.swd.read_mem_register::<FlashSr>()?.is_busy())
    }

    /// Erases the whole of flash.
    ///
    /// Returns:
    /// - `Ok(())`: once the flash controller reports the erase complete.
    /// - `Err(SwdError::NotWritable)`: if flash hasn't been unlocked.
    /// - `Err(SwdError::EraseTimeout)`: if it was still busy after
    ///   [`ERASE_POLL_ATTEMPTS`] polls.
    /// - `Err(SwdError::FlashStatus)`: if the erase failed.
    pub fn erase_all(&mut self) -> Result<(), SwdError> {
        self.check_unlocked()?;

        info!("Erasing all flash");
        self.swd.write_mem_register(FlashCr::mass_erase())?;
        self.swd.write_mem_register(FlashCr::mass_erase().start())?;
        let erased = self.wait_for_erase();
        self.clear_cr(erased)
    }

    /// Erases the page containing `offset`.
    pub fn erase_page(&mut self, offset: u32) -> Result<(), SwdError> {
        self.check_unlocked()?;
        let addr = to_address(offset)?;

        debug!("Erasing flash page at 0x{addr:08X}");
        self.swd.write_mem_register(FlashCr::page_erase())?;
        self.swd.write_register(FlashAr::ADDRESS, addr)?;
        self.swd.write_mem_register(FlashCr::page_erase().start())?;
        let erased = self.wait_for_erase();
        self.clear_cr(erased)
    }

    /// Programs `data` into flash at `offset`, a halfword at a time.  The
    /// flash must have been erased first.
    ///
    /// An odd length `data` is padded with a zero byte to make up the last
    /// halfword.
    ///
    /// Arguments:
    /// - `offset`: Offset into flash.  Must be halfword aligned.
    /// - `data`: The bytes to write.
    ///
    /// Returns:
    /// - `Ok(())`: if every halfword was programmed.
    /// - `Err(SwdError::NotWritable)`: if flash hasn't been unlocked.
    /// - `Err(SwdError::ProgramTimeout)`: if the controller stayed busy after
    ///   a halfword.
    /// - `Err(SwdError::FlashStatus)`: if the controller flagged an error,
    ///   for example because a halfword wasn't erased.
    pub fn write_flash(&mut self, offset: u32, data: &[u8]) -> Result<(), SwdError> {
        self.check_unlocked()?;
        if offset % 2 != 0 {
            return Err(SwdError::Api(format!(
                "flash offset 0x{offset:X} is not halfword aligned"
            )));
        }

        debug!("Programming {} bytes at offset 0x{offset:X}", data.len());
        self.swd.write_mem_register(FlashCr::program())?;
        let programmed = self.program_halfwords(offset, data);
        self.clear_cr(programmed)
    }

    fn program_halfwords(&mut self, offset: u32, data: &[u8]) -> Result<(), SwdError> {
        for (ii, chunk) in data.chunks(2).enumerate() {
            let halfword = u16::from_le_bytes([chunk[0], chunk.get(1).copied().unwrap_or(0)]);
            let addr = to_address(offset_plus(offset, ii * 2)?)?;

            self.swd.write_register_half(addr, halfword)?;
            self.wait_for_program(addr)?;
        }
        Ok(())
    }

    // Deselects the program or erase operation in FLASH_CR, whether or not
    // it succeeded.  The operation's own error takes precedence.
    fn clear_cr(&mut self, result: Result<(), SwdError>) -> Result<(), SwdError> {
        let cleared = self.swd.write_mem_register(FlashCr::new());
        match (result, cleared) {
            (Ok(()), cleared) => cleared,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(clear)) => {
                debug!("Error: FLASH_CR not cleared after failure: {clear}");
                Err(e)
            }
        }
    }

    fn check_unlocked(&self) -> Result<(), SwdError> {
        if self.flash.unlocked {
            Ok(())
        } else {
            debug!("Error: flash operation attempted while locked");
            Err(SwdError::NotWritable)
        }
    }

    fn wait_for_erase(&mut self) -> Result<(), SwdError> {
        for attempt in 1..=ERASE_POLL_ATTEMPTS {
            let sr = self.swd.read_mem_register::<FlashSr>()?;
            if !sr.is_busy() {
                debug!("Erase complete after {attempt} poll(s)");
                return self.check_status(sr);
            }

            if attempt < ERASE_POLL_ATTEMPTS {
                self.swd.protocol().delay_ms(ERASE_POLL_INTERVAL_MS);
            }
        }

        warn!("Flash still busy after {ERASE_POLL_ATTEMPTS} polls");
        Err(SwdError::EraseTimeout)
    }

    fn wait_for_program(&mut self, addr: u32) -> Result<(), SwdError> {
        for _ in 0..PROGRAM_POLL_ATTEMPTS {
            let sr = self.swd.read_mem_register::<FlashSr>()?;
            if !sr.is_busy() {
                return self.check_status(sr);
            }
        }

        warn!("Flash still busy programming 0x{addr:08X}");
        Err(SwdError::ProgramTimeout { addr })
    }

    // Error flags are sticky, so are cleared before reporting them.
    fn check_status(&mut self, sr: FlashSr) -> Result<(), SwdError> {
        if !sr.has_error() {
            return Ok(());
        }

        warn!("Flash error: FLASH_SR {sr}");
        self.swd.write_mem_register(sr.clear_flags())?;
        Err(SwdError::FlashStatus(sr.value()))
    }
}

fn to_address(offset: u32) -> Result<u32, SwdError> {
    flash_address(offset).ok_or_else(|| {
        SwdError::Api(format!(
            "offset 0x{offset:X} is beyond the address space from 0x{FLASH_BASE:08X}"
        ))
    })
}

fn offset_plus(offset: u32, n: usize) -> Result<u32, SwdError> {
    u32::try_from(n)
        .ok()
        .and_then(|n| offset.checked_add(n))
        .ok_or_else(|| SwdError::Api(format!("offset 0x{offset:X} + {n} overflows")))
}
