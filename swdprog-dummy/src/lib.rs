// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdprog-dummy
//!
//! A simulated STM32F1-style SWD target that plugs in where GPIO pins
//! would, by implementing [`BitChannel`].  It decodes the host's bit stream
//! on each rising SWCLK edge, so everything above the pins - the wire
//! codec, SELECT caching, posted reads, core control and flash
//! programming - runs exactly as it would against hardware.
//!
//! The model covers:
//! - the SW-DP: IDCODE, CTRL/STAT power handshake, sticky errors, ABORT,
//!   SELECT, RDBUFF and line reset
//! - a MEM-AP with CSW, TAR, DRW (8/16/32-bit, auto-increment) and IDR
//! - DHCSR, DEMCR and AIRCR on the core
//! - the STM32F1 flash controller: key sequence, lock, page and mass
//!   erase, halfword programming and status flags
//!
//! Faults can be injected to exercise error paths: forced WAIT/FAULT
//! ACKs, corrupted read parity, a disconnected target, a failing pin,
//! write-protected flash and erases or programs that never finish.
//!
//! ```rust
//! use swdprog_dummy::{DummyConfig, DummyTarget};
//!
//! let target = DummyTarget::new(DummyConfig {
//!     flash_size: 128 * 1024,
//!     ..Default::default()
//! });
//! assert!(target.flash_locked());
//! ```

mod dap;
mod system;
mod wire;

use std::collections::VecDeque;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::arm::dp::{CtrlStat, Select};
use swdprog_core::arm::map::Csw;
use swdprog_core::stm::{FlashCr, FlashSr, PAGE_SIZE_1K};
use swdprog_core::{BitChannel, Level, Pin, PinMode, TransportError};

use crate::dap::Dap;
use crate::system::Bus;
use crate::wire::{ACK_OK, Link, LinkEvent, Request};

const ACK_FAULT: u8 = 0b100;

/// Configuration for a [`DummyTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// Value returned from DP IDCODE.  Defaults to a Cortex-M3.
    pub idcode: u32,

    /// Value returned from the MEM-AP's IDR.
    pub ap_idr: u32,

    /// Size of flash in bytes, starting at 0x0800_0000.
    pub flash_size: usize,

    /// Flash page size, used by page erase.
    pub page_size: u32,

    /// DHCSR reads after a halt or run request that still show the old
    /// core state.  `None` means the core never changes state.
    pub core_stale_reads: Option<u32>,

    /// FLASH_SR reads that report busy after an erase starts.  `None`
    /// means the erase never completes.
    pub erase_busy_reads: Option<u32>,

    /// FLASH_SR reads that report busy after each halfword is programmed.
    /// `None` means programming never completes.
    pub program_busy_reads: Option<u32>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            idcode: 0x1BA0_1477,
            ap_idr: 0x2477_0011,
            flash_size: 64 * 1024,
            page_size: PAGE_SIZE_1K,
            core_stale_reads: Some(0),
            erase_busy_reads: Some(2),
            program_busy_reads: Some(1),
        }
    }
}

/// Flash controller faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashFault {
    /// Erases are refused with WRPRTERR.
    WriteProtected,
}

/// A simulated SWD target.
#[derive(Debug, Clone)]
pub struct DummyTarget {
    config: DummyConfig,
    link: Link,
    dap: Dap,
    bus: Bus,

    // Host side of the pins
    swdio_mode: PinMode,
    swdio_level: Level,
    swclk_level: Level,

    // Fault injection
    connected: bool,
    forced_acks: VecDeque<u8>,
    corrupt_reads: u32,
    failing_pin: Option<Pin>,

    line_resets: usize,
    requests: usize,
    slept_ms: u64,
}

impl Default for DummyTarget {
    fn default() -> Self {
        Self::new(DummyConfig::default())
    }
}

impl DummyTarget {
    pub fn new(config: DummyConfig) -> Self {
        Self {
            link: Link::default(),
            dap: Dap::new(&config),
            bus: Bus::new(&config),
            config,
            swdio_mode: PinMode::Input,
            swdio_level: Level::Low,
            swclk_level: Level::Low,
            connected: true,
            forced_acks: VecDeque::new(),
            corrupt_reads: 0,
            failing_pin: None,
            line_resets: 0,
            requests: 0,
            slept_ms: 0,
        }
    }

    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    //
    // Memory
    //

    /// Copies `data` into flash at `offset`, bypassing the flash controller.
    /// Anything past the end of flash is dropped.
    pub fn load_flash(&mut self, offset: usize, data: &[u8]) {
        let flash = &mut self.bus.flash;
        let start = offset.min(flash.len());
        let end = offset.saturating_add(data.len()).min(flash.len());
        flash[start..end].copy_from_slice(&data[..end - start]);
    }

    /// The whole of flash.
    pub fn flash(&self) -> &[u8] {
        &self.bus.flash
    }

    /// Reads a word of RAM (or any other non-flash, non-register address).
    pub fn ram_word(&self, addr: u32) -> u32 {
        self.bus.ram.get(&(addr & !0x3)).copied().unwrap_or(0)
    }

    //
    // DP and AP state
    //

    /// CTRL/STAT as the host would read it.
    pub fn ctrl_stat(&self) -> CtrlStat {
        self.dap.ctrl_stat()
    }

    pub fn select(&self) -> Select {
        self.dap.select
    }

    pub fn csw(&self) -> Csw {
        Csw::from(self.dap.csw)
    }

    pub fn tar(&self) -> u32 {
        self.dap.tar
    }

    /// Number of DP SELECT writes received.
    pub fn select_writes(&self) -> usize {
        self.dap.select_writes
    }

    /// Number of DP ABORT writes received.
    pub fn abort_writes(&self) -> usize {
        self.dap.abort_writes
    }

    pub fn line_resets(&self) -> usize {
        self.line_resets
    }

    /// Number of valid request headers received.
    pub fn requests(&self) -> usize {
        self.requests
    }

    //
    // Core state
    //

    pub fn core_halted(&self) -> bool {
        self.bus.core.halted
    }

    pub fn dhcsr_reads(&self) -> usize {
        self.bus.core.dhcsr_reads
    }

    pub fn demcr(&self) -> u32 {
        self.bus.core.demcr
    }

    pub fn system_resets(&self) -> u32 {
        self.bus.core.system_resets
    }

    pub fn set_core_stale_reads(&mut self, reads: Option<u32>) {
        self.config.core_stale_reads = reads;
        self.bus.core.stale_reads = reads;
    }

    //
    // Flash controller state
    //

    pub fn flash_locked(&self) -> bool {
        self.bus.fpec.locked
    }

    pub fn flash_cr(&self) -> FlashCr {
        FlashCr::from(self.bus.fpec.read_cr())
    }

    /// FLASH_SR, without counting as a read.
    pub fn flash_sr(&self) -> FlashSr {
        FlashSr::from(self.bus.fpec.peek_sr())
    }

    /// Every halfword write the flash controller received while programming
    /// was enabled, as (flash offset, value).
    pub fn halfword_writes(&self) -> &[(u32, u16)] {
        &self.bus.fpec.halfword_writes
    }

    pub fn mass_erases(&self) -> u32 {
        self.bus.fpec.mass_erases
    }

    pub fn page_erases(&self) -> u32 {
        self.bus.fpec.page_erases
    }

    pub fn set_erase_busy_reads(&mut self, reads: Option<u32>) {
        self.config.erase_busy_reads = reads;
        self.bus.fpec.erase_busy_reads = reads;
    }

    pub fn set_program_busy_reads(&mut self, reads: Option<u32>) {
        self.config.program_busy_reads = reads;
        self.bus.fpec.program_busy_reads = reads;
    }

    pub fn set_flash_fault(&mut self, fault: Option<FlashFault>) {
        self.bus.fpec.fault = fault;
    }

    //
    // Fault injection
    //

    /// Total time the host asked to sleep via [`BitChannel::delay_ms()`].
    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }

    /// Disconnects or reconnects the target.  A disconnected target ignores
    /// the clock and SWDIO floats high.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Answers the next requests with these ACKs instead of the real ones.
    /// An OK (0b001) entry lets the request through normally.
    pub fn force_acks(&mut self, acks: impl IntoIterator<Item = u8>) {
        self.forced_acks.extend(acks);
    }

    /// Sends the wrong parity bit with the next `count` read responses.
    pub fn corrupt_read_parity(&mut self, count: u32) {
        self.corrupt_reads = count;
    }

    /// Makes every operation on `pin` fail with a [`TransportError`].
    pub fn fail_pin(&mut self, pin: Option<Pin>) {
        self.failing_pin = pin;
    }

    /// Sets a sticky error flag in CTRL/STAT, as a failed transfer would.
    pub fn set_sticky_error(&mut self, flag: u32) {
        self.dap.set_sticky(flag);
    }

    /// Resets the core and flash controller, as AIRCR.SYSRESETREQ would.
    pub fn system_reset(&mut self) {
        self.bus.system_reset();
    }

    fn check_pin(&self, pin: Pin) -> Result<(), TransportError> {
        match self.failing_pin {
            Some(failing) if failing == pin => Err(TransportError::new(pin, "injected failure")),
            _ => Ok(()),
        }
    }

    fn rising_edge(&mut self) {
        if !self.connected {
            return;
        }

        let host = match self.swdio_mode {
            PinMode::Output => Some(self.swdio_level.is_high()),
            PinMode::Input => None,
        };

        match self.link.clock(host) {
            None => (),
            Some(LinkEvent::LineReset) => self.line_resets += 1,
            Some(LinkEvent::Request(request)) => {
                self.requests += 1;
                let (ack, data) = self.respond(request);
                let mut parity = data.count_ones() % 2 == 1;
                if ack == ACK_OK && request.read && self.corrupt_reads > 0 {
                    debug!("Corrupting read parity");
                    self.corrupt_reads -= 1;
                    parity = !parity;
                }
                self.link.respond(request, ack, data, parity);
            }
            Some(LinkEvent::Write {
                request,
                data,
                parity_ok,
            }) => self.complete_write(request, data, parity_ok),
        }
    }

    // Works out the ACK for a request, and for OK reads the data.
    fn respond(&mut self, request: Request) -> (u8, u32) {
        if let Some(ack) = self.forced_acks.pop_front() {
            if ack != ACK_OK {
                debug!("Forcing ACK 0b{ack:03b} for {request:?}");
                return (ack, 0);
            }
        }

        if !request.ap {
            let data = if request.read {
                self.dap.read_dp(request.addr)
            } else {
                0
            };
            return (ACK_OK, data);
        }

        if self.dap.ap_faults() {
            debug!("AP access refused: CTRL/STAT {}", self.dap.ctrl_stat());
            return (ACK_FAULT, 0);
        }

        let data = if request.read {
            self.dap.read_ap(request.addr, &mut self.bus)
        } else {
            0
        };
        (ACK_OK, data)
    }

    fn complete_write(&mut self, request: Request, data: u32, parity_ok: bool) {
        if !parity_ok {
            debug!("Write data parity error, setting WDATAERR");
            self.dap.set_sticky(CtrlStat::WDATAERR);
            return;
        }

        if request.ap {
            self.dap.write_ap(request.addr, data, &mut self.bus);
        } else {
            self.dap.write_dp(request.addr, data);
        }
    }
}

impl BitChannel for DummyTarget {
    fn set_mode(&mut self, pin: Pin, mode: PinMode) -> Result<(), TransportError> {
        self.check_pin(pin)?;
        if pin == Pin::Swdio {
            self.swdio_mode = mode;
        }
        Ok(())
    }

    fn drive(&mut self, pin: Pin, level: Level) -> Result<(), TransportError> {
        self.check_pin(pin)?;
        match pin {
            Pin::Swdio => self.swdio_level = level,
            Pin::Swclk => {
                let rising = !self.swclk_level.is_high() && level.is_high();
                self.swclk_level = level;
                if rising {
                    self.rising_edge();
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, pin: Pin) -> Result<Level, TransportError> {
        self.check_pin(pin)?;
        let level = match pin {
            Pin::Swclk => self.swclk_level,
            Pin::Swdio => match self.swdio_mode {
                PinMode::Output => self.swdio_level,
                PinMode::Input if !self.connected => Level::High,
                PinMode::Input => Level::from(self.link.output().unwrap_or(true)),
            },
        };
        Ok(level)
    }

    fn half_period_delay(&mut self) {}

    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms += ms as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Clocks one bit the way the host's wire codec does.
    fn write_bit(target: &mut DummyTarget, bit: bool) {
        target.drive(Pin::Swclk, Level::Low).unwrap();
        target.drive(Pin::Swdio, Level::from(bit)).unwrap();
        target.drive(Pin::Swclk, Level::High).unwrap();
    }

    fn read_bit(target: &mut DummyTarget) -> bool {
        target.drive(Pin::Swclk, Level::Low).unwrap();
        let bit = target.read(Pin::Swdio).unwrap().is_high();
        target.drive(Pin::Swclk, Level::High).unwrap();
        bit
    }

    fn write_bits(target: &mut DummyTarget, value: u64, count: u32) {
        for i in 0..count {
            write_bit(target, value & (1 << i) != 0);
        }
    }

    fn line_reset(target: &mut DummyTarget) {
        target.set_mode(Pin::Swdio, PinMode::Output).unwrap();
        write_bits(target, u64::MAX, 56);
        write_bits(target, 0, 8);
    }

    // Sends a DP IDCODE read header and returns the ACK.
    fn idcode_ack(target: &mut DummyTarget) -> u8 {
        target.set_mode(Pin::Swdio, PinMode::Output).unwrap();
        write_bits(target, 0xA5, 8);
        target.set_mode(Pin::Swdio, PinMode::Input).unwrap();
        target.drive(Pin::Swclk, Level::Low).unwrap();
        target.drive(Pin::Swclk, Level::High).unwrap();
        (0..3).fold(0, |ack, i| ack | ((read_bit(target) as u8) << i))
    }

    #[test]
    fn default_config() {
        let target = DummyTarget::default();
        assert_eq!(target.flash().len(), 64 * 1024);
        assert!(target.flash().iter().all(|&b| b == 0xFF));
        assert!(target.flash_locked());
        assert!(!target.ctrl_stat().is_powered());
        assert_eq!(target.csw().value(), 0x2300_0052);
    }

    #[test]
    fn ignores_requests_before_line_reset() {
        let mut target = DummyTarget::default();
        assert_eq!(idcode_ack(&mut target), 0b111);
        assert_eq!(target.requests(), 0);
    }

    #[test]
    fn idcode_after_line_reset() {
        let mut target = DummyTarget::default();
        line_reset(&mut target);
        assert_eq!(target.line_resets(), 1);
        assert_eq!(idcode_ack(&mut target), ACK_OK);

        let idcode = (0..32).fold(0u32, |v, i| v | ((read_bit(&mut target) as u32) << i));
        let parity = read_bit(&mut target);
        assert_eq!(idcode, 0x1BA0_1477);
        assert_eq!(parity, idcode.count_ones() % 2 == 1);
    }

    #[test]
    fn corrupted_parity() {
        let mut target = DummyTarget::default();
        target.corrupt_read_parity(1);
        line_reset(&mut target);
        idcode_ack(&mut target);
        let idcode = (0..32).fold(0u32, |v, i| v | ((read_bit(&mut target) as u32) << i));
        let parity = read_bit(&mut target);
        assert_ne!(parity, idcode.count_ones() % 2 == 1);
    }

    #[test]
    fn forced_wait() {
        let mut target = DummyTarget::default();
        target.force_acks([0b010]);
        line_reset(&mut target);
        assert_eq!(idcode_ack(&mut target), 0b010);
    }

    #[test]
    fn disconnected_floats_high() {
        let mut target = DummyTarget::default();
        target.set_connected(false);
        line_reset(&mut target);
        assert_eq!(idcode_ack(&mut target), 0b111);
        assert_eq!(target.line_resets(), 0);
    }

    #[test]
    fn failing_pin() {
        let mut target = DummyTarget::default();
        target.fail_pin(Some(Pin::Swclk));
        assert_eq!(
            target.drive(Pin::Swclk, Level::High),
            Err(TransportError::new(Pin::Swclk, "injected failure"))
        );
        assert!(target.read(Pin::Swdio).is_ok());
    }

    #[test]
    fn load_flash_clamps() {
        let mut target = DummyTarget::new(DummyConfig {
            flash_size: 4,
            ..Default::default()
        });
        target.load_flash(2, &[1, 2, 3, 4]);
        assert_eq!(target.flash(), &[0xFF, 0xFF, 1, 2]);
    }

    #[test]
    fn delay_accumulates() {
        let mut target = DummyTarget::default();
        target.delay_ms(100);
        target.delay_ms(5);
        assert_eq!(target.slept_ms(), 105);
    }
}
