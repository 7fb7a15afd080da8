// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Wire Protocol Implementation
//!
//! This module bit-bangs the SWD protocol over a [`BitChannel`].  It knows
//! how to frame a single request, decode the target's ACK, and move 32 bits
//! of data plus parity in either direction.  It has no idea what the
//! registers mean, and it never retries - see [`crate::SwdInterface`] for
//! that layer.
//!
//! A transaction on the wire looks like this, time flowing left to right,
//! every field LSB first:
//!
//! ```text
//!  host:   | header (8) | trn |           | trn | data (32) | parity | idle |  write
//!  target: |            |     |  ACK (3)  |     |           |        |      |
//!
//!  host:   | header (8) | trn |           |           |        | trn | idle |  read
//!  target: |            |     |  ACK (3)  | data (32) | parity |     |      |
//! ```

use swdprog_core::{BitChannel, Level, Pin, PinMode};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::SwdError;
use core::fmt;

/// At least 50 clocks with SWDIO high.  Sent either side of the JTAG-to-SWD
/// sequence.
pub const LINE_RESET: [u8; 8] = [0xFF; 8];

/// JTAG-to-SWD select sequence, 0xE79E sent LSB first.
pub const JTAG_TO_SWD: [u8; 2] = [0x9E, 0xE7];

/// Idle cycles with SWDIO low, required before the first request.
pub const IDLE_SYNC: [u8; 2] = [0x00; 2];

pub const ACK_OK: u8 = 0b001;
pub const ACK_WAIT: u8 = 0b010;
pub const ACK_FAULT: u8 = 0b100;

/// SWD Operations
///
/// Each operation contains the register address as a u8 (0x0, 0x4, etc).
/// Only `A[3:2]` go on the wire.  For AP registers the rest of the address
/// is the bank, selected beforehand via DP SELECT.
///
/// SWD request header format
/// Bit 0: Start (1)
/// Bit 1: APnDP (0=DP, 1=AP)
/// Bit 2: RnW (0=write, 1=read)
/// Bit 3: A2 (address bit 2)
/// Bit 4: A3 (address bit 3)
/// Bit 5: Parity over bits 1-4
/// Bit 6: Stop (0)
/// Bit 7: Park (1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwdOp {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

impl SwdOp {
    /// Builds an operation from its APnDP and RnW components.
    pub fn new(ap: bool, read: bool, addr: u8) -> Self {
        match (ap, read) {
            (false, true) => SwdOp::DpRead(addr),
            (false, false) => SwdOp::DpWrite(addr),
            (true, true) => SwdOp::ApRead(addr),
            (true, false) => SwdOp::ApWrite(addr),
        }
    }

    /// Returns the 8-bit request header, in the order it goes on the wire
    /// (bit 0 first).
    pub fn header(&self) -> u8 {
        let (base, addr) = match self {
            // start=1, APnDP=0, RnW=1, park=1
            SwdOp::DpRead(a) => (0x85, a),
            // start=1, APnDP=0, RnW=0, park=1
            SwdOp::DpWrite(a) => (0x81, a),
            // start=1, APnDP=1, RnW=1, park=1
            SwdOp::ApRead(a) => (0x87, a),
            // start=1, APnDP=1, RnW=0, park=1
            SwdOp::ApWrite(a) => (0x83, a),
        };

        let header = base | ((addr & 0x0C) << 1);
        let parity = data_parity((header & 0x1E) as u32) as u8;
        header | (parity << 5)
    }

    pub fn is_read(&self) -> bool {
        matches!(self, SwdOp::DpRead(_) | SwdOp::ApRead(_))
    }

    pub fn is_ap(&self) -> bool {
        matches!(self, SwdOp::ApRead(_) | SwdOp::ApWrite(_))
    }
}

impl fmt::Display for SwdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdOp::DpRead(a) => write!(f, "DP Read 0x{a:02X}"),
            SwdOp::DpWrite(a) => write!(f, "DP Write 0x{a:02X}"),
            SwdOp::ApRead(a) => write!(f, "AP Read 0x{a:02X}"),
            SwdOp::ApWrite(a) => write!(f, "AP Write 0x{a:02X}"),
        }
    }
}

/// SWD parity - true for an odd number of bits set to 1.
pub fn data_parity(value: u32) -> bool {
    value.count_ones() % 2 == 1
}

/// SWD Protocol object
///
/// Owns the [`BitChannel`] for the lifetime of the session.  Most
/// applications use [`crate::DebugInterface`] or [`crate::SwdInterface`]
/// rather than this directly.
///
/// ```rust
/// use swdprog_swd::SwdProtocol;
/// use swdprog_dummy::DummyTarget;
///
/// let mut swd = SwdProtocol::new(DummyTarget::default());
/// swd.reset().unwrap();
/// let idcode = swd.read(false, 0x00).unwrap();
/// assert_eq!(idcode, 0x1BA0_1477);
/// ```
#[derive(Debug)]
pub struct SwdProtocol<C> {
    channel: C,
}

impl<C: BitChannel> SwdProtocol<C> {
    /// Creates a new protocol instance on top of `channel`.  Nothing is sent
    /// until [`Self::reset()`] is called.
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Puts the target's SWD port into a known state: line reset, JTAG-to-SWD
    /// select, a second line reset, then idle.
    ///
    /// Must be called before the first transaction, and after any error that
    /// [`SwdError::requires_reset()`].
    pub fn reset(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Line reset and JTAG-to-SWD");
        self.channel.set_mode(Pin::Swclk, PinMode::Output)?;
        self.channel.drive(Pin::Swclk, Level::Low)?;
        self.swdio_output()?;

        self.write_bytes(&LINE_RESET)?;
        self.write_bytes(&JTAG_TO_SWD)?;
        self.write_bytes(&LINE_RESET)?;
        self.write_bytes(&IDLE_SYNC)?;

        trace!("OK:    Line reset and JTAG-to-SWD");
        Ok(())
    }

    /// Writes a DP (`ap == false`) or AP register.
    ///
    /// Arguments:
    /// - `ap`: Whether this is an AP, rather than a DP, register.
    /// - `addr`: Register address.  Only `A[3:2]` are used.
    /// - `data`: The value to write.
    ///
    /// Returns:
    /// - `Ok(())` if the target acknowledged with OK.
    /// - `Err(SwdError)` for any other ACK, or a transport failure.  On an
    ///   ACK failure no data phase takes place.
    pub fn write(&mut self, ap: bool, addr: u8, data: u32) -> Result<(), SwdError> {
        let op = SwdOp::new(ap, false, addr);
        trace!("Exec:  {op} 0x{data:08X}");

        let result = self.do_write(op, data);
        match &result {
            Ok(()) => trace!("OK:    {op}"),
            Err(e) => debug!("Error: {op} 0x{data:08X}: {e}"),
        }
        result
    }

    /// Reads a DP (`ap == false`) or AP register.
    ///
    /// AP reads are posted: the value returned is the result of the previous
    /// AP read.  The caller is responsible for reading DP RDBUFF to get the
    /// result of this one.
    ///
    /// Returns:
    /// - `Ok(data)` if the target acknowledged OK and the parity matched.
    /// - `Err(SwdError::ReadParity)` if the parity didn't match.
    /// - `Err(SwdError)` for any other ACK, or a transport failure.
    pub fn read(&mut self, ap: bool, addr: u8) -> Result<u32, SwdError> {
        let op = SwdOp::new(ap, true, addr);
        trace!("Exec:  {op}");

        let result = self.do_read(op);
        match &result {
            Ok(data) => trace!("OK:    {op} 0x{data:08X}"),
            Err(e) => debug!("Error: {op}: {e}"),
        }
        result
    }

    /// Sleeps for `ms` milliseconds, using the channel's delay.
    pub fn delay_ms(&mut self, ms: u32) {
        self.channel.delay_ms(ms);
    }

    fn do_write(&mut self, op: SwdOp, data: u32) -> Result<(), SwdError> {
        self.request(op)?;

        // Target releases SWDIO after the ACK, then we take it back
        self.clock(1)?;
        self.swdio_output()?;

        self.write_bits(32, data)?;
        self.write_bit(data_parity(data))?;

        self.write_bit(false)
    }

    fn do_read(&mut self, op: SwdOp) -> Result<u32, SwdError> {
        self.request(op)?;

        let data = self.read_bits(32)?;
        let parity = self.read_bit()?;
        self.turnaround_to_output()?;
        self.write_bit(false)?;

        if data_parity(data) != parity {
            debug!("Read parity error: data=0x{data:08X}, parity={parity}");
            return Err(SwdError::ReadParity);
        }

        Ok(data)
    }

    // Sends the header, turns the line around and reads the ACK.  On
    // success SWDIO is left as an input.  On failure the turnaround back to
    // the host has been done.
    fn request(&mut self, op: SwdOp) -> Result<(), SwdError> {
        self.swdio_output()?;
        self.write_bits(8, op.header() as u32)?;

        self.swdio_input()?;
        self.clock(1)?;

        let ack = self.read_bits(3)? as u8;
        let result = SwdError::from_ack(ack);
        if let Err(e) = &result {
            trace!("ACK error - turnaround: {e}");
            self.turnaround_to_output()?;
        }
        result
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SwdError> {
        for &byte in bytes {
            self.write_bits(8, byte as u32)?;
        }
        Ok(())
    }

    fn write_bits(&mut self, count: usize, data: u32) -> Result<(), SwdError> {
        let mut data = data;
        for _ in 0..count {
            self.write_bit(data & 1 == 1)?;
            data >>= 1;
        }
        Ok(())
    }

    fn read_bits(&mut self, count: usize) -> Result<u32, SwdError> {
        let mut data = 0u32;
        for ii in 0..count {
            if self.read_bit()? {
                data |= 1 << ii;
            }
        }
        Ok(data)
    }

    #[inline]
    fn write_bit(&mut self, bit: bool) -> Result<(), SwdError> {
        self.channel.drive(Pin::Swclk, Level::Low)?;
        self.channel.drive(Pin::Swdio, Level::from(bit))?;
        self.channel.half_period_delay();
        self.channel.drive(Pin::Swclk, Level::High)?;
        self.channel.half_period_delay();
        Ok(())
    }

    // The target changes SWDIO on the rising edge, so sample before raising
    // SWCLK.
    #[inline]
    fn read_bit(&mut self) -> Result<bool, SwdError> {
        self.channel.drive(Pin::Swclk, Level::Low)?;
        self.channel.half_period_delay();
        let bit = self.channel.read(Pin::Swdio)?.is_high();
        self.channel.drive(Pin::Swclk, Level::High)?;
        self.channel.half_period_delay();
        Ok(bit)
    }

    fn clock(&mut self, cycles: u32) -> Result<(), SwdError> {
        for _ in 0..cycles {
            self.channel.drive(Pin::Swclk, Level::Low)?;
            self.channel.half_period_delay();
            self.channel.drive(Pin::Swclk, Level::High)?;
            self.channel.half_period_delay();
        }
        Ok(())
    }

    fn turnaround_to_output(&mut self) -> Result<(), SwdError> {
        self.clock(1)?;
        self.swdio_output()?;
        self.channel.drive(Pin::Swdio, Level::Low)?;
        Ok(())
    }

    fn swdio_output(&mut self) -> Result<(), SwdError> {
        self.channel.set_mode(Pin::Swdio, PinMode::Output)?;
        Ok(())
    }

    fn swdio_input(&mut self) -> Result<(), SwdError> {
        self.channel.set_mode(Pin::Swdio, PinMode::Input)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(SwdOp::DpRead(0x00), 0xA5 ; "read idcode")]
    #[test_case(SwdOp::DpWrite(0x00), 0x81 ; "write abort")]
    #[test_case(SwdOp::DpWrite(0x04), 0xA9 ; "write ctrl stat")]
    #[test_case(SwdOp::DpWrite(0x08), 0xB1 ; "write select")]
    #[test_case(SwdOp::DpRead(0x0C), 0xBD ; "read rdbuff")]
    #[test_case(SwdOp::ApWrite(0x00), 0xA3 ; "write csw")]
    #[test_case(SwdOp::ApWrite(0x04), 0x8B ; "write tar")]
    #[test_case(SwdOp::ApRead(0x0C), 0x9F ; "read drw")]
    #[test_case(SwdOp::ApRead(0xFC), 0x9F ; "bank bits ignored")]
    fn known_headers(op: SwdOp, header: u8) {
        assert_eq!(op.header(), header);
    }

    #[test]
    fn header_parity_covers_apndp_rnw_a2_a3() {
        for ap in [false, true] {
            for read in [false, true] {
                for addr in [0x00, 0x04, 0x08, 0x0C] {
                    let header = SwdOp::new(ap, read, addr).header();
                    let bit = |n: u8| (header >> n) & 1;
                    assert_eq!(bit(0), 1, "start");
                    assert_eq!(bit(1), ap as u8, "APnDP");
                    assert_eq!(bit(2), read as u8, "RnW");
                    assert_eq!(bit(3), (addr >> 2) & 1, "A2");
                    assert_eq!(bit(4), (addr >> 3) & 1, "A3");
                    assert_eq!(bit(5), bit(1) ^ bit(2) ^ bit(3) ^ bit(4), "parity");
                    assert_eq!(bit(6), 0, "stop");
                    assert_eq!(bit(7), 1, "park");
                }
            }
        }
    }

    #[test_case(0x0000_0000, false)]
    #[test_case(0xFFFF_FFFF, false)]
    #[test_case(0xA5A5_A5A5, false)]
    #[test_case(0x0000_0001, true)]
    #[test_case(0x8000_0000, true)]
    #[test_case(0x1BA0_1477, false)]
    #[test_case(0x0000_0007, true)]
    fn parity_is_popcount_mod_2(value: u32, odd: bool) {
        assert_eq!(data_parity(value), odd);
        assert_eq!(data_parity(value), value.count_ones() % 2 == 1);
    }

    #[test]
    fn op_from_parts() {
        assert_eq!(SwdOp::new(true, true, 0x0C), SwdOp::ApRead(0x0C));
        assert!(SwdOp::new(true, false, 0x04).is_ap());
        assert!(!SwdOp::new(false, false, 0x04).is_read());
        assert_eq!(SwdOp::DpWrite(0x08).to_string(), "DP Write 0x08");
    }
}
