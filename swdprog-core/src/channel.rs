// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Physical bit channel abstraction
//!
//! The SWD wire codec only ever needs to do four things to the hardware:
//! switch SWDIO between input and output, drive a pin high or low, sample
//! SWDIO, and wait.  [`BitChannel`] captures exactly that, so the protocol
//! logic can run against GPIO pins on a Linux host, a different transport,
//! or a simulated target in a test.
//!
//! ```text
//!   SwdProtocol  --->  BitChannel  --->  SWDIO/SWCLK  ---> target
//! ```

use alloc::string::String;
use core::fmt;

/// The two SWD signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    /// Bidirectional data line
    Swdio,

    /// Clock, always driven by the host
    Swclk,
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Swdio => write!(f, "SWDIO"),
            Pin::Swclk => write!(f, "SWCLK"),
        }
    }
}

/// Direction of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Logic level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(value: Level) -> Self {
        value.is_high()
    }
}

/// A physical link failure - the pin driver could not do what was asked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failure on {pin}: {detail}")]
pub struct TransportError {
    pub pin: Pin,
    pub detail: String,
}

impl TransportError {
    pub fn new(pin: Pin, detail: impl Into<String>) -> Self {
        Self {
            pin,
            detail: detail.into(),
        }
    }
}

/// Capability required by the SWD wire codec.
///
/// Implementations own the two pins for the lifetime of a session.  SWCLK
/// is always an output; SWDIO changes direction at turnaround boundaries.
///
/// Half-period delays set the SWD clock rate, and are called twice per bit.
/// [`BitChannel::delay_ms()`] is only used for coarse waits, such as between
/// flash busy polls, so simulated channels are free to skip it.
pub trait BitChannel {
    /// Sets the direction of a pin.
    fn set_mode(&mut self, pin: Pin, mode: PinMode) -> Result<(), TransportError>;

    /// Drives an output pin to the given level.
    fn drive(&mut self, pin: Pin, level: Level) -> Result<(), TransportError>;

    /// Samples the current level of a pin.
    fn read(&mut self, pin: Pin) -> Result<Level, TransportError>;

    /// Waits for half of the configured SWD clock period.
    fn half_period_delay(&mut self);

    /// Waits for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

impl<T: BitChannel + ?Sized> BitChannel for &mut T {
    fn set_mode(&mut self, pin: Pin, mode: PinMode) -> Result<(), TransportError> {
        (**self).set_mode(pin, mode)
    }

    fn drive(&mut self, pin: Pin, level: Level) -> Result<(), TransportError> {
        (**self).drive(pin, level)
    }

    fn read(&mut self, pin: Pin) -> Result<Level, TransportError> {
        (**self).read(pin)
    }

    fn half_period_delay(&mut self) {
        (**self).half_period_delay()
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}
