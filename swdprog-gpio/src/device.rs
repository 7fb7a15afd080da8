// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Linux GPIO character device [`BitChannel`]
//!
//! SWCLK is requested as an output, and SWDIO starts as an input with a
//! pull-up so an absent target reads as all 1s.  SWDIO direction changes
//! are done by reconfiguring the line request.

use std::thread;
use std::time::{Duration, Instant};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use gpiocdev::line::{Bias, Offset, Value};
use gpiocdev::request::{Config, Request};

use swdprog_core::{BitChannel, Level, Pin, PinMode, TransportError};

use crate::error::{LinuxGpioError, Result};

const CONSUMER: &str = "swdprog";

// Delays shorter than this are spun rather than slept, as the scheduler
// can't do better than tens of microseconds.
const SPIN_THRESHOLD: Duration = Duration::from_micros(50);

/// SWD clock speed setting.
///
/// These are targets.  Each pin change is a system call, so the achieved
/// rate on a Linux host is usually lower, particularly at [`Speed::Turbo`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Speed {
    /// Aims to be roughly 500kHz clock
    Slow,

    /// Aims to be roughly 1MHz clock
    #[default]
    Medium,

    /// Aims to be roughly 2MHz clock
    Fast,

    /// Aims to be roughly 4MHz clock
    Turbo,
}

impl Speed {
    /// Returns the **approximate** speed in kHz for this SWD speed setting.
    pub fn speed_khz(&self) -> u32 {
        match self {
            Speed::Slow => 500,
            Speed::Medium => 1000,
            Speed::Fast => 2000,
            Speed::Turbo => 4000,
        }
    }

    /// Half of the clock period, in nanoseconds.
    pub fn half_period_ns(&self) -> u64 {
        half_period_ns(self.speed_khz())
    }
}

fn half_period_ns(khz: u32) -> u64 {
    500_000 / khz as u64
}

/// Configuration for opening a [`LinuxGpioChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxGpioConfig {
    /// GPIO chip device path, e.g. "/dev/gpiochip0"
    pub device: String,

    /// SWDIO line offset on the chip
    pub swdio: Offset,

    /// SWCLK line offset on the chip
    pub swclk: Offset,

    /// Half-period delay in nanoseconds
    pub half_period_ns: u64,
}

impl LinuxGpioConfig {
    /// Creates a configuration for the given chip and lines, at the default
    /// [`Speed`].
    ///
    /// `device` is either a device path, or a bare chip number, which is
    /// expanded to `/dev/gpiochipN`.
    pub fn new(device: impl Into<String>, swdio: Offset, swclk: Offset) -> Self {
        Self {
            device: chip_path(device.into()),
            swdio,
            swclk,
            half_period_ns: Speed::default().half_period_ns(),
        }
    }

    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.half_period_ns = speed.half_period_ns();
        self
    }

    pub fn with_half_period_ns(mut self, ns: u64) -> Self {
        self.half_period_ns = ns;
        self
    }

    /// Sets an approximate clock rate in kHz.  0 leaves the rate unchanged.
    pub fn with_speed_khz(mut self, khz: u32) -> Self {
        if khz > 0 {
            self.half_period_ns = half_period_ns(khz);
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }
        if self.swdio == self.swclk {
            return Err(LinuxGpioError::InvalidParameter(format!(
                "SWDIO and SWCLK are both line {}",
                self.swdio
            )));
        }
        Ok(())
    }
}

fn chip_path(device: String) -> String {
    match device.parse::<u32>() {
        Ok(n) => format!("/dev/gpiochip{n}"),
        Err(_) => device,
    }
}

/// A [`BitChannel`] driving SWDIO and SWCLK through the Linux GPIO
/// character device.
pub struct LinuxGpioChannel {
    request: Request,
    swdio: Offset,
    swclk: Offset,
    half_period: Duration,
    swdio_mode: PinMode,
    swclk_level: Level,
}

impl LinuxGpioChannel {
    /// Requests the lines.  SWCLK starts low, SWDIO as a pulled-up input.
    pub fn open(config: &LinuxGpioConfig) -> Result<Self> {
        config.validate()?;
        debug!("Opening {} for SWD", config.device);

        let line_config = line_config(config.swdio, config.swclk, PinMode::Input, Level::Low);
        let request = Request::from_config(line_config)
            .on_chip(&config.device)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|source| LinuxGpioError::LineRequestFailed {
                path: config.device.clone(),
                source,
            })?;

        info!(
            "Opened {} (swdio={}, swclk={}, half period {}ns)",
            config.device, config.swdio, config.swclk, config.half_period_ns
        );

        Ok(Self {
            request,
            swdio: config.swdio,
            swclk: config.swclk,
            half_period: Duration::from_nanos(config.half_period_ns),
            swdio_mode: PinMode::Input,
            swclk_level: Level::Low,
        })
    }

    fn offset(&self, pin: Pin) -> Offset {
        match pin {
            Pin::Swdio => self.swdio,
            Pin::Swclk => self.swclk,
        }
    }
}

// Both lines are always in the request, so reconfiguring needs both.
fn line_config(swdio: Offset, swclk: Offset, swdio_mode: PinMode, swclk_level: Level) -> Config {
    let mut config = Config::default();
    config.with_line(swclk).as_output(to_value(swclk_level));
    match swdio_mode {
        PinMode::Output => {
            config.with_line(swdio).as_output(Value::Inactive);
        }
        PinMode::Input => {
            config.with_line(swdio).as_input().with_bias(Bias::PullUp);
        }
    }
    config
}

fn to_value(level: Level) -> Value {
    if level.is_high() {
        Value::Active
    } else {
        Value::Inactive
    }
}

fn pin_error(pin: Pin, e: gpiocdev::Error) -> TransportError {
    TransportError::new(pin, e.to_string())
}

impl BitChannel for LinuxGpioChannel {
    fn set_mode(&mut self, pin: Pin, mode: PinMode) -> std::result::Result<(), TransportError> {
        match pin {
            // Always an output
            Pin::Swclk => Ok(()),
            Pin::Swdio => {
                if self.swdio_mode == mode {
                    return Ok(());
                }

                let config = line_config(self.swdio, self.swclk, mode, self.swclk_level);
                self.request
                    .reconfigure(&config)
                    .map_err(|e| pin_error(pin, e))?;
                self.swdio_mode = mode;
                Ok(())
            }
        }
    }

    fn drive(&mut self, pin: Pin, level: Level) -> std::result::Result<(), TransportError> {
        self.request
            .set_value(self.offset(pin), to_value(level))
            .map_err(|e| pin_error(pin, e))?;
        if pin == Pin::Swclk {
            self.swclk_level = level;
        }
        Ok(())
    }

    fn read(&mut self, pin: Pin) -> std::result::Result<Level, TransportError> {
        let value = self
            .request
            .value(self.offset(pin))
            .map_err(|e| pin_error(pin, e))?;
        Ok(Level::from(value == Value::Active))
    }

    fn half_period_delay(&mut self) {
        if self.half_period.is_zero() {
            return;
        }

        if self.half_period >= SPIN_THRESHOLD {
            thread::sleep(self.half_period);
        } else {
            let start = Instant::now();
            while start.elapsed() < self.half_period {
                std::hint::spin_loop();
            }
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Speed::Slow, 1000 ; "slow")]
    #[test_case(Speed::Medium, 500 ; "medium")]
    #[test_case(Speed::Fast, 250 ; "fast")]
    #[test_case(Speed::Turbo, 125 ; "turbo")]
    fn speed_half_period(speed: Speed, ns: u64) {
        assert_eq!(speed.half_period_ns(), ns);
    }

    #[test_case("/dev/gpiochip4", "/dev/gpiochip4" ; "path")]
    #[test_case("0", "/dev/gpiochip0" ; "number")]
    #[test_case("gpiochip1", "gpiochip1" ; "name left alone")]
    fn device_path(device: &str, expected: &str) {
        let config = LinuxGpioConfig::new(device, 24, 25);
        assert_eq!(config.device, expected);
    }

    #[test]
    fn builder() {
        let config = LinuxGpioConfig::new("/dev/gpiochip0", 24, 25);
        assert_eq!(config.half_period_ns, 500);

        let config = config.with_speed(Speed::Slow);
        assert_eq!(config.half_period_ns, 1000);

        let config = config.with_speed_khz(100);
        assert_eq!(config.half_period_ns, 5000);

        let config = config.with_speed_khz(0).with_half_period_ns(42);
        assert_eq!(config.half_period_ns, 42);
    }

    #[test]
    fn same_line_rejected() {
        let config = LinuxGpioConfig::new("/dev/gpiochip0", 7, 7);
        assert!(matches!(
            LinuxGpioChannel::open(&config),
            Err(LinuxGpioError::InvalidParameter(_))
        ));
    }

    #[test]
    fn empty_device_rejected() {
        let config = LinuxGpioConfig::new("", 24, 25);
        assert!(matches!(
            LinuxGpioChannel::open(&config),
            Err(LinuxGpioError::NoDevice)
        ));
    }
}
