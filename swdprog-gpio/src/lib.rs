// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdprog-gpio - SWD over Linux GPIO
//!
//! Provides [`LinuxGpioChannel`], a [`swdprog_core::BitChannel`] that
//! bit-bangs SWDIO and SWCLK on two GPIO lines via the Linux character
//! device interface, using the `gpiocdev` crate.
//!
//! ```no_run
//! use swdprog_gpio::{LinuxGpioChannel, LinuxGpioConfig, Speed};
//! use swdprog_swd::DebugInterface;
//!
//! let config = LinuxGpioConfig::new("/dev/gpiochip0", 24, 25).with_speed(Speed::Slow);
//! //                                 device           SWDIO SWCLK
//! let channel = LinuxGpioChannel::open(&config)?;
//! let mut debug = DebugInterface::from_channel(channel);
//! let idcode = debug.initialize()?;
//! println!("IDCODE {idcode}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Wiring
//!
//! | Target | Host                        |
//! |--------|-----------------------------|
//! | SWDIO  | `swdio` line                |
//! | SWCLK  | `swclk` line                |
//! | GND    | GND                         |
//!
//! The target must be powered separately, or from the host's 3.3V rail.
//! Access to `/dev/gpiochipN` may need root or a udev rule.

pub mod device;
pub mod error;

pub use device::{LinuxGpioChannel, LinuxGpioConfig, Speed};
pub use error::{LinuxGpioError, Result};
