// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdprog-core - Core protocol and MCU concepts used by swdprog.
//!
//! Designed to be used in conjunction with the `swdprog-swd` library for ARM
//! Serial Wire Debug (SWD) operations.  This crate holds the parts which are
//! not specific to the SWD wire protocol itself:
//!
//! * [`channel`] - the [`BitChannel`] capability the SWD wire codec is
//!   written against.  A physical implementation drives two GPIO pins, a
//!   simulated one models a target in memory.
//! * [`arm`] - strongly typed ARM Debug Port, MEM-AP and Cortex-M System
//!   Control Space registers.
//! * [`stm`] - the STM32F1-style flash controller registers.
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![no_std]

pub mod arm;
pub mod channel;
pub mod stm;

extern crate alloc;

#[doc(inline)]
pub use crate::channel::{BitChannel, Level, Pin, PinMode, TransportError};
