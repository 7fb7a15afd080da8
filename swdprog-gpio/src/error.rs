// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Errors opening the GPIO lines

use thiserror::Error;

/// Failure to set up a [`crate::LinuxGpioChannel`].  Once open, pin
/// failures are reported as [`swdprog_core::TransportError`] instead.
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// No GPIO chip given
    #[error("no GPIO chip specified, use /dev/gpiochipN or a chip number")]
    NoDevice,

    /// Failed to request the SWDIO and SWCLK lines
    #[error("failed to request GPIO lines on '{path}': {source}")]
    LineRequestFailed {
        path: String,
        #[source]
        source: gpiocdev::Error,
    },

    /// Invalid pin or speed configuration
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for GPIO channel setup
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
