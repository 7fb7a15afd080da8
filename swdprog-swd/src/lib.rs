// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdprog-swd library
//!
//! Bit-banged ARM Serial Wire Debug (SWD), used to halt, resume and reset an
//! ARM Cortex-M target and to reflash an STM32F1-style part, from a host with
//! two spare GPIO pins.
//!
//! The following diagram shows the key `swdprog-swd` concepts.
//!
//! ```text
//!        recipe::flash_image()      |--  FlashError (phase + SwdError)
//! ----------------------------------
//!  DebugInterface (core + flash)    \
//! ----------------------------------  \
//!        SwdInterface                  |--  SwdError
//! ----------------------------------  /
//!        SwdProtocol                 /
//! ----------------------------------
//!   BitChannel (swdprog-core)   >=========<   SWD Target
//!                               SWDIO/SWCLK/GND
//! ```
//!
//! * [`recipe::flash_image()`] runs the complete halt, unlock, erase, write,
//!   verify and restart sequence.
//! * [`DebugInterface`] halts, resumes and resets the core, and erases and
//!   programs flash.
//! * [`SwdInterface`] performs individual Debug Port and Access Port register
//!   transactions, and memory mapped register access via the MEM-AP.
//! * [`SwdProtocol`] implements the SWD wire protocol through bit-banging a
//!   [`BitChannel`].
//!
//! None of the layers retry.  Any failure is returned to the caller
//! immediately, and [`SwdError::requires_reset()`] and
//! [`SwdError::requires_retry()`] can be used to decide what to do next.

pub mod debug;
pub mod flash;
pub mod interface;
pub mod protocol;
pub mod recipe;

#[doc(inline)]
pub use crate::debug::{CoreState, DebugInterface};
#[doc(inline)]
pub use crate::interface::{DebugPortState, SwdInterface};
#[doc(inline)]
pub use crate::protocol::{SwdOp, SwdProtocol};
#[doc(inline)]
pub use crate::recipe::{FlashError, FlashOptions, Phase};

#[doc(inline)]
pub use swdprog_core::{BitChannel, TransportError};

/// Core error type used by all swdprog-swd objects
///
/// Methods are provided to make it easier to handle errors, by checking if
/// either a retry or reset is required:
///
/// - [`SwdError::requires_retry()`]
/// - [`SwdError::requires_reset()`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwdError {
    /// The physical bit channel failed, for example a GPIO line request was
    /// revoked.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The target responded WAIT.  It is busy with a previous AP transaction.
    /// swdprog-swd doesn't retry, so it is up to the caller whether to try
    /// again.
    #[error("target responded WAIT")]
    WaitAck,

    /// The target responded FAULT.  A sticky error flag is set in the DP
    /// CTRL/STAT register and must be cleared via ABORT, for example by
    /// re-running [`SwdInterface::power_up()`].
    #[error("target responded FAULT")]
    FaultAck,

    /// No valid acknowledgement.  The raw 3 bits are included.  7 means
    /// SWDIO stayed high for the entire ACK phase: nothing is driving the
    /// line, because the target is disconnected, unpowered, or needs a line
    /// reset.
    #[error("no valid ACK from target (0b{0:03b})")]
    NoAck(u8),

    /// The parity bit of data read from the target did not match the data.
    /// The data can't be trusted.  Persistent parity errors usually mean
    /// noise on the SWD lines or too high a clock rate.
    #[error("parity error in data read from target")]
    ReadParity,

    /// A flash program operation was attempted before the flash controller
    /// was unlocked.
    #[error("flash is not unlocked for programming")]
    NotWritable,

    /// The flash controller stayed busy for the whole erase polling budget.
    #[error("timed out waiting for flash erase to complete")]
    EraseTimeout,

    /// The flash controller stayed busy after programming a halfword.
    #[error("timed out programming flash at 0x{addr:08X}")]
    ProgramTimeout { addr: u32 },

    /// The flash controller flagged a programming or write protection error.
    /// The raw FLASH_SR value is included.
    #[error("flash controller reported an error: FLASH_SR=0x{0:08X}")]
    FlashStatus(u32),

    /// The core was asked to change state, and every status poll succeeded,
    /// but none showed the requested state.
    #[error("core did not confirm it is {0}")]
    CoreStateUnconfirmed(CoreState),

    /// Data read back from flash differs from what was written.
    #[error(
        "verify failed at offset 0x{offset:X}: expected 0x{expected:02X}, read 0x{actual:02X}"
    )]
    VerifyMismatch {
        offset: usize,
        expected: u8,
        actual: u8,
    },

    /// The API was called incorrectly.
    #[error("invalid request: {0}")]
    Api(String),
}

impl SwdError {
    pub(crate) fn from_ack(ack: u8) -> Result<(), SwdError> {
        match ack {
            protocol::ACK_OK => Ok(()),
            protocol::ACK_WAIT => Err(SwdError::WaitAck),
            protocol::ACK_FAULT => Err(SwdError::FaultAck),
            _ => Err(SwdError::NoAck(ack)),
        }
    }

    /// Returns true if this is an acknowledgement failure: the target
    /// answered something other than OK.
    pub fn is_ack_fault(&self) -> bool {
        matches!(
            self,
            SwdError::WaitAck | SwdError::FaultAck | SwdError::NoAck(_)
        )
    }

    /// Returns true if the error requires the SWD link to be reset to
    /// recover.  In this case call [`DebugInterface::initialize()`].  If the
    /// error persists, the target may require a hard reset.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            SwdError::NoAck(_) | SwdError::FaultAck | SwdError::ReadParity
        )
    }

    /// Returns true if the error is a transient error that can be retried.
    pub fn requires_retry(&self) -> bool {
        matches!(self, SwdError::WaitAck)
    }

    /// Returns a short name for the error, suitable for summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwdError::Transport(_) => "Transport Error",
            SwdError::WaitAck => "Wait ACK",
            SwdError::FaultAck => "Fault ACK",
            SwdError::NoAck(_) => "No ACK",
            SwdError::ReadParity => "Read Parity Error",
            SwdError::NotWritable => "Flash Not Writable",
            SwdError::EraseTimeout => "Erase Timeout",
            SwdError::ProgramTimeout { .. } => "Program Timeout",
            SwdError::FlashStatus(_) => "Flash Status Error",
            SwdError::CoreStateUnconfirmed(_) => "Core State Unconfirmed",
            SwdError::VerifyMismatch { .. } => "Verify Mismatch",
            SwdError::Api(_) => "API Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swdprog_core::Pin;
    use test_case::test_case;

    #[test_case(0b001, None ; "ok")]
    #[test_case(0b010, Some(SwdError::WaitAck) ; "wait")]
    #[test_case(0b100, Some(SwdError::FaultAck) ; "fault")]
    #[test_case(0b111, Some(SwdError::NoAck(7)) ; "line floating high")]
    #[test_case(0b000, Some(SwdError::NoAck(0)) ; "line held low")]
    fn ack_decoding(ack: u8, expected: Option<SwdError>) {
        assert_eq!(SwdError::from_ack(ack).err(), expected);
    }

    #[test]
    fn classification() {
        assert!(SwdError::WaitAck.requires_retry());
        assert!(!SwdError::WaitAck.requires_reset());
        assert!(SwdError::FaultAck.requires_reset());
        assert!(SwdError::ReadParity.requires_reset());
        assert!(SwdError::NoAck(7).is_ack_fault());
        assert!(!SwdError::ReadParity.is_ack_fault());
        assert!(!SwdError::EraseTimeout.requires_reset());
    }

    #[test]
    fn transport_errors_convert() {
        let err: SwdError = TransportError::new(Pin::Swclk, "line released").into();
        assert_eq!(err.as_str(), "Transport Error");
        assert_eq!(
            err.to_string(),
            "transport failure on SWCLK: line released"
        );
    }
}
