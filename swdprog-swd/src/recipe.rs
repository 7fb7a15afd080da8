// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Complete flash programming sequence
//!
//! [`flash_image()`] connects to the target, halts it, erases and programs
//! flash with an image, verifies it, and restarts the target.  The first
//! failure aborts the sequence.  Nothing is rolled back, so a failed write
//! or verify leaves flash partially programmed.

use core::fmt;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::BitChannel;

use crate::SwdError;
use crate::debug::DebugInterface;

/// Steps of [`flash_image()`], in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Halt,
    Unlock,
    Erase,
    Write,
    Verify,
    Lock,
    Resume,
    Reset,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Halt => "halt",
            Phase::Unlock => "unlock",
            Phase::Erase => "erase",
            Phase::Write => "write",
            Phase::Verify => "verify",
            Phase::Lock => "lock",
            Phase::Resume => "resume",
            Phase::Reset => "reset",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A [`flash_image()`] failure: which phase failed and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{phase} failed: {source}")]
pub struct FlashError {
    pub phase: Phase,
    pub source: SwdError,
}

impl FlashError {
    pub fn new(phase: Phase, source: SwdError) -> Self {
        Self { phase, source }
    }
}

/// Options for [`flash_image()`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashOptions {
    /// Lock the flash controller again after verifying.  The reset at the
    /// end of the sequence locks it anyway, so this only matters if that
    /// reset doesn't happen.
    pub lock_after: bool,
}

/// Programs `image` into the target's flash at offset 0.
///
/// The sequence is: initialize, halt, unlock, erase all, write, read back
/// and compare, (optionally) lock, release the core, system reset.
///
/// Arguments:
/// - `debug`: The debug interface for the target.  It doesn't need to have
///   been initialized.
/// - `image`: The bytes to program.  An empty image erases flash.
/// - `options`: See [`FlashOptions`].
///
/// Returns:
/// - `Ok(())`: if the image was programmed, verified and the target
///   restarted.
/// - `Err(FlashError)`: identifying the phase that failed and the cause.
pub fn flash_image<C: BitChannel>(
    debug: &mut DebugInterface<C>,
    image: &[u8],
    options: &FlashOptions,
) -> Result<(), FlashError> {
    info!("Flashing {} byte image", image.len());

    let idcode = run(Phase::Init, debug.initialize())?;
    debug!("Target IDCODE {idcode}");

    run(Phase::Halt, debug.halt())?;
    run(Phase::Unlock, debug.unlock_flash())?;
    run(Phase::Erase, debug.erase_all())?;

    info!("Writing image");
    run(Phase::Write, debug.write_flash(0, image))?;

    info!("Verifying image");
    let readback = run(Phase::Verify, debug.read(0, image.len()))?;
    run(Phase::Verify, verify(image, &readback))?;

    if options.lock_after {
        run(Phase::Lock, debug.lock_flash())?;
    }

    run(Phase::Resume, debug.run_after_reset())?;
    run(Phase::Reset, debug.system_reset_request())?;

    info!("Flashed and verified {} bytes", image.len());
    Ok(())
}

/// Compares the image with the start of `readback`, which may be longer.
///
/// Returns:
/// - `Ok(())`: if every image byte matches.
/// - `Err(SwdError::VerifyMismatch)`: at the first byte that differs, or
///   that is missing from `readback`.
pub fn verify(image: &[u8], readback: &[u8]) -> Result<(), SwdError> {
    for (offset, &expected) in image.iter().enumerate() {
        let actual = match readback.get(offset) {
            Some(&actual) => actual,
            None => {
                return Err(SwdError::Api(format!(
                    "only {} bytes read back, expected {}",
                    readback.len(),
                    image.len()
                )));
            }
        };

        if actual != expected {
            warn!("Verify mismatch at 0x{offset:X}: 0x{expected:02X} != 0x{actual:02X}");
            return Err(SwdError::VerifyMismatch {
                offset,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

fn run<T>(phase: Phase, result: Result<T, SwdError>) -> Result<T, FlashError> {
    result.map_err(|e| {
        error!("Error: {phase} phase failed: {e}");
        FlashError::new(phase, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_ignores_word_padding() {
        assert_eq!(verify(&[1, 2, 3], &[1, 2, 3, 0xFF]), Ok(()));
        assert_eq!(verify(&[], &[]), Ok(()));
    }

    #[test]
    fn verify_reports_first_difference() {
        assert_eq!(
            verify(&[1, 2, 3, 4], &[1, 2, 9, 8]),
            Err(SwdError::VerifyMismatch {
                offset: 2,
                expected: 3,
                actual: 9,
            })
        );
    }

    #[test]
    fn verify_short_readback() {
        assert!(matches!(verify(&[1, 2], &[1]), Err(SwdError::Api(_))));
    }

    #[test]
    fn error_display_names_phase() {
        let err = FlashError::new(Phase::Erase, SwdError::EraseTimeout);
        assert_eq!(
            err.to_string(),
            "erase failed: timed out waiting for flash erase to complete"
        );
        assert_eq!(err.phase.as_str(), "erase");
    }
}
