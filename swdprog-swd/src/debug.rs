// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD Debug Interface
//!
//! This module implements the high-level [`DebugInterface`], used to halt,
//! resume and reset an ARM Cortex-M core.  The flash operations are in
//! [`crate::flash`].
//!
//! If this module does not give you the control you need, use the
//! underlying [`SwdInterface`] via [`DebugInterface::swd_if()`].
//!
//! Core state changes are requested by writing DHCSR and confirmed by
//! polling S_HALT at most [`CORE_POLL_ATTEMPTS`] times.  There is no delay
//! between polls - the SWD transactions themselves take long enough for a
//! Cortex-M3 to react.

use core::fmt;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::BitChannel;
use swdprog_core::arm::Cortex;
use swdprog_core::arm::dp::IdCode;
use swdprog_core::arm::scs::{Aircr, Demcr, Dhcsr};

use crate::SwdError;
use crate::flash::FlashState;
use crate::interface::SwdInterface;

/// Number of DHCSR reads made after requesting a core state change.
pub const CORE_POLL_ATTEMPTS: u32 = 3;

/// Core execution state, as requested of and reported by DHCSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Halted,
    Running,
}

impl CoreState {
    fn matches(&self, dhcsr: Dhcsr) -> bool {
        match self {
            CoreState::Halted => dhcsr.is_halted(),
            CoreState::Running => !dhcsr.is_halted(),
        }
    }
}

impl fmt::Display for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreState::Halted => write!(f, "halted"),
            CoreState::Running => write!(f, "running"),
        }
    }
}

/// ARM Debug Interface object
///
/// Owns an [`SwdInterface`] and the flash unlock state for one session.
///
/// ```rust
/// use swdprog_swd::DebugInterface;
/// use swdprog_dummy::DummyTarget;
///
/// let mut debug = DebugInterface::from_channel(DummyTarget::default());
/// debug.initialize().unwrap();
/// debug.halt().unwrap();
/// let data = debug.read(0, 16).unwrap();
/// debug.resume().unwrap();
/// ```
#[derive(Debug)]
pub struct DebugInterface<C> {
    pub(crate) swd: SwdInterface<C>,
    pub(crate) flash: FlashState,
}

impl<C: BitChannel> DebugInterface<C> {
    /// Creates a new `DebugInterface` with the given [`SwdInterface`].
    pub fn new(swd: SwdInterface<C>) -> Self {
        Self {
            swd,
            flash: FlashState::default(),
        }
    }

    /// Creates a new `DebugInterface` directly from a [`BitChannel`].
    pub fn from_channel(channel: C) -> Self {
        Self::new(SwdInterface::from_channel(channel))
    }

    /// Returns a mutable reference to the underlying [`SwdInterface`], for
    /// lower-level access.
    pub fn swd_if(&mut self) -> &mut SwdInterface<C> {
        &mut self.swd
    }

    pub fn channel(&self) -> &C {
        self.swd.channel()
    }

    pub fn channel_mut(&mut self) -> &mut C {
        self.swd.channel_mut()
    }

    pub fn into_inner(self) -> C {
        self.swd.into_inner()
    }

    /// Connects to the target: line reset, JTAG-to-SWD, then debug power up
    /// and MEM-AP configuration.  Any previous flash unlock is forgotten.
    ///
    /// Returns:
    /// - `Ok(IdCode)`: the target's IDCODE.
    /// - `Err(SwdError)`: if the target didn't respond correctly.
    pub fn initialize(&mut self) -> Result<IdCode, SwdError> {
        self.flash = FlashState::default();
        self.swd.reset_line()?;
        let idcode = self.swd.power_up()?;

        match Cortex::from_idcode(idcode) {
            Some(core) => info!("Connected to {core}, IDCODE {idcode}"),
            None => info!("Connected to unknown core, IDCODE {idcode}"),
        }

        Ok(idcode)
    }

    /// Reads DHCSR.
    pub fn read_dhcsr(&mut self) -> Result<Dhcsr, SwdError> {
        self.swd.read_mem_register::<Dhcsr>()
    }

    /// Halts the core.
    ///
    /// Returns:
    /// - `Ok(())`: once DHCSR reports the core halted.
    /// - `Err(SwdError::CoreStateUnconfirmed)`: if it didn't within
    ///   [`CORE_POLL_ATTEMPTS`] polls.
    /// - `Err(SwdError)`: if the DHCSR write failed, or the last poll failed.
    pub fn halt(&mut self) -> Result<(), SwdError> {
        debug!("Halting core");
        self.swd.write_mem_register(Dhcsr::halt_request())?;
        self.poll_core_state(CoreState::Halted)
    }

    /// Resumes the core with debug still enabled, so it can be halted again
    /// later.
    pub fn resume(&mut self) -> Result<(), SwdError> {
        debug!("Resuming core");
        self.swd.write_mem_register(Dhcsr::continue_request())?;
        self.poll_core_state(CoreState::Running)
    }

    /// Releases the core from debug entirely (C_DEBUGEN cleared), so it runs
    /// normally, including after the next reset.
    pub fn run_after_reset(&mut self) -> Result<(), SwdError> {
        debug!("Releasing core from debug");
        self.swd.write_mem_register(Dhcsr::with_key())?;
        self.poll_core_state(CoreState::Running)
    }

    /// Puts the debug registers back to their reset state, then resets the
    /// whole MCU.
    pub fn reset_registers(&mut self) -> Result<(), SwdError> {
        debug!("Resetting debug registers");
        self.swd.write_mem_register(Dhcsr::with_key())?;
        self.swd.write_mem_register(Demcr::default())?;
        self.system_reset_request()
    }

    /// Requests a system reset via AIRCR.  The target resets immediately,
    /// and the flash controller comes back locked.
    pub fn system_reset_request(&mut self) -> Result<(), SwdError> {
        debug!("Requesting system reset");
        self.swd
            .write_mem_register(Aircr::system_reset_request())?;
        self.flash = FlashState::default();
        Ok(())
    }

    // Polls DHCSR until the core reports `wanted`.  A failed read doesn't end
    // the loop, but if the budget runs out the last failure is returned.
    fn poll_core_state(&mut self, wanted: CoreState) -> Result<(), SwdError> {
        let mut last_err = None;

        for attempt in 1..=CORE_POLL_ATTEMPTS {
            match self.read_dhcsr() {
                Ok(dhcsr) => {
                    trace!("Info:  DHCSR {dhcsr} poll {attempt}");
                    if wanted.matches(dhcsr) {
                        debug!("Core {wanted} after {attempt} poll(s)");
                        return Ok(());
                    }
                    last_err = None;
                }
                Err(e) => {
                    debug!("Error: DHCSR read failed on poll {attempt}: {e}");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => {
                warn!("Core not {wanted} after {CORE_POLL_ATTEMPTS} polls");
                Err(SwdError::CoreStateUnconfirmed(wanted))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use swdprog_dummy::DummyTarget;
    use test_case::test_case;

    fn connected(target: DummyTarget) -> DebugInterface<DummyTarget> {
        let mut debug = DebugInterface::from_channel(target);
        debug.initialize().unwrap();
        debug
    }

    #[test]
    fn halt_resume_release() {
        let mut debug = connected(DummyTarget::default());

        debug.halt().unwrap();
        assert!(debug.channel().core_halted());
        assert!(debug.read_dhcsr().unwrap().is_halted());

        debug.resume().unwrap();
        assert!(!debug.channel().core_halted());
        assert!(debug.read_dhcsr().unwrap().c_debugen());

        debug.halt().unwrap();
        debug.run_after_reset().unwrap();
        assert!(!debug.channel().core_halted());
        assert!(!debug.read_dhcsr().unwrap().c_debugen());
    }

    #[test]
    fn halt_confirmed_on_last_poll() {
        let mut target = DummyTarget::default();
        target.set_core_stale_reads(Some(CORE_POLL_ATTEMPTS - 1));
        let mut debug = connected(target);

        debug.halt().unwrap();
        assert_eq!(debug.channel().dhcsr_reads(), CORE_POLL_ATTEMPTS as usize);
    }

    #[test_case(DebugInterface::resume ; "resume")]
    #[test_case(DebugInterface::run_after_reset ; "run after reset")]
    fn running_confirmed_on_last_poll(
        release: fn(&mut DebugInterface<DummyTarget>) -> Result<(), SwdError>,
    ) {
        let mut target = DummyTarget::default();
        target.set_core_stale_reads(Some(CORE_POLL_ATTEMPTS - 1));
        let mut debug = connected(target);
        debug.halt().unwrap();
        let reads = debug.channel().dhcsr_reads();

        release(&mut debug).unwrap();
        assert!(!debug.channel().core_halted());
        assert_eq!(
            debug.channel().dhcsr_reads() - reads,
            CORE_POLL_ATTEMPTS as usize
        );
    }

    #[test]
    fn halt_unconfirmed_when_core_never_halts() {
        let mut target = DummyTarget::default();
        target.set_core_stale_reads(None);
        let mut debug = connected(target);

        assert_eq!(
            debug.halt(),
            Err(SwdError::CoreStateUnconfirmed(CoreState::Halted))
        );
        assert_eq!(debug.channel().dhcsr_reads(), CORE_POLL_ATTEMPTS as usize);
    }

    #[test]
    fn system_reset_request_resets_target() {
        let mut debug = connected(DummyTarget::default());
        debug.reset_registers().unwrap();
        assert_eq!(debug.channel().system_resets(), 1);
        assert_eq!(debug.channel().demcr(), 0);
    }
}
