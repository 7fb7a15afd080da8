// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Flash programming against the simulated target

use pretty_assertions::assert_eq;

use swdprog_core::stm::FlashSr;
use swdprog_dummy::{DummyConfig, DummyTarget, FlashFault};
use swdprog_swd::flash::{ERASE_POLL_ATTEMPTS, ERASE_POLL_INTERVAL_MS};
use swdprog_swd::recipe::flash_image;
use swdprog_swd::{DebugInterface, FlashError, FlashOptions, Phase, SwdError};

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|ii| (ii * 7 + 3) as u8).collect()
}

fn unlocked(target: DummyTarget) -> DebugInterface<DummyTarget> {
    let mut debug = DebugInterface::from_channel(target);
    debug.initialize().unwrap();
    debug.halt().unwrap();
    debug.unlock_flash().unwrap();
    debug
}

#[test]
fn odd_length_image_split_into_halfwords() {
    let mut debug = unlocked(DummyTarget::default());
    debug.erase_all().unwrap();
    debug
        .write_flash(0, &[0x11, 0x22, 0x33, 0x44, 0x55])
        .unwrap();

    assert_eq!(
        debug.channel().halfword_writes(),
        &[(0, 0x2211), (2, 0x4433), (4, 0x0055)]
    );
    assert_eq!(
        &debug.channel().flash()[..6],
        &[0x11, 0x22, 0x33, 0x44, 0x55, 0x00]
    );
}

#[test]
fn write_at_offset() {
    let mut debug = unlocked(DummyTarget::default());
    debug.erase_all().unwrap();
    debug.write_flash(0x400, &[0xAA, 0xBB]).unwrap();

    assert_eq!(debug.channel().halfword_writes(), &[(0x400, 0xBBAA)]);
    assert_eq!(debug.read_word(0x400).unwrap(), [0xAA, 0xBB, 0xFF, 0xFF]);
}

#[test]
fn erase_completes_within_polls() {
    let mut target = DummyTarget::default();
    target.load_flash(0, &[0; 16]);
    target.set_erase_busy_reads(Some(2));
    let mut debug = unlocked(target);

    debug.erase_all().unwrap();
    assert_eq!(debug.channel().mass_erases(), 1);
    assert_eq!(debug.channel().slept_ms(), 2 * ERASE_POLL_INTERVAL_MS as u64);
    assert!(debug.read(0, 16).unwrap().iter().all(|&b| b == 0xFF));
}

#[test]
fn erase_timeout() {
    let mut target = DummyTarget::default();
    target.set_erase_busy_reads(None);
    let mut debug = unlocked(target);

    assert_eq!(debug.erase_all(), Err(SwdError::EraseTimeout));
    assert_eq!(
        debug.channel().slept_ms(),
        ((ERASE_POLL_ATTEMPTS - 1) * ERASE_POLL_INTERVAL_MS) as u64
    );
}

#[test]
fn write_protected_erase() {
    let mut target = DummyTarget::default();
    target.set_flash_fault(Some(FlashFault::WriteProtected));
    let mut debug = unlocked(target);

    assert_eq!(debug.erase_all(), Err(SwdError::FlashStatus(FlashSr::WRPRTERR)));
    assert!(!debug.channel().flash_sr().has_error());
}

#[test]
fn relocked_by_system_reset() {
    let mut debug = unlocked(DummyTarget::default());
    debug.system_reset_request().unwrap();

    assert!(!debug.is_unlocked());
    assert!(debug.channel().flash_locked());
    assert_eq!(debug.write_flash(0, &[1, 2]), Err(SwdError::NotWritable));
}

#[test]
fn flash_image_end_to_end() {
    let data = image(1000);
    let mut target = DummyTarget::default();
    target.load_flash(0, &[0; 2048]);
    let mut debug = DebugInterface::from_channel(target);

    flash_image(&mut debug, &data, &FlashOptions::default()).unwrap();

    let target = debug.channel();
    assert_eq!(&target.flash()[..1000], data.as_slice());
    assert!(target.flash()[1000..].iter().all(|&b| b == 0xFF));
    assert_eq!(target.halfword_writes().len(), 500);
    assert_eq!(target.mass_erases(), 1);
    assert_eq!(target.system_resets(), 1);
    assert!(!target.core_halted());
    assert!(target.flash_locked());
}

#[test]
fn flash_image_lock_after() {
    let mut debug = DebugInterface::from_channel(DummyTarget::default());
    let options = FlashOptions { lock_after: true };

    flash_image(&mut debug, &image(9), &options).unwrap();
    assert!(debug.channel().flash_locked());
    assert_eq!(debug.channel().halfword_writes().len(), 5);
}

#[test]
fn flash_image_empty_erases() {
    let mut target = DummyTarget::default();
    target.load_flash(0, &[0; 4]);
    let mut debug = DebugInterface::from_channel(target);

    flash_image(&mut debug, &[], &FlashOptions::default()).unwrap();
    assert_eq!(debug.channel().flash()[..4], [0xFF; 4]);
    assert!(debug.channel().halfword_writes().is_empty());
}

#[test]
fn erase_failure_prevents_writes() {
    let mut target = DummyTarget::default();
    target.set_erase_busy_reads(None);
    let mut debug = DebugInterface::from_channel(target);

    let err = flash_image(&mut debug, &image(64), &FlashOptions::default()).unwrap_err();
    assert_eq!(err, FlashError::new(Phase::Erase, SwdError::EraseTimeout));
    assert!(debug.channel().halfword_writes().is_empty());
    assert_eq!(debug.channel().system_resets(), 0);
}

#[test]
fn halt_failure_stops_early() {
    let mut target = DummyTarget::default();
    target.set_core_stale_reads(None);
    let mut debug = DebugInterface::from_channel(target);

    let err = flash_image(&mut debug, &image(64), &FlashOptions::default()).unwrap_err();
    assert_eq!(err.phase, Phase::Halt);
    assert!(debug.channel().flash_locked());
    assert_eq!(debug.channel().mass_erases(), 0);
}

#[test]
fn no_target_fails_init() {
    let mut target = DummyTarget::default();
    target.set_connected(false);
    let mut debug = DebugInterface::from_channel(target);

    let err = flash_image(&mut debug, &image(4), &FlashOptions::default()).unwrap_err();
    assert_eq!(err.phase, Phase::Init);
    assert_eq!(err.source, SwdError::NoAck(0b111));
}

#[test]
fn image_larger_than_flash() {
    let target = DummyTarget::new(DummyConfig {
        flash_size: 1024,
        ..Default::default()
    });
    let mut debug = DebugInterface::from_channel(target);

    let err = flash_image(&mut debug, &image(1026), &FlashOptions::default()).unwrap_err();
    assert_eq!(err.phase, Phase::Write);
    // EOP is still set from the erase and the halfwords that fitted
    assert_eq!(
        err.source,
        SwdError::FlashStatus(FlashSr::PGERR | FlashSr::EOP)
    );
}
