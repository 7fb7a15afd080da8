// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! DP/AP transactions against the simulated target

use pretty_assertions::assert_eq;
use test_case::test_case;

use swdprog_core::Pin;
use swdprog_core::arm::dp::CtrlStat;
use swdprog_core::arm::map::Csw;
use swdprog_dummy::{DummyConfig, DummyTarget};
use swdprog_swd::protocol::{ACK_FAULT, ACK_OK, ACK_WAIT};
use swdprog_swd::{DebugInterface, SwdError, SwdInterface, SwdProtocol};

const RAM: u32 = 0x2000_0000;

fn powered(target: DummyTarget) -> SwdInterface<DummyTarget> {
    let mut swd_if = SwdInterface::from_channel(target);
    swd_if.reset_line().unwrap();
    swd_if.power_up().unwrap();
    swd_if
}

#[test]
fn idcode_from_config() {
    let target = DummyTarget::new(DummyConfig {
        idcode: 0x0BC1_2477,
        ..Default::default()
    });
    let mut protocol = SwdProtocol::new(target);
    protocol.reset().unwrap();
    assert_eq!(protocol.read(false, 0x00).unwrap(), 0x0BC1_2477);
}

#[test]
fn no_response_without_line_reset() {
    let mut protocol = SwdProtocol::new(DummyTarget::default());
    assert_eq!(protocol.read(false, 0x00), Err(SwdError::NoAck(0b111)));
}

#[test]
fn disconnected_target() {
    let mut target = DummyTarget::default();
    target.set_connected(false);
    let mut debug = DebugInterface::from_channel(target);

    let err = debug.initialize().unwrap_err();
    assert_eq!(err, SwdError::NoAck(0b111));
    assert!(err.requires_reset());
}

#[test]
fn transport_failure_propagates() {
    let mut target = DummyTarget::default();
    target.fail_pin(Some(Pin::Swclk));
    let mut protocol = SwdProtocol::new(target);

    assert!(matches!(protocol.reset(), Err(SwdError::Transport(e)) if e.pin == Pin::Swclk));
}

#[test]
fn read_parity_error() {
    let mut target = DummyTarget::default();
    target.corrupt_read_parity(1);
    let mut protocol = SwdProtocol::new(target);
    protocol.reset().unwrap();

    let err = protocol.read(false, 0x00).unwrap_err();
    assert_eq!(err, SwdError::ReadParity);
    assert!(err.requires_reset());

    // The link is still in step, so the next read works
    assert_eq!(protocol.read(false, 0x00).unwrap(), 0x1BA0_1477);
}

#[test_case(0x0000_0000 ; "all zeros")]
#[test_case(0xFFFF_FFFF ; "all ones")]
#[test_case(0xA5A5_A5A5 ; "alternating")]
fn ap_register_round_trip(value: u32) {
    let mut swd_if = powered(DummyTarget::default());
    swd_if.write_ap_raw(0x04, value).unwrap();
    assert_eq!(swd_if.read_ap_raw(0x04).unwrap(), value);
}

#[test_case(0x0000_0000 ; "all zeros")]
#[test_case(0xFFFF_FFFF ; "all ones")]
#[test_case(0xA5A5_A5A5 ; "alternating")]
fn memory_round_trip(value: u32) {
    let mut swd_if = powered(DummyTarget::default());
    swd_if.write_register(RAM + 0x40, value).unwrap();
    assert_eq!(swd_if.read_register(RAM + 0x40).unwrap(), value);
    assert_eq!(swd_if.channel().ram_word(RAM + 0x40), value);
}

#[test]
fn dp_ctrl_stat_round_trip() {
    let mut swd_if = powered(DummyTarget::default());
    let ctrl_stat = swd_if.read_ctrl_stat().unwrap();
    assert!(ctrl_stat.is_powered());
    assert!(!ctrl_stat.has_sticky_error());
}

#[test]
fn bank_0_accesses_reuse_select() {
    let mut swd_if = powered(DummyTarget::default());
    let before = swd_if.channel().select_writes();

    for ii in 0..4 {
        swd_if.write_register(RAM + ii * 4, ii).unwrap();
    }
    for ii in 0..4 {
        assert_eq!(swd_if.read_register(RAM + ii * 4).unwrap(), ii);
    }

    assert_eq!(swd_if.channel().select_writes(), before);
}

#[test]
fn idr_bank_then_back() {
    let mut swd_if = powered(DummyTarget::default());
    let before = swd_if.channel().select_writes();

    swd_if.read_ap_idr().unwrap();
    swd_if.read_register(RAM).unwrap();
    swd_if.read_ap_idr().unwrap();

    assert_eq!(swd_if.channel().select_writes(), before + 3);
}

#[test]
fn wait_ack_not_retried() {
    let mut swd_if = powered(DummyTarget::default());
    let requests = swd_if.channel().requests();
    swd_if.channel_mut().force_acks([ACK_WAIT]);

    let err = swd_if.read_ap_raw(0x04).unwrap_err();
    assert_eq!(err, SwdError::WaitAck);
    assert!(err.is_ack_fault());
    assert!(err.requires_retry());
    assert_eq!(swd_if.channel().requests(), requests + 1);

    // Caller's retry succeeds
    swd_if.read_ap_raw(0x04).unwrap();
}

#[test]
fn fault_ack_on_write() {
    let mut swd_if = powered(DummyTarget::default());
    swd_if.channel_mut().force_acks([ACK_FAULT]);

    let err = swd_if.write_ap_raw(0x04, RAM).unwrap_err();
    assert_eq!(err, SwdError::FaultAck);
    assert!(err.requires_reset());
    assert_eq!(swd_if.channel().tar(), 0);
}

// A halfword write is TAR, CSW read (AP + RDBUFF), CSW write, DRW, then the
// CSW read-modify-write back to 32-bit.
#[test_case(4 ; "wait on drw write")]
#[test_case(5 ; "wait on csw restore")]
fn failed_halfword_write_restores_word_access(ok_before_wait: usize) {
    let mut swd_if = powered(DummyTarget::default());
    let mut acks = vec![ACK_OK; ok_before_wait];
    acks.push(ACK_WAIT);
    swd_if.channel_mut().force_acks(acks);

    let err = swd_if.write_register_half(RAM, 0xBEEF).unwrap_err();
    assert_eq!(err, SwdError::WaitAck);
    assert!(err.requires_retry());

    swd_if.write_register(RAM + 0x10, 0x1122_3344).unwrap();
    assert_eq!(swd_if.channel().csw().size(), Csw::SIZE_32BIT);
    assert_eq!(swd_if.read_register(RAM + 0x10), Ok(0x1122_3344));
}

#[test]
fn sticky_error_faults_until_cleared() {
    let mut swd_if = powered(DummyTarget::default());
    swd_if.channel_mut().set_sticky_error(CtrlStat::STICKYERR);

    assert_eq!(swd_if.read_register(RAM), Err(SwdError::FaultAck));
    assert!(swd_if.read_ctrl_stat().unwrap().has_sticky_error());

    swd_if.power_up().unwrap();
    assert_eq!(swd_if.read_register(RAM), Ok(0));
}

#[test]
fn unpowered_ap_faults() {
    let mut swd_if = SwdInterface::from_channel(DummyTarget::default());
    swd_if.reset_line().unwrap();
    swd_if.select_bank(0, 0).unwrap();
    assert_eq!(swd_if.read_ap_raw(0x00), Err(SwdError::FaultAck));
}
