// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SW-DP and MEM-AP model

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::arm::ap::IdrRegister;
use swdprog_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCodeRegister, RdBuffRegister, Select,
    SelectRegister,
};
use swdprog_core::arm::map::{Csw, CswRegister, DrwRegister, TarRegister};
use swdprog_core::arm::register::RegisterDescriptor;

use crate::DummyConfig;
use crate::system::Bus;

// CSW value out of reset: 32-bit, no increment, DEVICE_EN, and the
// HPROT/MasterType bits a Cortex-M3 AHB-AP reports.
pub(crate) const CSW_RESET: u32 = 0x2300_0052;

// DEVICE_EN and TrInProg are read-only.  DEVICE_EN is always set.
const CSW_READ_ONLY: u32 = 0xC0;
const CSW_DEVICE_EN: u32 = 0x40;

const CTRL_STAT_REQ_MASK: u32 =
    CtrlStat::CDBGPWRUPREQ | CtrlStat::CSYSPWRUPREQ | CtrlStat::CDBGRSTREQ;
const STICKY_ERRORS: u32 = CtrlStat::STICKYERR | CtrlStat::WDATAERR | CtrlStat::STICKYORUN;

// ROM table pointer reported in the MEM-AP BASE register
const AP_BASE: u32 = 0xE00F_F003;
const AP_BASE_ADDRESS: u8 = 0xF8;

#[derive(Debug, Clone)]
pub(crate) struct Dap {
    idcode: u32,
    ap_idr: u32,
    ctrl_req: u32,
    pub sticky: u32,
    pub select: Select,
    rdbuff: u32,
    pub csw: u32,
    pub tar: u32,
    pub select_writes: usize,
    pub abort_writes: usize,
}

impl Dap {
    pub fn new(config: &DummyConfig) -> Self {
        Self {
            idcode: config.idcode,
            ap_idr: config.ap_idr,
            ctrl_req: 0,
            sticky: 0,
            select: Select::new(),
            rdbuff: 0,
            csw: CSW_RESET,
            tar: 0,
            select_writes: 0,
            abort_writes: 0,
        }
    }

    pub fn ctrl_stat(&self) -> CtrlStat {
        let mut value = self.ctrl_req | self.sticky;
        if self.ctrl_req & CtrlStat::CDBGPWRUPREQ != 0 {
            value |= CtrlStat::CDBGPWRUPACK;
        }
        if self.ctrl_req & CtrlStat::CSYSPWRUPREQ != 0 {
            value |= CtrlStat::CSYSPWRUPACK;
        }
        if self.ctrl_req & CtrlStat::CDBGRSTREQ != 0 {
            value |= CtrlStat::CDBGRSTACK;
        }
        CtrlStat::from(value)
    }

    /// Whether an AP access would be refused with FAULT.
    pub fn ap_faults(&self) -> bool {
        !self.ctrl_stat().is_powered() || self.sticky & STICKY_ERRORS != 0
    }

    pub fn set_sticky(&mut self, flag: u32) {
        self.sticky |= flag;
    }

    pub fn read_dp(&mut self, addr: u8) -> u32 {
        match addr {
            IdCodeRegister::ADDRESS => self.idcode,
            CtrlStatRegister::ADDRESS => self.ctrl_stat().value(),
            // RESEND
            SelectRegister::ADDRESS => self.rdbuff,
            RdBuffRegister::ADDRESS => self.rdbuff,
            _ => 0,
        }
    }

    pub fn write_dp(&mut self, addr: u8, value: u32) {
        match addr {
            AbortRegister::ADDRESS => {
                self.abort_writes += 1;
                let mut clear = 0;
                if value & Abort::STKCMPCLR != 0 {
                    clear |= CtrlStat::STICKYCMP;
                }
                if value & Abort::STKERRCLR != 0 {
                    clear |= CtrlStat::STICKYERR;
                }
                if value & Abort::WDERRCLR != 0 {
                    clear |= CtrlStat::WDATAERR;
                }
                if value & Abort::ORUNERRCLR != 0 {
                    clear |= CtrlStat::STICKYORUN;
                }
                self.sticky &= !clear;
            }
            CtrlStatRegister::ADDRESS => self.ctrl_req = value & CTRL_STAT_REQ_MASK,
            SelectRegister::ADDRESS => {
                self.select_writes += 1;
                self.select = Select::from(value);
            }
            _ => debug!("Write to read-only DP register 0x{addr:02X} ignored"),
        }
    }

    // Full AP register address: bank from SELECT, A[3:2] from the request.
    fn ap_address(&self, addr: u8) -> u8 {
        self.select.apbanksel() | (addr & 0x0C)
    }

    /// Performs a posted AP read, returning the result of the previous one.
    pub fn read_ap(&mut self, addr: u8, bus: &mut Bus) -> u32 {
        let value = if self.select.apsel() != 0 {
            0
        } else {
            match self.ap_address(addr) {
                CswRegister::ADDRESS => self.csw,
                TarRegister::ADDRESS => self.tar,
                DrwRegister::ADDRESS => self.read_drw(bus),
                AP_BASE_ADDRESS => AP_BASE,
                IdrRegister::ADDRESS => self.ap_idr,
                _ => 0,
            }
        };
        core::mem::replace(&mut self.rdbuff, value)
    }

    pub fn write_ap(&mut self, addr: u8, value: u32, bus: &mut Bus) {
        if self.select.apsel() != 0 {
            debug!("Write to absent AP {} ignored", self.select.apsel());
            return;
        }

        match self.ap_address(addr) {
            CswRegister::ADDRESS => {
                self.csw = (value & !CSW_READ_ONLY) | CSW_DEVICE_EN;
            }
            TarRegister::ADDRESS => self.tar = value,
            DrwRegister::ADDRESS => self.write_drw(value, bus),
            other => debug!("Write to AP register 0x{other:02X} ignored"),
        }
    }

    fn transfer_size(&self) -> u32 {
        match Csw::from(self.csw).size() {
            Csw::SIZE_8BIT => 1,
            Csw::SIZE_16BIT => 2,
            _ => 4,
        }
    }

    fn advance_tar(&mut self) {
        if Csw::from(self.csw).addrinc() == Csw::ADDRINC_SINGLE {
            self.tar = self.tar.wrapping_add(self.transfer_size());
        }
    }

    // Narrow reads return the whole word; the host picks out its lane.
    fn read_drw(&mut self, bus: &mut Bus) -> u32 {
        let value = bus.read_word(self.tar);
        trace!("MEM-AP read 0x{:08X} -> 0x{value:08X}", self.tar);
        self.advance_tar();
        value
    }

    fn write_drw(&mut self, value: u32, bus: &mut Bus) {
        let addr = self.tar;
        let lane = (addr & 0x3) * 8;
        trace!("MEM-AP write 0x{addr:08X} <- 0x{value:08X}");

        match self.transfer_size() {
            1 => bus.write_byte(addr, (value >> lane) as u8),
            2 => bus.write_halfword(addr, (value >> (lane & 0x10)) as u16),
            _ => bus.write_word(addr, value),
        }
        self.advance_tar();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn powered() -> (Dap, Bus) {
        let config = DummyConfig::default();
        let mut dap = Dap::new(&config);
        dap.write_dp(CtrlStatRegister::ADDRESS, CtrlStat::power_up_request().value());
        (dap, Bus::new(&config))
    }

    #[test]
    fn power_up_acknowledged() {
        let config = DummyConfig::default();
        let mut dap = Dap::new(&config);
        assert!(dap.ap_faults());
        dap.write_dp(CtrlStatRegister::ADDRESS, CtrlStat::power_up_request().value());
        assert!(dap.ctrl_stat().is_powered());
        assert!(!dap.ap_faults());
    }

    #[test]
    fn abort_clears_sticky() {
        let (mut dap, _) = powered();
        dap.set_sticky(CtrlStat::STICKYERR | CtrlStat::WDATAERR);
        assert!(dap.ap_faults());

        dap.write_dp(AbortRegister::ADDRESS, Abort::WDERRCLR);
        assert!(dap.ap_faults());
        dap.write_dp(AbortRegister::ADDRESS, Abort::ALL);
        assert!(!dap.ap_faults());
        assert_eq!(dap.abort_writes, 2);
    }

    #[test]
    fn ap_reads_are_posted() {
        let (mut dap, mut bus) = powered();
        dap.write_dp(SelectRegister::ADDRESS, 0xF0);
        assert_eq!(dap.read_ap(0x0C, &mut bus), 0);
        assert_eq!(dap.read_dp(RdBuffRegister::ADDRESS), 0x2477_0011);
    }

    #[test]
    fn csw_read_only_bits() {
        let (mut dap, mut bus) = powered();
        dap.write_ap(0x00, 0x2300_0080, &mut bus);
        assert_eq!(dap.csw, 0x2300_0040);
    }

    #[test]
    fn drw_auto_increment() {
        let (mut dap, mut bus) = powered();
        dap.write_ap(0x00, CSW_RESET | (Csw::ADDRINC_SINGLE << 4), &mut bus);
        dap.write_ap(0x04, 0x2000_0000, &mut bus);
        dap.write_ap(0x0C, 0x1111_1111, &mut bus);
        dap.write_ap(0x0C, 0x2222_2222, &mut bus);
        assert_eq!(dap.tar, 0x2000_0008);
        assert_eq!(bus.read_word(0x2000_0004), 0x2222_2222);
    }

    #[test]
    fn drw_halfword_lane() {
        let (mut dap, mut bus) = powered();
        dap.write_ap(0x00, 0x2300_0001, &mut bus);
        dap.write_ap(0x04, 0x2000_0002, &mut bus);
        dap.write_ap(0x0C, 0xBEEF_0000, &mut bus);
        assert_eq!(bus.read_word(0x2000_0000), 0xBEEF_0000);
    }
}
