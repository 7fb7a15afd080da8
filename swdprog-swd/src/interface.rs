// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD Interface
//!
//! Provides [`SwdInterface`], which turns raw SWD transactions into Debug
//! Port and Access Port register accesses, and uses the MEM-AP to read and
//! write registers in the target's address space.
//!
//! It tracks the last value written to DP SELECT, so an AP register access
//! only costs a SELECT write when the bank changes.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdprog_core::BitChannel;
use swdprog_core::arm::ap::{Idr, IdrRegister};
use swdprog_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, RdBuffRegister,
    Select, SelectRegister,
};
use swdprog_core::arm::map::{Csw, CswRegister, Drw, DrwRegister, Tar, TarRegister};
use swdprog_core::arm::register::{
    ApRegister, DpRegister, MemoryMappedRegister, ReadableRegister, RegisterDescriptor,
    WritableRegister,
};

use crate::SwdError;
use crate::protocol::SwdProtocol;

/// The MEM-AP used for all memory accesses.  Single core parts only have the
/// one.
pub const MEM_AP: u8 = 0;

/// Cached copy of the last DP SELECT value written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugPortState {
    /// APSEL
    pub ap: u8,

    /// APBANKSEL, as a register address (0x00, 0x10, .. 0xF0)
    pub bank: u8,
}

impl From<DebugPortState> for Select {
    fn from(state: DebugPortState) -> Self {
        Select::from_ap_bank(state.ap, state.bank)
    }
}

/// SWD Interface object
///
/// Create using [`SwdInterface::new()`] or [`SwdInterface::from_channel()`].
/// Before any register access, reset the line with
/// [`SwdInterface::reset_line()`] then call [`SwdInterface::power_up()`].
///
/// ```rust
/// use swdprog_swd::SwdInterface;
/// use swdprog_dummy::DummyTarget;
///
/// let mut swd_if = SwdInterface::from_channel(DummyTarget::default());
/// swd_if.reset_line().unwrap();
/// let idcode = swd_if.power_up().unwrap();
/// println!("IDCODE: {idcode}");
///
/// let dhcsr = swd_if.read_register(0xE000_EDF0).unwrap();
/// println!("DHCSR: 0x{dhcsr:08X}");
/// ```
#[derive(Debug)]
pub struct SwdInterface<C> {
    protocol: SwdProtocol<C>,

    // None until SELECT has been written since the last line reset
    dp_state: Option<DebugPortState>,
    idcode: Option<IdCode>,

    // Set while CSW may be left in 16-bit mode by a halfword write
    csw_halfword: bool,
}

impl<C: BitChannel> SwdInterface<C> {
    /// Creates a new SWD interface using the given [`SwdProtocol`] instance.
    pub fn new(protocol: SwdProtocol<C>) -> Self {
        Self {
            protocol,
            dp_state: None,
            idcode: None,
            csw_halfword: false,
        }
    }

    /// Creates a new SWD interface directly from a [`BitChannel`].
    pub fn from_channel(channel: C) -> Self {
        Self::new(SwdProtocol::new(channel))
    }

    pub fn protocol(&mut self) -> &mut SwdProtocol<C> {
        &mut self.protocol
    }

    pub fn channel(&self) -> &C {
        self.protocol.channel()
    }

    pub fn channel_mut(&mut self) -> &mut C {
        self.protocol.channel_mut()
    }

    pub fn into_inner(self) -> C {
        self.protocol.into_inner()
    }

    /// The DP SELECT value last written, if any.
    pub fn dp_state(&self) -> Option<DebugPortState> {
        self.dp_state
    }

    /// The IDCODE read by the last [`Self::power_up()`].
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    /// Line resets the target and switches it from JTAG to SWD.  A line
    /// reset also resets the target's SELECT register, so the cached value
    /// is forgotten.
    pub fn reset_line(&mut self) -> Result<(), SwdError> {
        self.dp_state = None;
        self.idcode = None;
        self.protocol.reset()
    }

    /// Powers up the debug and system domains and gets the MEM-AP ready for
    /// 32-bit accesses.
    ///
    /// Must be called after [`Self::reset_line()`] and before any AP or
    /// memory access.
    ///
    /// Returns:
    /// - `Ok(IdCode)`: the target's IDCODE.
    /// - `Err(SwdError)`: if any step failed.
    pub fn power_up(&mut self) -> Result<IdCode, SwdError> {
        let idcode = self.read_idcode()?;
        debug!("IDCODE: {idcode}");
        if !idcode.is_plausible() {
            warn!("Unexpected IDCODE {idcode} - is the target connected?");
        }

        self.write_dp_register(CtrlStatRegister, CtrlStat::power_up_request())?;
        self.abort(Abort::clear_all())?;
        self.select_bank(MEM_AP, 0)?;
        self.write_csw(Csw::ADDRINC_OFF, Csw::SIZE_32BIT)?;
        self.csw_halfword = false;

        debug!("Debug domain powered up, MEM-AP configured for 32-bit access");
        self.idcode = Some(idcode);
        Ok(idcode)
    }

    /// Writes DP SELECT to choose an AP and AP register bank, unless the
    /// cached value shows it is already selected.
    ///
    /// Arguments:
    /// - `ap`: The AP index.
    /// - `bank`: An AP register address within the bank.  The low nibble is
    ///   ignored.
    pub fn select_bank(&mut self, ap: u8, bank: u8) -> Result<(), SwdError> {
        let wanted = DebugPortState {
            ap,
            bank: bank & 0xF0,
        };
        if self.dp_state == Some(wanted) {
            return Ok(());
        }

        self.protocol
            .write(false, SelectRegister::ADDRESS, Select::from(wanted).into())?;
        trace!("Info:  SELECT AP {ap} bank 0x{:02X}", wanted.bank);
        self.dp_state = Some(wanted);
        Ok(())
    }

    /// Write a Debug Port register.
    ///
    /// ```rust
    /// use swdprog_core::arm::dp::{Abort, AbortRegister};
    /// # use swdprog_swd::SwdInterface;
    /// # use swdprog_dummy::DummyTarget;
    /// # let mut swd_if = SwdInterface::from_channel(DummyTarget::default());
    /// # swd_if.reset_line().unwrap();
    /// let mut abort = Abort::new();
    /// abort.set_stkerrclr(true).set_orunerrclr(true);
    /// swd_if.write_dp_register(AbortRegister, abort).unwrap();
    /// ```
    pub fn write_dp_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        R::Value: Into<u32>,
    {
        self.protocol.write(false, R::ADDRESS, R::to_raw(value))
    }

    /// Read a Debug Port register.
    pub fn read_dp_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let data = self.protocol.read(false, R::ADDRESS)?;
        Ok(R::from_raw(data))
    }

    /// Write an Access Port register on the MEM-AP, updating SELECT first if
    /// required.
    pub fn write_ap_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        R::Value: Into<u32>,
    {
        self.write_ap_raw(R::ADDRESS, R::to_raw(value))
    }

    /// Read an Access Port register on the MEM-AP.  Handles the posted read,
    /// returning the value from RDBUFF.
    pub fn read_ap_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let data = self.read_ap_raw(R::ADDRESS)?;
        Ok(R::from_raw(data))
    }

    /// Writes an AP register by address, where `addr` includes the bank.
    pub fn write_ap_raw(&mut self, addr: u8, data: u32) -> Result<(), SwdError> {
        self.select_bank(MEM_AP, addr)?;
        self.protocol.write(true, addr, data)
    }

    /// Reads an AP register by address, where `addr` includes the bank.
    pub fn read_ap_raw(&mut self, addr: u8) -> Result<u32, SwdError> {
        self.select_bank(MEM_AP, addr)?;

        // Returns the previous AP read's result, so is discarded
        let _stale = self.protocol.read(true, addr)?;
        self.read_rdbuff()
    }

    pub fn read_idcode(&mut self) -> Result<IdCode, SwdError> {
        self.read_dp_register(IdCodeRegister)
    }

    pub fn read_ctrl_stat(&mut self) -> Result<CtrlStat, SwdError> {
        self.read_dp_register(CtrlStatRegister)
    }

    pub fn read_rdbuff(&mut self) -> Result<u32, SwdError> {
        Ok(self.read_dp_register(RdBuffRegister)?.value())
    }

    /// Reads the MEM-AP's identification register, in bank 0xF0.
    pub fn read_ap_idr(&mut self) -> Result<Idr, SwdError> {
        self.read_ap_register(IdrRegister)
    }

    /// Writes DP ABORT, to abort an AP transaction and/or clear sticky
    /// errors.
    pub fn abort(&mut self, flags: Abort) -> Result<(), SwdError> {
        debug!("Writing ABORT {flags}");
        self.write_dp_register(AbortRegister, flags)
    }

    /// Sets the MEM-AP transfer size and address increment mode, keeping the
    /// rest of CSW as it is.
    pub fn write_csw(&mut self, addrinc: u32, size: u32) -> Result<(), SwdError> {
        let csw = self.read_ap_register(CswRegister)?;

        let mut low = Csw::from(0);
        low.set_size(size).set_addrinc(addrinc);
        let csw = csw.with_low_byte(low.value() as u8);

        self.write_ap_register(CswRegister, csw)
    }

    /// Reads a 32-bit register or memory location in the target's address
    /// space.
    pub fn read_register(&mut self, addr: u32) -> Result<u32, SwdError> {
        self.restore_word_csw()?;
        self.write_ap_register(TarRegister, Tar::from(addr))?;
        let data = self.read_ap_register(DrwRegister)?.data();
        trace!("Info:  Read 0x{addr:08X} = 0x{data:08X}");
        Ok(data)
    }

    /// Writes a 32-bit register or memory location in the target's address
    /// space.
    pub fn write_register(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        trace!("Info:  Write 0x{addr:08X} = 0x{data:08X}");
        self.restore_word_csw()?;
        self.write_ap_register(TarRegister, Tar::from(addr))?;
        self.write_ap_register(DrwRegister, Drw::from(data))
    }

    /// Writes a halfword to the target's address space, as required by flash
    /// controllers which only accept 16-bit writes.
    ///
    /// CSW is switched to 16-bit transfers for the write and back to 32-bit
    /// afterwards, including when the DRW write fails.  If the switch back
    /// fails too, the next [`Self::read_register()`] or
    /// [`Self::write_register()`] retries it.
    ///
    /// Arguments:
    /// - `addr`: Target address.  Must be halfword aligned.
    /// - `data`: The halfword to write.  It is moved into the byte lane
    ///   matching `addr` before being written to DRW.
    pub fn write_register_half(&mut self, addr: u32, data: u16) -> Result<(), SwdError> {
        if addr % 2 != 0 {
            return Err(SwdError::Api(format!(
                "halfword write to unaligned address 0x{addr:08X}"
            )));
        }

        trace!("Info:  Write half 0x{addr:08X} = 0x{data:04X}");
        self.write_ap_register(TarRegister, Tar::from(addr))?;
        self.csw_halfword = true;
        self.write_csw(Csw::ADDRINC_OFF, Csw::SIZE_16BIT)?;
        let written = self.write_ap_register(DrwRegister, Drw::halfword_lane(addr, data));

        match (written, self.restore_word_csw()) {
            (Ok(()), restored) => restored,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore)) => {
                debug!("Error: CSW left at 16-bit after failed halfword write: {restore}");
                Err(e)
            }
        }
    }

    // Puts CSW back to 32-bit transfers if a halfword write may have left it
    // at 16-bit.
    fn restore_word_csw(&mut self) -> Result<(), SwdError> {
        if self.csw_halfword {
            self.write_csw(Csw::ADDRINC_OFF, Csw::SIZE_32BIT)?;
            self.csw_halfword = false;
        }
        Ok(())
    }

    /// Reads a typed memory mapped register, such as
    /// [`swdprog_core::arm::scs::Dhcsr`].
    pub fn read_mem_register<R>(&mut self) -> Result<R, SwdError>
    where
        R: MemoryMappedRegister + From<u32>,
    {
        Ok(R::from(self.read_register(R::ADDRESS)?))
    }

    /// Writes a typed memory mapped register.
    pub fn write_mem_register<R>(&mut self, value: R) -> Result<(), SwdError>
    where
        R: MemoryMappedRegister + Into<u32>,
    {
        self.write_register(R::ADDRESS, value.into())
    }
}
