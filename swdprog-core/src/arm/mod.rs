// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM debug architecture registers and core identification

pub mod ap;
pub mod dp;
pub mod map;
pub mod register;
pub mod scs;

use core::fmt;

use dp::IdCode;

/// ARM Cortex-M core family, as identified by the SW-DP IDCODE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cortex {
    /// Cortex-M0/M0+ (DPv1 MINDP)
    M0,
    /// Cortex-M3, such as the STM32F1 family
    M3,
    /// Cortex-M4
    M4,
}

impl Cortex {
    pub const IDCODE_M0: IdCode = IdCode::from_u32(0x0BC1_2477);
    pub const IDCODE_M3: IdCode = IdCode::from_u32(0x1BA0_1477);
    pub const IDCODE_M4: IdCode = IdCode::from_u32(0x2BA0_1477);

    pub fn idcode(&self) -> IdCode {
        match self {
            Cortex::M0 => Self::IDCODE_M0,
            Cortex::M3 => Self::IDCODE_M3,
            Cortex::M4 => Self::IDCODE_M4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cortex::M0 => "Cortex-M0",
            Cortex::M3 => "Cortex-M3",
            Cortex::M4 => "Cortex-M4",
        }
    }

    /// Identifies the core from an IDCODE read during power-up.  Returns
    /// `None` for debug ports swdprog doesn't know about, which isn't
    /// necessarily an error.
    pub fn from_idcode(idcode: IdCode) -> Option<Cortex> {
        match idcode {
            Self::IDCODE_M0 => Some(Cortex::M0),
            Self::IDCODE_M3 => Some(Cortex::M3),
            Self::IDCODE_M4 => Some(Cortex::M4),
            _ => None,
        }
    }
}

impl fmt::Display for Cortex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARM {}", self.as_str())
    }
}
