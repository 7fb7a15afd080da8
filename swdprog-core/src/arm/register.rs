// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Register Access Traits
//!
//! These give strongly typed access to the registers used by swdprog:
//!
//! * Debug Port and Access Port registers are addressed by a byte on the
//!   SWD link (`A[3:2]` plus a SELECT bank), and are read and written with
//!   `swdprog_swd::SwdInterface::read_dp_register()` and friends.
//! * Memory mapped registers (Cortex-M System Control Space, flash
//!   controller) are addressed by a 32-bit target address and accessed
//!   through the MEM-AP with `swdprog_swd::SwdInterface::read_register()`.

/// Base trait for Debug Port and Access Port register descriptors
pub trait RegisterDescriptor {
    const ADDRESS: u8;
    type Value;
}

/// Registers that can be read
pub trait ReadableRegister: RegisterDescriptor {
    /// Convert raw 32-bit data to register value
    fn from_raw(data: u32) -> Self::Value
    where
        Self::Value: From<u32>,
    {
        Self::Value::from(data)
    }
}

/// Registers that can be written
pub trait WritableRegister: RegisterDescriptor {
    /// Convert register value to raw 32-bit data
    fn to_raw(value: Self::Value) -> u32
    where
        Self::Value: Into<u32>,
    {
        value.into()
    }
}

/// Debug Port registers (accessed via DP operations)
pub trait DpRegister: RegisterDescriptor {}

/// Access Port registers (accessed via AP operations)
pub trait ApRegister: RegisterDescriptor {}

/// A register in the target's address space, reached through the MEM-AP.
pub trait MemoryMappedRegister {
    const ADDRESS: u32;
}

/// Generate the standard conversions and formatting for a register data
/// type wrapping a `u32`.
///
/// `rw` (the default) generates conversions both ways.  `w` omits
/// `From<u32>`, for write-only registers whose value should be built up with
/// setters.
#[macro_export]
macro_rules! register_data {
    ($name:ident) => {
        $crate::register_data!($name, w);

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }
    };
    ($name:ident, w) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

/// Generate a bool getter/setter pair for a single bit field.
#[macro_export]
macro_rules! register_bit {
    ($get:ident, $set:ident, $mask:expr) => {
        pub fn $get(&self) -> bool {
            self.0 & $mask != 0
        }

        pub fn $set(&mut self, enable: bool) -> &mut Self {
            if enable {
                self.0 |= $mask;
            } else {
                self.0 &= !$mask;
            }
            self
        }
    };
}
