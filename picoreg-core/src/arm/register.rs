// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Register Descriptors
//!
//! Each DP or AP register is described by a zero-sized descriptor type which
//! carries the register's 4-bit aligned address and the type of its data.
//! `picoreg_swd::interface::SwdInterface` uses these to provide typed
//! register access:
//!
//! * `SwdInterface::read_dp_register`
//! * `SwdInterface::write_dp_register`
//! * `SwdInterface::read_ap_register`
//! * `SwdInterface::write_ap_register`
//!
//! Only bits 2 and 3 of the address go out on the wire.  The higher nibble of
//! an AP address (for example 0xF of IDR at 0xFC) is the AP bank, selected
//! separately via DP SELECT.

/// Base trait for all ARM debug register descriptors
pub trait RegisterDescriptor {
    const ADDRESS: u8;
    const NAME: &'static str;
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

/// Returns the AP bank (bits 7:4 of the full AP register address).
pub const fn ap_bank(address: u8) -> u8 {
    (address >> 4) & 0xF
}

/// Implements the data conversions and `Display` for a register data type.
///
/// - `register_data!(Name, r)` - readable only, `From<u32>`.
/// - `register_data!(Name, w)` - writable only, `Into<u32>`.
/// - `register_data!(Name, rw)` - both.
#[macro_export]
macro_rules! register_data {
    ($name:ident, r) => {
        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        $crate::register_data!(@common $name);
    };
    ($name:ident, w) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        $crate::register_data!(@common $name);
    };
    ($name:ident, rw) => {
        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        $crate::register_data!(@common $name);
    };
    (@common $name:ident) => {
        impl $name {
            /// Returns the raw register value
            pub const fn value(&self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ap_bank_is_high_nibble() {
        assert_eq!(ap_bank(0xFC), 0xF);
        assert_eq!(ap_bank(0x0C), 0x0);
        assert_eq!(ap_bank(0x14), 0x1);
    }
}
