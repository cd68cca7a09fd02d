// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Generic Access Port Registers

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor};
use crate::register_data;
use alloc::format;
use alloc::string::String;

/// Access Port Identification Register descriptor.  Lives in AP bank 0xF.
pub struct IdrRegister;

impl RegisterDescriptor for IdrRegister {
    const ADDRESS: u8 = 0xFC;
    const NAME: &'static str = "IDR";
    type Value = Idr;
}

impl ReadableRegister for IdrRegister {}
impl ApRegister for IdrRegister {}

/// Access Port Identification Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Idr(u32);

register_data!(Idr, r);

impl Idr {
    const REVISION_SHIFT: u32 = 28;
    const DESIGNER_SHIFT: u32 = 17;
    const CLASS_SHIFT: u32 = 13;
    const VARIANT_SHIFT: u32 = 4;

    /// Memory Access Port
    pub const CLASS_MEM_AP: u32 = 0x8;

    pub const AP_TYPE_AMBA_AHB3: u32 = 0x1;
    pub const AP_TYPE_AMBA_AHB5: u32 = 0x5;

    /// Create a new IDR from a raw value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get revision field (bits 31:28)
    pub fn revision(&self) -> u32 {
        (self.0 >> Self::REVISION_SHIFT) & 0xF
    }

    /// Get JEP106 designer field (bits 27:17)
    pub fn designer(&self) -> u32 {
        (self.0 >> Self::DESIGNER_SHIFT) & 0x7FF
    }

    /// Get class field (bits 16:13)
    pub fn class(&self) -> u32 {
        (self.0 >> Self::CLASS_SHIFT) & 0xF
    }

    /// Get variant field (bits 7:4)
    pub fn variant(&self) -> u32 {
        (self.0 >> Self::VARIANT_SHIFT) & 0xF
    }

    /// Get AP type field (bits 3:0)
    pub fn ap_type(&self) -> u32 {
        self.0 & 0xF
    }

    pub fn is_mem_ap(&self) -> bool {
        self.class() == Self::CLASS_MEM_AP
    }

    /// Get formatted information string
    pub fn idr_info(&self) -> String {
        let ap_type = match self.ap_type() {
            Self::AP_TYPE_AMBA_AHB3 => "AHB3",
            Self::AP_TYPE_AMBA_AHB5 => "AHB5",
            _ => "other",
        };
        format!(
            "Designer: 0x{:03X}, Class: 0x{:X}, Type: {ap_type}, Variant: 0x{:X}, Rev: 0x{:X}",
            self.designer(),
            self.class(),
            self.variant(),
            self.revision()
        )
    }
}

/// ARM Cortex-M0 (RP2040) AHB-AP IDR value
pub const IDR_AHB_AP_CORTEX_M0: Idr = Idr::new(0x0477_0031);
