// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Port Registers
//!
//! Only the registers and fields the SWD connection handshake touches are
//! modelled here.

use crate::arm::register::{DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::register_data;
use alloc::{format, string::String};
use core::fmt;
use static_assertions::const_assert_eq;

/// DPIDR (IDCODE) Register descriptor (read-only)
pub struct IdCodeRegister;

impl RegisterDescriptor for IdCodeRegister {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "DPIDR";
    type Value = IdCode;
}

impl ReadableRegister for IdCodeRegister {}
impl DpRegister for IdCodeRegister {}

/// ARM Debug Port Identification Register (DPIDR) data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdCode(u32);

impl IdCode {
    pub const fn new(value: u32) -> Self {
        IdCode(value)
    }

    pub fn data(&self) -> u32 {
        self.0
    }

    /// Get revision field (bits 31:28)
    pub fn revision(&self) -> u8 {
        ((self.0 >> 28) & 0xF) as u8
    }

    /// Get DP architecture version (bits 15:12)
    pub fn version(&self) -> u8 {
        ((self.0 >> 12) & 0xF) as u8
    }

    /// Get JEDEC designer ID (bits 11:1)
    pub fn designer_id(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// Bit 0 reads as one on every valid DPIDR.  A line stuck low yields 0.
    pub fn is_valid(&self) -> bool {
        (self.0 & 1) == 1
    }

    /// Get manufacturer name if known
    pub fn designer_name(&self) -> &'static str {
        match self.designer_id() {
            0x23B => "ARM Ltd",
            _ => "Unknown",
        }
    }
}

impl From<u32> for IdCode {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            if !self.is_valid() {
                return write!(f, "Invalid DPIDR: 0x{:08X} (LSB not set)", self.0);
            }
            write!(
                f,
                "0x{:08X} ({} DPv{} rev {})",
                self.0,
                self.designer_name(),
                self.version(),
                self.revision()
            )
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

/// ABORT Register descriptor (write-only)
pub struct AbortRegister;

impl RegisterDescriptor for AbortRegister {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "ABORT";
    type Value = Abort;
}

impl WritableRegister for AbortRegister {}
impl DpRegister for AbortRegister {}

/// ARM Debug Port ABORT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort(u32);

register_data!(Abort, w);

impl Abort {
    const STKCMPCLR: u32 = 1 << 1;
    const STKERRCLR: u32 = 1 << 2;
    const WDERRCLR: u32 = 1 << 3;
    const ORUNERRCLR: u32 = 1 << 4;

    /// Clears every sticky error flag: `0x1E`.
    pub const fn clear_all() -> Self {
        Abort(Self::STKCMPCLR | Self::STKERRCLR | Self::WDERRCLR | Self::ORUNERRCLR)
    }
}

/// CTRL/STAT Register descriptor (read-write)
pub struct CtrlStatRegister;

impl RegisterDescriptor for CtrlStatRegister {
    const ADDRESS: u8 = 0x04;
    const NAME: &'static str = "CTRL/STAT";
    type Value = CtrlStat;
}

impl ReadableRegister for CtrlStatRegister {}
impl WritableRegister for CtrlStatRegister {}
impl DpRegister for CtrlStatRegister {}

/// ARM Debug Port CTRL/STAT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlStat(u32);

register_data!(CtrlStat, rw);

impl CtrlStat {
    pub const ORUNDETECT: u32 = 1 << 0;
    pub const STICKYORUN: u32 = 1 << 1;
    pub const STICKYCMP: u32 = 1 << 4;
    pub const STICKYERR: u32 = 1 << 5;
    pub const READOK: u32 = 1 << 6;
    pub const WDATAERR: u32 = 1 << 7;
    pub const CDBGPWRUPREQ: u32 = 1 << 28;
    pub const CDBGPWRUPACK: u32 = 1 << 29;
    pub const CSYSPWRUPREQ: u32 = 1 << 30;
    pub const CSYSPWRUPACK: u32 = 1 << 31;

    /// Requests system and debug power-up, with overrun detection enabled:
    /// `0x5000_0001`.
    pub const fn power_up_request() -> Self {
        CtrlStat(Self::CSYSPWRUPREQ | Self::CDBGPWRUPREQ | Self::ORUNDETECT)
    }

    /// Both system and debug power domains have acknowledged power-up.
    pub fn powered_up(&self) -> bool {
        let acks = Self::CDBGPWRUPACK | Self::CSYSPWRUPACK;
        self.0 & acks == acks
    }

    pub fn has_errors(&self) -> bool {
        self.0 & (Self::STICKYORUN | Self::STICKYCMP | Self::STICKYERR | Self::WDATAERR) != 0
    }

    /// Get power state description
    pub fn power_states(&self) -> String {
        let flag = |bit: u32, set: &'static str, clear: &'static str| {
            if self.0 & bit != 0 { set } else { clear }
        };
        format!(
            "Debug: {}/{}, System: {}/{}",
            flag(Self::CDBGPWRUPREQ, "REQ", "off"),
            flag(Self::CDBGPWRUPACK, "ACK", "nak"),
            flag(Self::CSYSPWRUPREQ, "REQ", "off"),
            flag(Self::CSYSPWRUPACK, "ACK", "nak"),
        )
    }
}

/// SELECT Register descriptor (write-only on the SW-DP)
pub struct SelectRegister;

impl RegisterDescriptor for SelectRegister {
    const ADDRESS: u8 = 0x08;
    const NAME: &'static str = "SELECT";
    type Value = Select;
}

impl WritableRegister for SelectRegister {}
impl DpRegister for SelectRegister {}

/// ARM Debug Port SELECT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select(u32);

register_data!(Select, rw);

impl Select {
    const APBANKSEL_SHIFT: u32 = 4;
    const DPBANKSEL_SHIFT: u32 = 0;
    const BANK_MASK: u32 = 0xF;

    /// AP 0, the given AP and DP register banks.
    pub const fn bank(ap_bank: u8, dp_bank: u8) -> Self {
        Select(
            ((ap_bank as u32 & Self::BANK_MASK) << Self::APBANKSEL_SHIFT)
                | ((dp_bank as u32 & Self::BANK_MASK) << Self::DPBANKSEL_SHIFT),
        )
    }
}

/// RDBUFF Register descriptor (read-only)
pub struct RdBuffRegister;

impl RegisterDescriptor for RdBuffRegister {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "RDBUFF";
    type Value = RdBuff;
}

impl ReadableRegister for RdBuffRegister {}
impl DpRegister for RdBuffRegister {}

/// ARM Debug Port RDBUFF register data.  Holds the result of the previous
/// (posted) AP read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RdBuff(u32);

register_data!(RdBuff, r);

/// TARGETSEL Register descriptor (write-only, DPv2).  Shares address 0xC
/// with RDBUFF; writes go to TARGETSEL.
pub struct TargetSelRegister;

impl RegisterDescriptor for TargetSelRegister {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "TARGETSEL";
    type Value = TargetSel;
}

impl WritableRegister for TargetSelRegister {}
impl DpRegister for TargetSelRegister {}

/// ARM Debug Port TARGETSEL register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetSel(u32);

register_data!(TargetSel, rw);

impl TargetSel {
    pub const fn new(value: u32) -> Self {
        TargetSel(value)
    }
}

// RP2040 multi-drop targets.  TINSTANCE (bits 31:28) picks the core.
pub const TARGET_SEL_RP2040_BASE: u32 = 0x0100_2927;
pub const TARGET_SEL_RP2040_CORE0: TargetSel = TargetSel(TARGET_SEL_RP2040_BASE);
pub const TARGET_SEL_RP2040_CORE1: TargetSel = TargetSel((0x1 << 28) | TARGET_SEL_RP2040_BASE);

const_assert_eq!(TARGET_SEL_RP2040_CORE0.0, 0x0100_2927);
const_assert_eq!(TARGET_SEL_RP2040_CORE1.0, 0x1100_2927);
const_assert_eq!(TARGET_SEL_RP2040_CORE0.0 ^ TARGET_SEL_RP2040_CORE1.0, 1 << 28);
const_assert_eq!(Abort::clear_all().0, 0x1E);
const_assert_eq!(CtrlStat::power_up_request().0, 0x5000_0001);
const_assert_eq!(Select::bank(0xF, 0).0, 0xF0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_banks() {
        assert_eq!(Select::bank(0xF, 0x2).value(), 0xF2);
        assert_eq!(Select::bank(0x1F, 0).value(), 0xF0);
        assert_eq!(Select::default().value(), 0);
    }

    #[test]
    fn ctrl_stat_power_acks() {
        let req = CtrlStat::power_up_request();
        assert!(!req.powered_up());
        let acked = CtrlStat::from(req.value() | CtrlStat::CDBGPWRUPACK | CtrlStat::CSYSPWRUPACK);
        assert!(acked.powered_up());
        assert!(!acked.has_errors());
        assert_eq!(acked.power_states(), "Debug: REQ/ACK, System: REQ/ACK");
        assert!(CtrlStat::from(CtrlStat::STICKYERR).has_errors());
    }

    #[test]
    fn idcode_display() {
        let idcode = IdCode::new(0x0BC1_2477);
        assert_eq!(format!("{idcode}"), "0x0BC12477");
        assert_eq!(format!("{idcode:#}"), "0x0BC12477 (ARM Ltd DPv2 rev 0)");
        assert_eq!(
            format!("{:#}", IdCode::new(0xFFFF_FFFE)),
            "Invalid DPIDR: 0xFFFFFFFE (LSB not set)"
        );
    }
}
