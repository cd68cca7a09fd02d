// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Memory Access Port Registers

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::register_data;
use static_assertions::const_assert_eq;

/// Control/Status Word Register descriptor (read-write)
pub struct CswRegister;

impl RegisterDescriptor for CswRegister {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "CSW";
    type Value = Csw;
}

impl ReadableRegister for CswRegister {}
impl WritableRegister for CswRegister {}
impl ApRegister for CswRegister {}

/// Control/Status Word register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Csw(u32);

register_data!(Csw, rw);

impl Csw {
    const ADDRINC_SHIFT: u32 = 4;
    const ADDRINC_MASK: u32 = 0b11;
    const PROT_SHIFT: u32 = 24;
    const DBG_SW_ENABLE: u32 = 1 << 31;

    pub const SIZE_32BIT: u32 = 0b010;
    pub const ADDRINC_OFF: u32 = 0b00;
    pub const ADDRINC_SINGLE: u32 = 0b01;

    // HPROT: privileged data access, plus the master type bit
    const PROT_DEBUG_PRIVILEGED: u32 = 0x22;

    /// 32-bit transfers, TAR auto-incremented after each DRW access,
    /// privileged debug master: `0xA200_0012`.
    pub const fn auto_increment_word() -> Self {
        Csw(Self::DBG_SW_ENABLE
            | (Self::PROT_DEBUG_PRIVILEGED << Self::PROT_SHIFT)
            | (Self::ADDRINC_SINGLE << Self::ADDRINC_SHIFT)
            | Self::SIZE_32BIT)
    }

    /// Get address increment field
    pub fn addrinc(&self) -> u32 {
        (self.0 >> Self::ADDRINC_SHIFT) & Self::ADDRINC_MASK
    }
}

const_assert_eq!(Csw::auto_increment_word().0, 0xA200_0012);

/// Transfer Address Register descriptor (read-write)
pub struct TarRegister;

impl RegisterDescriptor for TarRegister {
    const ADDRESS: u8 = 0x04;
    const NAME: &'static str = "TAR";
    type Value = Tar;
}

impl ReadableRegister for TarRegister {}
impl WritableRegister for TarRegister {}
impl ApRegister for TarRegister {}

/// Transfer Address Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tar(pub u32);

register_data!(Tar, rw);

/// Data Read/Write Register descriptor (read-write)
pub struct DrwRegister;

impl RegisterDescriptor for DrwRegister {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "DRW";
    type Value = Drw;
}

impl ReadableRegister for DrwRegister {}
impl WritableRegister for DrwRegister {}
impl ApRegister for DrwRegister {}

/// Data Read/Write register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drw(pub u32);

register_data!(Drw, rw);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_increment_word_fields() {
        let csw = Csw::auto_increment_word();
        assert_eq!(csw.value() & 0b111, Csw::SIZE_32BIT);
        assert_eq!(csw.addrinc(), Csw::ADDRINC_SINGLE);
        assert_eq!(Csw::default().addrinc(), Csw::ADDRINC_OFF);
    }
}
