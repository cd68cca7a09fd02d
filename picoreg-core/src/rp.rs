// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! picoreg-core - Raspberry Pi (RP2040) specific objects

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::arm::ap::{IDR_AHB_AP_CORTEX_M0, Idr};
use crate::arm::dp::{IdCode, TARGET_SEL_RP2040_CORE0, TARGET_SEL_RP2040_CORE1, TargetSel};

/// RP2040 SIO GPIO_IN register: the level of every GPIO pin.  A handy
/// always-readable word to peek at.
pub const RP2040_SIO_GPIO_IN: u32 = 0xD000_0004;

// RP2040 chip ID
pub const RP2040_CHIP_ID: u32 = 0x1000_2927;
pub const RP2040_CHIP_ID_ADDR: u32 = 0x4000_0000;

/// The RP2040 DPIDR: a Cortex-M0+ SW-DP, DPv2
pub const RP2040_IDCODE: IdCode = IdCode::new(0x0BC1_2477);

/// The RP2040 AHB-AP IDR
pub const RP2040_IDR: Idr = IDR_AHB_AP_CORTEX_M0;

/// Names the target behind a DPIDR, if it is one we know.
pub fn dpidr_name(idcode: IdCode) -> Option<&'static str> {
    match idcode {
        RP2040_IDCODE => Some("RP2040 (ARM Cortex-M0+)"),
        _ => None,
    }
}

/// Which core of a dual-core RP2040 the SW-DP connection selects.
///
/// Each core has its own multi-drop DP, picked by writing its identifier to
/// TARGETSEL straight after a line reset.  Serialized as the integer 0 or 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TargetCore {
    #[default]
    Core0,
    Core1,
}

impl TargetCore {
    /// The TARGETSEL value selecting this core's DP
    pub fn target_sel(&self) -> TargetSel {
        match self {
            TargetCore::Core0 => TARGET_SEL_RP2040_CORE0,
            TargetCore::Core1 => TARGET_SEL_RP2040_CORE1,
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            TargetCore::Core0 => 0,
            TargetCore::Core1 => 1,
        }
    }
}

/// Returned when a core index other than 0 or 1 is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCore(pub u8);

impl fmt::Display for InvalidCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid core index {} (expected 0 or 1)", self.0)
    }
}

impl TryFrom<u8> for TargetCore {
    type Error = InvalidCore;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TargetCore::Core0),
            1 => Ok(TargetCore::Core1),
            other => Err(InvalidCore(other)),
        }
    }
}

impl From<TargetCore> for u8 {
    fn from(core: TargetCore) -> u8 {
        core.index()
    }
}

impl fmt::Display for TargetCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RP2040 Core {} ({})", self.index(), self.target_sel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn core_selection_ids() {
        assert_eq!(TargetCore::Core0.target_sel().value(), 0x0100_2927);
        assert_eq!(TargetCore::Core1.target_sel().value(), 0x1100_2927);
        assert_eq!(TargetCore::default(), TargetCore::Core0);
    }

    #[test]
    fn known_dpidr() {
        assert_eq!(dpidr_name(RP2040_IDCODE), Some("RP2040 (ARM Cortex-M0+)"));
        assert_eq!(dpidr_name(IdCode::new(0x2BA0_1477)), None);
        assert!(RP2040_IDCODE.is_valid());
        assert_eq!(RP2040_IDCODE.designer_id(), 0x23B);
        assert_eq!(RP2040_IDCODE.version(), 2);
    }

    #[test]
    fn core_from_index() {
        assert_eq!(TargetCore::try_from(1), Ok(TargetCore::Core1));
        assert_eq!(TargetCore::try_from(2), Err(InvalidCore(2)));
        assert_eq!(u8::from(TargetCore::Core1), 1);
        assert_eq!(
            format!("{}", TargetCore::Core1),
            "RP2040 Core 1 (0x11002927)"
        );
    }
}
