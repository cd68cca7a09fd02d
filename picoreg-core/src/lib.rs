// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! picoreg-core - ARM debug concepts used by picoreg.
//!
//! Designed to be used in conjunction with the `picoreg-swd` library, which
//! drives the ARM Serial Wire Debug (SWD) wire protocol over two bit-banged
//! lines.  This crate holds the parts which are not specific to the wire:
//!
//! * [`arm::register`] - typed register descriptors.
//! * [`arm::dp`] - Debug Port registers (DPIDR, ABORT, CTRL/STAT, SELECT,
//!   RDBUFF, TARGETSEL).
//! * [`arm::ap`] and [`arm::map`] - Access Port and MEM-AP registers.
//! * [`rp`] - RP2040 specifics, such as the per-core TARGETSEL identifiers.
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![no_std]

pub mod arm;
pub mod rp;

extern crate alloc;

#[doc(inline)]
pub use crate::rp::TargetCore;
