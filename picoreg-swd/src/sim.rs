// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated SWD target
//!
//! [`SimTarget`] is a [`LineDriver`] which, instead of toggling pins, plays
//! the part of an RP2040 SW-DP on the other end of the wire.  It watches the
//! host's clock edges and data line, decodes what is sent and answers with
//! acks and data, so the whole stack can be exercised without hardware.
//!
//! It models:
//! - dormant state, left only on the selection alert (wake-up key)
//! - line reset (50 or more high bits then a low bit)
//! - lockout after a protocol error, until the next line reset
//! - multi-drop selection via TARGETSEL straight after a line reset
//! - DPIDR, ABORT, CTRL/STAT with power-up acks, SELECT and RDBUFF
//! - posted AP reads
//! - a MEM-AP (CSW, TAR, DRW with auto-increment) over a sparse memory
//! - the AP IDR in AP bank 0xF
//!
//! Failures can be injected with [`SimTarget::inject_ack`] (once) and
//! [`SimTarget::set_stuck_ack`] (always).

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use picoreg_core::TargetCore;
use picoreg_core::arm::dp::CtrlStat;
use picoreg_core::arm::map::Csw;
use picoreg_core::rp::{RP2040_CHIP_ID, RP2040_CHIP_ID_ADDR, RP2040_IDCODE, RP2040_IDR};

use crate::protocol::{Direction, Line, LineDriver, WAKEUP_KEY};
use crate::transaction::{SwdOp, calculate_parity};
use crate::{ACK_FAULT, ACK_OK};

// High bits needed before a low bit counts as a line reset
const LINE_RESET_MIN_HIGH_BITS: u32 = 50;

const DP_DPIDR: u8 = 0x0;
const DP_CTRL_STAT: u8 = 0x4;
const DP_SELECT: u8 = 0x8;
const DP_RDBUFF: u8 = 0xC;

const AP_CSW: u8 = 0x00;
const AP_TAR: u8 = 0x04;
const AP_DRW: u8 = 0x0C;
const AP_IDR: u8 = 0xFC;

// What the target makes of the next bit the host drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Dormant,
    Lockout,
    Idle,
    Header { bits: u8, count: u8 },
    TargetSel { bits: u64, count: u8 },
    WriteData { op: SwdOp, bits: u64, count: u8 },
    Discard(u8),
}

/// A simulated RP2040 SWD target.
#[derive(Debug)]
pub struct SimTarget {
    // Host side of the lines
    clock_direction: Direction,
    data_direction: Direction,
    clock_high: bool,
    host_level: bool,

    // Protocol state
    phase: Phase,
    after_reset: bool,
    high_run: u32,
    alert_window: u128,
    response: VecDeque<bool>,

    // Identity
    target_core: TargetCore,
    idcode: u32,
    turnaround_bits: u8,

    // Registers
    ctrl_stat: u32,
    select: u32,
    rdbuff: u32,
    csw: u32,
    tar: u32,
    memory: BTreeMap<u32, u32>,

    // Fault injection
    injected: Vec<(SwdOp, u8)>,
    stuck_ack: Option<u8>,

    // Counters
    wakeups: u32,
    line_resets: u32,
    transactions: u32,
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTarget {
    /// A dormant RP2040, answering as core 0, with 1 bit turnarounds.
    pub fn new() -> Self {
        let mut memory = BTreeMap::new();
        memory.insert(RP2040_CHIP_ID_ADDR, RP2040_CHIP_ID);
        Self {
            clock_direction: Direction::Input,
            data_direction: Direction::Input,
            clock_high: false,
            host_level: false,
            phase: Phase::Dormant,
            after_reset: false,
            high_run: 0,
            alert_window: 0,
            response: VecDeque::new(),
            target_core: TargetCore::Core0,
            idcode: RP2040_IDCODE.data(),
            turnaround_bits: 1,
            ctrl_stat: 0,
            select: 0,
            rdbuff: 0,
            csw: 0,
            tar: 0,
            memory,
            injected: Vec::new(),
            stuck_ack: None,
            wakeups: 0,
            line_resets: 0,
            transactions: 0,
        }
    }

    /// Answer to the TARGETSEL value of this core instead.
    pub fn with_target_core(mut self, core: TargetCore) -> Self {
        self.target_core = core;
        self
    }

    pub fn with_turnaround_bits(mut self, bits: u8) -> Self {
        self.turnaround_bits = bits;
        self
    }

    /// Sets a word of target memory.
    pub fn write_memory(&mut self, addr: u32, value: u32) {
        self.memory.insert(addr, value);
    }

    /// Reads a word of target memory.  Unset words read as zero.
    pub fn memory(&self, addr: u32) -> u32 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    /// Answers the next transaction matching `op` with `ack`, once.
    pub fn inject_ack(&mut self, op: SwdOp, ack: u8) {
        self.injected.push((op, ack));
    }

    /// Answers every transaction with `ack`, until cleared with `None`.
    pub fn set_stuck_ack(&mut self, ack: Option<u8>) {
        self.stuck_ack = ack;
    }

    /// Number of selection alerts seen.
    pub fn wakeups(&self) -> u32 {
        self.wakeups
    }

    /// Number of line resets seen while awake.
    pub fn line_resets(&self) -> u32 {
        self.line_resets
    }

    /// Number of valid request headers received, TARGETSEL included.
    pub fn transactions(&self) -> u32 {
        self.transactions
    }

    /// True once the host has returned both lines to inputs.
    pub fn is_released(&self) -> bool {
        self.clock_direction == Direction::Input && self.data_direction == Direction::Input
    }

    pub fn is_selected(&self) -> bool {
        !matches!(self.phase, Phase::Dormant | Phase::Lockout)
    }

    fn powered(&self) -> bool {
        let req = CtrlStat::CDBGPWRUPREQ | CtrlStat::CSYSPWRUPREQ;
        self.ctrl_stat & req == req
    }

    // A rising clock edge: the host either drove a bit to us, or sampled
    // the one we were presenting.
    fn on_rising_edge(&mut self) {
        if self.data_direction == Direction::Output {
            self.on_host_bit(self.host_level);
        } else {
            self.high_run = 0;
            self.response.pop_front();
        }
    }

    fn on_host_bit(&mut self, bit: bool) {
        if !self.response.is_empty() {
            // Host took the line back mid-response
            trace!("Sim:   response abandoned");
            self.response.clear();
        }

        self.alert_window = (self.alert_window >> 1) | ((bit as u128) << 127);
        if self.alert_window == u128::from_le_bytes(WAKEUP_KEY) {
            debug!("Sim:   selection alert");
            self.wakeups += 1;
            self.phase = Phase::Lockout;
            return;
        }

        if bit {
            self.high_run += 1;
        } else {
            let run = self.high_run;
            self.high_run = 0;
            if run >= LINE_RESET_MIN_HIGH_BITS && self.phase != Phase::Dormant {
                debug!("Sim:   line reset");
                self.line_resets += 1;
                self.after_reset = true;
                self.phase = Phase::Idle;
                return;
            }
        }

        self.phase = match self.phase {
            Phase::Dormant => Phase::Dormant,
            Phase::Lockout => Phase::Lockout,
            Phase::Idle if bit => Phase::Header { bits: 1, count: 1 },
            Phase::Idle => Phase::Idle,
            Phase::Header { bits, count } => {
                let bits = bits | ((bit as u8) << count);
                if count + 1 < 8 {
                    Phase::Header {
                        bits,
                        count: count + 1,
                    }
                } else {
                    self.on_header(bits)
                }
            }
            Phase::TargetSel { bits, count } => {
                let bits = bits | ((bit as u64) << count);
                if count + 1 < 33 {
                    Phase::TargetSel {
                        bits,
                        count: count + 1,
                    }
                } else {
                    self.on_target_sel(bits)
                }
            }
            Phase::WriteData { op, bits, count } => {
                let bits = bits | ((bit as u64) << count);
                if count + 1 < 33 {
                    Phase::WriteData {
                        op,
                        bits,
                        count: count + 1,
                    }
                } else {
                    self.on_write_data(op, bits)
                }
            }
            Phase::Discard(1) => Phase::Idle,
            Phase::Discard(remaining) => Phase::Discard(remaining - 1),
        };
    }

    fn on_header(&mut self, header: u8) -> Phase {
        let bit = |n: u8| (header >> n) & 1 == 1;
        let ap = bit(1);
        let read = bit(2);
        let addr = ((header >> 3) & 0b11) << 2;
        let parity = bit(5);
        let group = ((header >> 1) & 0xF) as u32;

        if bit(6) || !bit(7) || parity != calculate_parity(group) {
            debug!("Sim:   bad header {header:#04X}, lockout");
            return Phase::Lockout;
        }

        let op = SwdOp::new(ap, read, addr);
        self.transactions += 1;

        let after_reset = self.after_reset;
        self.after_reset = false;

        if after_reset && op == SwdOp::DpWrite(0xC) {
            // TARGETSEL: nobody drives the ack
            return Phase::TargetSel { bits: 0, count: 0 };
        }

        let ack = self.ack_for(op);
        trace!("Sim:   {op} ack {ack}");
        self.queue_turnaround();
        self.queue_bits(ack as u64, 3);

        if ack != ACK_OK {
            if read {
                return Phase::Idle;
            }
            self.queue_turnaround();
            return Phase::Discard(33);
        }

        if read {
            let value = self.read_register(op);
            self.queue_bits(value as u64, 32);
            self.response.push_back(calculate_parity(value));
            self.queue_turnaround();
            Phase::Idle
        } else {
            self.queue_turnaround();
            Phase::WriteData {
                op,
                bits: 0,
                count: 0,
            }
        }
    }

    fn on_target_sel(&mut self, bits: u64) -> Phase {
        let value = bits as u32;
        let parity = (bits >> 32) & 1 == 1;
        if parity == calculate_parity(value) && value == self.target_core.target_sel().value() {
            debug!("Sim:   selected by TARGETSEL {value:#010X}");
            Phase::Idle
        } else {
            debug!("Sim:   not selected by TARGETSEL {value:#010X}");
            Phase::Lockout
        }
    }

    fn on_write_data(&mut self, op: SwdOp, bits: u64) -> Phase {
        let value = bits as u32;
        let parity = (bits >> 32) & 1 == 1;
        if parity != calculate_parity(value) {
            debug!("Sim:   write data parity error");
            self.ctrl_stat |= CtrlStat::WDATAERR;
            return Phase::Idle;
        }
        self.write_register(op, value);
        Phase::Idle
    }

    fn ack_for(&mut self, op: SwdOp) -> u8 {
        if let Some(ack) = self.stuck_ack {
            return ack;
        }
        if let Some(pos) = self.injected.iter().position(|(inj, _)| *inj == op) {
            let (_, ack) = self.injected.remove(pos);
            return ack;
        }
        if op.is_ap() && !self.powered() {
            return ACK_FAULT;
        }
        ACK_OK
    }

    fn queue_turnaround(&mut self) {
        for _ in 0..self.turnaround_bits {
            self.response.push_back(true);
        }
    }

    fn queue_bits(&mut self, value: u64, count: u32) {
        for ii in 0..count {
            self.response.push_back((value >> ii) & 1 == 1);
        }
    }

    fn ap_addr(&self, addr: u8) -> u8 {
        let bank = ((self.select >> 4) & 0xF) as u8;
        (bank << 4) | addr
    }

    fn read_register(&mut self, op: SwdOp) -> u32 {
        match op {
            SwdOp::DpRead(DP_DPIDR) => self.idcode,
            SwdOp::DpRead(DP_CTRL_STAT) => {
                let mut value = self.ctrl_stat;
                if value & CtrlStat::CDBGPWRUPREQ != 0 {
                    value |= CtrlStat::CDBGPWRUPACK;
                }
                if value & CtrlStat::CSYSPWRUPREQ != 0 {
                    value |= CtrlStat::CSYSPWRUPACK;
                }
                value
            }
            SwdOp::DpRead(DP_RDBUFF) => self.rdbuff,
            SwdOp::DpRead(_) => 0,
            SwdOp::ApRead(addr) => {
                // Posted: return the previous result, latch this one
                let value = self.read_ap(self.ap_addr(addr));
                core::mem::replace(&mut self.rdbuff, value)
            }
            SwdOp::DpWrite(_) | SwdOp::ApWrite(_) => 0,
        }
    }

    fn read_ap(&mut self, addr: u8) -> u32 {
        match addr {
            AP_CSW => self.csw,
            AP_TAR => self.tar,
            AP_DRW => {
                let value = self.memory(self.tar);
                self.increment_tar();
                value
            }
            AP_IDR => RP2040_IDR.value(),
            _ => 0,
        }
    }

    fn write_register(&mut self, op: SwdOp, value: u32) {
        match op {
            SwdOp::DpWrite(DP_DPIDR) => {
                // ABORT: clear the sticky flags asked for
                if value & (1 << 1) != 0 {
                    self.ctrl_stat &= !CtrlStat::STICKYCMP;
                }
                if value & (1 << 2) != 0 {
                    self.ctrl_stat &= !CtrlStat::STICKYERR;
                }
                if value & (1 << 3) != 0 {
                    self.ctrl_stat &= !CtrlStat::WDATAERR;
                }
                if value & (1 << 4) != 0 {
                    self.ctrl_stat &= !CtrlStat::STICKYORUN;
                }
            }
            SwdOp::DpWrite(DP_CTRL_STAT) => self.ctrl_stat = value,
            SwdOp::DpWrite(DP_SELECT) => self.select = value,
            SwdOp::DpWrite(_) => (),
            SwdOp::ApWrite(addr) => match self.ap_addr(addr) {
                AP_CSW => self.csw = value,
                AP_TAR => self.tar = value,
                AP_DRW => {
                    self.memory.insert(self.tar, value);
                    self.increment_tar();
                }
                _ => (),
            },
            SwdOp::DpRead(_) | SwdOp::ApRead(_) => (),
        }
    }

    fn increment_tar(&mut self) {
        if Csw::from(self.csw).addrinc() == Csw::ADDRINC_SINGLE {
            self.tar = self.tar.wrapping_add(4);
        }
    }
}

impl LineDriver for SimTarget {
    fn configure(&mut self, line: Line, direction: Direction) {
        match line {
            Line::Clock => self.clock_direction = direction,
            Line::Data => self.data_direction = direction,
        }
    }

    fn set_level(&mut self, line: Line, high: bool) {
        match line {
            Line::Clock => {
                let rising = high && !self.clock_high;
                self.clock_high = high;
                if rising {
                    self.on_rising_edge();
                }
            }
            Line::Data => self.host_level = high,
        }
    }

    fn read_level(&mut self, line: Line) -> bool {
        match line {
            // Undriven SWDIO is pulled up
            Line::Data => self.response.front().copied().unwrap_or(true),
            Line::Clock => self.clock_high,
        }
    }
}
