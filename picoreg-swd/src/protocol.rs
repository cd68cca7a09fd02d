// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Wire Protocol Implementation
//!
//! This module turns a plan of bits - some driven by us, some to be sampled
//! from the target - into clock and data line operations.  The lines are
//! reached through the [`LineDriver`] trait, which the application provides.
//!
//! It also holds the fixed wake-up and line-reset sequences.

use alloc::vec::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

// 8+ cycles with SWDIO high to begin exiting dormant mode
const DORMANT_EXIT_PREFIX: u8 = 0xFF;

/// Selection alert sequence, IHI 0031 B5.3.4.  Sent byte-wise LSB first.
pub const WAKEUP_KEY: [u8; 16] = [
    0x92, 0xF3, 0x09, 0x62, 0x95, 0x2D, 0x85, 0x86, 0xE9, 0xAF, 0xDD, 0xE3, 0xA2, 0x0E, 0xBC, 0x19,
];

// 4 cycles with SWDIO low to complete exiting dormant mode
const DORMANT_EXIT_IDLE_CYCLES: u32 = 4;

// Defined as 0b01011000 MSB, or 0b00011010 LSB first
pub const SWD_ACTIVATION_CODE: u8 = 0x1A;

// 50+ clock cycles with SWDIO high, then 2+ with SWDIO low.  Whole bytes.
const LINE_RESET_SEQUENCE: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// The two SWD lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// SWCLK, always driven by us
    Clock,

    /// SWDIO, driven by whichever side owns the current bit
    Data,
}

/// Line direction, from our point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We drive the line
    Output,

    /// We sample the line
    Input,
}

/// The line-level capability the engine is built on, typically a pair of
/// GPIO pins.
///
/// Implementations need do no more than touch the hardware.  All protocol
/// ordering and bit timing is decided by [`SwdProtocol`]; any delay needed
/// to keep the clock within the target's limits belongs in `set_level`.
pub trait LineDriver {
    /// Set a line as driven output or sampled input
    fn configure(&mut self, line: Line, direction: Direction);

    /// Drive a logic level onto a line
    fn set_level(&mut self, line: Line, high: bool);

    /// Sample the current logic level of a line
    fn read_level(&mut self, line: Line) -> bool;
}

impl<T: LineDriver + ?Sized> LineDriver for &mut T {
    fn configure(&mut self, line: Line, direction: Direction) {
        (**self).configure(line, direction)
    }

    fn set_level(&mut self, line: Line, high: bool) {
        (**self).set_level(line, high)
    }

    fn read_level(&mut self, line: Line) -> bool {
        (**self).read_level(line)
    }
}

/// One entry of a bit plan: the data line state for a single clock cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Drive SWDIO low
    Low,

    /// Drive SWDIO high
    High,

    /// Leave SWDIO to the target and sample it
    Input,
}

impl LineState {
    pub fn from_bit(bit: bool) -> Self {
        if bit { LineState::High } else { LineState::Low }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, LineState::Input)
    }
}

/// Appends `count` bits of `data`, LSB first, as driven bits.
pub fn push_bits(plan: &mut Vec<LineState>, data: u64, count: u32) {
    plan.extend((0..count).map(|ii| LineState::from_bit((data >> ii) & 1 == 1)));
}

/// Appends each byte, LSB first, as driven bits.
pub fn push_bytes(plan: &mut Vec<LineState>, data: &[u8]) {
    for &byte in data {
        push_bits(plan, byte as u64, 8);
    }
}

/// The dormant-to-SWD sequence: 8 high bits, the selection alert sequence,
/// 4 idle low bits, then the SW-DP activation code.
pub fn dormant_exit_plan() -> Vec<LineState> {
    let mut plan = Vec::with_capacity(8 + 128 + 4 + 8);
    push_bytes(&mut plan, &[DORMANT_EXIT_PREFIX]);
    push_bytes(&mut plan, &WAKEUP_KEY);
    push_bits(&mut plan, 0, DORMANT_EXIT_IDLE_CYCLES);
    push_bytes(&mut plan, &[SWD_ACTIVATION_CODE]);
    plan
}

/// The line reset: 56 high bits then 8 low bits.
pub fn line_reset_plan() -> Vec<LineState> {
    let mut plan = Vec::with_capacity(LINE_RESET_SEQUENCE.len() * 8);
    push_bytes(&mut plan, &LINE_RESET_SEQUENCE);
    plan
}

/// SWD Protocol object
///
/// This is used by [`SwdInterface`](crate::SwdInterface) to clock bits to
/// and from the target.  Applications do not normally use it directly.
///
/// The data line direction is tracked, and only changed when a driven bit
/// follows a sampled one or vice versa.  Each bit ends with one clock pulse:
/// clock high, then clock low.
#[derive(Debug)]
pub struct SwdProtocol<D> {
    driver: D,
    data_direction: Direction,
    acquired: bool,
}

impl<D: LineDriver> SwdProtocol<D> {
    /// Create a new SWD protocol instance around a line driver.  The lines
    /// are not touched until [`Self::acquire()`].
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            data_direction: Direction::Input,
            acquired: false,
        }
    }

    /// Take ownership of the lines: SWCLK output low, SWDIO input.  We do not
    /// drive SWDIO until there is something to send.
    pub fn acquire(&mut self) {
        self.driver.configure(Line::Clock, Direction::Output);
        self.driver.set_level(Line::Clock, false);
        self.driver.configure(Line::Data, Direction::Input);
        self.data_direction = Direction::Input;
        self.acquired = true;
        debug!("SWD lines acquired, SWCLK output low, SWDIO input");
    }

    /// Give the lines back, leaving both as inputs.
    pub fn release(&mut self) {
        self.driver.configure(Line::Clock, Direction::Input);
        self.driver.configure(Line::Data, Direction::Input);
        self.data_direction = Direction::Input;
        self.acquired = false;
        debug!("SWD lines released");
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Clocks every entry of `plan` in order, and returns the bits sampled
    /// for the [`LineState::Input`] entries, in order.
    ///
    /// Nothing here can fail.  A stuck or floating line just produces wrong
    /// bits, which the acknowledgement and parity checks above catch.
    pub fn transmit_and_sample(&mut self, plan: &[LineState]) -> Vec<bool> {
        trace!(
            "Info:  Clocking {} bits, {} sampled",
            plan.len(),
            plan.iter().filter(|state| state.is_input()).count()
        );
        let mut sampled = Vec::new();
        for state in plan {
            match state {
                LineState::Input => sampled.push(self.read_bit()),
                LineState::Low => self.write_bit(false),
                LineState::High => self.write_bit(true),
            }
        }
        sampled
    }

    fn set_data_direction(&mut self, direction: Direction) {
        if self.data_direction != direction {
            self.driver.configure(Line::Data, direction);
            self.data_direction = direction;
        }
    }

    #[inline]
    fn clock(&mut self) {
        self.driver.set_level(Line::Clock, true);
        self.driver.set_level(Line::Clock, false);
    }

    #[inline]
    fn write_bit(&mut self, bit: bool) {
        self.set_data_direction(Direction::Output);
        self.driver.set_level(Line::Data, bit);
        self.clock();
    }

    #[inline]
    fn read_bit(&mut self) -> bool {
        self.set_data_direction(Direction::Input);
        let bit = self.driver.read_level(Line::Data);
        self.clock();
        bit
    }
}
