// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD Transactions
//!
//! A [`Transaction`] is one complete SWD read or write: the request header,
//! the acknowledgement from the target, the turnaround gaps where the data
//! line changes hands, and the 32-bit data word with its parity bit.
//!
//! ```text
//! Write: Header > Turn > Ack > Turn > Data (driven)
//! Read:  Header > Turn > Ack > Data (sampled) > Turn
//! ```
//!
//! The whole transaction is encoded into a single bit plan, transferred in
//! one go, and then decoded and checked.  See
//! [`SwdInterface::execute`](crate::SwdInterface::execute).

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::SwdError;
use crate::field::{Frame, FrameMode};
use crate::protocol::LineState;

/// Used to create SWD operations
///
/// The address is the register's byte address within its bank.  Only bits 2
/// and 3 go out on the wire as the header's Addr field.
///
/// The header is sent LSB first:
///
/// Bit 0: Start (1)
/// Bit 1: APnDP
/// Bit 2: RnW
/// Bit 3: A2
/// Bit 4: A3
/// Bit 5: Parity
/// Bit 6: Stop (0)
/// Bit 7: Park (1)
///
/// Create using `SwdOp::DpRead(0x0)`, `SwdOp::ApWrite(0x4)`, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwdOp {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

impl SwdOp {
    pub fn new(access_port: bool, read: bool, addr: u8) -> Self {
        match (access_port, read) {
            (false, true) => SwdOp::DpRead(addr),
            (false, false) => SwdOp::DpWrite(addr),
            (true, true) => SwdOp::ApRead(addr),
            (true, false) => SwdOp::ApWrite(addr),
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, SwdOp::DpRead(_) | SwdOp::ApRead(_))
    }

    pub fn is_ap(&self) -> bool {
        matches!(self, SwdOp::ApRead(_) | SwdOp::ApWrite(_))
    }

    pub fn addr(&self) -> u8 {
        match self {
            SwdOp::DpRead(a) | SwdOp::DpWrite(a) | SwdOp::ApRead(a) | SwdOp::ApWrite(a) => *a,
        }
    }

    /// The 2-bit Addr field of the header: A[3:2]
    pub fn wire_addr(&self) -> u8 {
        (self.addr() >> 2) & 0b11
    }

    /// Odd parity over APnDP, RnW, A2 and A3.
    pub fn header_parity(&self) -> bool {
        let bits = (self.is_ap() as u32)
            | ((self.is_read() as u32) << 1)
            | ((self.wire_addr() as u32) << 2);
        calculate_parity(bits)
    }
}

impl fmt::Display for SwdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdOp::DpRead(a) => write!(f, "DP Read 0x{a:02X}"),
            SwdOp::DpWrite(a) => write!(f, "DP Write 0x{a:02X}"),
            SwdOp::ApRead(a) => write!(f, "AP Read 0x{a:02X}"),
            SwdOp::ApWrite(a) => write!(f, "AP Write 0x{a:02X}"),
        }
    }
}

/// Parity of a 32-bit value: true if an odd number of bits are set.
pub fn calculate_parity(value: u32) -> bool {
    let mut v = value;
    v ^= v >> 16;
    v ^= v >> 8;
    v ^= v >> 4;
    v ^= v >> 2;
    v ^= v >> 1;
    (v & 1) == 1
}

/// A single SWD read or write, with its frames.
///
/// Created by [`Transaction::read`] and [`Transaction::write`] (or the
/// [`SwdInterface`](crate::SwdInterface) `begin_` functions), executed by
/// [`SwdInterface::execute`](crate::SwdInterface::execute).  After execution
/// the sampled fields hold what the target sent back.
#[derive(Debug, Clone)]
pub struct Transaction {
    op: SwdOp,
    header: Frame,
    turn1: Frame,
    ack: Frame,
    turn2: Frame,
    data: Frame,
    label: &'static str,
}

impl Transaction {
    fn new(op: SwdOp, value: u32, turnaround_bits: u32) -> Self {
        let mut header = Frame::header();
        // Single-bit and 2-bit fields, always in range
        let _ = header.set("APnDP", op.is_ap() as u32);
        let _ = header.set("RnW", op.is_read() as u32);
        let _ = header.set("Addr", op.wire_addr() as u32);
        let _ = header.set("Parity", op.header_parity() as u32);

        let mut data = if op.is_read() {
            Frame::data_word(FrameMode::Sampled)
        } else {
            Frame::data_word(FrameMode::Driven)
        };
        let _ = data.set("value", value);
        let _ = data.set("parity", calculate_parity(value) as u32);

        Self {
            op,
            header,
            turn1: Frame::turnaround(turnaround_bits),
            ack: Frame::ack(),
            turn2: Frame::turnaround(turnaround_bits),
            data,
            label: "",
        }
    }

    /// A read of the given DP or AP register address.
    pub fn read(access_port: bool, addr: u8, turnaround_bits: u32) -> Self {
        Self::new(SwdOp::new(access_port, true, addr), 0, turnaround_bits)
    }

    /// A write of `value` to the given DP or AP register address.
    pub fn write(access_port: bool, addr: u8, value: u32, turnaround_bits: u32) -> Self {
        Self::new(SwdOp::new(access_port, false, addr), value, turnaround_bits)
    }

    /// Attaches a description, shown in verbose output.
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn op(&self) -> SwdOp {
        self.op
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The frames, in the order they go out on the wire.
    pub fn frames(&self) -> [&Frame; 5] {
        if self.op.is_read() {
            [
                &self.header,
                &self.turn1,
                &self.ack,
                &self.data,
                &self.turn2,
            ]
        } else {
            [
                &self.header,
                &self.turn1,
                &self.ack,
                &self.turn2,
                &self.data,
            ]
        }
    }

    fn frames_mut(&mut self) -> [&mut Frame; 5] {
        if self.op.is_read() {
            [
                &mut self.header,
                &mut self.turn1,
                &mut self.ack,
                &mut self.data,
                &mut self.turn2,
            ]
        } else {
            [
                &mut self.header,
                &mut self.turn1,
                &mut self.ack,
                &mut self.turn2,
                &mut self.data,
            ]
        }
    }

    /// Total length of the transaction in clock cycles.
    pub fn width(&self) -> u32 {
        self.frames().iter().map(|frame| frame.width()).sum()
    }

    /// Encodes every frame into one bit plan.
    pub fn plan(&self) -> Vec<LineState> {
        let mut plan = Vec::with_capacity(self.width() as usize);
        for frame in self.frames() {
            frame.encode(&mut plan);
        }
        plan
    }

    /// Decodes the sampled frames from the bits returned by the transfer.
    /// `sampled` holds only the sampled bits, in wire order.
    pub fn absorb(&mut self, sampled: &[bool]) {
        let mut offset = 0;
        for frame in self.frames_mut() {
            let remaining = sampled.get(offset..).unwrap_or(&[]);
            offset += frame.decode(remaining);
        }
    }

    /// The acknowledgement received.
    pub fn ack(&self) -> u8 {
        self.ack.get("ack").unwrap_or(0) as u8
    }

    /// The data word: the value written, or the value read.
    pub fn value(&self) -> u32 {
        self.data.get("value").unwrap_or(0)
    }

    fn parity_ok(&self) -> bool {
        let parity = self.data.get("parity").unwrap_or(0) == 1;
        parity == calculate_parity(self.value())
    }

    /// Validates a completed transaction: the ack must be OK and, for reads,
    /// the data parity must match.
    pub fn check(&self) -> Result<(), SwdError> {
        SwdError::from_ack(self.ack())?;
        if self.op.is_read() && !self.parity_ok() {
            return Err(SwdError::ReadParity);
        }
        Ok(())
    }

    /// The header as it appears on the wire, bit 0 first.
    pub fn header_byte(&self) -> u8 {
        let mut byte = 0u32;
        let mut shift = 0;
        for field in self.header.fields() {
            byte |= field.value() << shift;
            shift += field.width();
        }
        byte as u8
    }

    /// Every field of the header, ack and data frames, for diagnostics.
    pub fn field_values(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.header.field_values());
        out.push_str(&self.ack.field_values());
        out.push_str(&self.data.field_values());
        String::from(out.trim_start())
    }
}

/// Formats the one-line summary used for verbose output, for example:
///
/// `Rd DP 0 0x0bc12477 OK  Read DPIDR`
impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.op.is_read() { "Rd" } else { "Wr" };
        let port = if self.op.is_ap() { "AP" } else { "DP" };
        let addr = self.op.wire_addr() << 2;
        write!(f, "{dir} {port} {addr:X} 0x{:08x} ", self.value())?;
        match self.check() {
            Ok(()) => write!(f, "OK")?,
            Err(SwdError::ReadParity) => write!(f, "Parity")?,
            Err(_) => write!(f, "Ack {}", self.ack())?,
        }
        write!(f, "  {}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ACK_FAULT, ACK_OK, ACK_WAIT};

    // Builds the sampled bits a target would return for a transaction.
    fn response(txn: &Transaction, ack: u8, data: u32, parity: bool) -> Vec<bool> {
        let mut bits = Vec::new();
        let turn = txn.turn1.width();
        bits.extend((0..turn).map(|_| true));
        bits.extend((0..3).map(|ii| (ack >> ii) & 1 == 1));
        if txn.op().is_read() {
            bits.extend((0..32).map(|ii| (data >> ii) & 1 == 1));
            bits.push(parity);
        }
        bits.extend((0..turn).map(|_| true));
        bits
    }

    #[test]
    fn parity_matches_popcount() {
        let values = [
            0,
            u32::MAX,
            1,
            0x8000_0000,
            0x0BC1_2477,
            0xA200_0012,
            0x5000_0001,
            0x1234_5678,
            0xDEAD_BEEF,
        ];
        for value in values {
            assert_eq!(calculate_parity(value), value.count_ones() % 2 == 1, "{value:#x}");
        }
        for bit in 0..32 {
            assert!(calculate_parity(1 << bit));
        }
    }

    #[test]
    fn header_bytes() {
        assert_eq!(Transaction::read(false, 0x0, 1).header_byte(), 0xA5);
        assert_eq!(Transaction::write(false, 0x0, 0x1E, 1).header_byte(), 0x81);
        assert_eq!(Transaction::read(false, 0x4, 1).header_byte(), 0x8D);
        assert_eq!(Transaction::write(false, 0x8, 0, 1).header_byte(), 0xB1);
        assert_eq!(Transaction::read(true, 0xC, 1).header_byte(), 0x9F);
        assert_eq!(Transaction::read(true, 0xFC, 1).header_byte(), 0x9F);
    }

    #[test]
    fn header_parity_makes_even_group() {
        for ap in [false, true] {
            for read in [false, true] {
                for addr in [0x0, 0x4, 0x8, 0xC] {
                    let header = Transaction::new(SwdOp::new(ap, read, addr), 0, 1).header_byte();
                    // APnDP, RnW, A2, A3 and Parity are bits 1 to 5
                    let group = (header >> 1) & 0x1F;
                    assert_eq!(group.count_ones() % 2, 0, "{ap} {read} {addr:#x}");
                    assert_eq!(header & 0xC1, 0x81);
                }
            }
        }
    }

    #[test]
    fn read_places_data_before_second_turnaround() {
        let txn = Transaction::read(false, 0, 1);
        let plan = txn.plan();
        assert_eq!(plan.len(), 8 + 1 + 3 + 33 + 1);
        assert!(plan[..8].iter().all(|state| !state.is_input()));
        assert!(plan[8..].iter().all(|state| state.is_input()));

        let frames = txn.frames();
        assert_eq!(frames[3].width(), 33);
        assert_eq!(frames[4].width(), 1);
    }

    #[test]
    fn write_places_data_after_second_turnaround() {
        let txn = Transaction::write(true, 0x4, 0xD000_0004, 2);
        let plan = txn.plan();
        assert_eq!(plan.len(), 8 + 2 + 3 + 2 + 33);
        assert!(plan[8..15].iter().all(|state| state.is_input()));
        assert!(plan[15..].iter().all(|state| !state.is_input()));

        // Value LSB first, then parity
        let value: u32 = plan[15..47]
            .iter()
            .enumerate()
            .map(|(ii, state)| ((*state == LineState::High) as u32) << ii)
            .sum();
        assert_eq!(value, 0xD000_0004);
        assert_eq!(plan[47], LineState::Low);
    }

    #[test]
    fn check_ok_read() {
        let mut txn = Transaction::read(false, 0, 1);
        let bits = response(&txn, ACK_OK, 0x0BC1_2477, calculate_parity(0x0BC1_2477));
        txn.absorb(&bits);
        assert_eq!(txn.ack(), ACK_OK);
        assert_eq!(txn.value(), 0x0BC1_2477);
        assert_eq!(txn.check(), Ok(()));
    }

    #[test]
    fn check_read_parity_error() {
        let mut txn = Transaction::read(false, 0, 1);
        let bits = response(&txn, ACK_OK, 0x0BC1_2477, !calculate_parity(0x0BC1_2477));
        txn.absorb(&bits);
        assert_eq!(txn.check(), Err(SwdError::ReadParity));
    }

    #[test]
    fn check_bad_acks() {
        for (ack, err) in [
            (ACK_WAIT, SwdError::WaitAck),
            (ACK_FAULT, SwdError::FaultAck),
            (7, SwdError::NoAck(7)),
        ] {
            let mut txn = Transaction::write(false, 0x8, 0xF0, 1);
            txn.absorb(&response(&txn, ack, 0, false));
            assert_eq!(txn.check(), Err(err));
            // The written value is kept
            assert_eq!(txn.value(), 0xF0);
        }
    }

    #[test]
    fn write_ignores_data_parity() {
        let mut txn = Transaction::write(false, 0x4, 0x5000_0001, 1);
        txn.absorb(&response(&txn, ACK_OK, 0, false));
        assert_eq!(txn.check(), Ok(()));
    }

    #[test]
    fn verbose_line() {
        let mut txn = Transaction::read(false, 0, 1).with_label("Read DPIDR");
        let bits = response(&txn, ACK_OK, 0x0BC1_2477, calculate_parity(0x0BC1_2477));
        txn.absorb(&bits);
        assert_eq!(format!("{txn}"), "Rd DP 0 0x0bc12477 OK  Read DPIDR");

        let mut txn = Transaction::read(true, 0xFC, 1).with_label("Read AP addr 0xFC");
        txn.absorb(&response(&txn, ACK_FAULT, 0, false));
        assert_eq!(format!("{txn}"), "Rd AP C 0x00000000 Ack 4  Read AP addr 0xFC");

        let mut txn = Transaction::read(false, 0xC, 1);
        txn.absorb(&response(&txn, ACK_OK, 3, true));
        assert_eq!(format!("{txn}"), "Rd DP C 0x00000003 Parity  ");
    }

    #[test]
    fn field_dump() {
        let mut txn = Transaction::read(false, 0, 1);
        let bits = response(&txn, ACK_OK, 0x0BC1_2477, calculate_parity(0x0BC1_2477));
        txn.absorb(&bits);
        assert_eq!(
            txn.field_values(),
            "Start=1 APnDP=0 RnW=1 Addr=0 Parity=1 Stop=0 Park=1 ack=1 value=0xbc12477 parity=0"
        );
    }
}
