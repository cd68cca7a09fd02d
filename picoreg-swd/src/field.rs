// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD Frame Field Codec
//!
//! Every part of an SWD transaction - the header, the acknowledgement, the
//! turnaround gaps and the data word - is a [`Frame`]: an ordered list of
//! named, fixed-width [`BitField`]s.  A frame is either driven by us, in
//! which case its field values go out on the wire, or sampled from the
//! target, in which case placeholders go out and the values are filled in
//! from the sampled bits afterwards.
//!
//! Fields go out in declaration order, each one LSB first.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::SwdError;
use crate::protocol::{LineState, push_bits};

/// One named field of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    name: &'static str,
    width: u32,
    value: u32,
}

impl BitField {
    /// Creates a field.  `width` must be between 1 and 32 bits.
    pub const fn new(name: &'static str, width: u32, value: u32) -> Self {
        assert!(width >= 1 && width <= 32);
        Self { name, width, value }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    fn mask(&self) -> u32 {
        u32::MAX >> (32 - self.width)
    }

    fn fits(&self, value: u32) -> bool {
        value & !self.mask() == 0
    }
}

/// Whether a frame's bits come from us or from the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    Driven,
    Sampled,
}

/// A fixed sequence of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    fields: Vec<BitField>,
    mode: FrameMode,
}

impl Frame {
    pub fn new(fields: &[BitField], mode: FrameMode) -> Self {
        Self {
            fields: fields.to_vec(),
            mode,
        }
    }

    /// The 8-bit request header.  Start, Stop and Park are fixed; APnDP,
    /// RnW, Addr and Parity are filled in per transaction.
    pub fn header() -> Self {
        Self::new(
            &[
                BitField::new("Start", 1, 1),
                BitField::new("APnDP", 1, 0),
                BitField::new("RnW", 1, 0),
                BitField::new("Addr", 2, 0),
                BitField::new("Parity", 1, 0),
                BitField::new("Stop", 1, 0),
                BitField::new("Park", 1, 1),
            ],
            FrameMode::Driven,
        )
    }

    /// The 3-bit acknowledgement, always sampled.
    pub fn ack() -> Self {
        Self::new(&[BitField::new("ack", 3, 0)], FrameMode::Sampled)
    }

    /// A turnaround gap of `width` bits, sampled and ignored.
    pub fn turnaround(width: u32) -> Self {
        Self::new(&[BitField::new("turn", width, 0)], FrameMode::Sampled)
    }

    /// A 32-bit value followed by its parity bit.  Driven for writes,
    /// sampled for reads.
    pub fn data_word(mode: FrameMode) -> Self {
        Self::new(
            &[BitField::new("value", 32, 0), BitField::new("parity", 1, 0)],
            mode,
        )
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FrameMode) {
        self.mode = mode;
    }

    pub fn is_sampled(&self) -> bool {
        self.mode == FrameMode::Sampled
    }

    pub fn fields(&self) -> &[BitField] {
        &self.fields
    }

    /// Total width in bits.
    pub fn width(&self) -> u32 {
        self.fields.iter().map(BitField::width).sum()
    }

    /// Returns the named field's value, or `None` for an unknown name.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(BitField::value)
    }

    /// Sets the named field.  Fails with [`SwdError::Api`] for an unknown
    /// name, or a value which doesn't fit in the field.
    pub fn set(&mut self, name: &str, value: u32) -> Result<(), SwdError> {
        let field = self
            .fields
            .iter_mut()
            .find(|field| field.name == name)
            .ok_or(SwdError::Api)?;
        if !field.fits(value) {
            return Err(SwdError::Api);
        }
        field.value = value;
        Ok(())
    }

    /// Appends this frame to a bit plan: the field values if driven,
    /// placeholders to be sampled if not.
    pub fn encode(&self, plan: &mut Vec<LineState>) {
        for field in &self.fields {
            match self.mode {
                FrameMode::Driven => push_bits(plan, field.value as u64, field.width),
                FrameMode::Sampled => {
                    plan.extend((0..field.width).map(|_| LineState::Input));
                }
            }
        }
    }

    /// Fills in the field values from sampled bits, and returns how many
    /// bits were consumed.  A driven frame consumes nothing and keeps its
    /// values.  Missing bits read as zero.
    pub fn decode(&mut self, sampled: &[bool]) -> usize {
        if self.mode == FrameMode::Driven {
            return 0;
        }

        let mut bits = sampled.iter();
        for field in self.fields.iter_mut() {
            let mut value = 0u32;
            for ii in 0..field.width {
                if bits.next().copied().unwrap_or(false) {
                    value |= 1 << ii;
                }
            }
            field.value = value;
        }
        self.width() as usize
    }

    /// Returns `" Name=value"` for each field.  Fields of under 8 bits are
    /// shown in decimal, wider ones in hex.
    pub fn field_values(&self) -> String {
        let mut out = String::new();
        for field in &self.fields {
            if field.width < 8 {
                let _ = write!(out, " {}={}", field.name, field.value);
            } else {
                let _ = write!(out, " {}=0x{:x}", field.name, field.value);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_widths() {
        assert_eq!(Frame::header().width(), 8);
        assert_eq!(Frame::ack().width(), 3);
        assert_eq!(Frame::turnaround(1).width(), 1);
        assert_eq!(Frame::turnaround(3).width(), 3);
        assert_eq!(Frame::data_word(FrameMode::Driven).width(), 33);
    }

    #[test]
    fn encode_driven_lsb_first_in_declaration_order() {
        let mut frame = Frame::header();
        frame.set("APnDP", 1).unwrap();
        frame.set("Addr", 0b10).unwrap();

        let mut plan = Vec::new();
        frame.encode(&mut plan);
        use LineState::{High as H, Low as L};
        // Start APnDP RnW Addr[0] Addr[1] Parity Stop Park
        assert_eq!(plan, vec![H, H, L, L, H, L, L, H]);
    }

    #[test]
    fn encode_sampled_emits_placeholders() {
        let mut plan = Vec::new();
        Frame::ack().encode(&mut plan);
        assert_eq!(plan, vec![LineState::Input; 3]);
    }

    #[test]
    fn decode_consumes_exact_width() {
        let mut data = Frame::data_word(FrameMode::Sampled);
        let mut sampled = vec![false; 40];
        sampled[0] = true;
        sampled[31] = true;
        sampled[32] = true;
        sampled[33] = true; // belongs to whatever follows

        assert_eq!(data.decode(&sampled), 33);
        assert_eq!(data.get("value"), Some(0x8000_0001));
        assert_eq!(data.get("parity"), Some(1));
    }

    #[test]
    fn decode_driven_is_a_no_op() {
        let mut data = Frame::data_word(FrameMode::Driven);
        data.set("value", 0x1234_5678).unwrap();
        assert_eq!(data.decode(&[true; 33]), 0);
        assert_eq!(data.get("value"), Some(0x1234_5678));
    }

    #[test]
    fn encode_then_decode_restores_values() {
        let mut driven = Frame::header();
        driven.set("APnDP", 1).unwrap();
        driven.set("RnW", 1).unwrap();
        driven.set("Addr", 3).unwrap();
        driven.set("Parity", 1).unwrap();

        let mut plan = Vec::new();
        driven.encode(&mut plan);
        let bits: Vec<bool> = plan.iter().map(|state| *state == LineState::High).collect();

        let mut sampled = Frame::header();
        sampled.set_mode(FrameMode::Sampled);
        assert_eq!(sampled.decode(&bits), 8);
        assert_eq!(sampled.fields(), driven.fields());
    }

    // Drives `values` through a copy of `shape`, then decodes the bits into
    // a zeroed sampled copy.
    fn assert_round_trip(shape: &Frame, values: &[u32]) {
        let mut driven = shape.clone();
        driven.set_mode(FrameMode::Driven);
        let mut sampled = shape.clone();
        sampled.set_mode(FrameMode::Sampled);
        for (field, value) in shape.fields().iter().zip(values) {
            let mask = u32::MAX >> (32 - field.width());
            driven.set(field.name(), value & mask).unwrap();
            sampled.set(field.name(), 0).unwrap();
        }

        let mut plan = Vec::new();
        driven.encode(&mut plan);
        assert_eq!(plan.len() as u32, shape.width());
        let bits: Vec<bool> = plan.iter().map(|state| *state == LineState::High).collect();

        assert_eq!(sampled.decode(&bits) as u32, shape.width());
        assert_eq!(sampled.fields(), driven.fields());
    }

    #[test]
    fn every_frame_shape_round_trips() {
        let mut shapes = vec![Frame::header(), Frame::ack(), Frame::data_word(FrameMode::Sampled)];
        shapes.extend((1..=4).map(Frame::turnaround));

        for shape in &shapes {
            let count = shape.fields().len();
            for pattern in [0, u32::MAX, 0xA5A5_A5A5, 0x5A5A_5A5A] {
                assert_round_trip(shape, &vec![pattern; count]);
            }
            for bit in 0..32 {
                assert_round_trip(shape, &vec![1 << bit; count]);
            }
            // A different single bit in each field
            let staggered: Vec<u32> = shape
                .fields()
                .iter()
                .enumerate()
                .map(|(i, field)| 1 << (i as u32 % field.width()))
                .collect();
            assert_round_trip(shape, &staggered);
        }
    }

    #[test]
    fn set_rejects_bad_names_and_wide_values() {
        let mut frame = Frame::header();
        assert_eq!(frame.set("Addr", 4), Err(SwdError::Api));
        assert_eq!(frame.set("Nope", 0), Err(SwdError::Api));
        assert_eq!(frame.get("Nope"), None);

        let mut data = Frame::data_word(FrameMode::Driven);
        assert_eq!(data.set("value", u32::MAX), Ok(()));
    }

    #[test]
    fn field_values_text() {
        let mut data = Frame::data_word(FrameMode::Driven);
        data.set("value", 0xbc12477).unwrap();
        assert_eq!(data.field_values(), " value=0xbc12477 parity=0");
        assert_eq!(
            Frame::header().field_values(),
            " Start=1 APnDP=0 RnW=0 Addr=0 Parity=0 Stop=0 Park=1"
        );
    }
}
