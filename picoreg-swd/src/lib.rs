// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! picoreg-swd library
//!
//! Bit-banged ARM Serial Wire Debug (SWD) protocol engine.
//!
//! This reads and writes registers inside a target microcontroller's debug
//! infrastructure using the
//! [ARM SWD protocol](https://developer.arm.com/documentation/ihi0031/latest/)
//! over two directly toggled lines - a clock and a bidirectional data line -
//! with no dedicated debug probe hardware.  The lines themselves are reached
//! through an injected [`LineDriver`], so the engine runs equally well
//! against GPIO pins or the [`sim`] target.
//!
//! It is `no_std` and requires an `alloc` implementation.
//!
//! The following diagram shows the key `picoreg-swd` concepts.
//!
//! ```text
//!      Application
//! ----------------------
//!     SwdConnection     \    wake, reset, power-up, retry
//! ----------------------  \
//!      SwdInterface        |--  SwdError
//! ----------------------   |
//!   Transaction / Frame   /    header, ack, turnaround, data fields
//! ----------------------  /
//!      SwdProtocol       /
//! ----------------------
//!   LineDriver (GPIO)   >======================<  SWD Target
//!                          SWDIO/SWCLK/GND
//! ```
//!
//! * [`SwdConnection`] owns the link: it wakes and resets the target, selects
//!   the target core, powers up the debug domain and wraps operations in a
//!   retry loop which re-establishes the whole session on any failure.
//! * [`SwdInterface`] assembles and executes single SWD transactions and
//!   validates their acknowledgement and parity.
//! * [`field`] packs and unpacks the fixed-width fields of each frame.
//! * [`SwdProtocol`] converts a plan of driven and sampled bits into line
//!   operations.
//!
//! ```rust,ignore
//! use picoreg_swd::{SwdConfig, SwdConnection};
//!
//! let mut conn = SwdConnection::new(gpio_driver, SwdConfig::default())?;
//! conn.open();
//! let gpio_in = conn.read_word(0xD000_0004)?;
//! conn.close();
//! ```

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod connection;
pub mod field;
pub mod interface;
pub mod protocol;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod transaction;

#[doc(inline)]
pub use crate::config::SwdConfig;
#[doc(inline)]
pub use crate::connection::SwdConnection;
#[doc(inline)]
pub use crate::interface::SwdInterface;
#[doc(inline)]
pub use crate::protocol::{LineDriver, SwdProtocol};
#[doc(inline)]
pub use crate::transaction::{SwdOp, Transaction};

extern crate alloc;
use alloc::format;
use alloc::string::String;
use core::fmt;
use serde::Serialize;

/// Acknowledgement codes returned by the target after the header phase.
pub const ACK_OK: u8 = 0b001;
pub const ACK_WAIT: u8 = 0b010;
pub const ACK_FAULT: u8 = 0b100;

/// Core error type used by all picoreg-swd objects
///
/// Only [`SwdConnection`] decides what to do about an error.  Every layer
/// below it reports the error upwards untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwdError {
    /// The target answered WAIT.  [`SwdConnection`] treats this like any
    /// other failed transaction and re-establishes the link.
    WaitAck,

    /// The target answered FAULT.
    FaultAck,

    /// The acknowledgement was none of OK, WAIT or FAULT.  The value received
    /// is included.  7 means the data line was high for the entire
    /// acknowledge phase - nobody drove it - which is what a deselected or
    /// desynchronized target looks like.
    NoAck(u8),

    /// The parity bit of a read data phase disagreed with the data.  The
    /// value read cannot be trusted.
    ReadParity,

    /// The operation needs an open, connected link.
    NotConnected,

    /// Establishing the connection failed - the DPIDR could not be read or
    /// the power-up handshake did not complete.  The failing step is
    /// included.
    ConnectFailed(String),

    /// The retry budget ran out without the operation succeeding.
    RetriesExhausted,

    /// The configuration is invalid.
    Config(String),

    /// The API was called incorrectly, for example with a field value too
    /// wide for its field.
    Api,
}

impl SwdError {
    pub(crate) fn from_ack(ack: u8) -> Result<(), SwdError> {
        match ack {
            ACK_OK => Ok(()),
            ACK_WAIT => Err(SwdError::WaitAck),
            ACK_FAULT => Err(SwdError::FaultAck),
            _ => Err(SwdError::NoAck(ack)),
        }
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwdError::WaitAck => "Wait ACK",
            SwdError::FaultAck => "Fault ACK",
            SwdError::NoAck(_) => "No ACK",
            SwdError::ReadParity => "Read Parity Error",
            SwdError::NotConnected => "Not Connected",
            SwdError::ConnectFailed(_) => "Connect Failed",
            SwdError::RetriesExhausted => "Retries Exhausted",
            SwdError::Config(_) => "Configuration Error",
            SwdError::Api => "API Error",
        }
    }
}

impl Serialize for SwdError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SwdError", 2)?;

        let kind = match self {
            SwdError::WaitAck => "wait ack",
            SwdError::FaultAck => "fault ack",
            SwdError::NoAck(_) => "no ack",
            SwdError::ReadParity => "read parity",
            SwdError::NotConnected => "not connected",
            SwdError::ConnectFailed(_) => "connect failed",
            SwdError::RetriesExhausted => "retries exhausted",
            SwdError::Config(_) => "config",
            SwdError::Api => "api error",
        };
        state.serialize_field("kind", kind)?;

        let detail = match self {
            SwdError::ConnectFailed(msg) | SwdError::Config(msg) => msg.clone(),
            SwdError::NoAck(code) => format!("{code}"),
            _ => String::new(),
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}

impl fmt::Display for SwdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdError::NoAck(ack) => write!(f, "{}: {ack}", self.as_str()),
            SwdError::ConnectFailed(msg) | SwdError::Config(msg) => {
                write!(f, "{}: {msg}", self.as_str())
            }
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_codes() {
        assert_eq!(SwdError::from_ack(1), Ok(()));
        assert_eq!(SwdError::from_ack(2), Err(SwdError::WaitAck));
        assert_eq!(SwdError::from_ack(4), Err(SwdError::FaultAck));
        assert_eq!(SwdError::from_ack(7), Err(SwdError::NoAck(7)));
        assert_eq!(SwdError::from_ack(0), Err(SwdError::NoAck(0)));
    }

    #[test]
    fn serializes_kind_and_detail() {
        let json = serde_json::to_string(&SwdError::NoAck(7)).unwrap();
        assert_eq!(json, r#"{"kind":"no ack","detail":"7"}"#);
        let json = serde_json::to_string(&SwdError::ConnectFailed("Power up".into())).unwrap();
        assert_eq!(json, r#"{"kind":"connect failed","detail":"Power up"}"#);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", SwdError::NoAck(7)), "No ACK: 7");
        assert_eq!(format!("{}", SwdError::FaultAck), "Fault ACK");
    }
}
