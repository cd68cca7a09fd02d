// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Interface
//!
//! This module implements single SWD transactions against an ARM target.  It
//! provides [`SwdInterface`], which builds, executes and validates
//! [`Transaction`]s, plus typed register access on top.
//!
//! Nothing here retries.  A failed transaction is returned to the caller as
//! an [`SwdError`], and it is up to [`SwdConnection`](crate::SwdConnection)
//! to decide what happens next.

use alloc::boxed::Box;
use alloc::format;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use picoreg_core::arm::register::{ApRegister, DpRegister, ReadableRegister, WritableRegister};

use crate::SwdError;
use crate::config::{DEFAULT_TURNAROUND_BITS, MAX_TURNAROUND_BITS};
use crate::protocol::{LineDriver, LineState, SwdProtocol};
use crate::transaction::Transaction;

/// Receives each verbose transaction line.
pub type Observer = Box<dyn FnMut(&str)>;

/// SWD Interface object
///
/// This is used by [`SwdConnection`](crate::SwdConnection) to perform
/// individual SWD transactions on the target.  It exposes a low-level
/// interface: every call is exactly one transaction on the wire.
///
/// Create using `SwdInterface::new()` passing in an [`SwdProtocol`]
/// instance, or `SwdInterface::from_driver()`.
///
/// ```rust,ignore
/// use picoreg_core::arm::dp::IdCodeRegister;
/// use picoreg_swd::SwdInterface;
///
/// let mut swd_if = SwdInterface::from_driver(gpio_driver);
/// swd_if.protocol_mut().acquire();
/// let idcode = swd_if.read_dp_register(IdCodeRegister, "Read DPIDR")?;
/// ```
pub struct SwdInterface<D> {
    protocol: SwdProtocol<D>,
    turnaround_bits: u32,
    verbose: bool,
    observer: Option<Observer>,
}

impl<D: LineDriver> SwdInterface<D> {
    /// Creates a new SWD interface using the given [`SwdProtocol`] instance.
    pub fn new(protocol: SwdProtocol<D>) -> Self {
        Self {
            protocol,
            turnaround_bits: DEFAULT_TURNAROUND_BITS as u32,
            verbose: false,
            observer: None,
        }
    }

    /// Creates a new SWD interface directly from a line driver.
    pub fn from_driver(driver: D) -> Self {
        Self::new(SwdProtocol::new(driver))
    }

    pub fn protocol(&self) -> &SwdProtocol<D> {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut SwdProtocol<D> {
        &mut self.protocol
    }

    /// Sets the turnaround width used by subsequent transactions, 1 to 4
    /// cycles.  Must match what the target expects.
    pub fn set_turnaround_bits(&mut self, bits: u8) -> Result<(), SwdError> {
        if !(1..=MAX_TURNAROUND_BITS).contains(&bits) {
            warn!("Error: Invalid turnaround {bits}");
            return Err(SwdError::Api);
        }
        self.turnaround_bits = bits as u32;
        Ok(())
    }

    pub fn turnaround_bits(&self) -> u32 {
        self.turnaround_bits
    }

    /// Enables or disables the one line summary of every transaction.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Hands verbose lines to `observer`, as well as logging them.
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Prepares a read of a DP or AP register.
    pub fn begin_read(&self, access_port: bool, addr: u8) -> Transaction {
        Transaction::read(access_port, addr, self.turnaround_bits)
    }

    /// Prepares a write of a DP or AP register.
    pub fn begin_write(&self, access_port: bool, addr: u8, value: u32) -> Transaction {
        Transaction::write(access_port, addr, value, self.turnaround_bits)
    }

    /// Executes a transaction and validates it.
    ///
    /// Returns:
    /// - `Ok(Some(value))` for a successful read
    /// - `Ok(None)` for a successful write
    /// - `Err(SwdError)` if the ack was not OK, or a read's parity was wrong
    ///
    /// Either way the transaction holds what the target returned afterwards.
    pub fn execute(&mut self, txn: &mut Transaction) -> Result<Option<u32>, SwdError> {
        self.transfer(txn);

        let result = txn.check();
        match &result {
            Ok(()) => trace!("OK:    {}", txn.op()),
            Err(e) => debug!("Error: {} {e}", txn.op()),
        }
        result?;

        if txn.op().is_read() {
            trace!("Value: {:#010X}", txn.value());
            Ok(Some(txn.value()))
        } else {
            Ok(None)
        }
    }

    /// Executes a transaction without checking its ack.  For TARGETSEL,
    /// where no target answers until it has been selected.
    pub fn execute_unchecked(&mut self, txn: &mut Transaction) {
        self.transfer(txn);
        trace!("Done:  {} ack {} ignored", txn.op(), txn.ack());
    }

    fn transfer(&mut self, txn: &mut Transaction) {
        trace!("Exec:  {} SWD: {:#04X}", txn.op(), txn.header_byte());

        let plan = txn.plan();
        let sampled = self.protocol.transmit_and_sample(&plan);
        txn.absorb(&sampled);

        trace!("Field: {}", txn.field_values());
        self.report(txn);
    }

    fn report(&mut self, txn: &Transaction) {
        if !self.verbose {
            return;
        }
        let line = format!("{txn}");
        info!("{line}");
        if let Some(observer) = self.observer.as_mut() {
            observer(&line);
        }
    }

    /// Clocks out a fixed driven sequence, such as a line reset.
    pub fn send_sequence(&mut self, plan: &[LineState]) {
        debug_assert!(plan.iter().all(|state| !state.is_input()));
        self.protocol.transmit_and_sample(plan);
    }

    /// Write a Debug Port register
    ///
    /// ```rust,ignore
    /// use picoreg_core::arm::dp::{Abort, AbortRegister};
    /// swd_if.write_dp_register(AbortRegister, Abort::clear_all(), "Clear error bits")?;
    /// ```
    pub fn write_dp_register<R>(
        &mut self,
        _reg: R,
        value: R::Value,
        label: &'static str,
    ) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        u32: From<R::Value>,
    {
        let raw = R::to_raw(value);
        trace!("Write: DP {} {raw:#010X}", R::NAME);
        let mut txn = self.begin_write(false, R::ADDRESS, raw).with_label(label);
        self.execute(&mut txn).map(|_| ())
    }

    /// Write an Access Port register
    ///
    /// The AP bank in the upper nibble of the address must already be
    /// selected via DP SELECT.
    pub fn write_ap_register<R>(
        &mut self,
        _reg: R,
        value: R::Value,
        label: &'static str,
    ) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        u32: From<R::Value>,
    {
        let raw = R::to_raw(value);
        trace!("Write: AP {} {raw:#010X}", R::NAME);
        let mut txn = self.begin_write(true, R::ADDRESS, raw).with_label(label);
        self.execute(&mut txn).map(|_| ())
    }

    /// Read a Debug Port register.
    ///
    /// ```rust,ignore
    /// use picoreg_core::arm::dp::CtrlStatRegister;
    /// let value = swd_if.read_dp_register(CtrlStatRegister, "Read status")?;
    /// ```
    pub fn read_dp_register<R>(&mut self, _reg: R, label: &'static str) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let mut txn = self.begin_read(false, R::ADDRESS).with_label(label);
        let raw = self.execute(&mut txn)?.unwrap_or_default();
        trace!("Read:  DP {} {raw:#010X}", R::NAME);
        Ok(R::from_raw(raw))
    }

    /// Read an Access Port register
    ///
    /// AP reads are posted: the value returned is the result of the
    /// *previous* AP read, and this read's result is fetched afterwards
    /// from DP RDBUFF.
    pub fn read_ap_register<R>(&mut self, _reg: R, label: &'static str) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let mut txn = self.begin_read(true, R::ADDRESS).with_label(label);
        let raw = self.execute(&mut txn)?.unwrap_or_default();
        trace!("Read:  AP {} (posted) {raw:#010X}", R::NAME);
        Ok(R::from_raw(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ACK_WAIT;
    use crate::sim::SimTarget;
    use crate::transaction::SwdOp;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use picoreg_core::arm::dp::{Abort, AbortRegister, IdCodeRegister, TargetSelRegister};
    use picoreg_core::arm::register::RegisterDescriptor;
    use picoreg_core::rp::{RP2040_IDCODE, TargetCore};

    // Wakes, resets and selects core 0 of the simulated target
    fn selected(sim: &mut SimTarget) -> SwdInterface<&mut SimTarget> {
        let mut swd_if = SwdInterface::from_driver(sim);
        swd_if.protocol_mut().acquire();
        swd_if.send_sequence(&crate::protocol::dormant_exit_plan());
        swd_if.send_sequence(&crate::protocol::line_reset_plan());
        let sel = TargetCore::Core0.target_sel();
        let mut txn = swd_if.begin_write(false, TargetSelRegister::ADDRESS, sel.value());
        swd_if.execute_unchecked(&mut txn);
        swd_if
    }

    #[test]
    fn read_dpidr() {
        crate::init_test_logging();
        let mut sim = SimTarget::new();
        let mut swd_if = selected(&mut sim);
        let idcode = swd_if.read_dp_register(IdCodeRegister, "Read DPIDR").unwrap();
        assert_eq!(idcode, RP2040_IDCODE);
    }

    #[test]
    fn execute_returns_value_only_for_reads() {
        let mut sim = SimTarget::new();
        let mut swd_if = selected(&mut sim);

        let mut txn = swd_if.begin_read(false, 0);
        assert_eq!(swd_if.execute(&mut txn), Ok(Some(0x0BC1_2477)));

        let mut txn = swd_if.begin_write(false, 0, 0x1E);
        assert_eq!(swd_if.execute(&mut txn), Ok(None));
    }

    #[test]
    fn bad_ack_is_returned_not_retried() {
        let mut sim = SimTarget::new();
        sim.inject_ack(SwdOp::DpWrite(0x0), ACK_WAIT);
        let transactions = {
            let mut swd_if = selected(&mut sim);
            let result = swd_if.write_dp_register(AbortRegister, Abort::clear_all(), "");
            assert_eq!(result, Err(SwdError::WaitAck));
            swd_if.protocol().driver().transactions()
        };
        // TARGETSEL plus the one write
        assert_eq!(transactions, 2);
    }

    #[test]
    fn unselected_target_does_not_answer() {
        let mut sim = SimTarget::new();
        let mut swd_if = SwdInterface::from_driver(&mut sim);
        swd_if.protocol_mut().acquire();
        let mut txn = swd_if.begin_read(false, 0);
        assert_eq!(swd_if.execute(&mut txn), Err(SwdError::NoAck(7)));
        assert_eq!(txn.ack(), 7);
    }

    #[test]
    fn verbose_lines_reach_observer() {
        let lines: Rc<RefCell<Vec<String>>> = Rc::default();
        let mut sim = SimTarget::new();
        let mut swd_if = selected(&mut sim);

        let sink = lines.clone();
        swd_if.set_observer(Box::new(move |line: &str| sink.borrow_mut().push(line.into())));
        swd_if.read_dp_register(IdCodeRegister, "Read DPIDR").unwrap();
        assert!(lines.borrow().is_empty());

        swd_if.set_verbose(true);
        swd_if.read_dp_register(IdCodeRegister, "Read DPIDR").unwrap();
        assert_eq!(*lines.borrow(), ["Rd DP 0 0x0bc12477 OK  Read DPIDR"]);
    }

    #[test]
    fn turnaround_width_is_configurable() {
        let mut sim = SimTarget::new().with_turnaround_bits(3);
        let mut swd_if = SwdInterface::from_driver(&mut sim);
        assert_eq!(swd_if.set_turnaround_bits(3), Ok(()));
        swd_if.protocol_mut().acquire();
        swd_if.send_sequence(&crate::protocol::dormant_exit_plan());
        swd_if.send_sequence(&crate::protocol::line_reset_plan());
        let mut txn = swd_if.begin_write(false, 0xC, TargetCore::Core0.target_sel().value());
        swd_if.execute_unchecked(&mut txn);

        let mut txn = swd_if.begin_read(false, 0);
        assert_eq!(txn.width(), 8 + 3 + 3 + 33 + 3);
        assert_eq!(swd_if.execute(&mut txn), Ok(Some(0x0BC1_2477)));
    }

    #[test]
    fn turnaround_width_out_of_range_rejected() {
        let mut sim = SimTarget::new();
        let mut swd_if = SwdInterface::from_driver(&mut sim);
        assert_eq!(swd_if.set_turnaround_bits(0), Err(SwdError::Api));
        assert_eq!(swd_if.set_turnaround_bits(5), Err(SwdError::Api));
        assert_eq!(swd_if.turnaround_bits(), 1);

        // Still usable at the previous width
        let txn = swd_if.begin_read(false, 0);
        assert_eq!(txn.width(), 8 + 1 + 3 + 33 + 1);
        assert_eq!(swd_if.set_turnaround_bits(4), Ok(()));
        assert_eq!(swd_if.begin_read(false, 0).width(), 8 + 4 + 3 + 33 + 4);
    }
}
