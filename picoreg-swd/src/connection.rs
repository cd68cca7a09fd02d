// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD Connection Manager
//!
//! This module implements the connection to an RP2040 over SWD.  It wakes
//! the target from dormant state, resets the line, selects the core's debug
//! port, powers up the debug domain and configures the MEM-AP.  It then reads
//! target memory on the caller's behalf.
//!
//! Any failed transaction is taken to mean the link can no longer be
//! trusted, so [`SwdConnection::retry_and_call`] tears the whole session down
//! and establishes it again from scratch before retrying.
//!
//! ```text
//! Disconnected --connect()--> Connecting --power_up()--> Connected
//!       ^                          |                         |
//!       +------- any failure ------+------- any failure -----+
//! ```

use alloc::format;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use picoreg_core::TargetCore;
use picoreg_core::arm::ap::{Idr, IdrRegister};
use picoreg_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, RdBuffRegister,
    Select, SelectRegister, TargetSelRegister,
};
use picoreg_core::arm::map::{Csw, CswRegister, DrwRegister, Tar, TarRegister};
use picoreg_core::arm::register::{RegisterDescriptor, ap_bank};
use picoreg_core::rp::dpidr_name;

use crate::SwdError;
use crate::config::SwdConfig;
use crate::interface::{Observer, SwdInterface};
use crate::protocol::{LineDriver, dormant_exit_plan, line_reset_plan};

/// Where the link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// The state of an [`SwdConnection`], as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    target: TargetCore,
    link: LinkState,
    retries: u32,
}

impl ConnectionState {
    /// The core whose debug port is selected on the next connection
    pub fn target(&self) -> TargetCore {
        self.target
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    /// Remaining retry budget
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }
}

/// SWD Connection object
///
/// Owns the lines for its lifetime.  [`Self::open()`] takes them, and
/// [`Self::close()`] - or dropping the object - disconnects from the target
/// and releases them.
///
/// ```rust,ignore
/// use picoreg_core::rp::RP2040_SIO_GPIO_IN;
/// use picoreg_swd::{SwdConfig, SwdConnection};
///
/// let mut conn = SwdConnection::new(gpio_driver, SwdConfig::default())?;
/// conn.open();
/// match conn.read_word(RP2040_SIO_GPIO_IN) {
///     Ok(value) => info!("GPIO_IN: {value:#010X}"),
///     Err(e) => warn!("Failed: {e}"),
/// }
/// ```
pub struct SwdConnection<D: LineDriver> {
    swd: SwdInterface<D>,
    config: SwdConfig,
    state: ConnectionState,
    idcode: Option<IdCode>,
    idr: Option<Idr>,
}

impl<D: LineDriver> SwdConnection<D> {
    /// Creates a connection over the given line driver.  The lines are not
    /// touched until [`Self::open()`].
    pub fn new(driver: D, config: SwdConfig) -> Result<Self, SwdError> {
        config.validate()?;

        let mut swd = SwdInterface::from_driver(driver);
        swd.set_turnaround_bits(config.turnaround_bits)?;
        swd.set_verbose(config.verbose);

        let state = ConnectionState {
            target: config.target_core,
            link: LinkState::Disconnected,
            retries: config.retries,
        };

        Ok(Self {
            swd,
            config,
            state,
            idcode: None,
            idr: None,
        })
    }

    /// Takes ownership of the lines.  Does nothing if already open.
    pub fn open(&mut self) {
        if !self.is_open() {
            self.swd.protocol_mut().acquire();
        }
    }

    /// Disconnects, if connected, and releases the lines.  Does nothing if
    /// not open.
    pub fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        if self.state.link != LinkState::Disconnected {
            self.disconnect();
        }
        self.swd.protocol_mut().release();
    }

    pub fn is_open(&self) -> bool {
        self.swd.protocol().is_acquired()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn config(&self) -> &SwdConfig {
        &self.config
    }

    /// The DPIDR read on the most recent connection
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    /// The AP IDR read on the most recent power up
    pub fn idr(&self) -> Option<Idr> {
        self.idr
    }

    pub fn driver(&self) -> &D {
        self.swd.protocol().driver()
    }

    pub fn driver_mut(&mut self) -> &mut D {
        self.swd.protocol_mut().driver_mut()
    }

    /// Gives access to single transactions.  Anything done here bypasses the
    /// connection state.
    pub fn swd_if(&mut self) -> &mut SwdInterface<D> {
        &mut self.swd
    }

    /// Selects which core to connect to, 0 or 1.  Takes effect on the next
    /// connection.
    pub fn set_target_core(&mut self, core: u8) -> Result<(), SwdError> {
        let core = TargetCore::try_from(core).map_err(|e| {
            warn!("Error: {e}");
            SwdError::Api
        })?;
        debug!("Info:  Target set to {core}");
        self.config.target_core = core;
        self.state.target = core;
        Ok(())
    }

    /// Reports every transaction as a single line.  See
    /// [`crate::Transaction`]'s `Display` for the format.
    pub fn enable_verbose(&mut self, enable: bool) {
        self.config.verbose = enable;
        self.swd.set_verbose(enable);
    }

    /// Hands verbose lines to `observer` as well as the log.
    pub fn set_observer(&mut self, observer: Observer) {
        self.swd.set_observer(observer);
    }

    /// Wakes the target, resets the line, selects the target core and reads
    /// the DPIDR.
    ///
    /// Leaves the link `Connecting`: [`Self::power_up()`] completes it.
    pub fn connect(&mut self) -> Result<IdCode, SwdError> {
        if !self.is_open() {
            return Err(SwdError::NotConnected);
        }

        info!("SWD connection restart, {}", self.state.target);
        self.state.link = LinkState::Connecting;
        self.idcode = None;
        self.idr = None;

        self.swd.send_sequence(&dormant_exit_plan());
        self.swd.send_sequence(&line_reset_plan());

        // No target drives the ack of TARGETSEL, so it is not checked
        let target_sel = self.state.target.target_sel();
        let mut txn = self
            .swd
            .begin_write(false, TargetSelRegister::ADDRESS, target_sel.value())
            .with_label("Select target");
        self.swd.execute_unchecked(&mut txn);

        let idcode = self
            .swd
            .read_dp_register(IdCodeRegister, "Read DPIDR")
            .map_err(|e| {
                self.state.link = LinkState::Disconnected;
                step_failed("Read DPIDR", e)
            })?;

        match dpidr_name(idcode) {
            Some(name) => info!("DPIDR {idcode:#} {name}"),
            None => info!("DPIDR {idcode:#}"),
        }
        self.idcode = Some(idcode);

        Ok(idcode)
    }

    /// Powers up the debug domain and configures the MEM-AP for 32-bit
    /// auto-incrementing transfers.  Returns the AP IDR.
    ///
    /// Each step must succeed.  The first failure is returned as
    /// [`SwdError::ConnectFailed`], naming the step.
    pub fn power_up(&mut self) -> Result<Idr, SwdError> {
        if !self.is_open() {
            return Err(SwdError::NotConnected);
        }

        let result = self.power_up_sequence();
        match &result {
            Ok(idr) => {
                info!("AP IDR {idr} {}", idr.idr_info());
                self.idr = Some(*idr);
                self.state.link = LinkState::Connected;
            }
            Err(_) => self.state.link = LinkState::Disconnected,
        }
        result
    }

    fn power_up_sequence(&mut self) -> Result<Idr, SwdError> {
        const CLEAR: &str = "Clear error bits";
        self.swd
            .write_dp_register(AbortRegister, Abort::clear_all(), CLEAR)
            .map_err(|e| step_failed(CLEAR, e))?;

        const BANK_0: &str = "Set AP and DP bank 0";
        self.swd
            .write_dp_register(SelectRegister, Select::bank(0, 0), BANK_0)
            .map_err(|e| step_failed(BANK_0, e))?;

        const POWER: &str = "Power up";
        self.swd
            .write_dp_register(CtrlStatRegister, CtrlStat::power_up_request(), POWER)
            .map_err(|e| step_failed(POWER, e))?;

        const STATUS: &str = "Read status";
        let status = self
            .swd
            .read_dp_register(CtrlStatRegister, STATUS)
            .map_err(|e| step_failed(STATUS, e))?;
        debug!("Info:  CTRL/STAT {status} {}", status.power_states());
        if !status.powered_up() {
            warn!("Power up not yet acknowledged: {}", status.power_states());
        }
        if status.has_errors() {
            warn!("Sticky errors set after clearing: {status}");
        }

        const BANK_F: &str = "Set AP bank F, DP bank 0";
        let idr_bank = Select::bank(ap_bank(IdrRegister::ADDRESS), 0);
        self.swd
            .write_dp_register(SelectRegister, idr_bank, BANK_F)
            .map_err(|e| step_failed(BANK_F, e))?;

        // Posted read, the result arrives in RDBUFF
        const IDR: &str = "Read AP addr 0xFC";
        self.swd
            .read_ap_register(IdrRegister, IDR)
            .map_err(|e| step_failed(IDR, e))?;

        const RESULT: &str = "Read AP result (AHB3-AP IDR)";
        let idr = self
            .swd
            .read_dp_register(RdBuffRegister, RESULT)
            .map_err(|e| step_failed(RESULT, e))?;
        let idr = Idr::new(idr.value());
        if !idr.is_mem_ap() {
            warn!("AP IDR {idr} is not a MEM-AP");
        }

        // Back to CSW's bank before writing it
        let csw_bank = Select::bank(ap_bank(CswRegister::ADDRESS), 0);
        self.swd
            .write_dp_register(SelectRegister, csw_bank, BANK_0)
            .map_err(|e| step_failed(BANK_0, e))?;

        const CSW: &str = "Auto-increment word values";
        self.swd
            .write_ap_register(CswRegister, Csw::auto_increment_word(), CSW)
            .map_err(|e| step_failed(CSW, e))?;

        Ok(idr)
    }

    /// Reads one word of target memory over the MEM-AP.  The connection
    /// must already be powered up, and nothing is retried.  A failure marks
    /// the link disconnected.
    pub fn peek(&mut self, addr: u32) -> Result<u32, SwdError> {
        let result = self.peek_sequence(addr);
        if result.is_err() {
            self.state.link = LinkState::Disconnected;
        }
        result
    }

    fn peek_sequence(&mut self, addr: u32) -> Result<u32, SwdError> {
        trace!("Exec:  Peek {addr:#010X}");
        self.swd
            .write_ap_register(TarRegister, Tar(addr), "Set AP address")?;
        self.swd.read_ap_register(DrwRegister, "AP read cycle")?;
        let value = self
            .swd
            .read_dp_register(RdBuffRegister, "DP read result")?
            .value();
        trace!("Value: {addr:#010X}: {value:#010X}");
        Ok(value)
    }

    /// Calls `op` on an established connection, re-establishing the
    /// connection and retrying on any failure.
    ///
    /// If not connected, the target is connected to and powered up first.
    /// Any failure, whether connecting or in `op`, marks the link broken
    /// and uses up one retry.  A successful connection restores the budget,
    /// less the number of times `op` itself has failed in this call.  A
    /// successful `op` restores it in full.
    ///
    /// Returns:
    /// - `Ok(value)` - what `op` returned
    /// - `Err(SwdError::RetriesExhausted)` - the budget ran out
    /// - `Err(SwdError::NotConnected)` - not open
    pub fn retry_and_call<T, F>(&mut self, mut op: F) -> Result<T, SwdError>
    where
        F: FnMut(&mut Self) -> Result<T, SwdError>,
    {
        if !self.is_open() {
            return Err(SwdError::NotConnected);
        }

        let budget = self.config.retries;
        let mut op_failures = 0;
        self.state.retries = budget;

        while self.state.retries > 0 {
            if self.state.link != LinkState::Connected {
                match self.establish() {
                    Ok(()) => self.state.retries = budget.saturating_sub(op_failures),
                    Err(e) => {
                        warn!("Retry: Can't connect: {e}");
                        self.state.link = LinkState::Disconnected;
                        self.state.retries -= 1;
                        continue;
                    }
                }
            }

            match op(self) {
                Ok(value) => {
                    self.state.retries = budget;
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Retry: Operation failed, reconnecting: {e}");
                    self.state.link = LinkState::Disconnected;
                    op_failures += 1;
                    self.state.retries = self.state.retries.saturating_sub(1);
                }
            }
        }

        error!("Error: Giving up after {budget} retries");
        Err(SwdError::RetriesExhausted)
    }

    /// Connects, with retries, if not already connected.
    pub fn connect_and_retry(&mut self) -> Result<(), SwdError> {
        self.retry_and_call(|_| Ok(()))
    }

    /// Reads one word of target memory, connecting and retrying as needed.
    pub fn read_word(&mut self, addr: u32) -> Result<u32, SwdError> {
        self.retry_and_call(|conn| conn.peek(addr))
    }

    /// Sends a line reset and marks the link disconnected.  Safe to call
    /// when already disconnected.
    pub fn disconnect(&mut self) {
        if self.is_open() {
            self.swd.send_sequence(&line_reset_plan());
        }
        if self.state.link != LinkState::Disconnected {
            debug!("Info:  Disconnected from {}", self.state.target);
        }
        self.state.link = LinkState::Disconnected;
    }

    fn establish(&mut self) -> Result<(), SwdError> {
        self.connect()?;
        self.power_up()?;
        Ok(())
    }
}

impl<D: LineDriver> Drop for SwdConnection<D> {
    fn drop(&mut self) {
        self.close();
    }
}

fn step_failed(step: &str, e: SwdError) -> SwdError {
    warn!("Error: {step} failed: {e}");
    SwdError::ConnectFailed(format!("{step}: {e}"))
}
