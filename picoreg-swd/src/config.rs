// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD connection configuration
//!
//! Serialized as JSON, for example:
//!
//! ```json
//! {"target_core": 1, "retries": 5, "turnaround_bits": 1, "verbose": true}
//! ```
//!
//! Every field is optional and defaults as per [`SwdConfig::default()`].

use alloc::format;
use alloc::string::String;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use picoreg_core::TargetCore;

use crate::SwdError;

/// Default number of consecutive failures before giving up
pub const DEFAULT_RETRIES: u32 = 3;

/// Default turnaround period, in clock cycles
pub const DEFAULT_TURNAROUND_BITS: u8 = 1;

/// Longest turnaround period the SW-DP supports
pub const MAX_TURNAROUND_BITS: u8 = 4;

/// Configuration for [`SwdConnection`](crate::SwdConnection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwdConfig {
    /// Which RP2040 core's debug port to select
    pub target_core: TargetCore,

    /// Consecutive failures tolerated by the retry loop
    pub retries: u32,

    /// Width of each turnaround gap
    pub turnaround_bits: u8,

    /// Report every transaction
    pub verbose: bool,
}

impl Default for SwdConfig {
    fn default() -> Self {
        Self {
            target_core: TargetCore::default(),
            retries: DEFAULT_RETRIES,
            turnaround_bits: DEFAULT_TURNAROUND_BITS,
            verbose: false,
        }
    }
}

impl SwdConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, SwdError> {
        let config: SwdConfig = serde_json::from_str(json).map_err(|e| {
            warn!("Error: Failed to parse config: {e}");
            SwdError::Config(format!("{e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SwdError> {
        serde_json::to_string(self).map_err(|e| SwdError::Config(format!("{e}")))
    }

    /// Checks the values are usable.
    pub fn validate(&self) -> Result<(), SwdError> {
        if self.retries == 0 {
            return Err(SwdError::Config(String::from("retries must be at least 1")));
        }
        if !(1..=MAX_TURNAROUND_BITS).contains(&self.turnaround_bits) {
            return Err(SwdError::Config(format!(
                "turnaround_bits must be 1 to {MAX_TURNAROUND_BITS}, got {}",
                self.turnaround_bits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SwdConfig::default();
        assert_eq!(config.target_core, TargetCore::Core0);
        assert_eq!(config.retries, 3);
        assert_eq!(config.turnaround_bits, 1);
        assert!(!config.verbose);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn from_json_partial() {
        let config = SwdConfig::from_json(r#"{"target_core": 1, "verbose": true}"#).unwrap();
        assert_eq!(config.target_core, TargetCore::Core1);
        assert!(config.verbose);
        assert_eq!(config.retries, DEFAULT_RETRIES);

        assert_eq!(SwdConfig::from_json("{}").unwrap(), SwdConfig::default());
    }

    #[test]
    fn from_json_rejects_bad_values() {
        assert!(matches!(
            SwdConfig::from_json(r#"{"target_core": 2}"#),
            Err(SwdError::Config(_))
        ));
        assert!(matches!(
            SwdConfig::from_json(r#"{"retries": 0}"#),
            Err(SwdError::Config(_))
        ));
        assert!(matches!(
            SwdConfig::from_json(r#"{"turnaround_bits": 5}"#),
            Err(SwdError::Config(_))
        ));
        assert!(matches!(
            SwdConfig::from_json("not json"),
            Err(SwdError::Config(_))
        ));
    }

    #[test]
    fn json_round_trip() {
        let config = SwdConfig {
            target_core: TargetCore::Core1,
            retries: 5,
            turnaround_bits: 2,
            verbose: true,
        };
        let json = config.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"target_core":1,"retries":5,"turnaround_bits":2,"verbose":true}"#
        );
        assert_eq!(SwdConfig::from_json(&json).unwrap(), config);
    }
}
