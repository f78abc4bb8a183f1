//! Fault bitmask decoding.
//!
//! Every actuator reports latched faults as a 16-bit bitmask. This module is
//! the single place that interprets those bits: display, logging and the
//! clear-errors decision all consume [`ErrorFlags`] rather than raw registers.
//!
//! Decoding is total. A set bit the register map does not name becomes
//! [`Fault::Unspecified`] carrying its bit position, so no fault signal is
//! ever lost.
//!
//! ```text
//! bit 0  LOCKED_ROTOR
//! bit 1  OVER_CURRENT
//! bit 2  OVER_TEMPERATURE
//! bit 3  COMM_TIMEOUT
//! bit 4  STALL
//! 5..15  UNKNOWN_BIT_n
//! ```
//!
//! # Examples
//!
//! ```
//! use handbus_core::faults::{decode, Fault};
//!
//! let flags = decode(0b0000_0000_0000_0011);
//! assert_eq!(flags.faults(), &[Fault::LockedRotor, Fault::OverCurrent]);
//!
//! let flags = decode(1 << 9);
//! assert_eq!(flags.faults(), &[Fault::Unspecified(9)]);
//! assert_eq!(flags.faults()[0].to_string(), "UNKNOWN_BIT_9");
//! ```

use crate::constants::{
    FAULT_BIT_COMM_TIMEOUT, FAULT_BIT_LOCKED_ROTOR, FAULT_BIT_OVER_CURRENT,
    FAULT_BIT_OVER_TEMPERATURE, FAULT_BIT_STALL, FAULT_REGISTER_BITS,
};
use crate::types::FingerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named fault condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fault {
    LockedRotor,
    OverCurrent,
    OverTemperature,
    CommTimeout,
    Stall,
    /// A set bit with no assigned meaning, by bit position.
    Unspecified(u8),
}

impl Fault {
    /// Map a bit position to its fault.
    #[must_use]
    pub fn from_bit(bit: u8) -> Self {
        match bit {
            FAULT_BIT_LOCKED_ROTOR => Fault::LockedRotor,
            FAULT_BIT_OVER_CURRENT => Fault::OverCurrent,
            FAULT_BIT_OVER_TEMPERATURE => Fault::OverTemperature,
            FAULT_BIT_COMM_TIMEOUT => Fault::CommTimeout,
            FAULT_BIT_STALL => Fault::Stall,
            other => Fault::Unspecified(other),
        }
    }

    /// Bit position this fault occupies in the register.
    #[must_use]
    pub fn bit(&self) -> u8 {
        match self {
            Fault::LockedRotor => FAULT_BIT_LOCKED_ROTOR,
            Fault::OverCurrent => FAULT_BIT_OVER_CURRENT,
            Fault::OverTemperature => FAULT_BIT_OVER_TEMPERATURE,
            Fault::CommTimeout => FAULT_BIT_COMM_TIMEOUT,
            Fault::Stall => FAULT_BIT_STALL,
            Fault::Unspecified(bit) => *bit,
        }
    }

    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Fault::Unspecified(_))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::LockedRotor => f.write_str("LOCKED_ROTOR"),
            Fault::OverCurrent => f.write_str("OVER_CURRENT"),
            Fault::OverTemperature => f.write_str("OVER_TEMPERATURE"),
            Fault::CommTimeout => f.write_str("COMM_TIMEOUT"),
            Fault::Stall => f.write_str("STALL"),
            Fault::Unspecified(bit) => write!(f, "UNKNOWN_BIT_{bit}"),
        }
    }
}

/// Decoded fault set of one actuator, ordered by bit position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorFlags {
    faults: Vec<Fault>,
}

impl ErrorFlags {
    /// The empty set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn contains(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    /// Whether any set bit had no assigned meaning.
    pub fn has_unspecified(&self) -> bool {
        self.faults.iter().any(Fault::is_unspecified)
    }

    /// Re-encode the set into the register bitmask it came from.
    #[must_use]
    pub fn bits(&self) -> u16 {
        self.faults.iter().fold(0, |acc, f| acc | (1 << f.bit()))
    }

    /// Fault names for display.
    pub fn names(&self) -> Vec<String> {
        self.faults.iter().map(Fault::to_string).collect()
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.faults.is_empty() {
            return f.write_str("OK");
        }
        f.write_str(&self.names().join(", "))
    }
}

/// Decode one fault register.
#[must_use]
pub fn decode(bitmask: u16) -> ErrorFlags {
    let faults = (0..FAULT_REGISTER_BITS)
        .filter(|bit| bitmask & (1 << bit) != 0)
        .map(Fault::from_bit)
        .collect();
    ErrorFlags { faults }
}

/// Whether a clear-errors request is warranted for these per-actuator sets.
#[must_use]
pub fn needs_clear(flags: &[ErrorFlags]) -> bool {
    flags.iter().any(|f| !f.is_empty())
}

/// Human-readable fault names per actuator, for faulted actuators only.
///
/// Sets beyond the sixth actuator are ignored.
pub fn describe_finger_errors(flags: &[ErrorFlags]) -> BTreeMap<FingerId, Vec<String>> {
    FingerId::ALL
        .iter()
        .zip(flags)
        .filter(|(_, f)| !f.is_empty())
        .map(|(finger, f)| (*finger, f.names()))
        .collect()
}
