//! Register map and link defaults for the hand controller.
//!
//! The hand exposes one 16-bit holding register per actuator for every
//! quantity. Each quantity occupies a block of [`FINGER_COUNT`] consecutive
//! registers in actuator order (see [`FingerId`](crate::FingerId)):
//!
//! ```text
//! base + 0  little
//! base + 1  ring
//! base + 2  middle
//! base + 3  index
//! base + 4  thumb bend
//! base + 5  thumb rotate
//! ```
//!
//! # Usage
//!
//! ```
//! use handbus_core::constants::*;
//!
//! // Target angle register of the index finger
//! let index_target = REG_ANGLE_SET + 3;
//! assert_eq!(index_target, 1489);
//!
//! // Link defaults
//! assert_eq!(DEFAULT_BAUD_RATE, 115_200);
//! assert_eq!(DEFAULT_SLAVE_ID, 1);
//! ```

// ============================================================================
// Link Parameters
// ============================================================================

/// Default Modbus slave address of the hand.
pub const DEFAULT_SLAVE_ID: u8 = 1;

/// Default serial baud rate (8 data bits, no parity, 1 stop bit).
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default time allowed for the hand to answer one transaction (milliseconds).
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 500;

/// Default time a feedback caller waits for its read to be serviced (milliseconds).
///
/// Covers queueing delay behind pending writes as well as the transaction itself.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2_000;

/// Default minimum re-fire interval for a hotkey (milliseconds).
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Maximum holding registers in one Modbus read request.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum holding registers in one Modbus write-multiple request.
pub const MAX_WRITE_REGISTERS: u16 = 123;

// ============================================================================
// Hand Geometry
// ============================================================================

/// Number of independently driven actuators.
pub const FINGER_COUNT: usize = 6;

/// Lowest accepted target / limit value.
pub const MIN_TARGET: u16 = 0;

/// Highest accepted target / limit value (fully open for angles).
pub const MAX_TARGET: u16 = 1000;

// ============================================================================
// Register Map
// ============================================================================

/// Writing `1` clears the latched fault bits of every actuator.
pub const REG_CLEAR_ERROR: u16 = 1004;

/// Target positions (0-1000).
pub const REG_POS_SET: u16 = 1474;

/// Target angles (0-1000, 1000 = open).
pub const REG_ANGLE_SET: u16 = 1486;

/// Force limits (0-1000).
pub const REG_FORCE_SET: u16 = 1498;

/// Speeds (0-1000).
pub const REG_SPEED_SET: u16 = 1522;

/// Measured positions.
pub const REG_POS_ACT: u16 = 1534;

/// Measured angles.
pub const REG_ANGLE_ACT: u16 = 1546;

/// Measured forces (signed).
pub const REG_FORCE_ACT: u16 = 1582;

/// Measured motor currents (signed).
pub const REG_CURRENT: u16 = 1594;

/// Latched fault bitmask per actuator.
pub const REG_ERROR: u16 = 1606;

/// Status code per actuator.
pub const REG_STATUS: u16 = 1612;

/// Actuator temperature (degrees Celsius).
pub const REG_TEMP: u16 = 1618;

/// Value written to [`REG_CLEAR_ERROR`] to clear faults.
pub const CLEAR_ERROR_VALUE: u16 = 1;

// ============================================================================
// Fault Bits
// ============================================================================

/// Actuator locked rotor.
pub const FAULT_BIT_LOCKED_ROTOR: u8 = 0;

/// Over-current protection tripped.
pub const FAULT_BIT_OVER_CURRENT: u8 = 1;

/// Over-temperature protection tripped.
pub const FAULT_BIT_OVER_TEMPERATURE: u8 = 2;

/// Internal communication timeout.
pub const FAULT_BIT_COMM_TIMEOUT: u8 = 3;

/// Actuator stalled.
pub const FAULT_BIT_STALL: u8 = 4;

/// Width of the fault register in bits.
pub const FAULT_REGISTER_BITS: u8 = 16;
