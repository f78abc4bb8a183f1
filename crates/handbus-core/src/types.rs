use crate::{
    Result,
    constants::{
        DEFAULT_SLAVE_ID, FINGER_COUNT, MAX_READ_REGISTERS, MAX_TARGET, MAX_WRITE_REGISTERS,
        MIN_TARGET,
    },
    error::Error,
    faults::ErrorFlags,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Modbus slave address (1-247)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlaveId(u8);

impl SlaveId {
    /// Create a slave id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSlaveId` for the broadcast address 0 and for
    /// the reserved range 248-255.
    pub fn new(id: u8) -> Result<Self> {
        if !(1..=247).contains(&id) {
            return Err(Error::InvalidSlaveId(id));
        }
        Ok(SlaveId(id))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl Default for SlaveId {
    fn default() -> Self {
        SlaveId(DEFAULT_SLAVE_ID)
    }
}

impl TryFrom<u8> for SlaveId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        SlaveId::new(id)
    }
}

impl From<SlaveId> for u8 {
    fn from(id: SlaveId) -> u8 {
        id.0
    }
}

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One actuator of the hand, in register order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerId {
    Little,
    Ring,
    Middle,
    Index,
    ThumbBend,
    ThumbRotate,
}

impl FingerId {
    /// All actuators in register order.
    pub const ALL: [FingerId; FINGER_COUNT] = [
        FingerId::Little,
        FingerId::Ring,
        FingerId::Middle,
        FingerId::Index,
        FingerId::ThumbBend,
        FingerId::ThumbRotate,
    ];

    /// Look up an actuator by its register offset.
    ///
    /// # Errors
    /// Returns `Error::InvalidFinger` for offsets outside 0-5.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::InvalidFinger(index))
    }

    /// Register offset of this actuator inside a quantity block.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FingerId::Little => "little",
            FingerId::Ring => "ring",
            FingerId::Middle => "middle",
            FingerId::Index => "index",
            FingerId::ThumbBend => "thumb_bend",
            FingerId::ThumbRotate => "thumb_rotate",
        }
    }
}

impl fmt::Display for FingerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FingerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" | "pinky" => Ok(FingerId::Little),
            "ring" => Ok(FingerId::Ring),
            "middle" => Ok(FingerId::Middle),
            "index" => Ok(FingerId::Index),
            "thumb" | "thumb_bend" => Ok(FingerId::ThumbBend),
            "thumb_rotate" => Ok(FingerId::ThumbRotate),
            other => Err(Error::UnknownFingerName(other.to_string())),
        }
    }
}

/// Contiguous block of holding registers touched by one command.
///
/// Ranges describe and validate commands; they never influence ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterRange {
    start: u16,
    count: u16,
}

impl RegisterRange {
    /// Create a range with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidRange` if the range is empty, exceeds the
    /// largest Modbus read, or runs past the end of the address space.
    pub fn new(start: u16, count: u16) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidRange(format!("empty range at {start}")));
        }
        if count > MAX_READ_REGISTERS {
            return Err(Error::InvalidRange(format!(
                "{count} registers exceeds the {MAX_READ_REGISTERS} register limit"
            )));
        }
        if start.checked_add(count - 1).is_none() {
            return Err(Error::InvalidRange(format!(
                "{count} registers from {start} overflows the address space"
            )));
        }
        Ok(Self { start, count })
    }

    /// A single register.
    #[must_use]
    pub fn single(address: u16) -> Self {
        Self {
            start: address,
            count: 1,
        }
    }

    /// The full per-actuator block of a quantity starting at `base`.
    #[must_use]
    pub fn finger_block(base: u16) -> Self {
        Self {
            start: base,
            count: FINGER_COUNT as u16,
        }
    }

    /// The register of one actuator inside the block starting at `base`.
    #[must_use]
    pub fn for_finger(base: u16, finger: FingerId) -> Self {
        Self::single(base + finger.index() as u16)
    }

    #[must_use]
    pub fn start(&self) -> u16 {
        self.start
    }

    #[must_use]
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Last address covered by the range.
    #[must_use]
    pub fn last(&self) -> u16 {
        self.start + (self.count - 1)
    }

    #[must_use]
    pub fn contains(&self, address: u16) -> bool {
        (self.start..=self.last()).contains(&address)
    }

    #[must_use]
    pub fn overlaps(&self, other: &RegisterRange) -> bool {
        self.start <= other.last() && other.start <= self.last()
    }

    /// Check that `values` fills this range exactly and fits one write request.
    ///
    /// # Errors
    /// Returns `Error::ValueCountMismatch` or `Error::InvalidRange`.
    pub fn check_write(&self, values: &[u16]) -> Result<()> {
        if values.len() != self.count as usize {
            return Err(Error::ValueCountMismatch {
                expected: self.count as usize,
                actual: values.len(),
            });
        }
        if self.count > MAX_WRITE_REGISTERS {
            return Err(Error::InvalidRange(format!(
                "{} registers exceeds the {MAX_WRITE_REGISTERS} register write limit",
                self.count
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RegisterRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.count == 1 {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.last())
        }
    }
}

/// Validate a target, speed or force value.
///
/// # Errors
/// Returns `Error::ValueOutOfRange` outside 0-1000.
pub fn check_target(value: u16) -> Result<u16> {
    if !(MIN_TARGET..=MAX_TARGET).contains(&value) {
        return Err(Error::ValueOutOfRange {
            value,
            min: MIN_TARGET,
            max: MAX_TARGET,
        });
    }
    Ok(value)
}

/// Split a per-actuator register block into one value per finger.
///
/// # Errors
/// Returns `Error::ShortRead` if fewer than six registers were returned.
pub fn finger_values<T>(registers: &[u16], decode: impl Fn(u16) -> T) -> Result<[T; FINGER_COUNT]> {
    if registers.len() < FINGER_COUNT {
        return Err(Error::ShortRead {
            expected: FINGER_COUNT,
            actual: registers.len(),
        });
    }
    Ok(std::array::from_fn(|i| decode(registers[i])))
}

/// Hardware-reported actuator status.
///
/// The core only observes these; transitions are driven by the hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerStatus {
    Idle,
    Moving,
    Stalled,
    Error,
    /// A code the register map does not name.
    Unknown(u16),
}

impl FingerStatus {
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => FingerStatus::Idle,
            1 => FingerStatus::Moving,
            2 => FingerStatus::Stalled,
            3 => FingerStatus::Error,
            other => FingerStatus::Unknown(other),
        }
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            FingerStatus::Idle => 0,
            FingerStatus::Moving => 1,
            FingerStatus::Stalled => 2,
            FingerStatus::Error => 3,
            FingerStatus::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for FingerStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FingerStatus::Idle => f.write_str("IDLE"),
            FingerStatus::Moving => f.write_str("MOVING"),
            FingerStatus::Stalled => f.write_str("STALLED"),
            FingerStatus::Error => f.write_str("ERROR"),
            FingerStatus::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Feedback for one actuator from a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerState {
    pub finger: FingerId,
    pub angle: u16,
    pub force: i16,
    pub temperature: u16,
    pub status: FingerStatus,
    pub errors: ErrorFlags,
}

/// One poll of every actuator.
///
/// A snapshot replaces the previous one; nothing is accumulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandSnapshot {
    fingers: Vec<FingerState>,
}

impl HandSnapshot {
    /// Assemble a snapshot from per-quantity register blocks.
    #[must_use]
    pub fn from_parts(
        angles: [u16; FINGER_COUNT],
        forces: [i16; FINGER_COUNT],
        temperatures: [u16; FINGER_COUNT],
        statuses: [FingerStatus; FINGER_COUNT],
        errors: [ErrorFlags; FINGER_COUNT],
    ) -> Self {
        let fingers = FingerId::ALL
            .iter()
            .zip(errors)
            .map(|(&finger, errors)| {
                let i = finger.index();
                FingerState {
                    finger,
                    angle: angles[i],
                    force: forces[i],
                    temperature: temperatures[i],
                    status: statuses[i],
                    errors,
                }
            })
            .collect();
        Self { fingers }
    }

    pub fn fingers(&self) -> &[FingerState] {
        &self.fingers
    }

    pub fn finger(&self, finger: FingerId) -> &FingerState {
        &self.fingers[finger.index()]
    }

    /// Decoded fault sets in actuator order.
    pub fn error_flags(&self) -> Vec<ErrorFlags> {
        self.fingers.iter().map(|f| f.errors.clone()).collect()
    }

    pub fn has_faults(&self) -> bool {
        self.fingers.iter().any(|f| !f.errors.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REG_ANGLE_SET;
    use crate::faults::decode;
    use rstest::rstest;

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(247, true)]
    #[case(248, false)]
    fn test_slave_id_validation(#[case] id: u8, #[case] valid: bool) {
        assert_eq!(SlaveId::new(id).is_ok(), valid);
    }

    #[test]
    fn test_slave_id_default_matches_link_contract() {
        assert_eq!(SlaveId::default().as_u8(), 1);
    }

    #[rstest]
    #[case("little", FingerId::Little)]
    #[case("Pinky", FingerId::Little)]
    #[case("index", FingerId::Index)]
    #[case("thumb", FingerId::ThumbBend)]
    #[case(" thumb_rotate ", FingerId::ThumbRotate)]
    fn test_finger_from_str(#[case] input: &str, #[case] expected: FingerId) {
        assert_eq!(input.parse::<FingerId>().unwrap(), expected);
    }

    #[test]
    fn test_finger_from_str_unknown() {
        assert!(matches!(
            "wrist".parse::<FingerId>(),
            Err(Error::UnknownFingerName(_))
        ));
    }

    #[test]
    fn test_finger_index_roundtrip() {
        for (i, finger) in FingerId::ALL.iter().enumerate() {
            assert_eq!(finger.index(), i);
            assert_eq!(FingerId::from_index(i).unwrap(), *finger);
        }
        assert_eq!(FingerId::from_index(6), Err(Error::InvalidFinger(6)));
    }

    #[test]
    fn test_register_range_validation() {
        assert!(RegisterRange::new(100, 0).is_err());
        assert!(RegisterRange::new(100, 126).is_err());
        assert!(RegisterRange::new(u16::MAX, 2).is_err());
        assert!(RegisterRange::new(u16::MAX, 1).is_ok());
    }

    #[test]
    fn test_register_range_for_finger() {
        let range = RegisterRange::for_finger(REG_ANGLE_SET, FingerId::Index);
        assert_eq!(range.start(), REG_ANGLE_SET + 3);
        assert_eq!(range.count(), 1);
        assert!(RegisterRange::finger_block(REG_ANGLE_SET).contains(range.start()));
    }

    #[test]
    fn test_register_range_overlap() {
        let block = RegisterRange::finger_block(1486);
        assert!(block.overlaps(&RegisterRange::single(1491)));
        assert!(!block.overlaps(&RegisterRange::single(1492)));
        assert!(!block.overlaps(&RegisterRange::single(1485)));
    }

    #[test]
    fn test_register_range_check_write() {
        let block = RegisterRange::finger_block(1486);
        assert!(block.check_write(&[0; 6]).is_ok());
        assert_eq!(
            block.check_write(&[0; 5]),
            Err(Error::ValueCountMismatch {
                expected: 6,
                actual: 5
            })
        );
        let wide = RegisterRange::new(0, 124).unwrap();
        assert!(matches!(
            wide.check_write(&[0; 124]),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_register_range_display() {
        assert_eq!(RegisterRange::single(1004).to_string(), "1004");
        assert_eq!(RegisterRange::finger_block(1486).to_string(), "1486..=1491");
    }

    #[rstest]
    #[case(0, true)]
    #[case(1000, true)]
    #[case(1001, false)]
    fn test_check_target(#[case] value: u16, #[case] valid: bool) {
        assert_eq!(check_target(value).is_ok(), valid);
    }

    #[test]
    fn test_finger_values_short_read() {
        let result = finger_values(&[1, 2, 3], |v| v);
        assert_eq!(
            result,
            Err(Error::ShortRead {
                expected: 6,
                actual: 3
            })
        );
    }

    #[test]
    fn test_finger_values_signed_decode() {
        let forces = finger_values(&[0, 1, 0xFFFF, 500, 0x8000, 2], |v| v as i16).unwrap();
        assert_eq!(forces, [0, 1, -1, 500, i16::MIN, 2]);
    }

    #[rstest]
    #[case(0, FingerStatus::Idle)]
    #[case(1, FingerStatus::Moving)]
    #[case(2, FingerStatus::Stalled)]
    #[case(3, FingerStatus::Error)]
    #[case(7, FingerStatus::Unknown(7))]
    fn test_finger_status_codes(#[case] code: u16, #[case] status: FingerStatus) {
        assert_eq!(FingerStatus::from_code(code), status);
        assert_eq!(status.code(), code);
    }

    #[test]
    fn test_snapshot_from_parts() {
        let errors = std::array::from_fn(|i| decode(if i == 2 { 0b1 } else { 0 }));
        let snapshot = HandSnapshot::from_parts(
            [1000, 900, 800, 700, 600, 500],
            [0, 10, 20, 30, 40, -50],
            [30; 6],
            [FingerStatus::Idle; 6],
            errors,
        );

        assert_eq!(snapshot.fingers().len(), 6);
        assert_eq!(snapshot.finger(FingerId::Index).angle, 700);
        assert_eq!(snapshot.finger(FingerId::ThumbRotate).force, -50);
        assert!(snapshot.has_faults());
        assert!(!snapshot.finger(FingerId::Middle).errors.is_empty());
        assert!(snapshot.finger(FingerId::Little).errors.is_empty());
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = HandSnapshot::from_parts(
            [0; 6],
            [0; 6],
            [25; 6],
            [FingerStatus::Moving; 6],
            std::array::from_fn(|_| decode(0)),
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: HandSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }
}
