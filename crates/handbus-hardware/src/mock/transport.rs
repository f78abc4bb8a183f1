//! Mock Modbus transport for testing and development.
//!
//! This module provides a simulated hand: a bank of holding registers laid out
//! like the real register map, plus instrumentation that lets tests script
//! failures and observe exactly which transactions reached the bus.

use crate::{
    Result, TransportError,
    traits::ModbusTransport,
};
use handbus_core::constants::{
    CLEAR_ERROR_VALUE, FINGER_COUNT, MAX_TARGET, REG_ANGLE_ACT, REG_ANGLE_SET, REG_CLEAR_ERROR,
    REG_CURRENT, REG_ERROR, REG_FORCE_ACT, REG_FORCE_SET, REG_POS_ACT, REG_POS_SET, REG_SPEED_SET,
    REG_STATUS, REG_TEMP,
};
use handbus_core::{FingerId, FingerStatus, SlaveId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Resting temperature reported by the simulated actuators.
const IDLE_TEMPERATURE: u16 = 30;

/// Transactions kept in the call log before the oldest are dropped.
pub const DEFAULT_CALL_LOG_LIMIT: usize = 4096;

/// What a recorded transaction asked the bus to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Read { start: u16, count: u16 },
    Write { start: u16, values: Vec<u16> },
}

/// One transaction as seen by the mock bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    /// 1-based position in the order transactions were started.
    pub number: u64,
    pub slave: u8,
    pub kind: CallKind,
    /// Whether the transaction succeeded.
    pub ok: bool,
}

impl TransportCall {
    pub fn is_write_to(&self, address: u16) -> bool {
        matches!(&self.kind, CallKind::Write { start, .. } if *start == address)
    }

    pub fn is_read_of(&self, address: u16) -> bool {
        matches!(&self.kind, CallKind::Read { start, .. } if *start == address)
    }
}

#[derive(Debug)]
struct MockState {
    registers: BTreeMap<u16, u16>,
    calls: VecDeque<TransportCall>,
    call_log_limit: usize,
    started: u64,
    scripted: HashMap<u64, TransportError>,
    fail_all: Option<TransportError>,
    latency: Duration,
    in_flight: usize,
    max_in_flight: usize,
    mirror_targets: bool,
}

impl MockState {
    fn new() -> Self {
        // The device maps the whole table from the first target block to the
        // last temperature; registers without a named block read as zero.
        let mut registers: BTreeMap<u16, u16> =
            (REG_POS_SET..REG_TEMP + FINGER_COUNT as u16).map(|a| (a, 0)).collect();
        registers.insert(REG_CLEAR_ERROR, 0);
        for i in 0..FINGER_COUNT as u16 {
            registers.insert(REG_POS_SET + i, MAX_TARGET);
            registers.insert(REG_ANGLE_SET + i, MAX_TARGET);
            registers.insert(REG_FORCE_SET + i, 0);
            registers.insert(REG_SPEED_SET + i, MAX_TARGET);
            registers.insert(REG_POS_ACT + i, MAX_TARGET);
            registers.insert(REG_ANGLE_ACT + i, MAX_TARGET);
            registers.insert(REG_FORCE_ACT + i, 0);
            registers.insert(REG_CURRENT + i, 0);
            registers.insert(REG_ERROR + i, 0);
            registers.insert(REG_STATUS + i, FingerStatus::Idle.code());
            registers.insert(REG_TEMP + i, IDLE_TEMPERATURE);
        }

        Self {
            registers,
            calls: VecDeque::new(),
            call_log_limit: DEFAULT_CALL_LOG_LIMIT,
            started: 0,
            scripted: HashMap::new(),
            fail_all: None,
            latency: Duration::ZERO,
            in_flight: 0,
            max_in_flight: 0,
            mirror_targets: true,
        }
    }

    fn begin(&mut self) -> (u64, Duration) {
        self.started += 1;
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);
        (self.started, self.latency)
    }

    fn record(&mut self, call: TransportCall) {
        if self.call_log_limit == 0 {
            return;
        }
        while self.calls.len() >= self.call_log_limit {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }

    fn injected_failure(&mut self, number: u64) -> Option<TransportError> {
        self.scripted
            .remove(&number)
            .or_else(|| self.fail_all.clone())
    }

    fn read(&self, slave: u8, start: u16, count: u16) -> Result<Vec<u16>> {
        (0..count)
            .map(|offset| {
                let address = start.checked_add(offset).ok_or_else(|| {
                    TransportError::exception(slave, "IllegalDataAddress")
                })?;
                self.registers
                    .get(&address)
                    .copied()
                    .ok_or_else(|| TransportError::exception(slave, "IllegalDataAddress"))
            })
            .collect()
    }

    fn write(&mut self, slave: u8, start: u16, values: &[u16]) -> Result<()> {
        // The device rejects the whole frame if any address is unmapped.
        for offset in 0..values.len() {
            let address = u16::try_from(offset)
                .ok()
                .and_then(|o| start.checked_add(o))
                .filter(|a| self.registers.contains_key(a));
            if address.is_none() {
                return Err(TransportError::exception(slave, "IllegalDataAddress"));
            }
        }

        for (address, &value) in (start..).zip(values) {
            self.registers.insert(address, value);
            self.apply_side_effects(address, value);
        }
        Ok(())
    }

    fn apply_side_effects(&mut self, address: u16, value: u16) {
        if address == REG_CLEAR_ERROR && value == CLEAR_ERROR_VALUE {
            for i in 0..FINGER_COUNT as u16 {
                self.registers.insert(REG_ERROR + i, 0);
                if self.registers.get(&(REG_STATUS + i)) == Some(&FingerStatus::Error.code()) {
                    self.registers
                        .insert(REG_STATUS + i, FingerStatus::Idle.code());
                }
            }
            self.registers.insert(REG_CLEAR_ERROR, 0);
            return;
        }

        if !self.mirror_targets {
            return;
        }

        let finger_span = FINGER_COUNT as u16;
        if (REG_ANGLE_SET..REG_ANGLE_SET + finger_span).contains(&address) {
            self.registers
                .insert(REG_ANGLE_ACT + (address - REG_ANGLE_SET), value);
        } else if (REG_POS_SET..REG_POS_SET + finger_span).contains(&address) {
            self.registers
                .insert(REG_POS_ACT + (address - REG_POS_SET), value);
        } else if (REG_FORCE_SET..REG_FORCE_SET + finger_span).contains(&address) {
            self.registers
                .insert(REG_FORCE_ACT + (address - REG_FORCE_SET), value);
        }
    }
}

/// Mock Modbus transport for testing and development.
///
/// Writes to the angle, position and force target blocks are mirrored into
/// the matching actual-value blocks, so a write followed by a read observes the
/// new value. Writing `1` to the clear-error register zeroes every fault
/// register.
///
/// # Examples
///
/// ```
/// use handbus_core::SlaveId;
/// use handbus_hardware::mock::MockTransport;
/// use handbus_hardware::traits::ModbusTransport;
///
/// #[tokio::main]
/// async fn main() -> handbus_hardware::Result<()> {
///     let (mut transport, handle) = MockTransport::new();
///     let slave = SlaveId::default();
///
///     transport.write_registers(slave, 1486, &[0, 0, 0, 0, 0, 0]).await?;
///     let angles = transport.read_holding_registers(slave, 1546, 6).await?;
///
///     assert_eq!(angles, vec![0; 6]);
///     assert_eq!(handle.call_count(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    name: String,
}

impl MockTransport {
    /// Create a new mock transport with the default name.
    ///
    /// Returns a tuple of (MockTransport, MockTransportHandle) where the
    /// handle can be used to inspect and script the simulated bus.
    pub fn new() -> (Self, MockTransportHandle) {
        Self::with_name("Mock Bus".to_string())
    }

    /// Create a new mock transport with a custom name.
    pub fn with_name(name: String) -> (Self, MockTransportHandle) {
        let state = Arc::new(Mutex::new(MockState::new()));
        let handle = MockTransportHandle {
            state: Arc::clone(&state),
        };
        (Self { state, name }, handle)
    }

    async fn transact<T>(
        &mut self,
        slave: SlaveId,
        kind: CallKind,
        op: impl FnOnce(&mut MockState) -> Result<T>,
    ) -> Result<T> {
        let (number, latency) = self.state.lock().begin();

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        state.in_flight -= 1;
        let result = match state.injected_failure(number) {
            Some(error) => Err(error),
            None => op(&mut *state),
        };
        state.record(TransportCall {
            number,
            slave: slave.as_u8(),
            kind,
            ok: result.is_ok(),
        });
        result
    }
}

impl ModbusTransport for MockTransport {
    async fn read_holding_registers(
        &mut self,
        slave: SlaveId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.transact(slave, CallKind::Read { start, count }, |state| {
            state.read(slave.as_u8(), start, count)
        })
        .await
    }

    async fn write_registers(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> Result<()> {
        let kind = CallKind::Write {
            start,
            values: values.to_vec(),
        };
        self.transact(slave, kind, |state| state.write(slave.as_u8(), start, values))
            .await
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

/// Handle for inspecting and scripting a mock transport.
///
/// The handle shares state with its transport and can be cloned freely.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransportHandle {
    /// Current value of a register, if the address is mapped.
    pub fn register(&self, address: u16) -> Option<u16> {
        self.state.lock().registers.get(&address).copied()
    }

    /// Set a register directly, bypassing the bus and the call log.
    pub fn set_register(&self, address: u16, value: u16) {
        self.state.lock().registers.insert(address, value);
    }

    /// Raise fault bits on one actuator.
    pub fn set_fault_bits(&self, finger: FingerId, bits: u16) {
        self.set_register(REG_ERROR + finger.index() as u16, bits);
    }

    pub fn set_status(&self, finger: FingerId, status: FingerStatus) {
        self.set_register(REG_STATUS + finger.index() as u16, status.code());
    }

    pub fn set_temperature(&self, finger: FingerId, celsius: u16) {
        self.set_register(REG_TEMP + finger.index() as u16, celsius);
    }

    /// Set a measured force; negative values are stored two's complement.
    pub fn set_force(&self, finger: FingerId, force: i16) {
        self.set_register(REG_FORCE_ACT + finger.index() as u16, force as u16);
    }

    /// Stop copying target writes into the actual-value registers.
    ///
    /// Useful for simulating a finger that never reaches its target.
    pub fn set_mirror_targets(&self, enabled: bool) {
        self.state.lock().mirror_targets = enabled;
    }

    /// Fail the `number`-th transaction (1-based) with `error`.
    pub fn fail_call(&self, number: u64, error: TransportError) {
        self.state.lock().scripted.insert(number, error);
    }

    /// Fail every transaction with `error` until cleared with `None`.
    pub fn fail_all(&self, error: Option<TransportError>) {
        self.state.lock().fail_all = error;
    }

    /// Delay every transaction by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Logged transactions, oldest first, in completion order.
    ///
    /// Only the most recent [`DEFAULT_CALL_LOG_LIMIT`] calls are kept unless
    /// the limit is changed with [`set_call_log_limit`](Self::set_call_log_limit).
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.iter().cloned().collect()
    }

    /// Keep at most `limit` calls in the log; 0 turns recording off.
    pub fn set_call_log_limit(&self, limit: usize) {
        let mut state = self.state.lock();
        state.call_log_limit = limit;
        let excess = state.calls.len().saturating_sub(limit);
        state.calls.drain(..excess);
    }

    /// Number of transactions started so far.
    pub fn call_count(&self) -> u64 {
        self.state.lock().started
    }

    /// Highest number of transactions ever outstanding at once.
    pub fn max_concurrency(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slave() -> SlaveId {
        SlaveId::default()
    }

    #[tokio::test]
    async fn test_initial_hand_is_open_and_healthy() {
        let (mut transport, _handle) = MockTransport::new();

        let angles = transport
            .read_holding_registers(slave(), REG_ANGLE_ACT, 6)
            .await
            .unwrap();
        let errors = transport
            .read_holding_registers(slave(), REG_ERROR, 6)
            .await
            .unwrap();

        assert_eq!(angles, vec![MAX_TARGET; 6]);
        assert_eq!(errors, vec![0; 6]);
    }

    #[tokio::test]
    async fn test_angle_write_is_mirrored() {
        let (mut transport, handle) = MockTransport::new();

        transport
            .write_registers(slave(), REG_ANGLE_SET, &[0, 100, 200, 300, 400, 500])
            .await
            .unwrap();

        assert_eq!(handle.register(REG_ANGLE_ACT), Some(0));
        assert_eq!(handle.register(REG_ANGLE_ACT + 5), Some(500));
    }

    #[tokio::test]
    async fn test_mirroring_can_be_disabled() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_mirror_targets(false);

        transport
            .write_registers(slave(), REG_ANGLE_SET, &[0; 6])
            .await
            .unwrap();

        assert_eq!(handle.register(REG_ANGLE_SET), Some(0));
        assert_eq!(handle.register(REG_ANGLE_ACT), Some(MAX_TARGET));
    }

    #[tokio::test]
    async fn test_clear_error_zeroes_fault_registers() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_fault_bits(FingerId::Middle, 0b11);
        handle.set_status(FingerId::Middle, FingerStatus::Error);

        transport
            .write_registers(slave(), REG_CLEAR_ERROR, &[CLEAR_ERROR_VALUE])
            .await
            .unwrap();

        assert_eq!(handle.register(REG_ERROR + 2), Some(0));
        assert_eq!(handle.register(REG_STATUS + 2), Some(0));
        assert_eq!(handle.register(REG_CLEAR_ERROR), Some(0));
    }

    #[tokio::test]
    async fn test_unmapped_address_is_exception() {
        let (mut transport, handle) = MockTransport::new();

        let read = transport.read_holding_registers(slave(), 9000, 1).await;
        let write = transport.write_registers(slave(), 9000, &[1]).await;

        assert!(matches!(read, Err(TransportError::Exception { .. })));
        assert!(matches!(write, Err(TransportError::Exception { .. })));
        assert_eq!(handle.register(9000), None);
    }

    #[tokio::test]
    async fn test_feedback_table_reads_in_one_transaction() {
        let (mut transport, _handle) = MockTransport::new();
        let count = REG_TEMP + FINGER_COUNT as u16 - REG_ANGLE_ACT;

        let registers = transport
            .read_holding_registers(slave(), REG_ANGLE_ACT, count)
            .await
            .unwrap();

        assert_eq!(registers.len(), usize::from(count));
        assert_eq!(registers[0], MAX_TARGET);
        assert_eq!(registers[usize::from(count) - 1], IDLE_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_call_log_keeps_most_recent_calls() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_call_log_limit(3);

        for value in 0..5u16 {
            transport
                .write_registers(slave(), REG_ANGLE_SET, &[value])
                .await
                .unwrap();
        }

        let numbers: Vec<u64> = handle.calls().iter().map(|call| call.number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        assert_eq!(handle.call_count(), 5);

        handle.set_call_log_limit(0);
        transport
            .read_holding_registers(slave(), REG_TEMP, 6)
            .await
            .unwrap();
        assert!(handle.calls().is_empty());
        assert_eq!(handle.call_count(), 6);
    }

    #[tokio::test]
    async fn test_scripted_failure_hits_only_that_call() {
        let (mut transport, handle) = MockTransport::new();
        handle.fail_call(2, TransportError::no_response(1, "scripted"));

        let first = transport.read_holding_registers(slave(), REG_TEMP, 6).await;
        let second = transport.read_holding_registers(slave(), REG_TEMP, 6).await;
        let third = transport.read_holding_registers(slave(), REG_TEMP, 6).await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(TransportError::NoResponse { .. })));
        assert!(third.is_ok());

        let outcomes: Vec<bool> = handle.calls().iter().map(|c| c.ok).collect();
        assert_eq!(outcomes, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_change_registers() {
        let (mut transport, handle) = MockTransport::new();
        handle.fail_all(Some(TransportError::timeout(500)));

        let result = transport
            .write_registers(slave(), REG_ANGLE_SET, &[0; 6])
            .await;

        assert!(result.is_err());
        assert_eq!(handle.register(REG_ANGLE_SET), Some(MAX_TARGET));
    }

    #[tokio::test]
    async fn test_negative_force_reads_back_as_twos_complement() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_force(FingerId::Index, -25);

        let forces = transport
            .read_holding_registers(slave(), REG_FORCE_ACT, 6)
            .await
            .unwrap();

        assert_eq!(forces[3] as i16, -25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_transaction() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_latency(Duration::from_millis(40));

        let started = tokio::time::Instant::now();
        transport
            .read_holding_registers(slave(), REG_STATUS, 6)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(handle.max_concurrency(), 1);
    }

    #[test]
    fn test_describe() {
        let (transport, _handle) = MockTransport::with_name("bench".to_string());
        assert_eq!(transport.describe(), "mock:bench");
    }
}
