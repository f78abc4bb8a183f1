//! Bus arbiter.
//!
//! Every transport call passes through [`BusArbiter`]. It holds the transport
//! behind a lock and flags the single transaction in flight, so overlapping
//! transactions on the half-duplex line are impossible rather than merely
//! unlikely.

use handbus_core::{RegisterRange, SlaveId};
use handbus_hardware::{ModbusTransport, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::trace;

/// Marks a transaction as in flight for as long as it lives.
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let already = flag.swap(true, Ordering::AcqRel);
        debug_assert!(!already, "second transaction started while one is in flight");
        Self { flag }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Mutual-exclusion guard around a transport.
#[derive(Debug)]
pub struct BusArbiter<T> {
    transport: Mutex<T>,
    slave: SlaveId,
    in_flight: AtomicBool,
    transactions: AtomicU64,
    description: String,
}

impl<T: ModbusTransport> BusArbiter<T> {
    pub fn new(transport: T, slave: SlaveId) -> Self {
        let description = transport.describe();
        Self {
            transport: Mutex::new(transport),
            slave,
            in_flight: AtomicBool::new(false),
            transactions: AtomicU64::new(0),
            description,
        }
    }

    /// Read `range` from the slave.
    ///
    /// # Errors
    /// Propagates the transport's error for this transaction.
    pub async fn read(&self, range: RegisterRange) -> Result<Vec<u16>> {
        let mut transport = self.transport.lock().await;
        let _in_flight = InFlight::enter(&self.in_flight);
        let n = self.transactions.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(transaction = n, slave = self.slave.as_u8(), %range, "Bus read");

        transport
            .read_holding_registers(self.slave, range.start(), range.count())
            .await
    }

    /// Write `values` to `range` on the slave.
    ///
    /// # Errors
    /// Propagates the transport's error for this transaction.
    pub async fn write(&self, range: RegisterRange, values: &[u16]) -> Result<()> {
        let mut transport = self.transport.lock().await;
        let _in_flight = InFlight::enter(&self.in_flight);
        let n = self.transactions.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(transaction = n, slave = self.slave.as_u8(), %range, "Bus write");

        transport
            .write_registers(self.slave, range.start(), values)
            .await
    }
}

impl<T> BusArbiter<T> {
    pub fn slave(&self) -> SlaveId {
        self.slave
    }

    /// Whether a transaction is currently on the line.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Transactions started so far.
    pub fn transactions(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }

    pub fn describe(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handbus_core::constants::{REG_ANGLE_ACT, REG_ANGLE_SET};
    use handbus_hardware::mock::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_then_read_through_arbiter() {
        let (transport, handle) = MockTransport::new();
        let arbiter = BusArbiter::new(transport, SlaveId::default());

        arbiter
            .write(RegisterRange::finger_block(REG_ANGLE_SET), &[250; 6])
            .await
            .unwrap();
        let angles = arbiter
            .read(RegisterRange::finger_block(REG_ANGLE_ACT))
            .await
            .unwrap();

        assert_eq!(angles, vec![250; 6]);
        assert_eq!(arbiter.transactions(), 2);
        assert_eq!(handle.call_count(), 2);
        assert!(!arbiter.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let (transport, handle) = MockTransport::new();
        handle.set_latency(Duration::from_millis(20));
        let arbiter = Arc::new(BusArbiter::new(transport, SlaveId::default()));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let arbiter = Arc::clone(&arbiter);
            tasks.push(tokio::spawn(async move {
                arbiter
                    .read(RegisterRange::finger_block(REG_ANGLE_ACT))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(handle.max_concurrency(), 1);
        assert_eq!(handle.call_count(), 4);
    }

    #[tokio::test]
    async fn test_in_flight_flag_cleared_after_failure() {
        let (transport, handle) = MockTransport::new();
        handle.fail_call(1, handbus_hardware::TransportError::timeout(500));
        let arbiter = BusArbiter::new(transport, SlaveId::default());

        let result = arbiter.read(RegisterRange::single(REG_ANGLE_ACT)).await;

        assert!(result.is_err());
        assert!(!arbiter.is_busy());
    }
}
