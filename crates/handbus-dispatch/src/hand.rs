//! High-level hand control over the command queue.
//!
//! [`HandController`] is what producers hold. Every method turns into one or
//! more commands on the shared queue; none of them touches the transport.
//! Writes are fire-and-forget unless an `_and_wait` variant is used. Reads
//! wait for their reply, bounded by the read timeout; a reply that does not
//! arrive in time is reported as a transport timeout.

use crate::command::{Command, CommandOutput, ReplyReceiver};
use crate::error::{DispatchError, Result};
use crate::gesture::{ExpandedStep, GestureLibrary};
use crate::queue::CommandQueue;
use handbus_core::constants::{
    DEFAULT_READ_TIMEOUT_MS, FINGER_COUNT, MAX_TARGET, REG_ANGLE_ACT, REG_ANGLE_SET, REG_CURRENT,
    REG_ERROR, REG_FORCE_ACT, REG_FORCE_SET, REG_POS_ACT, REG_SPEED_SET, REG_STATUS, REG_TEMP,
};
use handbus_core::faults::{self, decode};
use handbus_core::{
    ErrorFlags, FingerId, FingerStatus, HandSnapshot, RegisterRange, check_target, finger_values,
};
use handbus_hardware::TransportError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registers covered by one snapshot read, from the first actual angle to
/// the last temperature.
const SNAPSHOT_START: u16 = REG_ANGLE_ACT;
const SNAPSHOT_COUNT: u16 = REG_TEMP + FINGER_COUNT as u16 - REG_ANGLE_ACT;

fn snapshot_offset(base: u16) -> usize {
    usize::from(base - SNAPSHOT_START)
}

/// Handle for driving the hand. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HandController {
    queue: CommandQueue,
    gestures: Arc<GestureLibrary>,
    read_timeout: Duration,
    last_action: Arc<Mutex<Option<String>>>,
}

impl HandController {
    pub fn new(queue: CommandQueue, gestures: GestureLibrary) -> Self {
        Self {
            queue,
            gestures: Arc::new(gestures),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            last_action: Arc::new(Mutex::new(None)),
        }
    }

    /// Bound on how long a caller waits for a reply.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn gestures(&self) -> &GestureLibrary {
        &self.gestures
    }

    /// The most recent gesture or motion requested through this controller.
    pub fn last_action(&self) -> Option<String> {
        self.last_action.lock().clone()
    }

    fn record_action(&self, action: &str) {
        *self.last_action.lock() = Some(action.to_string());
    }

    async fn await_reply(&self, reply: ReplyReceiver) -> Result<CommandOutput> {
        match tokio::time::timeout(self.read_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DispatchError::WorkerGone),
            Err(_) => {
                let waited = u64::try_from(self.read_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(TransportError::timeout(waited).into())
            }
        }
    }

    /// Enqueue `command` and wait for its outcome.
    ///
    /// # Errors
    /// Returns the command's own failure, `QueueClosed` if the queue is shut
    /// down, or a transport timeout if no reply arrives in time.
    pub async fn submit(&self, command: Command) -> Result<CommandOutput> {
        let (command, reply) = command.with_reply();
        self.queue.enqueue(command)?;
        self.await_reply(reply).await
    }

    async fn write_and_wait(&self, command: Command) -> Result<()> {
        self.submit(command).await.map(|_| ())
    }

    fn angle_command(finger: FingerId, value: u16) -> Result<Command> {
        check_target(value)?;
        Command::write(RegisterRange::for_finger(REG_ANGLE_SET, finger), vec![value])
    }

    fn block_command(base: u16, values: [u16; FINGER_COUNT]) -> Result<Command> {
        for value in values {
            check_target(value)?;
        }
        Command::write(RegisterRange::finger_block(base), values.to_vec())
    }

    /// Set one finger's target angle (0 closed, 1000 open).
    ///
    /// # Errors
    /// Returns `DispatchError::Invalid` for a value outside 0-1000, or
    /// `QueueClosed`.
    pub fn set_angle(&self, finger: FingerId, value: u16) -> Result<()> {
        self.queue.enqueue(Self::angle_command(finger, value)?)
    }

    /// [`set_angle`](Self::set_angle), waiting for the write to complete.
    ///
    /// # Errors
    /// As `set_angle`, plus the write's transport error.
    pub async fn set_angle_and_wait(&self, finger: FingerId, value: u16) -> Result<()> {
        self.write_and_wait(Self::angle_command(finger, value)?).await
    }

    /// Set every finger's target angle in one write.
    ///
    /// # Errors
    /// Returns `DispatchError::Invalid` for any value outside 0-1000, or
    /// `QueueClosed`.
    pub fn set_all_angles(&self, angles: [u16; FINGER_COUNT]) -> Result<()> {
        self.queue.enqueue(Self::block_command(REG_ANGLE_SET, angles)?)
    }

    /// [`set_all_angles`](Self::set_all_angles), waiting for the write to
    /// complete.
    ///
    /// # Errors
    /// As `set_all_angles`, plus the write's transport error.
    pub async fn set_all_angles_and_wait(&self, angles: [u16; FINGER_COUNT]) -> Result<()> {
        self.write_and_wait(Self::block_command(REG_ANGLE_SET, angles)?)
            .await
    }

    /// Set the same speed for every finger.
    ///
    /// # Errors
    /// Returns `DispatchError::Invalid` outside 0-1000, or `QueueClosed`.
    pub fn set_all_speeds(&self, speed: u16) -> Result<()> {
        self.queue
            .enqueue(Self::block_command(REG_SPEED_SET, [speed; FINGER_COUNT])?)
    }

    /// Set the same force limit for every finger.
    ///
    /// # Errors
    /// Returns `DispatchError::Invalid` outside 0-1000, or `QueueClosed`.
    pub fn set_all_forces(&self, force: u16) -> Result<()> {
        self.queue
            .enqueue(Self::block_command(REG_FORCE_SET, [force; FINGER_COUNT])?)
    }

    /// Run a named gesture.
    ///
    /// Steps with a settle time are awaited: the step's last write must
    /// complete and the settle time pass before the next step is enqueued.
    /// The final step is fire-and-forget.
    ///
    /// # Errors
    /// Returns `UnknownGesture`, `QueueClosed`, or the transport error of a
    /// step that was awaited.
    pub async fn perform(&self, name: &str) -> Result<()> {
        self.perform_inner(name, false).await
    }

    /// [`perform`](Self::perform), also waiting for the final write.
    ///
    /// # Errors
    /// As `perform`, plus the final write's transport error.
    pub async fn perform_and_wait(&self, name: &str) -> Result<()> {
        self.perform_inner(name, true).await
    }

    async fn perform_inner(&self, name: &str, wait_last: bool) -> Result<()> {
        let steps = self.gestures.get(name)?.expand()?;
        info!(gesture = name, steps = steps.len(), "Performing gesture");
        self.record_action(name);

        let count = steps.len();
        for (index, ExpandedStep { commands, settle }) in steps.into_iter().enumerate() {
            let last_step = index + 1 == count;
            let wait = if last_step { wait_last } else { !settle.is_zero() };

            let mut pending = None;
            let writes = commands.len();
            for (position, command) in commands.into_iter().enumerate() {
                if wait && position + 1 == writes {
                    let (command, reply) = command.with_reply();
                    self.queue.enqueue(command)?;
                    pending = Some(reply);
                } else {
                    self.queue.enqueue(command)?;
                }
            }

            if let Some(reply) = pending {
                self.await_reply(reply).await?;
            }
            if !last_step && !settle.is_zero() {
                debug!(gesture = name, step = index + 1, ?settle, "Settling");
                tokio::time::sleep(settle).await;
            }
        }
        Ok(())
    }

    /// Open the hand ahead of every waiting command.
    ///
    /// # Errors
    /// Returns `QueueClosed` after shutdown.
    pub fn emergency_open(&self) -> Result<()> {
        warn!("Emergency open requested");
        self.record_action("emergency_open");
        let command = Self::block_command(REG_ANGLE_SET, [MAX_TARGET; FINGER_COUNT])?
            .urgent()
            .with_label("emergency-open");
        self.queue.enqueue(command)
    }

    async fn read_block(&self, range: RegisterRange) -> Result<Vec<u16>> {
        self.submit(Command::read(range)).await?.into_registers()
    }

    async fn read_fingers<T>(
        &self,
        base: u16,
        decode: impl Fn(u16) -> T,
    ) -> Result<[T; FINGER_COUNT]> {
        let registers = self.read_block(RegisterRange::finger_block(base)).await?;
        Ok(finger_values(&registers, decode)?)
    }

    /// Actual finger angles.
    ///
    /// # Errors
    /// Returns the read's failure; never stale or zeroed values.
    pub async fn get_finger_angles(&self) -> Result<[u16; FINGER_COUNT]> {
        self.read_fingers(REG_ANGLE_ACT, |v| v).await
    }

    /// Measured finger forces, signed.
    ///
    /// # Errors
    /// Returns the read's failure.
    pub async fn get_finger_forces(&self) -> Result<[i16; FINGER_COUNT]> {
        self.read_fingers(REG_FORCE_ACT, |v| v as i16).await
    }

    /// # Errors
    /// Returns the read's failure.
    pub async fn get_finger_temperatures(&self) -> Result<[u16; FINGER_COUNT]> {
        self.read_fingers(REG_TEMP, |v| v).await
    }

    /// # Errors
    /// Returns the read's failure.
    pub async fn get_finger_statuses(&self) -> Result<[FingerStatus; FINGER_COUNT]> {
        self.read_fingers(REG_STATUS, FingerStatus::from_code).await
    }

    /// Decoded fault sets.
    ///
    /// # Errors
    /// Returns the read's failure.
    pub async fn get_finger_errors(&self) -> Result<[ErrorFlags; FINGER_COUNT]> {
        self.read_fingers(REG_ERROR, decode).await
    }

    /// # Errors
    /// Returns the read's failure.
    pub async fn get_finger_positions(&self) -> Result<[u16; FINGER_COUNT]> {
        self.read_fingers(REG_POS_ACT, |v| v).await
    }

    /// Motor currents, signed.
    ///
    /// # Errors
    /// Returns the read's failure.
    pub async fn get_finger_currents(&self) -> Result<[i16; FINGER_COUNT]> {
        self.read_fingers(REG_CURRENT, |v| v as i16).await
    }

    /// Read every feedback quantity in one transaction.
    ///
    /// # Errors
    /// Returns the read's failure.
    pub async fn snapshot(&self) -> Result<HandSnapshot> {
        let range = RegisterRange::new(SNAPSHOT_START, SNAPSHOT_COUNT)?;
        let registers = self.read_block(range).await?;
        if registers.len() != usize::from(SNAPSHOT_COUNT) {
            return Err(handbus_core::Error::ShortRead {
                expected: usize::from(SNAPSHOT_COUNT),
                actual: registers.len(),
            }
            .into());
        }

        let block = |base: u16| &registers[snapshot_offset(base)..];
        Ok(HandSnapshot::from_parts(
            finger_values(block(REG_ANGLE_ACT), |v| v)?,
            finger_values(block(REG_FORCE_ACT), |v| v as i16)?,
            finger_values(block(REG_TEMP), |v| v)?,
            finger_values(block(REG_STATUS), FingerStatus::from_code)?,
            finger_values(block(REG_ERROR), decode)?,
        ))
    }

    /// Enqueue a clear-errors command if any of `flags` is non-empty.
    ///
    /// Returns whether a clear was enqueued. Faults raised after `flags` was
    /// read are not considered.
    ///
    /// # Errors
    /// Returns `QueueClosed` after shutdown.
    pub fn clear_errors_if_needed(&self, flags: &[ErrorFlags]) -> Result<bool> {
        if !faults::needs_clear(flags) {
            return Ok(false);
        }
        debug!(faults = ?faults::describe_finger_errors(flags), "Clearing hardware faults");
        self.queue
            .enqueue(Command::clear_errors().with_label("clear-if-needed"))?;
        Ok(true)
    }

    /// Read the fault registers and clear them if anything is set.
    ///
    /// # Errors
    /// Returns the read's failure, or `QueueClosed`.
    pub async fn check_and_clear_errors(&self) -> Result<bool> {
        let flags = self.get_finger_errors().await?;
        self.clear_errors_if_needed(&flags)
    }

    /// Clear faults unconditionally, then read back what remains.
    ///
    /// An empty result means every fault cleared.
    ///
    /// # Errors
    /// Returns the failure of the clear or of the read-back.
    pub async fn reset(&self) -> Result<[ErrorFlags; FINGER_COUNT]> {
        self.submit(Command::clear_errors().with_label("reset")).await?;
        let remaining = self.get_finger_errors().await?;
        if faults::needs_clear(&remaining) {
            warn!(
                faults = ?faults::describe_finger_errors(&remaining),
                "Faults persist after clear"
            );
        } else {
            info!("Hardware faults cleared");
        }
        Ok(remaining)
    }

    /// Current faults by finger name, faulted fingers only.
    ///
    /// # Errors
    /// Returns the read's failure.
    pub async fn describe_finger_errors(&self) -> Result<BTreeMap<FingerId, Vec<String>>> {
        let flags = self.get_finger_errors().await?;
        Ok(faults::describe_finger_errors(&flags))
    }

    /// Shut the command queue down. Returns the number of waiting commands
    /// that will not run.
    pub fn shutdown(&self) -> usize {
        self.queue.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::command_queue;

    #[test]
    fn test_snapshot_span_fits_one_read() {
        let range = RegisterRange::new(SNAPSHOT_START, SNAPSHOT_COUNT).unwrap();
        assert!(range.contains(REG_TEMP + 5));
        assert!(range.contains(REG_ERROR));
    }

    #[test]
    fn test_invalid_target_never_reaches_queue() {
        let (queue, _rx) = command_queue();
        let hand = HandController::new(queue.clone(), GestureLibrary::builtin());

        assert!(matches!(
            hand.set_angle(FingerId::Index, 1200),
            Err(DispatchError::Invalid(_))
        ));
        assert!(hand.set_all_speeds(1001).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_errors_if_needed_skips_clean_hand() {
        let (queue, _rx) = command_queue();
        let hand = HandController::new(queue.clone(), GestureLibrary::builtin());

        let flags = vec![ErrorFlags::none(); FINGER_COUNT];

        assert!(!hand.clear_errors_if_needed(&flags).unwrap());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_read_without_worker_times_out() {
        let (queue, _rx) = command_queue();
        let hand = HandController::new(queue, GestureLibrary::builtin())
            .with_read_timeout(Duration::from_millis(20));

        let result = hand.get_finger_angles().await;

        assert_eq!(
            result,
            Err(DispatchError::Transport(TransportError::timeout(20)))
        );
    }

    #[tokio::test]
    async fn test_unknown_gesture_enqueues_nothing() {
        let (queue, _rx) = command_queue();
        let hand = HandController::new(queue.clone(), GestureLibrary::builtin());

        let result = hand.perform("moonwalk").await;

        assert_eq!(result, Err(DispatchError::unknown_gesture("moonwalk")));
        assert!(queue.is_empty());
        assert_eq!(hand.last_action(), None);
    }
}
