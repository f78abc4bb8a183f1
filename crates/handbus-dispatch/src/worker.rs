//! Dispatch worker.
//!
//! The worker is the only caller of the transport. It takes commands off the
//! queue one at a time, runs each through the [`BusArbiter`] and reports the
//! outcome to the command's result channel. A failing command never stops
//! the loop; only queue shutdown does.
//!
//! # Lifecycle
//!
//! 1. Create the queue with [`command_queue`](crate::queue::command_queue)
//! 2. Build a worker over the receiver and a transport
//! 3. Call [`DispatchWorker::spawn`] and keep the [`WorkerHandle`]
//! 4. Shut the queue down; [`WorkerHandle::join`] returns a [`WorkerSummary`]

use crate::arbiter::BusArbiter;
use crate::command::{Command, CommandKind, CommandOutput};
use crate::error::{DispatchError, Result};
use crate::queue::QueueReceiver;
use handbus_core::RegisterRange;
use handbus_core::constants::{CLEAR_ERROR_VALUE, REG_CLEAR_ERROR};
use handbus_hardware::{AnyTransport, ModbusTransport, TransportError};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often a failed transaction is attempted before giving up.
///
/// Only retryable transport errors (timeout, no response, malformed
/// response) are repeated. All attempts belong to the same command; the queue
/// is not consulted in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 count as 1.
    pub attempts: u32,

    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Worker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerConfig {
    pub retry: RetryPolicy,

    /// Pause after every successful write, giving the actuators time to
    /// pick up the new target before the next frame.
    pub write_cooldown: Duration,
}

/// Counters reported when the worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerSummary {
    /// Commands that completed successfully.
    pub executed: u64,

    /// Commands whose transaction failed.
    pub failed: u64,

    /// Commands terminally failed at queue shutdown without running.
    pub discarded: u64,
}

/// Single consumer of the command queue.
#[derive(Debug)]
pub struct DispatchWorker<T> {
    arbiter: BusArbiter<T>,
    queue: QueueReceiver,
    config: WorkerConfig,
}

impl<T: ModbusTransport> DispatchWorker<T> {
    pub fn new(arbiter: BusArbiter<T>, queue: QueueReceiver, config: WorkerConfig) -> Self {
        Self {
            arbiter,
            queue,
            config,
        }
    }

    /// Run until the queue is shut down.
    pub async fn run(mut self) -> WorkerSummary {
        info!(
            transport = %self.arbiter.describe(),
            slave = self.arbiter.slave().as_u8(),
            "Dispatch worker started"
        );

        let mut summary = WorkerSummary::default();
        while let Some(command) = self.queue.dequeue().await {
            if self.process(command).await {
                summary.executed += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary.discarded = self.queue.discarded();

        info!(
            executed = summary.executed,
            failed = summary.failed,
            discarded = summary.discarded,
            "Dispatch worker stopped"
        );
        summary
    }

    /// Execute one command and deliver its outcome. Returns whether it
    /// succeeded.
    async fn process(&self, command: Command) -> bool {
        debug!(command = %command, "Executing command");
        let result = self.execute(command.kind()).await;
        let succeeded = result.is_ok();

        if let Err(error) = &result
            && !command.wants_reply()
        {
            let range = command.range();
            warn!(
                command = %command,
                slave = self.arbiter.slave().as_u8(),
                start = range.start(),
                count = range.count(),
                error = %error,
                "Fire-and-forget command failed"
            );
        }

        if command.wants_reply() && !command.complete(result) {
            debug!("Caller stopped waiting before the reply");
        }
        succeeded
    }

    async fn execute(&self, kind: &CommandKind) -> Result<CommandOutput> {
        let arbiter = &self.arbiter;
        match kind {
            CommandKind::Write { range, values } => {
                let range = *range;
                self.with_retry(move || arbiter.write(range, values)).await?;
                self.cool_down().await;
                Ok(CommandOutput::Written)
            }
            CommandKind::Read { range } => {
                let range = *range;
                let values = self.with_retry(move || arbiter.read(range)).await?;
                Ok(CommandOutput::Registers(values))
            }
            CommandKind::ClearErrors => {
                let range = RegisterRange::single(REG_CLEAR_ERROR);
                self.with_retry(move || arbiter.write(range, &[CLEAR_ERROR_VALUE]))
                    .await?;
                self.cool_down().await;
                Ok(CommandOutput::Cleared)
            }
        }
    }

    async fn with_retry<F, Fut, R>(&self, mut transaction: F) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<R, TransportError>>,
    {
        let attempts = self.config.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match transaction().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < attempts => {
                    debug!(attempt, attempts, error = %error, "Retrying transaction");
                    attempt += 1;
                    if !self.config.retry.backoff.is_zero() {
                        tokio::time::sleep(self.config.retry.backoff).await;
                    }
                }
                Err(error) => return Err(DispatchError::Transport(error)),
            }
        }
    }

    async fn cool_down(&self) {
        if !self.config.write_cooldown.is_zero() {
            tokio::time::sleep(self.config.write_cooldown).await;
        }
    }
}

impl DispatchWorker<AnyTransport> {
    /// Start the worker on the current runtime.
    pub fn spawn(self) -> WorkerHandle {
        WorkerHandle {
            task: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a running dispatch worker.
#[derive(Debug)]
pub struct WorkerHandle {
    task: JoinHandle<WorkerSummary>,
}

impl WorkerHandle {
    /// Whether the worker loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to exit.
    ///
    /// The worker only exits after the queue has been shut down, so callers
    /// normally shut the queue down first.
    ///
    /// # Errors
    /// Returns `DispatchError::WorkerGone` if the worker panicked.
    pub async fn join(self) -> Result<WorkerSummary> {
        match self.task.await {
            Ok(summary) => Ok(summary),
            Err(e) if e.is_cancelled() => Err(DispatchError::WorkerGone),
            Err(e) => {
                warn!(error = %e, "Dispatch worker panicked");
                Err(DispatchError::WorkerGone)
            }
        }
    }
}
