//! Periodic feedback sampling.
//!
//! The poller reads a [`HandSnapshot`] at a fixed rate through the same queue
//! as every other producer, so polls never interleave with writes. Only the
//! latest sample is kept; subscribers see it on a `watch` channel.

use crate::error::DispatchError;
use crate::hand::HandController;
use handbus_core::HandSnapshot;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Latest feedback state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Feedback {
    /// No sample taken yet.
    #[default]
    Pending,
    Snapshot(HandSnapshot),
    /// The last poll failed; the reason is the read's error.
    Unavailable(String),
}

/// One published sample.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedbackSample {
    /// Number of polls so far, starting at 1.
    pub sequence: u64,
    pub feedback: Feedback,
    /// Most recent action requested through the controller.
    pub last_action: Option<String>,
}

/// Poller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,

    /// Enqueue a clear-errors command whenever a sample shows faults.
    pub auto_clear: bool,
}

impl PollerConfig {
    /// Sample `hz` times per second. Non-positive rates fall back to 1 Hz.
    pub fn from_rate(hz: f64, auto_clear: bool) -> Self {
        let interval = if hz.is_finite() && hz > 0.0 {
            Duration::from_secs_f64(1.0 / hz)
        } else {
            Duration::from_secs(1)
        };
        Self {
            interval,
            auto_clear,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from_rate(10.0, false)
    }
}

/// Periodic snapshot reader.
#[derive(Debug)]
pub struct FeedbackPoller {
    hand: HandController,
    config: PollerConfig,
}

impl FeedbackPoller {
    pub fn new(hand: HandController, config: PollerConfig) -> Self {
        Self { hand, config }
    }

    /// Start polling on the current runtime.
    pub fn spawn(self) -> PollerHandle {
        let (sample_tx, sample_rx) = watch::channel(FeedbackSample::default());
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(sample_tx, stop_rx));
        PollerHandle {
            samples: sample_rx,
            stop: Some(stop_tx),
            task,
        }
    }

    async fn run(
        self,
        samples: watch::Sender<FeedbackSample>,
        mut stop: oneshot::Receiver<()>,
    ) -> u64 {
        info!(
            interval = ?self.config.interval,
            auto_clear = self.config.auto_clear,
            "Feedback poller started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence = 0;

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {}
            }

            sequence += 1;
            let feedback = match self.hand.snapshot().await {
                Ok(snapshot) => {
                    if self.config.auto_clear
                        && let Err(error) = self.hand.clear_errors_if_needed(&snapshot.error_flags())
                    {
                        debug!(error = %error, "Auto-clear not enqueued");
                    }
                    Feedback::Snapshot(snapshot)
                }
                Err(error) if error.is_terminal() => {
                    debug!(error = %error, "Queue gone, stopping poller");
                    break;
                }
                Err(error) => {
                    warn!(error = %error, "Feedback unavailable");
                    Feedback::Unavailable(error.to_string())
                }
            };

            samples.send_replace(FeedbackSample {
                sequence,
                feedback,
                last_action: self.hand.last_action(),
            });
        }

        info!(samples = sequence, "Feedback poller stopped");
        sequence
    }
}

/// Handle to a running poller.
///
/// Dropping the handle stops the poller after its current poll.
#[derive(Debug)]
pub struct PollerHandle {
    samples: watch::Receiver<FeedbackSample>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<u64>,
}

impl PollerHandle {
    /// The most recent sample.
    pub fn latest(&self) -> FeedbackSample {
        self.samples.borrow().clone()
    }

    /// A receiver notified on every new sample.
    pub fn subscribe(&self) -> watch::Receiver<FeedbackSample> {
        self.samples.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling and return the number of polls taken.
    ///
    /// # Errors
    /// Returns `DispatchError::WorkerGone` if the poller task panicked.
    pub async fn stop(mut self) -> Result<u64, DispatchError> {
        if let Some(stop) = self.stop.take() {
            // The task may already have exited on its own.
            let _ = stop.send(());
        }
        (&mut self.task).await.map_err(|_| DispatchError::WorkerGone)
    }
}
