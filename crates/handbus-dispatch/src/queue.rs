//! Unbounded multi-producer, single-consumer command queue.
//!
//! [`CommandQueue`] is the producer side and can be cloned freely; the single
//! [`QueueReceiver`] belongs to the dispatch worker. Normal commands come out
//! in submission order. Urgent commands overtake every waiting normal command
//! and keep submission order among themselves.
//!
//! Shutdown is one-shot. Commands still waiting when it happens are failed
//! with [`DispatchError::QueueClosed`] (or logged as discarded when nobody
//! waits for them); nothing is silently lost.

use crate::command::{Command, Priority};
use crate::error::{DispatchError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct State {
    normal: VecDeque<Command>,
    urgent: VecDeque<Command>,
    closed: bool,
    enqueued: u64,
    discarded: u64,
}

impl State {
    fn pop(&mut self) -> Option<Command> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.normal.len() + self.urgent.len()
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    /// Close the queue and terminally fail whatever is still waiting.
    ///
    /// Returns the number of commands that will never run. Idempotent.
    fn close(&self) -> usize {
        let leftovers: Vec<Command> = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            let mut leftovers: Vec<Command> = state.urgent.drain(..).collect();
            leftovers.extend(state.normal.drain(..));
            state.discarded += leftovers.len() as u64;
            leftovers
        };
        self.notify.notify_one();

        let count = leftovers.len();
        for command in leftovers {
            let description = command.to_string();
            let range = command.range();
            if !command.complete(Err(DispatchError::QueueClosed)) {
                warn!(
                    command = %description,
                    start = range.start(),
                    count = range.count(),
                    "Discarded command at queue shutdown"
                );
            }
        }
        count
    }
}

/// Create a new command queue.
///
/// Returns the cloneable producer side and the single consumer side.
pub fn command_queue() -> (CommandQueue, QueueReceiver) {
    let shared = Arc::new(Shared::default());
    (
        CommandQueue {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

/// Producer side of the command queue.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    shared: Arc<Shared>,
}

impl CommandQueue {
    /// Append a command. Never blocks.
    ///
    /// # Errors
    /// Returns `DispatchError::QueueClosed` after shutdown. The rejected
    /// command is dropped without running.
    pub fn enqueue(&self, command: Command) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(DispatchError::QueueClosed);
            }
            state.enqueued += 1;
            debug!(
                command = %command,
                sequence = state.enqueued,
                urgent = command.priority() == Priority::Urgent,
                "Command enqueued"
            );
            match command.priority() {
                Priority::Normal => state.normal.push_back(command),
                Priority::Urgent => state.urgent.push_back(command),
            }
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Shut the queue down.
    ///
    /// The command the worker is executing, if any, still completes. Returns
    /// the number of waiting commands that were terminally failed.
    pub fn shutdown(&self) -> usize {
        let failed = self.shared.close();
        info!(failed, "Command queue shut down");
        failed
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of commands waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.shared.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer side of the command queue. Owned by the dispatch worker.
///
/// Dropping the receiver closes the queue.
#[derive(Debug)]
pub struct QueueReceiver {
    shared: Arc<Shared>,
}

impl QueueReceiver {
    /// Wait for the next command.
    ///
    /// Returns `None` once the queue has been shut down.
    pub async fn dequeue(&mut self) -> Option<Command> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(command) = state.pop() {
                    return Some(command);
                }
            }
            // A notify_one issued between the check and this await leaves a
            // permit behind, so no wakeup is lost.
            self.shared.notify.notified().await;
        }
    }

    /// Number of commands terminally failed at shutdown.
    pub fn discarded(&self) -> u64 {
        self.shared.state.lock().discarded
    }

    /// Producer handle for the same queue.
    pub fn queue(&self) -> CommandQueue {
        CommandQueue {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for QueueReceiver {
    fn drop(&mut self) {
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use handbus_core::RegisterRange;
    use std::time::Duration;

    fn read(start: u16) -> Command {
        Command::read(RegisterRange::single(start))
    }

    fn start_of(command: &Command) -> u16 {
        command.range().start()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut rx) = command_queue();
        for start in 1..=5 {
            queue.enqueue(read(start)).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(start_of(&rx.dequeue().await.unwrap()));
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_urgent_overtakes_waiting_normal_commands() {
        let (queue, mut rx) = command_queue();
        queue.enqueue(read(1)).unwrap();
        queue.enqueue(read(2)).unwrap();
        queue.enqueue(read(100).urgent()).unwrap();
        queue.enqueue(read(101).urgent()).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(start_of(&rx.dequeue().await.unwrap()));
        }
        assert_eq!(seen, vec![100, 101, 1, 2]);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let (queue, mut rx) = command_queue();

        let consumer = tokio::spawn(async move { rx.dequeue().await.map(|c| start_of(&c)) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(read(7)).unwrap();

        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let (queue, _rx) = command_queue();
        queue.shutdown();

        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(read(1)), Err(DispatchError::QueueClosed));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiting_consumer() {
        let (queue, mut rx) = command_queue();

        let consumer = tokio::spawn(async move { rx.dequeue().await.is_none() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.shutdown();

        assert!(consumer.await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_fails_waiting_commands() {
        let (queue, rx) = command_queue();
        let (waiting, reply) = read(1).with_reply();
        queue.enqueue(waiting).unwrap();
        queue.enqueue(read(2)).unwrap();

        assert_eq!(queue.shutdown(), 2);
        assert_eq!(reply.await.unwrap(), Err(DispatchError::QueueClosed));
        assert_eq!(rx.discarded(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (queue, _rx) = command_queue();
        queue.enqueue(read(1)).unwrap();

        assert_eq!(queue.shutdown(), 1);
        assert_eq!(queue.shutdown(), 0);
    }

    #[tokio::test]
    async fn test_dropping_receiver_closes_queue() {
        let (queue, rx) = command_queue();
        let (waiting, reply) = Command::clear_errors().with_reply();
        queue.enqueue(waiting).unwrap();

        drop(rx);

        assert!(queue.is_closed());
        let result: Result<CommandOutput> = reply.await.unwrap();
        assert_eq!(result, Err(DispatchError::QueueClosed));
    }
}
