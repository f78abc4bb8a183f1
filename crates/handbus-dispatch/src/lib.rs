//! Command dispatch and bus arbitration for the handbus controller.
//!
//! Every producer (keyboard handler, gesture expansion, feedback poller)
//! funnels commands into one [`CommandQueue`]. A single [`DispatchWorker`]
//! drains it and is the only caller of the transport, through a
//! [`BusArbiter`] that asserts one transaction in flight at a time.
//!
//! ```text
//! key event -> KeyRouter (debounce) -> HandController -> CommandQueue
//!                                                             |
//!                     transport <- BusArbiter <- DispatchWorker
//! ```
//!
//! # Example
//!
//! ```
//! use handbus_core::SlaveId;
//! use handbus_dispatch::{GestureLibrary, HandController, WorkerConfig, spawn_dispatch};
//! use handbus_hardware::{AnyTransport, mock::MockTransport};
//!
//! #[tokio::main]
//! async fn main() -> handbus_dispatch::Result<()> {
//!     let (transport, _bus) = MockTransport::new();
//!     let (queue, worker) =
//!         spawn_dispatch(AnyTransport::Mock(transport), SlaveId::default(), WorkerConfig::default());
//!     let hand = HandController::new(queue, GestureLibrary::builtin());
//!
//!     hand.perform_and_wait("pinch").await?;
//!     let angles = hand.get_finger_angles().await?;
//!     assert_eq!(angles[3], 350);
//!
//!     hand.shutdown();
//!     worker.join().await?;
//!     Ok(())
//! }
//! ```

pub mod arbiter;
pub mod command;
pub mod debounce;
pub mod error;
pub mod gesture;
pub mod hand;
pub mod keymap;
pub mod poller;
pub mod queue;
pub mod worker;

pub use arbiter::BusArbiter;
pub use command::{Command, CommandKind, CommandOutput, Priority};
pub use debounce::Debouncer;
pub use error::{DispatchError, Result};
pub use gesture::{Gesture, GestureLibrary, GestureStep};
pub use hand::HandController;
pub use keymap::{Action, Key, KeyBindings, KeyEvent, KeyRouter};
pub use poller::{Feedback, FeedbackPoller, FeedbackSample, PollerConfig, PollerHandle};
pub use queue::{CommandQueue, QueueReceiver, command_queue};
pub use worker::{DispatchWorker, RetryPolicy, WorkerConfig, WorkerHandle, WorkerSummary};

use handbus_core::SlaveId;
use handbus_hardware::AnyTransport;

/// Create a queue and start its worker over `transport`.
pub fn spawn_dispatch(
    transport: AnyTransport,
    slave: SlaveId,
    config: WorkerConfig,
) -> (CommandQueue, WorkerHandle) {
    let (queue, receiver) = command_queue();
    let worker = DispatchWorker::new(BusArbiter::new(transport, slave), receiver, config).spawn();
    (queue, worker)
}
