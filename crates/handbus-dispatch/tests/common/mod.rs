//! Common test utilities for dispatch integration tests.
//!
//! Every test runs against the mock transport. [`Rig`] wires a queue, a
//! spawned worker, a controller and the mock's control handle together so
//! each test only states what it does differently.

#![allow(dead_code)]

use handbus_core::constants::REG_ANGLE_SET;
use handbus_core::{RegisterRange, SlaveId};
use handbus_dispatch::{
    BusArbiter, Command, CommandQueue, DispatchWorker, GestureLibrary, HandController,
    WorkerConfig, WorkerHandle, WorkerSummary, command_queue,
};
use handbus_hardware::AnyTransport;
use handbus_hardware::mock::{CallKind, MockTransport, MockTransportHandle};

/// A running dispatch stack over a mock hand.
pub struct Rig {
    pub queue: CommandQueue,
    pub hand: HandController,
    pub bus: MockTransportHandle,
    pub worker: WorkerHandle,
}

impl Rig {
    /// Stack with default worker settings.
    pub fn start() -> Self {
        Self::with_config(WorkerConfig::default())
    }

    pub fn with_config(config: WorkerConfig) -> Self {
        let (transport, bus) = MockTransport::new();
        let arbiter = BusArbiter::new(AnyTransport::Mock(transport), SlaveId::default());
        let (queue, receiver) = command_queue();
        let worker = DispatchWorker::new(arbiter, receiver, config).spawn();
        let hand = HandController::new(queue.clone(), GestureLibrary::builtin());
        Self {
            queue,
            hand,
            bus,
            worker,
        }
    }

    /// Shut the queue down and wait for the worker's summary.
    pub async fn finish(self) -> WorkerSummary {
        self.queue.shutdown();
        self.worker
            .join()
            .await
            .expect("worker should exit cleanly")
    }
}

/// Single-register angle write for finger 0.
pub fn finger0_write(value: u16) -> Command {
    Command::write(RegisterRange::single(REG_ANGLE_SET), vec![value])
        .expect("one value for one register")
}

/// Start addresses of the writes the bus saw, in completion order.
pub fn written_values(bus: &MockTransportHandle) -> Vec<Vec<u16>> {
    bus.calls()
        .into_iter()
        .filter_map(|call| match call.kind {
            CallKind::Write { values, .. } => Some(values),
            CallKind::Read { .. } => None,
        })
        .collect()
}
