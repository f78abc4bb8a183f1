//! # handbus
//!
//! Keyboard control of a six-actuator robotic hand over RS-485 Modbus RTU.
//!
//! ```bash
//! # Real hand on the default port
//! handbus --port /dev/ttyUSB0
//!
//! # Simulated hand, verbose
//! handbus --port mock --log-level debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use handbus_dispatch::{
    Action, Feedback, FeedbackPoller, GestureLibrary, HandController, KeyBindings, KeyRouter,
    PollerHandle, spawn_dispatch,
};
use handbus_hardware::{ModbusTransport, open_transport};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod session;

use cli::Cli;
use config::AppConfig;

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!(error))
}

fn print_bindings(bindings: &KeyBindings, gestures: &GestureLibrary) {
    println!("Keys (type one and press enter):");
    for (key, action) in bindings.iter() {
        let description = match action {
            Action::Gesture(name) => gestures
                .get(name)
                .map(|gesture| gesture.description.as_str())
                .unwrap_or_default(),
            Action::ClearErrors => "clear hardware faults and report what remains",
            Action::Quit => "open the hand and exit",
        };
        println!("  {:<4} {:<20} {description}", key.to_string(), action.to_string());
    }
}

/// Warn about faults the poller sees until it stops.
fn watch_faults(poller: &PollerHandle) {
    let mut samples = poller.subscribe();
    tokio::spawn(async move {
        while samples.changed().await.is_ok() {
            let sample = samples.borrow_and_update().clone();
            if let Feedback::Snapshot(snapshot) = &sample.feedback
                && snapshot.has_faults()
            {
                let faults = handbus_core::faults::describe_finger_errors(&snapshot.error_flags());
                warn!(
                    sequence = sample.sequence,
                    last_action = sample.last_action.as_deref().unwrap_or("-"),
                    ?faults,
                    "Hardware faults reported"
                );
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = cli.resolve_config()?;
    let gestures = config.gesture_library()?;
    let bindings = config.key_bindings(&gestures)?;

    if cli.list {
        print_bindings(&bindings, &gestures);
        return Ok(());
    }

    run(config, gestures, bindings).await
}

async fn run(
    config: AppConfig,
    gestures: GestureLibrary,
    bindings: KeyBindings,
) -> Result<()> {
    let transport = open_transport(&config.link)
        .with_context(|| format!("opening {}", config.link.port))?;
    info!(
        transport = %transport.describe(),
        slave = config.link.slave_id.as_u8(),
        "Hand connected"
    );

    let (queue, worker) = spawn_dispatch(transport, config.link.slave_id, config.dispatch.worker());
    let hand = HandController::new(queue, gestures).with_read_timeout(config.dispatch.read_timeout());

    hand.set_all_speeds(config.motion.speed)
        .context("setting finger speed")?;
    hand.set_all_forces(config.motion.force)
        .context("setting finger force")?;

    let poller = config.poller.enabled.then(|| {
        let poller = FeedbackPoller::new(hand.clone(), config.poller.poller()).spawn();
        watch_faults(&poller);
        poller
    });

    let router = KeyRouter::new(bindings, config.dispatch.debounce());
    print_bindings(router.bindings(), hand.gestures());

    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = session::run(&hand, &router, stdin).await;

    if let Some(poller) = poller {
        let polls = poller.stop().await?;
        info!(polls, "Poller stopped");
    }
    hand.shutdown();
    let summary = worker.join().await?;
    info!(
        executed = summary.executed,
        failed = summary.failed,
        discarded = summary.discarded,
        "Shut down"
    );

    outcome.map(|_| ())
}
