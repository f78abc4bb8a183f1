//! Interactive keyboard session.
//!
//! Lines from the input are key presses: a single character, `esc`, or a run
//! of characters pressed one after another. Each press goes through the
//! router's debouncer before it reaches the hand.

use anyhow::Result;
use handbus_dispatch::{Action, HandController, Key, KeyEvent, KeyRouter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Gesture the hand returns to before the session ends.
pub const PARKING_GESTURE: &str = "open_all_fingers";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A quit key was pressed.
    Quit,
    /// The input closed.
    EndOfInput,
}

/// Key presses on one input line.
pub fn parse_line(line: &str) -> Vec<KeyEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    if let Ok(key) = line.parse::<Key>() {
        return vec![KeyEvent::Down(key)];
    }
    line.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| KeyEvent::Down(Key::char(c)))
        .collect()
}

/// Read key presses until quit or end of input, then park the hand.
///
/// Gestures run on their own tasks so input is never blocked by a gesture's
/// settle time. Fault reports are written to stdout.
pub async fn run<R>(hand: &HandController, router: &KeyRouter, input: R) -> Result<SessionEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut gestures = JoinSet::new();

    let end = loop {
        let Some(line) = lines.next_line().await? else {
            break SessionEnd::EndOfInput;
        };

        let mut quit = false;
        for event in parse_line(&line) {
            let Some(action) = router.route(&event, Instant::now()) else {
                debug!(key = %event.key(), "Key ignored");
                continue;
            };
            match action {
                Action::Gesture(name) => {
                    let hand = hand.clone();
                    gestures.spawn(async move {
                        if let Err(error) = hand.perform(&name).await {
                            warn!(gesture = %name, error = %error, "Gesture failed");
                        }
                    });
                }
                Action::ClearErrors => report_faults(hand).await,
                Action::Quit => {
                    quit = true;
                    break;
                }
            }
        }
        // Reap finished gestures so the set does not grow.
        while gestures.try_join_next().is_some() {}

        if quit {
            break SessionEnd::Quit;
        }
    };

    gestures.abort_all();
    info!(?end, "Parking hand");
    hand.perform_and_wait(PARKING_GESTURE).await?;
    Ok(end)
}

async fn report_faults(hand: &HandController) {
    match hand.reset().await {
        Ok(remaining) => {
            let faults = handbus_core::faults::describe_finger_errors(&remaining);
            if faults.is_empty() {
                println!("All faults cleared.");
            } else {
                for (finger, names) in faults {
                    println!("  {finger}: {}", names.join(", "));
                }
            }
        }
        Err(error) => warn!(error = %error, "Fault reset failed"),
    }
}
