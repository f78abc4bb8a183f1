//! Gestures as data.
//!
//! A [`Gesture`] is a named list of steps; each step is an ordered list of
//! per-finger angle targets and an optional settle time before the next
//! step. Expansion turns every target into its own single-register write, in
//! authoring order, so adding a gesture never touches the dispatch code.
//!
//! Gestures deserialize from TOML:
//!
//! ```toml
//! [[gestures]]
//! name = "wave_start"
//! description = "Open everything but the thumb"
//!
//! [[gestures.steps]]
//! settle_ms = 300
//! targets = [
//!     { finger = "thumb_rotate", value = 0 },
//!     { finger = "index", value = 1000 },
//! ]
//! ```

use crate::command::Command;
use crate::error::{DispatchError, Result};
use handbus_core::constants::{FINGER_COUNT, MAX_TARGET, REG_ANGLE_SET, REG_FORCE_SET};
use handbus_core::{FingerId, RegisterRange, check_target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Angle target for one finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerTarget {
    pub finger: FingerId,
    pub value: u16,
}

impl FingerTarget {
    pub fn new(finger: FingerId, value: u16) -> Self {
        Self { finger, value }
    }
}

/// Targets that are sent together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureStep {
    pub targets: Vec<FingerTarget>,

    /// Time to let the fingers travel before the next step starts.
    #[serde(default)]
    pub settle_ms: u64,
}

impl GestureStep {
    pub fn new(targets: impl IntoIterator<Item = (FingerId, u16)>) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|(finger, value)| FingerTarget::new(finger, value))
                .collect(),
            settle_ms: 0,
        }
    }

    #[must_use]
    pub fn settle(mut self, millis: u64) -> Self {
        self.settle_ms = millis;
        self
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// A named, pre-authored hand pose or motion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gesture {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Force limit applied to every finger before the first step.
    #[serde(default)]
    pub force: Option<u16>,

    pub steps: Vec<GestureStep>,
}

/// Commands for one step of an expanded gesture.
#[derive(Debug)]
pub struct ExpandedStep {
    pub commands: Vec<Command>,
    pub settle: Duration,
}

impl Gesture {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            force: None,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: GestureStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn with_force(mut self, force: u16) -> Self {
        self.force = Some(force);
        self
    }

    /// Check that the gesture can be expanded.
    ///
    /// # Errors
    /// Returns `DispatchError::InvalidGesture` for an empty name, a gesture
    /// without steps or a step without targets, and `DispatchError::Invalid`
    /// for a value outside 0-1000.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::InvalidGesture("gesture without a name".into()));
        }
        if self.steps.is_empty() {
            return Err(DispatchError::InvalidGesture(format!(
                "{} has no steps",
                self.name
            )));
        }
        // Every step must end in a write the controller can wait on.
        if let Some(index) = self.steps.iter().position(|step| step.targets.is_empty()) {
            return Err(DispatchError::InvalidGesture(format!(
                "{} step {} has no targets",
                self.name,
                index + 1
            )));
        }
        if let Some(force) = self.force {
            check_target(force)?;
        }
        for target in self.steps.iter().flat_map(|step| &step.targets) {
            check_target(target.value)?;
        }
        Ok(())
    }

    /// Expand into write commands, one per finger target.
    ///
    /// # Errors
    /// Returns the validation error if the gesture is not usable.
    pub fn expand(&self) -> Result<Vec<ExpandedStep>> {
        self.validate()?;

        let mut expanded = Vec::with_capacity(self.steps.len() + 1);
        if let Some(force) = self.force {
            let command = Command::write(
                RegisterRange::finger_block(REG_FORCE_SET),
                vec![force; FINGER_COUNT],
            )?
            .with_label(format!("{}: force", self.name));
            expanded.push(ExpandedStep {
                commands: vec![command],
                settle: Duration::ZERO,
            });
        }

        for (index, step) in self.steps.iter().enumerate() {
            let commands = step
                .targets
                .iter()
                .map(|target| {
                    Ok(Command::write(
                        RegisterRange::for_finger(REG_ANGLE_SET, target.finger),
                        vec![target.value],
                    )?
                    .with_label(format!("{} step {}", self.name, index + 1)))
                })
                .collect::<Result<Vec<_>>>()?;
            expanded.push(ExpandedStep {
                commands,
                settle: step.settle_time(),
            });
        }
        Ok(expanded)
    }
}

/// Gestures by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureLibrary {
    gestures: BTreeMap<String, Gesture>,
}

impl GestureLibrary {
    pub fn empty() -> Self {
        Self {
            gestures: BTreeMap::new(),
        }
    }

    /// The standard gesture set.
    pub fn builtin() -> Self {
        let mut library = Self::empty();
        for gesture in builtin_gestures() {
            library.gestures.insert(gesture.name.clone(), gesture);
        }
        library
    }

    /// Add a gesture, replacing one with the same name.
    ///
    /// # Errors
    /// Returns the validation error if the gesture is not usable.
    pub fn insert(&mut self, gesture: Gesture) -> Result<Option<Gesture>> {
        gesture.validate()?;
        Ok(self.gestures.insert(gesture.name.clone(), gesture))
    }

    /// Look up a gesture.
    ///
    /// # Errors
    /// Returns `DispatchError::UnknownGesture` if no gesture has this name.
    pub fn get(&self, name: &str) -> Result<&Gesture> {
        self.gestures
            .get(name)
            .ok_or_else(|| DispatchError::unknown_gesture(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.gestures.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.gestures.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }
}

impl Default for GestureLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

const OPEN: u16 = MAX_TARGET;
const CLOSED: u16 = 0;

fn four_fingers(value: u16) -> [(FingerId, u16); 4] {
    [
        (FingerId::Little, value),
        (FingerId::Ring, value),
        (FingerId::Middle, value),
        (FingerId::Index, value),
    ]
}

/// Targets for the four fingers in order little, ring, middle, index.
fn fingers(little: u16, ring: u16, middle: u16, index: u16) -> [(FingerId, u16); 4] {
    [
        (FingerId::Little, little),
        (FingerId::Ring, ring),
        (FingerId::Middle, middle),
        (FingerId::Index, index),
    ]
}

fn thumb(bend: u16, rotate: u16) -> [(FingerId, u16); 2] {
    [(FingerId::ThumbBend, bend), (FingerId::ThumbRotate, rotate)]
}

/// A single step setting every actuator at once.
fn pose(fingers: [(FingerId, u16); 4], thumb: [(FingerId, u16); 2]) -> GestureStep {
    GestureStep::new(fingers.into_iter().chain(thumb))
}

fn builtin_gestures() -> Vec<Gesture> {
    vec![
        Gesture::new("open_all_fingers", "Open every finger and swing the thumb out")
            .step(pose(four_fingers(OPEN), thumb(OPEN, OPEN))),
        Gesture::new("close_all_fingers", "Make a fist with the thumb over the fingers")
            .step(GestureStep::new(four_fingers(CLOSED)).settle(400))
            .step(GestureStep::new(thumb(CLOSED, CLOSED))),
        Gesture::new("thumb_front_ready", "Fingers open, thumb rotated in front of the palm")
            .step(pose(four_fingers(OPEN), thumb(OPEN, CLOSED))),
        Gesture::new("grip", "Power grip around an object")
            .step(GestureStep::new(thumb(OPEN, CLOSED)).settle(300))
            .step(pose(four_fingers(CLOSED), thumb(400, CLOSED))),
        Gesture::new("stronger_no_bend", "Fingers closed, thumb straight alongside")
            .step(GestureStep::new(thumb(OPEN, OPEN)).settle(200))
            .step(GestureStep::new(four_fingers(CLOSED))),
        Gesture::new("pinch", "Index and thumb tip to tip")
            .with_force(500)
            .step(pose(fingers(OPEN, OPEN, OPEN, OPEN), thumb(OPEN, CLOSED)).settle(300))
            .step(GestureStep::new([(FingerId::Index, 350), (FingerId::ThumbBend, 450)])),
        Gesture::new("point", "Index extended, the rest folded")
            .step(GestureStep::new(fingers(CLOSED, CLOSED, CLOSED, OPEN)).settle(300))
            .step(GestureStep::new(thumb(CLOSED, CLOSED))),
        Gesture::new("thumbs_up", "Fist with the thumb raised")
            .step(GestureStep::new(four_fingers(CLOSED)).settle(300))
            .step(GestureStep::new(thumb(OPEN, OPEN))),
        Gesture::new("cool", "Index and little finger up")
            .step(pose(fingers(OPEN, CLOSED, CLOSED, OPEN), thumb(CLOSED, 500))),
        Gesture::new("hook_for_door", "Four fingers half bent to pull a handle")
            .step(pose(four_fingers(450), thumb(OPEN, OPEN))),
        Gesture::new("hook_4", "Four fingers hooked, thumb out of the way")
            .step(pose(four_fingers(300), thumb(OPEN, OPEN))),
        Gesture::new("hook_2_1", "Index and middle hooked")
            .step(pose(fingers(OPEN, OPEN, 300, 300), thumb(OPEN, OPEN))),
        Gesture::new("hook_2_2", "Ring and little hooked")
            .step(pose(fingers(300, 300, OPEN, OPEN), thumb(OPEN, OPEN))),
        Gesture::new("little_hook", "Little finger hooked")
            .step(pose(fingers(300, OPEN, OPEN, OPEN), thumb(OPEN, OPEN))),
        Gesture::new("toilet_stick", "Cylindrical grip on a thin handle")
            .step(GestureStep::new(thumb(OPEN, CLOSED)).settle(300))
            .step(pose(four_fingers(200), thumb(300, CLOSED))),
    ]
}
