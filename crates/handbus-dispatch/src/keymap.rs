//! Keyboard events and key bindings.
//!
//! Keys map to [`Action`]s through [`KeyBindings`]. A [`KeyRouter`] combines
//! the bindings with a [`Debouncer`] so auto-repeat never floods the queue.

use crate::debounce::Debouncer;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// A physical key, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// A printable key, stored lowercase.
    Char(char),
    Escape,
}

impl Key {
    pub fn char(c: char) -> Self {
        Self::Char(c.to_ascii_lowercase())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Escape => f.write_str("esc"),
        }
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("esc") || trimmed.eq_ignore_ascii_case("escape") {
            return Ok(Key::Escape);
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => Ok(Key::char(c)),
            _ => Err(format!("not a key name: {s:?}")),
        }
    }
}

/// A discrete keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Down(Key),
    Up(Key),
}

impl KeyEvent {
    pub fn key(&self) -> Key {
        match self {
            KeyEvent::Down(key) | KeyEvent::Up(key) => *key,
        }
    }
}

/// What a key press asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Run a named gesture.
    Gesture(String),
    /// Clear hardware faults and report what remains.
    ClearErrors,
    /// Open the hand and stop.
    Quit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Gesture(name) => f.write_str(name),
            Action::ClearErrors => f.write_str("clear_errors"),
            Action::Quit => f.write_str("quit"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    /// `clear_errors` and `quit` are reserved; any other name is a gesture.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("empty action name".to_string()),
            "clear_errors" => Ok(Action::ClearErrors),
            "quit" => Ok(Action::Quit),
            name => Ok(Action::Gesture(name.to_string())),
        }
    }
}

/// Key to action table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    bindings: BTreeMap<Key, Action>,
}

impl KeyBindings {
    pub fn empty() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    /// Bind `key`, replacing any previous binding.
    pub fn bind(&mut self, key: Key, action: Action) {
        self.bindings.insert(key, action);
    }

    pub fn unbind(&mut self, key: Key) -> Option<Action> {
        self.bindings.remove(&key)
    }

    pub fn action_for(&self, key: Key) -> Option<&Action> {
        self.bindings.get(&key)
    }

    /// Bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Action)> {
        self.bindings.iter()
    }

    /// Gesture names referenced by any binding.
    pub fn gesture_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.values().filter_map(|action| match action {
            Action::Gesture(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Apply `key = "action"` overrides, as found in a config file.
    ///
    /// # Errors
    /// Returns a message naming the first key or action that does not parse.
    pub fn apply_overrides<'a>(
        &mut self,
        overrides: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<(), String> {
        for (key, action) in overrides {
            let key: Key = key.parse()?;
            let action: Action = action.parse()?;
            self.bind(key, action);
        }
        Ok(())
    }
}

impl Default for KeyBindings {
    /// The standard hotkey layout.
    fn default() -> Self {
        let mut bindings = Self::empty();
        for (c, gesture) in [
            ('g', "grip"),
            ('r', "thumb_front_ready"),
            ('s', "stronger_no_bend"),
            ('o', "open_all_fingers"),
            ('p', "pinch"),
            ('f', "point"),
            ('u', "thumbs_up"),
            ('e', "cool"),
            ('d', "hook_for_door"),
            ('h', "hook_4"),
            ('j', "hook_2_1"),
            ('k', "hook_2_2"),
            ('l', "little_hook"),
            ('t', "toilet_stick"),
            ('c', "close_all_fingers"),
        ] {
            bindings.bind(Key::Char(c), Action::Gesture(gesture.to_string()));
        }
        bindings.bind(Key::Char('x'), Action::ClearErrors);
        bindings.bind(Key::Char('q'), Action::Quit);
        bindings.bind(Key::Escape, Action::Quit);
        bindings
    }
}

/// Turns raw key events into actions.
#[derive(Debug)]
pub struct KeyRouter {
    bindings: KeyBindings,
    debouncer: Debouncer<Key>,
}

impl KeyRouter {
    pub fn new(bindings: KeyBindings, debounce: Duration) -> Self {
        Self {
            bindings,
            debouncer: Debouncer::new(debounce),
        }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// Action for `event` at `now`, if any.
    ///
    /// Key-up events and unbound keys yield nothing. Quit is never debounced.
    pub fn route(&self, event: &KeyEvent, now: Instant) -> Option<Action> {
        let KeyEvent::Down(key) = event else {
            return None;
        };
        let action = self.bindings.action_for(*key)?;
        if *action != Action::Quit && !self.debouncer.filter(event, now) {
            return None;
        }
        Some(action.clone())
    }
}
