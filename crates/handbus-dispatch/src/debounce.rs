//! Debounce layer for repeated trigger events.
//!
//! A trigger fires at most once per minimum interval. Suppressed firings are
//! dropped outright and do not extend the window. Timestamps come from the
//! monotonic Tokio clock, which tests can pause and advance.

use crate::keymap::{Key, KeyEvent};
use handbus_core::constants::DEFAULT_DEBOUNCE_MS;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Per-trigger rate limiter.
///
/// The last-fire table sits behind its own lock and never touches the bus.
#[derive(Debug)]
pub struct Debouncer<K = Key> {
    min_interval: Duration,
    last_fire: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_fire: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decide whether `trigger` may fire at `now`, recording it if so.
    ///
    /// A `now` earlier than the last accepted firing counts as inside the
    /// window.
    pub fn should_fire(&self, trigger: &K, now: Instant) -> bool {
        let mut last_fire = self.last_fire.lock();
        match last_fire.get(trigger) {
            Some(&last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                last_fire.insert(trigger.clone(), now);
                true
            }
        }
    }

    /// [`should_fire`](Self::should_fire) at the current instant.
    pub fn should_fire_now(&self, trigger: &K) -> bool {
        self.should_fire(trigger, Instant::now())
    }
}

impl Debouncer<Key> {
    /// Filter a keyboard event. Key-up events always pass.
    pub fn filter(&self, event: &KeyEvent, now: Instant) -> bool {
        match event {
            KeyEvent::Down(key) => self.should_fire(key, now),
            KeyEvent::Up(_) => true,
        }
    }
}

impl<K: Eq + Hash + Clone> Default for Debouncer<K> {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const D: Duration = Duration::from_millis(200);

    #[test]
    fn test_first_fire_is_accepted() {
        let debouncer: Debouncer<&str> = Debouncer::new(D);
        assert!(debouncer.should_fire(&"g", Instant::now()));
    }

    #[rstest]
    #[case::inside_window(Duration::from_millis(50), false)]
    #[case::just_before_edge(Duration::from_millis(199), false)]
    #[case::at_edge(Duration::from_millis(200), true)]
    #[case::after_window(Duration::from_millis(250), true)]
    fn test_second_fire(#[case] gap: Duration, #[case] accepted: bool) {
        let debouncer: Debouncer<&str> = Debouncer::new(D);
        let t = Instant::now();

        assert!(debouncer.should_fire(&"g", t));
        assert_eq!(debouncer.should_fire(&"g", t + gap), accepted);
    }

    #[test]
    fn test_suppressed_fire_does_not_extend_window() {
        let debouncer: Debouncer<&str> = Debouncer::new(D);
        let t = Instant::now();

        assert!(debouncer.should_fire(&"g", t));
        assert!(!debouncer.should_fire(&"g", t + Duration::from_millis(150)));
        // 210ms after the accepted fire, only 60ms after the suppressed one.
        assert!(debouncer.should_fire(&"g", t + Duration::from_millis(210)));
    }

    #[test]
    fn test_triggers_are_independent() {
        let debouncer: Debouncer<&str> = Debouncer::new(D);
        let t = Instant::now();

        assert!(debouncer.should_fire(&"g", t));
        assert!(debouncer.should_fire(&"o", t + Duration::from_millis(1)));
        assert!(!debouncer.should_fire(&"g", t + Duration::from_millis(2)));
    }

    #[test]
    fn test_earlier_timestamp_is_suppressed() {
        let debouncer: Debouncer<&str> = Debouncer::new(D);
        let t = Instant::now() + Duration::from_secs(1);

        assert!(debouncer.should_fire(&"g", t));
        assert!(!debouncer.should_fire(&"g", t - Duration::from_millis(500)));
    }

    #[test]
    fn test_key_up_is_never_debounced() {
        let debouncer: Debouncer = Debouncer::new(D);
        let t = Instant::now();
        let key = Key::Char('g');

        assert!(debouncer.filter(&KeyEvent::Down(key), t));
        assert!(debouncer.filter(&KeyEvent::Up(key), t));
        assert!(debouncer.filter(&KeyEvent::Up(key), t));
        assert!(!debouncer.filter(&KeyEvent::Down(key), t));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_fire_now_follows_tokio_clock() {
        let debouncer: Debouncer<&str> = Debouncer::default();

        assert!(debouncer.should_fire_now(&"x"));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!debouncer.should_fire_now(&"x"));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(debouncer.should_fire_now(&"x"));
    }
}
