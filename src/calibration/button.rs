//! Short/long press detection for the calibration button.

/// Default hold time for a long press in milliseconds
pub const DEFAULT_LONG_PRESS_MS: u64 = 1000;

/// A completed gesture on the button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    /// Released before the long-press threshold
    Short,
    /// Held for at least the long-press threshold
    Long,
}

/// Edge detector turning a sampled button level into press events.
///
/// A long press is reported once, as soon as the hold time is reached, so
/// the user gets feedback without having to release. The release that
/// follows is swallowed.
#[derive(Debug, Clone)]
pub struct ButtonDetector {
    long_press_ms: u64,
    pressed_since: Option<u64>,
    long_fired: bool,
}

impl Default for ButtonDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_PRESS_MS)
    }
}

impl ButtonDetector {
    #[must_use]
    pub fn new(long_press_ms: u64) -> Self {
        Self {
            long_press_ms,
            pressed_since: None,
            long_fired: false,
        }
    }

    /// Feed the current button level; returns a press when one completes
    pub fn update(&mut self, pressed: bool, now: u64) -> Option<Press> {
        match (pressed, self.pressed_since) {
            (true, None) => {
                self.pressed_since = Some(now);
                self.long_fired = false;
                None
            }
            (true, Some(since)) => {
                if !self.long_fired && now.saturating_sub(since) >= self.long_press_ms {
                    self.long_fired = true;
                    Some(Press::Long)
                } else {
                    None
                }
            }
            (false, Some(_)) => {
                self.pressed_since = None;
                if self.long_fired {
                    None
                } else {
                    Some(Press::Short)
                }
            }
            (false, None) => None,
        }
    }

    /// Whether the button is currently held
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.pressed_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_press_on_release() {
        let mut button = ButtonDetector::new(1000);
        assert_eq!(button.update(true, 0), None);
        assert_eq!(button.update(true, 500), None);
        assert_eq!(button.update(false, 600), Some(Press::Short));
        assert!(!button.is_held());
    }

    #[test]
    fn test_long_press_fires_once_while_held() {
        let mut button = ButtonDetector::new(1000);
        button.update(true, 0);
        assert_eq!(button.update(true, 999), None);
        assert_eq!(button.update(true, 1000), Some(Press::Long));
        assert_eq!(button.update(true, 1500), None);
        assert_eq!(button.update(false, 2000), None);
    }

    #[test]
    fn test_idle_produces_nothing() {
        let mut button = ButtonDetector::default();
        for t in 0..10 {
            assert_eq!(button.update(false, t * 100), None);
        }
    }

    #[test]
    fn test_consecutive_presses() {
        let mut button = ButtonDetector::new(100);
        button.update(true, 0);
        assert_eq!(button.update(true, 100), Some(Press::Long));
        button.update(false, 150);

        button.update(true, 200);
        assert_eq!(button.update(false, 250), Some(Press::Short));
    }
}
