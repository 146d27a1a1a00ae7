use std::time::Duration;
use crate::key::{KeyError, KeyResult};

/// Timestamp or duration in milliseconds on the scan clock.
///
/// The clock wraps around at `u32::MAX + 1`.
pub type Millis = u32;

/// Gets the time elapsed between two clock readings, accounting for a single wraparound.
pub fn elapsed_ms(earlier: Millis, later: Millis) -> Millis {
    later.wrapping_sub(earlier)
}

/// Converts a [Duration] to [Millis], saturating at the clock's range.
pub fn millis(duration: Duration) -> Millis {
    duration.as_millis().try_into().unwrap_or(Millis::MAX)
}

/// Timing thresholds shared by all keys of an engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timing {
    /// How long a new level has to hold before it is trusted.
    pub debounce_ms: Millis,
    /// Longest press that still counts as a click.
    pub click_ms: Millis,
    /// Longest idle time between two clicks of a double click.
    pub double_click_gap_ms: Millis,
    /// Hold time after which a press becomes a long press.
    pub long_press_ms: Millis,
    /// Period of hold events during a long press.
    pub long_press_hold_ms: Millis,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce_ms: 20,
            click_ms: 300,
            double_click_gap_ms: 500,
            long_press_ms: 1000,
            long_press_hold_ms: 200,
        }
    }
}

impl Timing {
    pub fn with_debounce_time(mut self, debounce_time: Duration) -> Self {
        self.debounce_ms = millis(debounce_time);
        self
    }

    pub fn with_click_time(mut self, click_time: Duration) -> Self {
        self.click_ms = millis(click_time);
        self
    }

    pub fn with_double_click_gap(mut self, gap: Duration) -> Self {
        self.double_click_gap_ms = millis(gap);
        self
    }

    pub fn with_long_press_time(mut self, long_press_time: Duration) -> Self {
        self.long_press_ms = millis(long_press_time);
        self
    }

    pub fn with_long_press_hold_interval(mut self, interval: Duration) -> Self {
        self.long_press_hold_ms = millis(interval);
        self
    }

    /// Checks that the thresholds describe distinguishable gestures.
    ///
    /// # Errors
    /// - `KeyError::InvalidTiming` if the hold interval is zero.
    /// - `KeyError::InvalidTiming` if a click could last as long as a long press.
    pub fn validate(&self) -> KeyResult<()> {
        if self.long_press_hold_ms == 0 {
            return Err(KeyError::InvalidTiming("long-press hold interval must not be zero"));
        }
        if self.click_ms >= self.long_press_ms {
            return Err(KeyError::InvalidTiming("click time must be shorter than long-press time"));
        }
        Ok(())
    }
}
