use std::fmt::{Display, Formatter};
use crate::key::Millis;

/// The most events a single tick of one key can produce (e.g. `PressUp` + `DoubleClick`).
pub const MAX_EVENTS_PER_TICK: usize = 2;

/// Events produced by one tick of one key.
pub type KeyEvents = heapless::Vec<KeyEvent, MAX_EVENTS_PER_TICK>;

/// Kinds of classified key events.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyEventKind {
    /// The key was pressed (after debouncing).
    PressDown,
    /// The key was released (after debouncing).
    PressUp,
    /// Repeated press. Part of the event vocabulary, but not produced by [crate::key::KeyEngine].
    PressRepeat,
    /// A short press with no second press following it in time.
    SingleClick,
    /// Two short presses in quick succession.
    DoubleClick,
    /// The key has been held for the long-press time.
    LongPressStart,
    /// Periodic event while a long press continues.
    LongPressHold,
    /// The key was released after a long press.
    LongPressEnd,
}

impl KeyEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            KeyEventKind::PressDown => "press down",
            KeyEventKind::PressUp => "press up",
            KeyEventKind::PressRepeat => "press repeat",
            KeyEventKind::SingleClick => "single click",
            KeyEventKind::DoubleClick => "double click",
            KeyEventKind::LongPressStart => "long press start",
            KeyEventKind::LongPressHold => "long press hold",
            KeyEventKind::LongPressEnd => "long press end",
        }
    }

    /// Whether the event is part of a long press.
    pub fn is_long_press(&self) -> bool {
        matches!(
            self,
            KeyEventKind::LongPressStart | KeyEventKind::LongPressHold | KeyEventKind::LongPressEnd
        )
    }

    /// Whether the event is a click classification.
    pub fn is_click(&self) -> bool {
        matches!(self, KeyEventKind::SingleClick | KeyEventKind::DoubleClick)
    }
}

impl Display for KeyEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A classified event of a single key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeyEvent {
    /// Index of the key in its engine.
    pub key: usize,
    pub kind: KeyEventKind,
    /// Clock reading of the tick that produced the event.
    pub at: Millis,
}

impl Display for KeyEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "key {}: {} @{}", self.key, self.kind, self.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups() {
        assert!(KeyEventKind::LongPressHold.is_long_press());
        assert!(!KeyEventKind::PressUp.is_long_press());
        assert!(KeyEventKind::DoubleClick.is_click());
        assert!(!KeyEventKind::LongPressEnd.is_click());
    }

    #[test]
    fn test_display() {
        let event = KeyEvent { key: 3, kind: KeyEventKind::SingleClick, at: 620 };
        assert_eq!(event.to_string(), "key 3: single click @620");
    }
}
