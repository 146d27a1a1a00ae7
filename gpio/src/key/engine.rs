use log::{debug, warn};
use crate::key::{
    elapsed_ms, KeyConfig, KeyError, KeyEvent, KeyEventKind, KeyEvents, KeyResult, Millis, Timing,
    MAX_KEYS,
};

/// State of a single key's state machine.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum KeyState {
    /// Stable, contact inactive.
    #[default]
    Released,
    /// Stable, contact active. Long presses are tracked here.
    Pressed,
    /// The contact changed level and has to hold it for the debounce time.
    Debouncing,
    /// A click just ended; waiting for a second press to make it a double click.
    AwaitingSecondClick,
}

impl KeyState {
    /// Gets the contact level of a settled state, or `None` while debouncing.
    fn settled_level(self) -> Option<bool> {
        match self {
            KeyState::Released | KeyState::AwaitingSecondClick => Some(false),
            KeyState::Pressed => Some(true),
            KeyState::Debouncing => None,
        }
    }
}

/// Per-key state machine record.
#[derive(Clone, Debug)]
pub struct KeyInstance {
    id: usize,
    state: KeyState,
    press_time: Millis,
    release_time: Millis,
    last_event_time: Millis,
    click_count: u8,
    long_press_active: bool,
    /// Level being confirmed while debouncing.
    candidate: bool,
    /// Settled state the key returns to if the candidate level does not hold.
    origin: KeyState,
}

impl KeyInstance {
    fn new(id: usize) -> Self {
        Self {
            id,
            state: KeyState::Released,
            press_time: 0,
            release_time: 0,
            last_event_time: 0,
            click_count: 0,
            long_press_active: false,
            candidate: false,
            origin: KeyState::Released,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> KeyState {
        self.state
    }

    /// When the contact last started becoming active.
    pub fn press_time(&self) -> Millis {
        self.press_time
    }

    /// When the contact last started becoming inactive.
    pub fn release_time(&self) -> Millis {
        self.release_time
    }

    pub fn last_event_time(&self) -> Millis {
        self.last_event_time
    }

    pub fn click_count(&self) -> u8 {
        self.click_count
    }

    pub fn long_press_active(&self) -> bool {
        self.long_press_active
    }

    /// Checks whether the record could have been produced by the transition table.
    ///
    /// A click count of 2 never outlives the tick that completes a double click,
    /// and a long press only survives a debounce that started from `Pressed`.
    fn is_consistent(&self) -> bool {
        if self.click_count > 1 {
            return false;
        }
        match self.state {
            KeyState::Released => self.click_count == 0 && !self.long_press_active,
            KeyState::Pressed => true,
            KeyState::Debouncing => {
                self.origin.settled_level() == Some(!self.candidate)
                    && (!self.long_press_active || self.origin == KeyState::Pressed)
            }
            KeyState::AwaitingSecondClick => self.click_count == 1 && !self.long_press_active,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.id);
    }

    fn emit(&mut self, kind: KeyEventKind, now: Millis, events: &mut KeyEvents) {
        self.last_event_time = now;
        let event = KeyEvent { key: self.id, kind, at: now };
        if events.push(event).is_err() {
            warn!("Event buffer of key {} full, dropping {}.", self.id, kind);
        }
    }

    fn advance(
        &mut self,
        name: &str,
        timing: &Timing,
        now: Millis,
        active: bool,
        resample: &mut dyn FnMut() -> bool,
        events: &mut KeyEvents,
    ) {
        if !self.is_consistent() {
            warn!("Key {} ({}) in unrecognized state {:?}, resetting.", self.id, name, self);
            self.reset();
            return;
        }

        match self.state {
            KeyState::Released => {
                if active {
                    self.begin_debounce(name, true, now);
                }
            }
            KeyState::Pressed => {
                if active {
                    self.track_long_press(name, timing, now, events);
                } else {
                    self.begin_debounce(name, false, now);
                }
            }
            KeyState::Debouncing => self.debounce(name, timing, now, active, resample, events),
            KeyState::AwaitingSecondClick => {
                if active {
                    self.begin_debounce(name, true, now);
                } else if elapsed_ms(self.last_event_time, now) >= timing.double_click_gap_ms {
                    self.emit(KeyEventKind::SingleClick, now, events);
                    self.click_count = 0;
                    self.state = KeyState::Released;
                    debug!("Key {} ({}): awaiting -> released (single click).", self.id, name);
                }
            }
        }
    }

    fn begin_debounce(&mut self, name: &str, candidate: bool, now: Millis) {
        if candidate {
            self.press_time = now;
        } else {
            self.release_time = now;
        }
        self.origin = self.state;
        self.candidate = candidate;
        self.state = KeyState::Debouncing;
        debug!("Key {} ({}): {:?} -> debouncing (active: {}).", self.id, name, self.origin, candidate);
    }

    fn debounce(
        &mut self,
        name: &str,
        timing: &Timing,
        now: Millis,
        active: bool,
        resample: &mut dyn FnMut() -> bool,
        events: &mut KeyEvents,
    ) {
        // The candidate level has to hold on every sample of the window and on the re-read.
        if active != self.candidate {
            self.reject_bounce(name);
            return;
        }

        let since = if self.candidate { self.press_time } else { self.release_time };
        if elapsed_ms(since, now) < timing.debounce_ms {
            return;
        }

        if resample() != self.candidate {
            self.reject_bounce(name);
            return;
        }

        if self.candidate {
            self.confirm_press(name, now, events);
        } else {
            self.confirm_release(name, timing, now, events);
        }
    }

    /// Contact chatter: the transition never happened, the key stays where it was.
    ///
    /// The key returns to `origin` rather than restarting the window, so chatter never
    /// leaves it in `Debouncing`. A level is confirmed one debounce time after it settles.
    fn reject_bounce(&mut self, name: &str) {
        self.state = self.origin;
        debug!("Key {} ({}): bounce, back to {:?}.", self.id, name, self.state);
    }

    fn confirm_press(&mut self, name: &str, now: Millis, events: &mut KeyEvents) {
        if self.click_count == 1 {
            debug!("Key {} ({}): second press of a double click.", self.id, name);
        } else {
            self.emit(KeyEventKind::PressDown, now, events);
            self.click_count = 0;
        }
        self.long_press_active = false;
        self.state = KeyState::Pressed;
        debug!("Key {} ({}): debouncing -> pressed.", self.id, name);
    }

    fn confirm_release(&mut self, name: &str, timing: &Timing, now: Millis, events: &mut KeyEvents) {
        self.emit(KeyEventKind::PressUp, now, events);
        let press_duration = elapsed_ms(self.press_time, self.release_time);

        if self.long_press_active {
            self.emit(KeyEventKind::LongPressEnd, now, events);
            self.long_press_active = false;
            self.click_count = 0;
            self.state = KeyState::Released;
            debug!("Key {} ({}): long press ended after {} ms.", self.id, name, press_duration);
        } else if press_duration <= timing.click_ms {
            self.click_count += 1;
            if self.click_count == 1 {
                self.state = KeyState::AwaitingSecondClick;
                self.last_event_time = now;
                debug!("Key {} ({}): debouncing -> awaiting second click.", self.id, name);
            } else {
                self.emit(KeyEventKind::DoubleClick, now, events);
                self.click_count = 0;
                self.state = KeyState::Released;
                debug!("Key {} ({}): double click.", self.id, name);
            }
        } else {
            self.click_count = 0;
            self.state = KeyState::Released;
            debug!("Key {} ({}): released after {} ms, not a click.", self.id, name, press_duration);
        }
    }

    fn track_long_press(&mut self, name: &str, timing: &Timing, now: Millis, events: &mut KeyEvents) {
        let held = elapsed_ms(self.press_time, now);

        if !self.long_press_active {
            if held >= timing.long_press_ms {
                self.emit(KeyEventKind::LongPressStart, now, events);
                self.long_press_active = true;
                debug!("Key {} ({}): long press started.", self.id, name);
            }
        } else if elapsed_ms(self.last_event_time, now) >= timing.long_press_hold_ms {
            self.emit(KeyEventKind::LongPressHold, now, events);
        }
    }
}

/// Gesture classifier for a fixed set of keys.
///
/// The engine is pure state: it never reads pins or clocks itself. Call [KeyEngine::tick]
/// for every key at a steady cadence well below the debounce time (10 ms works for the
/// default timing) and deliver the returned events.
#[derive(Clone, Debug)]
pub struct KeyEngine {
    timing: Timing,
    names: Vec<String>,
    keys: Vec<KeyInstance>,
}

impl KeyEngine {
    /// Creates an engine for the given keys, all starting released.
    ///
    /// # Errors
    /// - `KeyError::NoKeys` if `keys` is empty.
    /// - `KeyError::TooManyKeys` if there are more than [MAX_KEYS] keys.
    /// - `KeyError::InvalidTiming` if `timing` fails [Timing::validate].
    pub fn new(keys: &[KeyConfig], timing: Timing) -> KeyResult<Self> {
        if keys.is_empty() {
            return Err(KeyError::NoKeys);
        }
        if keys.len() > MAX_KEYS {
            return Err(KeyError::TooManyKeys(keys.len()));
        }
        timing.validate()?;

        Ok(Self {
            timing,
            names: keys.iter().map(|key| key.name.clone()).collect(),
            keys: (0..keys.len()).map(KeyInstance::new).collect(),
        })
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn name(&self, key: usize) -> KeyResult<&str> {
        self.names.get(key).map(String::as_str).ok_or(KeyError::UnknownKey(key))
    }

    pub fn instance(&self, key: usize) -> KeyResult<&KeyInstance> {
        self.keys.get(key).ok_or(KeyError::UnknownKey(key))
    }

    /// Gets the current state of the key. Has no side effects.
    pub fn current_state(&self, key: usize) -> KeyResult<KeyState> {
        self.instance(key).map(KeyInstance::state)
    }

    /// Advances the key's state machine with the contact level sampled at `now`.
    pub fn tick(&mut self, key: usize, now: Millis, active: bool) -> KeyResult<KeyEvents> {
        self.tick_with(key, now, active, || active)
    }

    /// Like [KeyEngine::tick], but reads the contact again through `resample` before a
    /// debounced transition is confirmed.
    pub fn tick_with(
        &mut self,
        key: usize,
        now: Millis,
        active: bool,
        mut resample: impl FnMut() -> bool,
    ) -> KeyResult<KeyEvents> {
        let instance = self.keys.get_mut(key).ok_or(KeyError::UnknownKey(key))?;
        let mut events = KeyEvents::new();
        instance.advance(&self.names[key], &self.timing, now, active, &mut resample, &mut events);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use KeyEventKind::*;

    const TICK_MS: Millis = 10;

    fn engine() -> KeyEngine {
        KeyEngine::new(&[KeyConfig::new("A"), KeyConfig::new("B")], Timing::default()).unwrap()
    }

    /// Drives key 0 with a level per 10 ms tick, starting at `start`; returns the events.
    fn drive(engine: &mut KeyEngine, start: Millis, levels: &[bool]) -> Vec<(KeyEventKind, Millis)> {
        let mut out = Vec::new();
        for (i, &active) in levels.iter().enumerate() {
            let now = start.wrapping_add(i as Millis * TICK_MS);
            for event in engine.tick(0, now, active).unwrap() {
                assert_eq!(event.key, 0);
                out.push((event.kind, event.at));
            }
        }
        out
    }

    /// `ms` worth of ticks at the given level.
    fn hold(active: bool, ms: Millis) -> Vec<bool> {
        vec![active; (ms / TICK_MS) as usize]
    }

    fn kinds(events: &[(KeyEventKind, Millis)]) -> Vec<KeyEventKind> {
        events.iter().map(|&(kind, _)| kind).collect()
    }

    #[test]
    fn test_construction_errors() {
        assert_eq!(KeyEngine::new(&[], Timing::default()).unwrap_err(), KeyError::NoKeys);

        let keys = vec![KeyConfig::new("K"); MAX_KEYS + 1];
        assert_eq!(
            KeyEngine::new(&keys, Timing::default()).unwrap_err(),
            KeyError::TooManyKeys(MAX_KEYS + 1)
        );
        assert!(KeyEngine::new(&keys[..MAX_KEYS], Timing::default()).is_ok());

        let timing = Timing { long_press_hold_ms: 0, ..Timing::default() };
        assert!(matches!(
            KeyEngine::new(&keys[..1], timing),
            Err(KeyError::InvalidTiming(_))
        ));
    }

    #[test]
    fn test_unknown_key() {
        let mut engine = engine();
        assert_eq!(engine.tick(2, 0, true).unwrap_err(), KeyError::UnknownKey(2));
        assert_eq!(engine.current_state(2).unwrap_err(), KeyError::UnknownKey(2));
        assert_eq!(engine.name(1).unwrap(), "B");
    }

    #[test]
    fn test_chatter_is_filtered() {
        let mut engine = engine();
        let mut levels = Vec::new();
        for _ in 0..20 {
            levels.push(true);
            levels.push(false);
        }
        assert!(drive(&mut engine, 0, &levels).is_empty());
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);
    }

    #[test]
    fn test_short_pulse_never_pressed() {
        let mut engine = engine();
        // Active for 15 ms: seen on the ticks at 0 and 10, gone at 20.
        let levels = [true, true, false, false, false];
        for (i, &active) in levels.iter().enumerate() {
            engine.tick(0, i as Millis * TICK_MS, active).unwrap();
            assert_ne!(engine.current_state(0).unwrap(), KeyState::Pressed);
        }
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);
    }

    #[test]
    fn test_single_click() {
        let mut engine = engine();
        let mut levels = hold(true, 100);
        levels.extend(hold(false, 700));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(events, vec![(PressDown, 20), (PressUp, 120), (SingleClick, 620)]);
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);

        let instance = engine.instance(0).unwrap();
        assert_eq!(instance.id(), 0);
        assert_eq!(instance.press_time(), 0);
        assert_eq!(instance.release_time(), 100);
        assert_eq!(instance.last_event_time(), 620);
    }

    #[test]
    fn test_click_at_ceiling() {
        let mut engine = engine();
        let mut levels = hold(true, 300);
        levels.extend(hold(false, 700));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(kinds(&events), vec![PressDown, PressUp, SingleClick]);
    }

    #[test]
    fn test_double_click() {
        let mut engine = engine();
        let mut levels = hold(true, 100);
        levels.extend(hold(false, 100));
        levels.extend(hold(true, 100));
        levels.extend(hold(false, 700));
        let events = drive(&mut engine, 0, &levels);
        // The second press is not reported as a separate press down.
        assert_eq!(kinds(&events), vec![PressDown, PressUp, PressUp, DoubleClick]);
        assert_eq!(events[3].1, 320);
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);
        assert_eq!(engine.instance(0).unwrap().click_count(), 0);
    }

    #[test]
    fn test_bounce_while_awaiting_keeps_pending_click() {
        let mut engine = engine();
        let mut levels = hold(true, 100);
        levels.extend(hold(false, 100));
        levels.push(true);
        levels.extend(hold(false, 600));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(events, vec![(PressDown, 20), (PressUp, 120), (SingleClick, 620)]);
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);
    }

    #[test]
    fn test_long_second_press_drops_pending_click() {
        let mut engine = engine();
        let mut levels = hold(true, 100);
        levels.extend(hold(false, 100));
        levels.extend(hold(true, 1500));
        levels.extend(hold(false, 100));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(
            events,
            vec![
                (PressDown, 20),
                (PressUp, 120),
                (LongPressStart, 1200),
                (LongPressHold, 1400),
                (LongPressHold, 1600),
                (PressUp, 1720),
                (LongPressEnd, 1720),
            ]
        );
        assert_eq!(engine.instance(0).unwrap().click_count(), 0);
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);
    }

    #[test]
    fn test_clicks_beyond_gap_are_two_singles() {
        let mut engine = engine();
        let mut levels = hold(true, 100);
        levels.extend(hold(false, 600));
        levels.extend(hold(true, 100));
        levels.extend(hold(false, 600));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(
            kinds(&events),
            vec![PressDown, PressUp, SingleClick, PressDown, PressUp, SingleClick]
        );
    }

    #[test]
    fn test_long_press() {
        let mut engine = engine();
        let mut levels = hold(true, 1500);
        levels.extend(hold(false, 700));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(
            events,
            vec![
                (PressDown, 20),
                (LongPressStart, 1000),
                (LongPressHold, 1200),
                (LongPressHold, 1400),
                (PressUp, 1520),
                (LongPressEnd, 1520),
            ]
        );
        assert!(!engine.instance(0).unwrap().long_press_active());
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);
    }

    #[test]
    fn test_press_between_click_and_long_press() {
        let mut engine = engine();
        let mut levels = hold(true, 600);
        levels.extend(hold(false, 700));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(kinds(&events), vec![PressDown, PressUp]);
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);
    }

    #[test]
    fn test_release_bounce_keeps_long_press() {
        let mut engine = engine();
        let mut levels = hold(true, 1100);
        levels.push(false);
        levels.extend(hold(true, 200));
        levels.extend(hold(false, 100));
        let events = drive(&mut engine, 0, &levels);
        assert_eq!(
            kinds(&events),
            vec![PressDown, LongPressStart, LongPressHold, PressUp, LongPressEnd]
        );
    }

    #[test]
    fn test_resample_disagreement_is_bounce() {
        let mut engine = engine();
        engine.tick(0, 0, true).unwrap();
        engine.tick(0, 10, true).unwrap();
        let events = engine.tick_with(0, 20, true, || false).unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Released);

        let events = drive(&mut engine, 30, &[true, true, true]);
        assert_eq!(events, vec![(PressDown, 50)]);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut engine = engine();
        for i in 0..5 {
            engine.tick(0, i * TICK_MS, true).unwrap();
            engine.tick(1, i * TICK_MS, false).unwrap();
        }
        assert_eq!(engine.current_state(0).unwrap(), KeyState::Pressed);
        assert_eq!(engine.current_state(1).unwrap(), KeyState::Released);
    }

    #[test]
    fn test_wraparound_matches_unwrapped() {
        let mut levels = hold(true, 1500);
        levels.extend(hold(false, 700));

        let mut plain = engine();
        let expected = kinds(&drive(&mut plain, 1000, &levels));

        let mut wrapping = engine();
        let actual = kinds(&drive(&mut wrapping, Millis::MAX - 495, &levels));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_current_state_is_idempotent() {
        let mut engine = engine();
        drive(&mut engine, 0, &hold(true, 50));
        let first = engine.current_state(0).unwrap();
        for _ in 0..10 {
            assert_eq!(engine.current_state(0).unwrap(), first);
        }
        assert_eq!(first, KeyState::Pressed);
    }

    #[test]
    fn test_unrecognized_state_resets() {
        let mut engine = engine();
        drive(&mut engine, 0, &hold(true, 50));
        engine.keys[0].click_count = 7;
        engine.keys[0].long_press_active = true;

        let events = engine.tick(0, 60, true).unwrap();
        assert!(events.is_empty());
        let instance = engine.instance(0).unwrap();
        assert_eq!(instance.state(), KeyState::Released);
        assert_eq!(instance.click_count(), 0);
        assert!(!instance.long_press_active());
    }
}
