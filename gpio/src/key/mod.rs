//! Key gesture classification.
//!
//! A [KeyEngine] turns a periodically sampled "is the contact active" signal into
//! press, release, click, double click and long-press events, one state machine per key.

mod engine;
mod event;
mod timing;

use crate::{GpioActiveLevel, GpioBias};
use thiserror::Error;
pub use engine::*;
pub use event::*;
pub use timing::*;

/// The maximum amount of keys a single [KeyEngine] can handle.
pub const MAX_KEYS: usize = 8;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum KeyError {
    #[error("no keys configured")]
    NoKeys,
    #[error("too many keys: {0} (at most {MAX_KEYS} supported)")]
    TooManyKeys(usize),
    #[error("unknown key index {0}")]
    UnknownKey(usize),
    #[error("invalid timing: {0}")]
    InvalidTiming(&'static str),
}

pub type KeyResult<T> = Result<T, KeyError>;

/// Per-key configuration: how the key is called and how its contact is wired.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyConfig {
    /// Name used in logs.
    pub name: String,
    /// Which raw level means the key is pressed.
    pub active_level: GpioActiveLevel,
    /// Pull resistor for the contact's pin.
    pub bias: GpioBias,
}

impl KeyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active_level: GpioActiveLevel::default(),
            bias: GpioBias::default(),
        }
    }

    pub fn with_active_level(mut self, active_level: GpioActiveLevel) -> Self {
        self.active_level = active_level;
        self
    }

    pub fn with_bias(mut self, bias: GpioBias) -> Self {
        self.bias = bias;
        self
    }
}
