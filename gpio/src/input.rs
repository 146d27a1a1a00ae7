//! Level sources: where the scan loop gets each key's polarity-corrected contact state.

use std::fmt::{Debug, Formatter};
use log::warn;
use crate::key::KeyConfig;
use crate::{GpioActiveLevel, GpioBias, GpioError, GpioInput, GpioPin, GpioResult};

/// Reports whether a key's contact is currently active.
///
/// Implementations must return promptly; they are called on the scan cadence.
pub trait LevelSource {
    fn read_active(&mut self, key: usize) -> GpioResult<bool>;
}

/// One input per key, in key index order.
impl LevelSource for Vec<Box<dyn GpioInput + '_>> {
    fn read_active(&mut self, key: usize) -> GpioResult<bool> {
        self.get(key).ok_or(GpioError::InvalidArgument)?.read()
    }
}

/// Applies an active level in software, for pins that can't do it themselves.
pub struct SoftActiveLevel<'a> {
    input: Box<dyn GpioInput + 'a>,
    active_level: GpioActiveLevel,
}

impl<'a> SoftActiveLevel<'a> {
    pub fn new(input: Box<dyn GpioInput + 'a>, active_level: GpioActiveLevel) -> Self {
        Self { input, active_level }
    }
}

impl Debug for SoftActiveLevel<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(active {:?})", self.input, self.active_level)
    }
}

impl GpioInput for SoftActiveLevel<'_> {
    fn read(&self) -> GpioResult<bool> {
        Ok(self.active_level.is_active(self.input.read()?))
    }
}

/// Configures the pin for the key and opens it as an input that reads `true` while pressed.
///
/// Bias is skipped with a warning if the pin does not support it.
pub fn open_key_input<'a>(
    pin: &'a mut dyn GpioPin,
    key: &KeyConfig,
) -> GpioResult<Box<dyn GpioInput + 'a>> {
    if pin.supports_bias() {
        pin.set_bias(key.bias)?;
    } else if key.bias != GpioBias::None {
        warn!("{:?} does not support bias, ignoring {:?} for key {}.", pin, key.bias, key.name);
    }

    if pin.supports_active_level() {
        pin.set_active_level(key.active_level)?;
        pin.as_input()
    } else {
        let input = pin.as_input()?;
        Ok(Box::new(SoftActiveLevel::new(input, key.active_level)))
    }
}
