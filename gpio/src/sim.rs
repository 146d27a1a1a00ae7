//! In-memory GPIO backend.
//!
//! Raw pin levels live in shared atomics and are driven through a [SimLevels] handle, which
//! can be moved to another thread to play the part of the physical contacts.
//! The backend has no hardware active level, so inputs opened through
//! [crate::input::open_key_input] get software polarity correction.

use crate::{GpioBias, GpioDriver, GpioError, GpioInput, GpioPin, GpioResult};
use bitvec::vec::BitVec;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Handle used to set the raw levels of a [SimGpioDriver]'s pins.
#[derive(Clone, Debug)]
pub struct SimLevels {
    levels: Arc<[AtomicBool]>,
}

impl SimLevels {
    /// Sets the raw level of the pin. Out-of-range indices are ignored.
    pub fn set(&self, index: usize, high: bool) {
        if let Some(level) = self.levels.get(index) {
            level.store(high, Ordering::Relaxed);
        }
    }

    /// Gets the raw level of the pin.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.levels.get(index).map(|level| level.load(Ordering::Relaxed))
    }
}

pub struct SimGpioDriver {
    levels: SimLevels,
    used_pins: BitVec<AtomicU8>,
}

impl SimGpioDriver {
    /// Creates a driver with `count` pins, all reading low.
    pub fn new(count: usize) -> Self {
        let levels: Arc<[AtomicBool]> = (0..count).map(|_| AtomicBool::new(false)).collect();
        Self {
            levels: SimLevels { levels },
            used_pins: BitVec::repeat(false, count),
        }
    }

    pub fn levels(&self) -> SimLevels {
        self.levels.clone()
    }
}

impl Debug for SimGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimGpioDriver({})", self.levels.levels.len())
    }
}

impl GpioDriver for SimGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.levels.levels.len())
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);

        Ok(Box::new(SimPin {
            driver: self,
            pin_index: index,
            bias: GpioBias::None,
        }))
    }
}

struct SimPin<'a> {
    driver: &'a SimGpioDriver,
    pin_index: usize,
    bias: GpioBias,
}

impl Debug for SimPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for SimPin<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        Ok(Box::new(SimInput { pin: self }))
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    /// An open contact settles to the pulled level.
    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.bias = bias;
        match bias {
            GpioBias::PullUp => self.driver.levels.set(self.pin_index, true),
            GpioBias::PullDown => self.driver.levels.set(self.pin_index, false),
            GpioBias::None => {}
        }
        Ok(())
    }
}

impl Drop for SimPin<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

struct SimInput<'a> {
    pin: &'a SimPin<'a>,
}

impl Debug for SimInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.pin)
    }
}

impl GpioInput for SimInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        self.pin
            .driver
            .levels
            .get(self.pin.pin_index)
            .ok_or(GpioError::InvalidArgument)
    }
}
