//! Key contacts on the Linux GPIO character device (`/dev/gpiochipN`).
//!
//! Each key gets its own single-line kernel request. Polarity and pull are part of that
//! request, so values read back are already "is the key pressed".
use crate::{GpioActiveLevel, GpioBias, GpioDriver, GpioError, GpioInput, GpioPin, GpioResult};
use bitvec::vec::BitVec;
use log::{debug, info};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

/// Hands out key lines of one GPIO chip. A line can be held by one key at a time.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    claimed: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let lines = chip.num_lines() as usize;
        Self {
            chip,
            claimed: BitVec::repeat(false, lines),
        }
    }

    /// Opens the chip at the given path, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        let chip = gpiod::Chip::new(path.as_ref())?;
        info!("Opened {} ({}, {} lines).", chip.name(), chip.label(), chip.num_lines());
        Ok(Self::new(chip))
    }

    fn claim(&self, line: usize) -> GpioResult<()> {
        if line >= self.claimed.len() {
            return Err(GpioError::InvalidArgument);
        }
        if self.claimed[line] {
            return Err(GpioError::AlreadyInUse);
        }
        self.claimed.set_aliased(line, true);
        Ok(())
    }

    fn release(&self, line: usize) {
        self.claimed.set_aliased(line, false);
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.claimed.len())
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        self.claim(index)?;
        Ok(Box::new(KeyLine {
            driver: self,
            line: index,
            wiring: LineWiring::default(),
        }))
    }
}

/// How a key contact is wired to its line, as sent to the kernel.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct LineWiring {
    active_level: GpioActiveLevel,
    bias: GpioBias,
}

impl LineWiring {
    fn request(self, line: usize) -> gpiod::Options<gpiod::Input, [u32; 1], &'static str> {
        gpiod::Options::input([line as u32])
            .consumer(env!("CARGO_PKG_NAME"))
            .active(self.active_level.into())
            .bias(self.bias.into())
    }
}

impl From<GpioActiveLevel> for gpiod::Active {
    fn from(level: GpioActiveLevel) -> Self {
        match level {
            GpioActiveLevel::High => gpiod::Active::High,
            GpioActiveLevel::Low => gpiod::Active::Low,
        }
    }
}

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

/// A claimed line, not yet requested from the kernel.
struct KeyLine<'a> {
    driver: &'a GpiodDriver,
    line: usize,
    wiring: LineWiring,
}

impl Debug for KeyLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.line)
    }
}

impl GpioPin for KeyLine<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        let request = self.driver.chip.request_lines(self.wiring.request(self.line))?;
        debug!("{:?} requested as key input ({:?}).", self, self.wiring);
        Ok(Box::new(KeyLineInput { line: self, request }))
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.wiring.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.wiring.active_level = level;
        Ok(())
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.wiring.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.wiring.bias = bias;
        Ok(())
    }
}

impl Drop for KeyLine<'_> {
    fn drop(&mut self) {
        self.driver.release(self.line);
    }
}

/// An active kernel request for one key line. Dropping it hands the line back to the kernel.
struct KeyLineInput<'a> {
    line: &'a KeyLine<'a>,
    request: gpiod::Lines<gpiod::Input>,
}

impl Debug for KeyLineInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.line)
    }
}

impl GpioInput for KeyLineInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        let [pressed] = self.request.get_values([false])?;
        Ok(pressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_accepts_any_path_type() {
        let missing = "/dev/gpiochip-keyscan-missing";
        assert!(GpiodDriver::open(missing).is_err());
        assert!(GpiodDriver::open(missing.to_string()).is_err());
        assert!(GpiodDriver::open(std::path::PathBuf::from(missing)).is_err());
        assert!(GpiodDriver::open(Path::new(missing)).is_err());
    }

    #[test]
    fn test_wiring_maps_to_kernel_flags() {
        let wiring = LineWiring::default();
        assert_eq!(gpiod::Active::from(wiring.active_level), gpiod::Active::High);
        assert_eq!(gpiod::Bias::from(wiring.bias), gpiod::Bias::Disable);

        assert_eq!(gpiod::Active::from(GpioActiveLevel::Low), gpiod::Active::Low);
        assert_eq!(gpiod::Bias::from(GpioBias::PullUp), gpiod::Bias::PullUp);
        assert_eq!(gpiod::Bias::from(GpioBias::PullDown), gpiod::Bias::PullDown);
    }
}
