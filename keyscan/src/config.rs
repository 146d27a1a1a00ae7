use std::env::var_os;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use keyscan_gpio::key::{KeyConfig, Timing};
use keyscan_gpio::{GpioActiveLevel, GpioBias};

const DEFAULT_CONFIG_FILE: &str = "keyscan.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// GPIO character device the keys are wired to.
    pub chip: String,
    pub scan_interval_ms: u64,
    pub queue_capacity: usize,
    pub timing: TimingConfig,
    pub keys: Vec<KeyEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub debounce_ms: u32,
    pub click_ms: u32,
    pub double_click_gap_ms: u32,
    pub long_press_ms: u32,
    pub long_press_hold_ms: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub name: String,
    /// Line offset on the chip.
    pub line: usize,
    #[serde(default)]
    pub active: ActiveLevel,
    #[serde(default)]
    pub pull: Pull,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    High,
    #[default]
    Low,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    None,
    #[default]
    Up,
    Down,
}

impl Config {
    fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new(DEFAULT_CONFIG_FILE));
        PathBuf::from(config_str)
    }

    /// Loads the config file. Returns `None` if there is none.
    ///
    /// A file that exists but can't be parsed is an error, so it never gets overwritten.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        let config_path = Self::path();
        if !config_path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(&config_path)?;
        let reader = std::io::BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .map_err(|err| eyre::eyre!("Invalid config {}: {}", config_path.display(), err))?;
        config.validate()
            .map_err(|err| eyre::eyre!("Invalid config {}: {}", config_path.display(), err))?;
        Ok(Some(config))
    }

    /// Checks the values serde can't. A zero-capacity queue only hands over events the
    /// consumer is already waiting for and drops the rest.
    pub fn validate(&self) -> eyre::Result<()> {
        eyre::ensure!(self.queue_capacity > 0, "queue_capacity must be at least 1");
        Ok(())
    }

    pub fn save(&self) -> std::io::Result<()> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn timing(&self) -> Timing {
        self.timing.into()
    }

    pub fn key_configs(&self) -> Vec<KeyConfig> {
        self.keys.iter().map(KeyEntry::to_key_config).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chip: "/dev/gpiochip0".to_string(),
            scan_interval_ms: 10,
            queue_capacity: keyscan_gpio::sink::DEFAULT_QUEUE_CAPACITY,
            timing: TimingConfig::default(),
            keys: vec![KeyEntry {
                name: "BOOT".to_string(),
                line: 0,
                active: ActiveLevel::Low,
                pull: Pull::Up,
            }],
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = Timing::default();
        TimingConfig {
            debounce_ms: timing.debounce_ms,
            click_ms: timing.click_ms,
            double_click_gap_ms: timing.double_click_gap_ms,
            long_press_ms: timing.long_press_ms,
            long_press_hold_ms: timing.long_press_hold_ms,
        }
    }
}

impl From<TimingConfig> for Timing {
    fn from(config: TimingConfig) -> Self {
        Timing {
            debounce_ms: config.debounce_ms,
            click_ms: config.click_ms,
            double_click_gap_ms: config.double_click_gap_ms,
            long_press_ms: config.long_press_ms,
            long_press_hold_ms: config.long_press_hold_ms,
        }
    }
}

impl KeyEntry {
    pub fn to_key_config(&self) -> KeyConfig {
        let active_level = match self.active {
            ActiveLevel::High => GpioActiveLevel::High,
            ActiveLevel::Low => GpioActiveLevel::Low,
        };
        let bias = match self.pull {
            Pull::None => GpioBias::None,
            Pull::Up => GpioBias::PullUp,
            Pull::Down => GpioBias::PullDown,
        };
        KeyConfig::new(self.name.clone())
            .with_active_level(active_level)
            .with_bias(bias)
    }
}
