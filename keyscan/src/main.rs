mod app;
mod config;

use std::env::var;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use dotenv::dotenv;
use log::{debug, info};
use thiserror::Error;
use keyscan_gpio::{GpioDriver, GpioInput, GpioResult};
use keyscan_gpio::clock::MonotonicClock;
use keyscan_gpio::gpiod::GpiodDriver;
use keyscan_gpio::input::open_key_input;
use keyscan_gpio::key::KeyEngine;
use keyscan_gpio::scan::{ScanControl, Scanner};
use keyscan_gpio::sink::{event_queue, EventSinks};
use crate::app::EventLog;
use crate::config::Config;

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
enum LinesError {
    #[error("expected {expected} line numbers, got {found}")]
    Count { expected: usize, found: usize },
}

fn parse_lines(lines_str: &str, expected: usize) -> eyre::Result<Vec<usize>> {
    let lines = lines_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<usize>, _>>()?;
    if lines.len() != expected {
        return Err(LinesError::Count { expected, found: lines.len() }.into());
    }
    Ok(lines)
}

fn main() -> eyre::Result<()> {
    // A missing .env is fine, everything has a default.
    dotenv().ok();
    pretty_env_logger::init();

    info!("Keyscan starting...");

    debug!("Trying to load config...");
    let mut config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };

    // Env overrides for trying out other wiring without touching the config file.
    if let Ok(chip) = var("KEYSCAN_CHIP") {
        config.chip = chip;
    }
    if let Ok(lines_str) = var("KEYSCAN_LINES") {
        let lines = parse_lines(&lines_str, config.keys.len())?;
        for (key, line) in config.keys.iter_mut().zip(lines) {
            key.line = line;
        }
    }

    let keys = config.key_configs();
    let engine = KeyEngine::new(&keys, config.timing())?;
    debug!("Timing: {:?}", engine.timing());
    for entry in &config.keys {
        info!("Key {} @ {} line {} (active {:?}, pull {:?})",
            entry.name, config.chip, entry.line, entry.active, entry.pull);
    }

    debug!("Initializing GPIO driver...");
    let gpio = GpiodDriver::open(&config.chip)?;
    debug!("{:?} initialized.", gpio);

    let mut pins = config.keys
        .iter()
        .map(|entry| gpio.get_pin(entry.line))
        .collect::<GpioResult<Vec<_>>>()?;
    let inputs = pins
        .iter_mut()
        .zip(&keys)
        .map(|(pin, key)| open_key_input(pin.as_mut(), key))
        .collect::<GpioResult<Vec<Box<dyn GpioInput + '_>>>>()?;
    debug!("Inputs: {:?}", inputs);

    let log = EventLog::new(&keys);
    let (queue, receiver) = event_queue(config.queue_capacity);
    let sinks = EventSinks::new()
        .with_queue(queue)
        .with_callback(log.callback());
    let consumer = log.spawn_consumer(receiver)?;

    let control = Arc::new(ScanControl::new());
    if let Ok(seconds) = var("KEYSCAN_RUN_SECONDS") {
        let seconds: u64 = seconds.parse()?;
        let timer_control = control.clone();
        thread::Builder::new()
            .name("stop-timer".to_string())
            .spawn(move || {
                thread::sleep(Duration::from_secs(seconds));
                info!("Run time of {}s elapsed, stopping.", seconds);
                timer_control.stop();
            })?;
    }

    info!("Keyscan initialized.");

    control.start();
    let mut scanner = Scanner::new(engine, inputs, MonotonicClock::new(), sinks)
        .with_interval(config.scan_interval());
    scanner.run(&control);

    // Dropping the scanner closes the queue, which lets the consumer finish.
    drop(scanner);
    let consumed = consumer
        .join()
        .map_err(|_| eyre::eyre!("Event consumer panicked"))?;
    info!("Consumed {} queued events.", consumed);

    Ok(())
}
