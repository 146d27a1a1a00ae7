//! The scan loop: samples every key at a fixed cadence and feeds the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::{debug, info, warn};
use crate::clock::Clock;
use crate::input::LevelSource;
use crate::key::KeyEngine;
use crate::sink::EventSinks;

/// Default time between two scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(10);

/// Run/stop flag of a scan loop. Stopping is the only way to halt a running [Scanner].
#[derive(Debug, Default)]
pub struct ScanControl {
    running: AtomicBool,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the loop as running. Returns `false` if it already was.
    pub fn start(&self) -> bool {
        let started = !self.running.swap(true, Ordering::SeqCst);
        if !started {
            warn!("Scan loop already running.");
        }
        started
    }

    /// Asks the loop to stop after its current scan. Returns `false` if it wasn't running.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Drives a [KeyEngine] from a [LevelSource] and a [Clock], publishing to [EventSinks].
#[derive(Debug)]
pub struct Scanner<L, C> {
    engine: KeyEngine,
    levels: L,
    clock: C,
    sinks: EventSinks,
    interval: Duration,
}

impl<L: LevelSource, C: Clock> Scanner<L, C> {
    pub fn new(engine: KeyEngine, levels: L, clock: C, sinks: EventSinks) -> Self {
        Self {
            engine,
            levels,
            clock,
            sinks,
            interval: DEFAULT_SCAN_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn engine(&self) -> &KeyEngine {
        &self.engine
    }

    pub fn sinks(&self) -> &EventSinks {
        &self.sinks
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks every key once, in index order. Returns the amount of events produced.
    ///
    /// A key whose level can't be read is skipped for this scan.
    pub fn scan_once(&mut self) -> usize {
        let mut produced = 0;

        for key in 0..self.engine.key_count() {
            let active = match self.levels.read_active(key) {
                Ok(active) => active,
                Err(err) => {
                    warn!("Failed to read key {}: {}", key, err);
                    continue;
                }
            };
            let now = self.clock.now_ms();

            let levels = &mut self.levels;
            let resample = || match levels.read_active(key) {
                Ok(active) => active,
                Err(err) => {
                    warn!("Failed to re-read key {}: {}", key, err);
                    !active
                }
            };

            let events = match self.engine.tick_with(key, now, active, resample) {
                Ok(events) => events,
                Err(err) => {
                    warn!("Failed to tick key {}: {}", key, err);
                    continue;
                }
            };

            for event in &events {
                debug!("{}", event);
                self.sinks.publish(event);
            }
            produced += events.len();
        }

        produced
    }

    /// Scans until `control` is stopped, sleeping the scan interval between scans.
    ///
    /// Returns right away if `control` was never started.
    pub fn run(&mut self, control: &ScanControl) {
        info!("Scan loop started ({} keys, every {:?}).", self.engine.key_count(), self.interval);

        while control.is_running() {
            self.scan_once();
            thread::sleep(self.interval);
        }

        if self.sinks.dropped_events() > 0 {
            warn!("{} events were dropped on a full queue.", self.sinks.dropped_events());
        }
        info!("Scan loop stopped.");
    }
}

impl<L, C> Scanner<L, C>
where
    L: LevelSource + Send + 'static,
    C: Clock + Send + 'static,
{
    /// Starts `control` and runs the loop on a new thread.
    /// The thread hands the scanner back once the loop stops.
    pub fn spawn(mut self, control: Arc<ScanControl>) -> std::io::Result<JoinHandle<Self>> {
        control.start();
        let loop_control = control.clone();
        let handle = thread::Builder::new()
            .name("key-scan".to_string())
            .spawn(move || {
                self.run(&loop_control);
                self
            });
        if handle.is_err() {
            control.stop();
        }
        handle
    }
}
