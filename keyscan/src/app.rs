//! Reporting of classified key events, by key name.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use log::{debug, info};
use keyscan_gpio::key::{KeyConfig, KeyEvent, KeyEventKind};
use keyscan_gpio::sink::EventReceiver;

const UNKNOWN_KEY: &str = "unknown key";

/// Logs events from both delivery paths under the configured key names.
#[derive(Clone, Debug)]
pub struct EventLog {
    names: Arc<[String]>,
}

impl EventLog {
    pub fn new(keys: &[KeyConfig]) -> Self {
        Self {
            names: keys.iter().map(|key| key.name.clone()).collect(),
        }
    }

    pub fn name(&self, key: usize) -> &str {
        self.names.get(key).map(String::as_str).unwrap_or(UNKNOWN_KEY)
    }

    /// One log line for the event, as seen through `path`.
    pub fn describe(&self, path: &str, event: &KeyEvent) -> String {
        format!("[{}] {} {} @{}", path, self.name(event.key), event.kind, event.at)
    }

    /// Callback for the inline delivery path. Runs on the scan thread, so it only logs.
    pub fn callback(&self) -> impl FnMut(&KeyEvent) + Send + 'static {
        let log = self.clone();
        move |event| {
            if event.kind == KeyEventKind::LongPressHold {
                debug!("{}", log.describe("callback", event));
            } else {
                info!("{}", log.describe("callback", event));
            }
        }
    }

    /// Drains the queue on its own thread until every publisher is gone.
    /// The thread returns the amount of events it consumed.
    pub fn spawn_consumer(&self, receiver: EventReceiver) -> io::Result<JoinHandle<usize>> {
        let log = self.clone();
        thread::Builder::new()
            .name("key-events".to_string())
            .spawn(move || {
                let mut consumed = 0;
                while let Some(event) = receiver.recv() {
                    // Hold events repeat every few hundred ms, keep them out of the info log.
                    if event.kind == KeyEventKind::LongPressHold {
                        debug!("{}", log.describe("queue", &event));
                    } else {
                        info!("{}", log.describe("queue", &event));
                    }
                    consumed += 1;
                }
                debug!("Event queue closed after {} events.", consumed);
                consumed
            })
    }
}
