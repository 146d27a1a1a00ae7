//! Delivery of classified key events.
//!
//! There are two independent paths, either or both of which may be present:
//! a bounded queue drained by a consumer thread, and a callback run inline on the scanning
//! thread. Neither ever blocks the scan loop; a full queue drops the event.

use std::fmt::{Debug, Formatter};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;
use log::{debug, warn};
use crate::key::KeyEvent;

/// Default capacity of an [event_queue].
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Callback invoked for every event on the scanning thread. Must return quickly.
pub type EventCallback = Box<dyn FnMut(&KeyEvent) + Send>;

/// Creates a bounded event queue holding at most `capacity` undelivered events.
pub fn event_queue(capacity: usize) -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (EventQueue { tx, capacity }, EventReceiver { rx })
}

/// Publishing end of an event queue.
#[derive(Clone, Debug)]
pub struct EventQueue {
    tx: SyncSender<KeyEvent>,
    capacity: usize,
}

impl EventQueue {
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consuming end of an event queue.
///
/// Events already queued stay receivable after scanning has stopped.
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<KeyEvent>,
}

impl EventReceiver {
    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<KeyEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Gets the next event if one is queued.
    pub fn try_recv(&self) -> Option<KeyEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the next event. Returns `None` once the queue is empty and every
    /// publisher is gone.
    pub fn recv(&self) -> Option<KeyEvent> {
        self.rx.recv().ok()
    }

    /// Takes all currently queued events.
    pub fn drain(&self) -> impl Iterator<Item = KeyEvent> + '_ {
        self.rx.try_iter()
    }
}

/// Fan-out of key events to the configured delivery paths.
#[derive(Default)]
pub struct EventSinks {
    queue: Option<EventQueue>,
    callback: Option<EventCallback>,
    dropped: u64,
}

impl Debug for EventSinks {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSinks")
            .field("queue", &self.queue)
            .field("callback", &self.callback.is_some())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl EventSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(mut self, queue: EventQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_callback(mut self, callback: impl FnMut(&KeyEvent) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn has_queue(&self) -> bool {
        self.queue.is_some()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Gets the amount of events the queue path has dropped because it was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    /// Delivers the event to every path. Returns whether any path took it.
    pub fn publish(&mut self, event: &KeyEvent) -> bool {
        let mut delivered = false;

        if let Some(queue) = &self.queue {
            match queue.tx.try_send(*event) {
                Ok(()) => delivered = true,
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    warn!("Event queue full, dropping {}.", event);
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Event queue receiver gone, disabling the queue path.");
                    self.queue = None;
                }
            }
        }

        if let Some(callback) = &mut self.callback {
            callback(event);
            delivered = true;
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use crate::key::KeyEventKind;

    fn event(at: u32) -> KeyEvent {
        KeyEvent { key: 0, kind: KeyEventKind::PressDown, at }
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (queue, receiver) = event_queue(2);
        assert_eq!(queue.capacity(), 2);
        let mut sinks = EventSinks::new().with_queue(queue);

        assert!(sinks.publish(&event(1)));
        assert!(sinks.publish(&event(2)));
        assert!(!sinks.publish(&event(3)));
        assert_eq!(sinks.dropped_events(), 1);

        let received: Vec<_> = receiver.drain().map(|e| e.at).collect();
        assert_eq!(received, vec![1, 2]);
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_callback_and_queue_both_receive() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let (queue, receiver) = event_queue(DEFAULT_QUEUE_CAPACITY);
        let mut sinks = EventSinks::new()
            .with_queue(queue)
            .with_callback(move |event| seen_cb.lock().unwrap().push(event.at));
        assert!(sinks.has_queue());
        assert!(sinks.has_callback());

        sinks.publish(&event(7));

        assert_eq!(*seen.lock().unwrap(), vec![7]);
        assert_eq!(receiver.recv_timeout(Duration::from_millis(10)), Some(event(7)));
    }

    #[test]
    fn test_callback_still_runs_when_queue_full() {
        let count = Arc::new(Mutex::new(0));
        let count_cb = count.clone();
        let (queue, _receiver) = event_queue(1);
        let mut sinks = EventSinks::new()
            .with_queue(queue)
            .with_callback(move |_| *count_cb.lock().unwrap() += 1);

        assert!(sinks.publish(&event(1)));
        assert!(sinks.publish(&event(2)));
        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(sinks.dropped_events(), 1);
    }

    #[test]
    fn test_disconnected_queue_is_disabled() {
        let (queue, receiver) = event_queue(4);
        drop(receiver);
        let mut sinks = EventSinks::new().with_queue(queue);

        assert!(!sinks.publish(&event(1)));
        assert!(!sinks.has_queue());
        assert_eq!(sinks.dropped_events(), 0);
    }

    #[test]
    fn test_no_sinks() {
        let mut sinks = EventSinks::new();
        assert!(!sinks.publish(&event(1)));
    }
}
