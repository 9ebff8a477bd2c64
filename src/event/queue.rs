use std::collections::VecDeque;

use tokio::sync::Mutex;
use tracing::trace;

use super::event_bus::Event;

/// Strict FIFO of events waiting for the worker.
///
/// Any number of producers may call [`enqueue`](Self::enqueue) concurrently; a
/// single consumer walks the head with [`peek`](Self::peek) and
/// [`pop`](Self::pop). The queue is unbounded: there is no backpressure on
/// producers.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail. `None` is ignored. Returns whether an event was added.
    pub async fn enqueue(&self, event: impl Into<Option<Event>>) -> bool {
        let Some(event) = event.into() else {
            return false;
        };
        trace!("enqueue {} ({})", event.name, event.id);
        self.events.lock().await.push_back(event);
        true
    }

    /// Returns a copy of the head without removing it.
    pub async fn peek(&self) -> Option<Event> {
        self.events.lock().await.front().cloned()
    }

    pub async fn pop(&self) -> Option<Event> {
        self.events.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}
