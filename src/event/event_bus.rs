//! # Events and the broadcast bus
//!
//! [`Event`] is the unit that travels between the host hub and the extension.
//! Events are immutable once built: the hub stamps the logical version while it
//! still owns the value, and everything downstream only reads it.
//!
//! [`EventBus`] is a thin wrapper over a Tokio broadcast channel. The in-process
//! hub uses it to fan outbound events (responses, shared-state notifications) out
//! to any number of subscribers.
//!
//! ## Capacity
//!
//! Broadcast receivers that fall behind by more than the capacity lose events and
//! observe [`EventError::Lagged`]. Subscribers should call `recv` again promptly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use super::event_type::{EventSource, EventType};

pub type EventData = HashMap<String, Value>;

/// # Event
///
/// * `name`: descriptive, for logs only
/// * `event_type` / `source`: routing discriminators
/// * `data`: payload, may be absent
/// * `version`: logical position used to snapshot shared state
/// * `response_to`: id of the request this event answers, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub event_type: EventType,
    pub source: EventSource,
    pub data: Option<EventData>,
    pub version: u64,
    pub response_to: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn builder(name: &str, event_type: EventType, source: EventSource) -> EventBuilder {
        EventBuilder::new(name, event_type, source)
    }

    /// Looks up a top-level string field of the payload.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// Looks up a top-level map field of the payload.
    pub fn data_map(&self, key: &str) -> Option<&EventData> {
        self.data.as_ref()?.get(key)?.as_map()
    }

    pub fn is_response_to(&self, request: &Event) -> bool {
        self.response_to == Some(request.id)
    }

    /// Hub-side stamping of the logical version. Consumes the event so it can only
    /// happen before the event is shared.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventBuilder {
    name: String,
    event_type: EventType,
    source: EventSource,
    data: Option<EventData>,
    version: u64,
    response_to: Option<Uuid>,
}

impl EventBuilder {
    pub fn new(name: &str, event_type: EventType, source: EventSource) -> Self {
        Self {
            name: name.to_string(),
            event_type,
            source,
            ..Default::default()
        }
    }

    pub fn parameter(mut self, key: &str, value: Value) -> Self {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Marks the event as the response to `request`, inheriting its version.
    pub fn response_to(mut self, request: &Event) -> Self {
        self.response_to = Some(request.id);
        self.version = request.version;
        self
    }

    pub fn build(self) -> EventResult<Event> {
        if self.name.trim().is_empty() {
            return Err(EventError::BuilderFailed("name is required".to_string()));
        }
        if matches!(self.event_type, EventType::Unknown) {
            return Err(EventError::BuilderFailed("event type is required".to_string()));
        }
        if matches!(self.source, EventSource::Unknown) {
            return Err(EventError::BuilderFailed("event source is required".to_string()));
        }
        Ok(Event {
            id: Uuid::new_v4(),
            name: self.name,
            event_type: self.event_type,
            source: self.source,
            data: self.data,
            version: self.version,
            response_to: self.response_to,
            timestamp: Utc::now(),
        })
    }
}

/// Loosely typed payload value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Null,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Option<HashMap<String, Value>>> for Value {
    fn from(value: Option<HashMap<String, Value>>) -> Self {
        value.map(Value::Map).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// # EventBus
///
/// Broadcast fan-out for outbound events. An internal receiver keeps the channel
/// open so publishing with no subscribers is not an error.
pub struct EventBus {
    event_sender: broadcast::Sender<Event>,
    _internal_receiver: broadcast::Receiver<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_sender, event_receiver) = broadcast::channel(capacity);
        Self {
            event_sender,
            _internal_receiver: event_receiver,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.event_sender.subscribe())
    }

    pub fn publish(&self, event: Event) -> EventResult<()> {
        debug_event("Publishing", &event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn subscribers_size(&self) -> usize {
        // the internal receiver is not a subscriber
        self.event_sender.receiver_count().saturating_sub(1)
    }
}

pub fn debug_event(prefix: &str, event: &Event) {
    match event.event_type {
        EventType::Hub => trace!("{} Event ({}): {:?}", prefix, event.timestamp, event),
        _ => debug!(
            "{} Event {} created at {}, {}/{} version {}",
            prefix, event.id, event.timestamp, event.event_type, event.source, event.version
        ),
    }
}

pub struct EventReceiver {
    pub receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// On lag the receiver is resubscribed and the skipped count is reported.
    pub async fn recv(&mut self) -> EventResult<Event> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("event builder failed: {0}")]
    BuilderFailed(String),

    #[error("Event Send failed: {message}")]
    SendFailed { message: String },

    #[error("Event Receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event lagged: {count}")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;
