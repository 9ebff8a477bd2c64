//! # Events
//!
//! Everything that crosses the boundary between the host hub and the extension
//! is an [`Event`]: typed by [`EventType`] and [`EventSource`], carrying an
//! optional payload and the logical version the hub assigned when it admitted it.
//!
//! ```text
//! ┌──────────┐  handle   ┌───────────┐  drain   ┌──────────────┐
//! │ Host hub │──────────▶│EventQueue │─────────▶│  Processor   │
//! └──────────┘           └───────────┘          └──────┬───────┘
//!      ▲                                               │ lookup (spawned)
//!      │          responses / shared state             ▼
//!      └──────────────────────────────────────── DispatchGateway
//! ```
//!
//! - [`event_bus`]: the event record, payload values and the broadcast bus
//! - [`event_type`]: type and source discriminators
//! - [`queue`]: the FIFO the worker drains

pub mod event_bus;
pub mod event_type;
pub mod queue;

pub use event_bus::{
    Event, EventBuilder, EventBus, EventData, EventError, EventReceiver, EventResult, Value,
};
pub use event_type::{EventSource, EventType};
pub use queue::EventQueue;
