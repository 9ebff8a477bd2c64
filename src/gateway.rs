use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::event::{Event, EventData, EventError};

/// The single exit point for everything the extension produces.
///
/// Implementations are called from spawned lookup tasks, so they must be safe to
/// use from any worker thread of the runtime.
#[automock]
#[async_trait]
pub trait DispatchGateway: Send + Sync {
    /// Publishes `response` as the answer to `request`.
    async fn dispatch_response(&self, response: Event, request: &Event) -> GatewayResult<()>;

    /// Writes `owner`'s shared state at the version of `event`. `None` is a valid
    /// state meaning "no data".
    async fn set_shared_state(
        &self,
        owner: &str,
        state: Option<EventData>,
        event: &Event,
    ) -> GatewayResult<()>;

    /// Drops every shared state `owner` has written.
    async fn clear_shared_states(&self, owner: &str) -> GatewayResult<()>;
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Shared state owner not registered: {0}")]
    NotRegistered(String),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
