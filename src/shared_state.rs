//! # Shared state and dependency resolution
//!
//! Other components publish named, versioned state slots on the hub
//! (configuration, identity). The extension only ever reads them, and always at
//! the logical version of the event it is processing, so a later update never
//! changes what an already-queued event observes.
//!
//! The hub answers a read with one of three outcomes, made explicit here:
//!
//! | hub answer                  | [`Resolution`]  |
//! |-----------------------------|-----------------|
//! | state set (even empty/null) | `Ready(data)`   |
//! | pending placeholder         | `Pending`       |
//! | slot unknown / read failed  | `Unavailable`   |

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{debug, warn};

use crate::{
    event::{Event, EventData},
    gateway::GatewayResult,
};

/// A slot snapshot as stored by the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum SharedState {
    /// Reserved but not yet filled in.
    Pending,
    /// Set by the owner. `None` means the owner explicitly published no data.
    Set(Option<EventData>),
}

/// Read side of the hub's shared-state store.
#[automock]
#[async_trait]
pub trait SharedStateSource: Send + Sync {
    /// Returns the state of `owner` as of `version`, or `None` if the slot does
    /// not exist.
    async fn shared_state(&self, owner: &str, version: u64) -> GatewayResult<Option<SharedState>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Ready(EventData),
    Pending,
    Unavailable,
}

impl Resolution {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready(_))
    }
}

#[derive(Clone)]
pub struct DependencyResolver {
    source: Arc<dyn SharedStateSource>,
}

impl DependencyResolver {
    pub fn new(source: Arc<dyn SharedStateSource>) -> Self {
        Self { source }
    }

    /// Resolves `slot` at the version stamped on `event`.
    pub async fn resolve(&self, slot: &str, event: &Event) -> Resolution {
        match self.source.shared_state(slot, event.version).await {
            Ok(Some(SharedState::Set(data))) => Resolution::Ready(data.unwrap_or_default()),
            Ok(Some(SharedState::Pending)) => {
                debug!("{} is pending at version {}", slot, event.version);
                Resolution::Pending
            }
            Ok(None) => {
                debug!("{} does not exist", slot);
                Resolution::Unavailable
            }
            Err(e) => {
                warn!(
                    "could not read {} for event {} ({}): {}",
                    slot, event.name, event.id, e
                );
                Resolution::Unavailable
            }
        }
    }
}
