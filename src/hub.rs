//! # LocalHub
//!
//! In-process stand-in for the host event hub. It
//!
//! - stamps every dispatched event with the next logical version,
//! - keeps versioned shared-state history per owner,
//! - forwards dispatched events to registered extensions,
//! - broadcasts everything (requests, responses, state notifications) on an
//!   [`EventBus`] so callers can wait for correlated responses.
//!
//! ## Versioned reads
//!
//! A read at version `v` sees the newest entry written at or before `v`. An
//! event older than an owner's first entry sees that first entry, so state
//! published right after startup still reaches events that were already queued.
//!
//! A pending entry reserved with [`LocalHub::create_pending_state`] is filled in
//! place by the next [`LocalHub::set_state`] of the same owner.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    constants::{event_name, shared_state},
    event::{Event, EventBus, EventData, EventReceiver, EventSource, EventType, Value},
    extension::{Extension, ExtensionResult},
    gateway::{DispatchGateway, GatewayResult},
    shared_state::{SharedState, SharedStateSource},
};

pub struct LocalHub {
    event_bus: EventBus,
    version: AtomicU64,
    states: DashMap<String, BTreeMap<u64, SharedState>>,
    extensions: RwLock<Vec<Weak<dyn Extension>>>,
}

impl LocalHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            event_bus: EventBus::new(capacity),
            version: AtomicU64::new(0),
            states: DashMap::new(),
            extensions: RwLock::new(Vec::new()),
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Latest version handed out so far.
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// The hub only keeps a weak reference: the caller owns the extension.
    pub async fn register_extension(&self, extension: Arc<dyn Extension>) {
        info!(
            "registering extension {} {}",
            extension.name(),
            extension.version()
        );
        let mut extensions = self.extensions.write().await;
        extensions.retain(|registered| registered.strong_count() > 0);
        extensions.push(Arc::downgrade(&extension));
    }

    /// Returns `false` when no live extension has that name.
    pub async fn unregister_extension(&self, name: &str) -> ExtensionResult<bool> {
        let removed = {
            let mut extensions = self.extensions.write().await;
            let position = extensions.iter().position(|registered| {
                registered
                    .upgrade()
                    .is_some_and(|extension| extension.name() == name)
            });
            position.and_then(|index| extensions.remove(index).upgrade())
        };

        match removed {
            Some(extension) => {
                info!("unregistering extension {}", name);
                extension.on_unregistered().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stamps `event` with the next version, broadcasts it and hands it to every
    /// registered extension. Returns the stamped event.
    pub async fn dispatch(&self, event: Event) -> GatewayResult<Event> {
        let event = event.with_version(self.next_version());
        self.event_bus.publish(event.clone())?;

        let extensions: Vec<Arc<dyn Extension>> = self
            .extensions
            .read()
            .await
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        let handled =
            futures::future::join_all(extensions.iter().map(|extension| extension.handle(&event)))
                .await;
        for (extension, result) in extensions.iter().zip(handled) {
            if let Err(e) = result {
                warn!("{} failed to handle {}: {}", extension.name(), event.id, e);
            }
        }
        Ok(event)
    }

    /// Reserves a pending entry for `owner` at a new version.
    pub fn create_pending_state(&self, owner: &str) -> u64 {
        let version = self.next_version();
        self.states
            .entry(owner.to_string())
            .or_default()
            .insert(version, SharedState::Pending);
        debug!("{} pending at version {}", owner, version);
        version
    }

    /// Publishes `owner`'s state. Fills the latest entry if it is pending,
    /// otherwise appends at a new version. Notifies listeners either way.
    pub async fn set_state(&self, owner: &str, data: Option<EventData>) -> GatewayResult<u64> {
        let version = {
            let mut history = self.states.entry(owner.to_string()).or_default();
            let pending = history
                .last_key_value()
                .and_then(|(&version, state)| (*state == SharedState::Pending).then_some(version));
            let version = pending.unwrap_or_else(|| self.next_version());
            history.insert(version, SharedState::Set(data));
            version
        };
        debug!("{} set at version {}", owner, version);
        self.notify_state_change(owner).await?;
        Ok(version)
    }

    async fn notify_state_change(&self, owner: &str) -> GatewayResult<()> {
        let notification = Event::builder(
            event_name::SHARED_STATE_CHANGE,
            EventType::Hub,
            EventSource::SharedState,
        )
        .parameter(shared_state::STATE_OWNER, Value::from(owner))
        .build()?;
        self.dispatch(notification).await?;
        Ok(())
    }

    fn read_state(&self, owner: &str, version: u64) -> Option<SharedState> {
        let history = self.states.get(owner)?;
        history
            .range(..=version)
            .next_back()
            .or_else(|| history.iter().next())
            .map(|(_, state)| state.clone())
    }
}

#[async_trait]
impl SharedStateSource for LocalHub {
    async fn shared_state(&self, owner: &str, version: u64) -> GatewayResult<Option<SharedState>> {
        Ok(self.read_state(owner, version))
    }
}

#[async_trait]
impl DispatchGateway for LocalHub {
    async fn dispatch_response(&self, response: Event, request: &Event) -> GatewayResult<()> {
        debug!("response {} to request {}", response.id, request.id);
        self.event_bus.publish(response)?;
        Ok(())
    }

    async fn set_shared_state(
        &self,
        owner: &str,
        state: Option<EventData>,
        event: &Event,
    ) -> GatewayResult<()> {
        self.states
            .entry(owner.to_string())
            .or_default()
            .insert(event.version, SharedState::Set(state));
        debug!("{} set at version {} by {}", owner, event.version, event.id);
        self.notify_state_change(owner).await
    }

    async fn clear_shared_states(&self, owner: &str) -> GatewayResult<()> {
        self.states.remove(owner);
        Ok(())
    }
}
