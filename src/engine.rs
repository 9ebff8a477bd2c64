//! # Processing engine
//!
//! A single worker task owns the drain loop and all mutable extension state
//! (`mid`, the engine state). Producers never touch either: they append to the
//! shared [`EventQueue`] and send the worker a [`WorkerCommand::Drain`].
//!
//! ```text
//!            enqueue / config ready
//!   ┌──────┐ ─────────────────────▶ ┌──────────┐  config pending  ┌─────────┐
//!   │ Idle │                        │ Draining │ ────────────────▶│ Blocked │
//!   └──────┘ ◀───────────────────── └──────────┘ ◀──────────────── └─────────┘
//!                 queue empty                        re-trigger
//! ```
//!
//! Per head event the configuration slot decides what happens:
//!
//! - `Unavailable`: the event is dropped and draining continues
//! - `Pending`: the event stays at the head and the worker stops until triggered again
//! - `Ready`: the event is classified and handled, then popped
//!
//! Handling only *starts* a lookup. The lookup runs on its own task and publishes
//! its results whenever it completes, so results can leave in a different order
//! than their requests arrived. Consumers correlate by the triggering event.

use std::{sync::Arc, time::Duration};

use secrecy::SecretString;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::{
    config::LimitsConfig,
    constants::{event_name, keys, shared_state},
    event::{Event, EventQueue, EventSource, EventType, Value},
    gateway::DispatchGateway,
    lookup::{LookupError, WeatherLookup, WeatherResult},
    shared_state::{DependencyResolver, Resolution},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum EngineState {
    #[default]
    Idle,
    Draining,
    Blocked,
}

#[derive(Debug)]
pub enum WorkerCommand {
    /// Drain the queue from its current head.
    Drain,
    /// Forget the cached identity.
    Reset,
    /// Reply with the engine state once every earlier command has been handled.
    Flush(oneshot::Sender<EngineState>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    WeatherRequest,
    RulesConsequence,
    Other,
}

impl Category {
    fn of(event: &Event) -> Self {
        match event.event_type {
            EventType::WeatherExtension => Category::WeatherRequest,
            EventType::RulesEngine => Category::RulesConsequence,
            _ => Category::Other,
        }
    }
}

/// Optional bounds applied around every lookup.
#[derive(Debug, Clone, Default)]
pub struct LookupLimits {
    permits: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
}

impl LookupLimits {
    pub fn from_config(config: &LimitsConfig) -> Self {
        Self {
            permits: config
                .max_in_flight
                .map(|permits| Arc::new(Semaphore::new(permits))),
            timeout: config.lookup_timeout,
        }
    }

    /// Runs one lookup. Failures are logged and collapse to `None`.
    async fn run(
        &self,
        lookup: &dyn WeatherLookup,
        zip: &str,
        api_key: &SecretString,
    ) -> Option<WeatherResult> {
        let _permit = match &self.permits {
            Some(permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };

        let call = lookup.weather_for_zip(zip, api_key);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(LookupError::TimedOut(limit))),
            None => call.await,
        };

        match result {
            Ok(weather) => Some(weather),
            Err(e) => {
                warn!("weather lookup for {} failed: {}", zip, e);
                None
            }
        }
    }
}

pub struct Processor {
    owner: String,
    queue: Arc<EventQueue>,
    resolver: DependencyResolver,
    lookup: Arc<dyn WeatherLookup>,
    gateway: Arc<dyn DispatchGateway>,
    limits: LookupLimits,
    state: watch::Sender<EngineState>,
    mid: watch::Sender<Option<String>>,
}

impl Processor {
    pub fn new(
        owner: &str,
        queue: Arc<EventQueue>,
        resolver: DependencyResolver,
        lookup: Arc<dyn WeatherLookup>,
        gateway: Arc<dyn DispatchGateway>,
        limits: LookupLimits,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        let (mid, _) = watch::channel(None);
        Self {
            owner: owner.to_string(),
            queue,
            resolver,
            lookup,
            gateway,
            limits,
            state,
            mid,
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn mid(&self) -> Option<String> {
        self.mid.borrow().clone()
    }

    pub fn subscribe_mid(&self) -> watch::Receiver<Option<String>> {
        self.mid.subscribe()
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("engine state {} -> {}", previous, state);
        }
    }

    /// Worker loop. Commands that pile up while a drain runs are taken as one
    /// batch; repeated drain requests in a batch collapse into a single drain.
    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<WorkerCommand>) {
        info!("{} worker started", self.owner);
        while let Some(first) = commands.recv().await {
            let mut batch = vec![first];
            while let Ok(command) = commands.try_recv() {
                batch.push(command);
            }

            let mut drain_requested = false;
            for command in batch {
                match command {
                    WorkerCommand::Drain => drain_requested = true,
                    WorkerCommand::Reset => {
                        if std::mem::take(&mut drain_requested) {
                            self.drain().await;
                        }
                        self.reset();
                    }
                    WorkerCommand::Flush(reply) => {
                        if std::mem::take(&mut drain_requested) {
                            self.drain().await;
                        }
                        let _ = reply.send(self.state());
                    }
                    WorkerCommand::Shutdown => {
                        if drain_requested {
                            self.drain().await;
                        }
                        info!("{} worker stopped", self.owner);
                        return;
                    }
                }
            }
            if drain_requested {
                self.drain().await;
            }
        }
        info!("{} worker stopped, command channel closed", self.owner);
    }

    fn reset(&self) {
        debug!("clearing cached identity");
        self.mid.send_replace(None);
    }

    /// Processes events from the head until the queue is empty or the head is
    /// waiting on configuration. Returns the state the engine settled in.
    pub async fn drain(&self) -> EngineState {
        self.set_state(EngineState::Draining);

        while let Some(event) = self.queue.peek().await {
            let config = match self
                .resolver
                .resolve(shared_state::CONFIGURATION, &event)
                .await
            {
                Resolution::Ready(config) => config,
                Resolution::Pending => {
                    debug!(
                        "Could not process event {}, configuration shared state is pending",
                        event.id
                    );
                    self.set_state(EngineState::Blocked);
                    return EngineState::Blocked;
                }
                Resolution::Unavailable => {
                    warn!(
                        "Dropping event {} ({}), configuration is unavailable",
                        event.name, event.id
                    );
                    self.queue.pop().await;
                    continue;
                }
            };

            let api_key = SecretString::from(
                config
                    .get(keys::WEATHER_API_KEY)
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            );

            self.refresh_mid(&event).await;

            match Category::of(&event) {
                Category::WeatherRequest => {
                    self.handle_get_weather(&event, api_key);
                    debug!("GetWeather event {} processed", event.id);
                }
                Category::RulesConsequence => {
                    self.handle_consequence(&event, api_key);
                    debug!("Rules consequence event {} processed", event.id);
                }
                Category::Other => {
                    debug!("Ignoring event {} of type {}", event.id, event.event_type);
                }
            }

            self.queue.pop().await;
        }

        self.set_state(EngineState::Idle);
        EngineState::Idle
    }

    /// Identity never blocks: a ready snapshot replaces the cached `mid`, anything
    /// else keeps it.
    async fn refresh_mid(&self, event: &Event) {
        match self
            .resolver
            .resolve(shared_state::IDENTITY, event)
            .await
        {
            Resolution::Ready(identity) => {
                let mid = identity
                    .get(keys::IDENTITY_MID)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.mid.send_replace(mid);
            }
            Resolution::Pending | Resolution::Unavailable => {
                debug!("Identity shared state is not available, keeping cached mid");
            }
        }
    }

    fn handle_get_weather(&self, event: &Event, api_key: SecretString) {
        let Some(zip) = event.data_str(keys::ZIP).filter(|zip| !zip.is_empty()) else {
            debug!("Get Weather event {} has no zip, dropping", event.id);
            return;
        };
        let zip = zip.to_string();
        let request = event.clone();
        let owner = self.owner.clone();
        let lookup = self.lookup.clone();
        let gateway = self.gateway.clone();
        let limits = self.limits.clone();

        tokio::spawn(async move {
            let weather = limits
                .run(lookup.as_ref(), &zip, &api_key)
                .await
                .map(|weather| weather.to_payload());
            debug!("Weather object returned for {}: {:?}", zip, weather);

            let response = Event::builder(
                event_name::WEATHER_LOADED,
                EventType::WeatherExtension,
                EventSource::WeatherResponseContent,
            )
            .parameter(keys::WEATHER, Value::from(weather.clone()))
            .response_to(&request)
            .build();
            if let Err(e) = &response {
                warn!("An error occurred constructing event: {}", e);
            }

            if let Err(e) = gateway.set_shared_state(&owner, weather, &request).await {
                warn!("An error occurred setting shared state for {}: {}", request.id, e);
            }

            if let Ok(response) = response {
                if let Err(e) = gateway.dispatch_response(response, &request).await {
                    warn!(
                        "An error occurred dispatching the weather loaded event: {}",
                        e
                    );
                }
            }
        });
    }

    fn handle_consequence(&self, event: &Event, api_key: SecretString) {
        let Some(consequence) = event
            .data_map(keys::TRIGGERED_CONSEQUENCE)
            .filter(|consequence| !consequence.is_empty())
        else {
            return;
        };
        let Some(detail) = consequence
            .get(keys::DETAIL)
            .and_then(Value::as_map)
            .filter(|detail| !detail.is_empty())
        else {
            return;
        };
        let Some(zip) = detail.get(keys::ZIP).and_then(Value::as_str) else {
            debug!("Not a zip request consequence");
            return;
        };

        let zip = zip.to_string();
        let request = event.clone();
        let owner = self.owner.clone();
        let lookup = self.lookup.clone();
        let gateway = self.gateway.clone();
        let limits = self.limits.clone();

        tokio::spawn(async move {
            let weather = limits
                .run(lookup.as_ref(), &zip, &api_key)
                .await
                .map(|weather| weather.to_payload());
            info!("The weather has been updated for this user: {:?}", weather);

            if let Err(e) = gateway.set_shared_state(&owner, weather, &request).await {
                warn!(
                    "An error occurred while setting the shared state for {}: {}",
                    request.id, e
                );
            }
        });
    }
}
