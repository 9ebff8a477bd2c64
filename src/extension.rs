use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, trace};

use crate::{
    config::LimitsConfig,
    constants::{shared_state, EXTENSION_NAME, EXTENSION_VERSION},
    engine::{EngineState, LookupLimits, Processor, WorkerCommand},
    event::{Event, EventQueue, EventSource, EventType},
    gateway::{DispatchGateway, GatewayError},
    lookup::WeatherLookup,
    shared_state::{DependencyResolver, SharedStateSource},
};

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Extension worker is not running")]
    WorkerStopped,

    #[error("Extension worker failed: {0}")]
    Worker(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// A component hosted by the hub.
#[async_trait]
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Called by the hub for every dispatched event. Must return quickly: heavy
    /// work belongs on the extension's own tasks.
    async fn handle(&self, event: &Event) -> ExtensionResult<()>;

    async fn on_unregistered(&self) -> ExtensionResult<()> {
        Ok(())
    }
}

/// # WeatherExtension
///
/// Listener side of the weather extension. Admitted events go to the queue and
/// the worker is nudged; a configuration change re-triggers a drain so a blocked
/// head gets re-evaluated.
pub struct WeatherExtension {
    queue: Arc<EventQueue>,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    state: watch::Receiver<EngineState>,
    mid: watch::Receiver<Option<String>>,
    gateway: Arc<dyn DispatchGateway>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WeatherExtension {
    /// Spawns the worker task on the current runtime.
    pub fn new(
        limits: &LimitsConfig,
        states: Arc<dyn SharedStateSource>,
        gateway: Arc<dyn DispatchGateway>,
        lookup: Arc<dyn WeatherLookup>,
    ) -> Self {
        let queue = Arc::new(EventQueue::new());
        let processor = Processor::new(
            EXTENSION_NAME,
            queue.clone(),
            DependencyResolver::new(states),
            lookup,
            gateway.clone(),
            LookupLimits::from_config(limits),
        );
        let state = processor.subscribe_state();
        let mid = processor.subscribe_mid();

        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(processor.run(receiver));

        Self {
            queue,
            commands,
            state,
            mid,
            gateway,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn send(&self, command: WorkerCommand) -> ExtensionResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ExtensionError::WorkerStopped)
    }

    async fn queue_event(&self, event: &Event) -> ExtensionResult<()> {
        self.queue.enqueue(event.clone()).await;
        debug!("queued {} ({})", event.name, event.id);
        self.process_events()
    }

    /// Asks the worker to drain from the current head.
    pub fn process_events(&self) -> ExtensionResult<()> {
        self.send(WorkerCommand::Drain)
    }

    /// Waits until the worker has handled every command sent before this call,
    /// then reports the engine state.
    pub async fn flush(&self) -> ExtensionResult<EngineState> {
        let (reply, settled) = oneshot::channel();
        self.send(WorkerCommand::Flush(reply))?;
        settled.await.map_err(|_| ExtensionError::WorkerStopped)
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Cached identity, if an identity snapshot has been seen.
    pub fn mid(&self) -> Option<String> {
        self.mid.borrow().clone()
    }

    pub async fn queued(&self) -> usize {
        self.queue.len().await
    }

    /// Stops the worker once the commands already sent are handled. In-flight
    /// lookups are not cancelled.
    pub async fn shutdown(&self) -> ExtensionResult<()> {
        let _ = self.send(WorkerCommand::Shutdown);
        if let Some(worker) = self.worker.lock().await.take() {
            worker
                .await
                .map_err(|e| ExtensionError::Worker(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Extension for WeatherExtension {
    fn name(&self) -> &str {
        EXTENSION_NAME
    }

    fn version(&self) -> &str {
        EXTENSION_VERSION
    }

    async fn handle(&self, event: &Event) -> ExtensionResult<()> {
        if event.data.is_none() {
            trace!("ignoring {} without payload", event.id);
            return Ok(());
        }

        match (&event.event_type, &event.source) {
            (EventType::Hub, EventSource::SharedState) => {
                if event
                    .data_str(shared_state::STATE_OWNER)
                    .is_some_and(|owner| owner.eq_ignore_ascii_case(shared_state::CONFIGURATION))
                {
                    debug!("configuration changed, processing queued events");
                    self.process_events()?;
                }
                Ok(())
            }
            (EventType::WeatherExtension, EventSource::WeatherRequestContent)
            | (EventType::RulesEngine, EventSource::ResponseContent) => {
                self.queue_event(event).await
            }
            _ => Ok(()),
        }
    }

    async fn on_unregistered(&self) -> ExtensionResult<()> {
        info!("{} unregistered", EXTENSION_NAME);
        self.gateway.clear_shared_states(EXTENSION_NAME).await?;
        self.send(WorkerCommand::Reset)
    }
}
