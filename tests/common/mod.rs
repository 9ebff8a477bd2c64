#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::oneshot;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use weather_extension::{
    config::LimitsConfig,
    constants::{event_name, keys, shared_state},
    lookup::{LookupError, LookupResult, WeatherLookup, WeatherResult},
    Event, EventData, EventReceiver, EventSource, EventType, LocalHub, Value, WeatherExtension,
};

pub const WAIT: Duration = Duration::from_secs(2);

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

type Gate = oneshot::Receiver<LookupResult<WeatherResult>>;

/// Lookup whose answers are released by the test, one gate per zip.
/// A zip without a gate fails with 404.
#[derive(Default)]
pub struct GatedLookup {
    gates: Mutex<HashMap<String, Gate>>,
    started: AtomicUsize,
    keys: Mutex<Vec<String>>,
}

impl GatedLookup {
    pub fn gate(&self, zip: &str) -> oneshot::Sender<LookupResult<WeatherResult>> {
        let (release, gate) = oneshot::channel();
        self.gates.lock().unwrap().insert(zip.to_string(), gate);
        release
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn keys_seen(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeatherLookup for GatedLookup {
    async fn weather_for_zip(
        &self,
        zip: &str,
        api_key: &SecretString,
    ) -> LookupResult<WeatherResult> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .unwrap()
            .push(api_key.expose_secret().to_string());
        let gate = self.gates.lock().unwrap().remove(zip);
        match gate {
            Some(gate) => gate
                .await
                .unwrap_or_else(|_| Err(LookupError::Request("gate dropped".to_string()))),
            None => Err(LookupError::Status(404)),
        }
    }
}

pub struct Harness {
    pub hub: Arc<LocalHub>,
    pub extension: Arc<WeatherExtension>,
    pub events: EventReceiver,
}

pub async fn harness(lookup: Arc<dyn WeatherLookup>, limits: LimitsConfig) -> Harness {
    let hub = Arc::new(LocalHub::new(256));
    let extension = Arc::new(WeatherExtension::new(
        &limits,
        hub.clone(),
        hub.clone(),
        lookup,
    ));
    hub.register_extension(extension.clone()).await;
    let events = hub.subscribe();
    Harness {
        hub,
        extension,
        events,
    }
}

pub fn api_key(key: &str) -> Option<EventData> {
    let mut data = HashMap::new();
    data.insert(keys::WEATHER_API_KEY.to_string(), Value::from(key));
    Some(data)
}

pub async fn configure(hub: &LocalHub, key: &str) {
    hub.set_state(shared_state::CONFIGURATION, api_key(key))
        .await
        .unwrap();
}

pub fn weather_request(zip: &str) -> Event {
    Event::builder(
        event_name::GET_WEATHER,
        EventType::WeatherExtension,
        EventSource::WeatherRequestContent,
    )
    .parameter(keys::ZIP, Value::from(zip))
    .build()
    .unwrap()
}

pub fn rules_consequence(detail: serde_json::Value) -> Event {
    Event::builder(
        "Rules Consequence Event",
        EventType::RulesEngine,
        EventSource::ResponseContent,
    )
    .parameter(
        keys::TRIGGERED_CONSEQUENCE,
        Value::from(serde_json::json!({ "id": "rule-1", "type": "pb", "detail": detail })),
    )
    .build()
    .unwrap()
}

/// Next event on `events` that answers `request`.
pub async fn response_to(events: &mut EventReceiver, request: &Event) -> Event {
    next_matching(events, |event| event.is_response_to(request)).await
}

/// Next shared-state notification for `owner`.
pub async fn state_change(events: &mut EventReceiver, owner: &str) -> Event {
    next_matching(events, |event| {
        event.event_type == EventType::Hub && event.data_str(shared_state::STATE_OWNER) == Some(owner)
    })
    .await
}

pub async fn next_matching(
    events: &mut EventReceiver,
    matches: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition")
}
