//! Request/response helper for callers that want a typed answer instead of
//! watching the hub themselves.

use std::{fmt, time::Duration};

use tracing::{debug, warn};

use crate::{
    constants::{event_name, keys},
    event::{Event, EventError, EventReceiver, EventSource, EventType, Value},
    hub::LocalHub,
};

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherData {
    pub temperature: f64,
    pub conditions: String,
}

impl WeatherData {
    /// Reads the `weather` field of a "Weather Loaded" response. A null or
    /// incomplete field yields `None`.
    pub fn from_response(event: &Event) -> Option<Self> {
        let weather = event.data_map(keys::WEATHER)?;
        let temperature = weather
            .get(keys::TEMPERATURE)
            .and_then(Value::as_str)?
            .parse::<f64>()
            .ok()?;
        let conditions = weather.get(keys::CONDITIONS).and_then(Value::as_str)?;
        Some(Self {
            temperature,
            conditions: conditions.to_string(),
        })
    }
}

impl fmt::Display for WeatherData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temperature: {:.2}, Conditions: {}",
            self.temperature, self.conditions
        )
    }
}

/// Dispatches a "Get Weather" request for `zip` and waits up to `timeout` for
/// the correlated response. Every failure, including a lookup that found
/// nothing, is `None`.
pub async fn get_weather_by_zip(hub: &LocalHub, zip: &str, timeout: Duration) -> Option<WeatherData> {
    if zip.is_empty() {
        debug!("no zip given, not requesting weather");
        return None;
    }

    let request = match Event::builder(
        event_name::GET_WEATHER,
        EventType::WeatherExtension,
        EventSource::WeatherRequestContent,
    )
    .parameter(keys::ZIP, Value::from(zip))
    .build()
    {
        Ok(request) => request,
        Err(e) => {
            warn!("An error occurred constructing event: {}", e);
            return None;
        }
    };

    // subscribe before dispatching so the response cannot slip past
    let mut responses = hub.subscribe();
    let request = match hub.dispatch(request).await {
        Ok(request) => request,
        Err(e) => {
            warn!("An error occurred dispatching the weather request: {}", e);
            return None;
        }
    };

    match tokio::time::timeout(timeout, wait_for_response(&mut responses, &request)).await {
        Ok(Some(event)) => WeatherData::from_response(&event),
        Ok(None) => None,
        Err(_) => {
            debug!("no weather response for {} within {:?}", zip, timeout);
            None
        }
    }
}

/// Reads `responses` until the answer to `request` shows up. A lag means the
/// answer may have been among the skipped events, so the wait ends there.
async fn wait_for_response(responses: &mut EventReceiver, request: &Event) -> Option<Event> {
    loop {
        match responses.recv().await {
            Ok(event) if event.is_response_to(request) => return Some(event),
            Ok(_) => continue,
            Err(EventError::Lagged { count }) => {
                warn!(
                    "weather response listener lagged by {} events, response to {} may be lost",
                    count, request.id
                );
                return None;
            }
            Err(e) => {
                warn!("weather response listener closed: {}", e);
                return None;
            }
        }
    }
}
