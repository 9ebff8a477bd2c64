//! # External weather lookup
//!
//! The extension treats the weather provider as an opaque async service. Only
//! two fields survive normalization: a temperature and a conditions label. Any
//! failure becomes "no data" in the engine; callers never see the distinction.

pub mod openweather;

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use mockall::automock;
use secrecy::SecretString;
use thiserror::Error;

use crate::{
    constants::keys,
    event::{EventData, Value},
};

pub use openweather::OpenWeatherClient;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherResult {
    pub temperature: f64,
    pub conditions: String,
}

impl WeatherResult {
    pub fn new(temperature: f64, conditions: &str) -> Self {
        Self {
            temperature,
            conditions: conditions.to_string(),
        }
    }

    /// Payload form: `{"temp": "72.50", "conditions": "Clear"}`.
    pub fn to_payload(&self) -> EventData {
        let mut payload = HashMap::new();
        payload.insert(
            keys::TEMPERATURE.to_string(),
            Value::String(format!("{:.2}", self.temperature)),
        );
        payload.insert(
            keys::CONDITIONS.to_string(),
            Value::String(self.conditions.clone()),
        );
        payload
    }
}

#[automock]
#[async_trait]
pub trait WeatherLookup: Send + Sync {
    /// `zip` is trusted as well-formed. `api_key` may be empty; the provider decides
    /// what that means.
    async fn weather_for_zip(&self, zip: &str, api_key: &SecretString)
        -> LookupResult<WeatherResult>;
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Lookup timed out after {0:?}")]
    TimedOut(Duration),
}

pub type LookupResult<T> = Result<T, LookupError>;
