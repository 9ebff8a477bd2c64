use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::LookupConfig;

use super::{LookupError, LookupResult, WeatherLookup, WeatherResult};

const WEATHER_PATH: &str = "/data/2.5/weather";

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    main: MainData,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainData {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: String,
}

/// OpenWeatherMap current-weather client.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    config: LookupConfig,
}

impl OpenWeatherClient {
    pub fn new(config: LookupConfig) -> LookupResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LookupError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), WEATHER_PATH)
    }

    fn parse(body: &str) -> LookupResult<WeatherResult> {
        let response: CurrentWeatherResponse =
            serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;
        let condition = response
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| LookupError::Malformed("weather list is empty".to_string()))?;
        Ok(WeatherResult {
            temperature: response.main.temp,
            conditions: condition.main,
        })
    }
}

#[async_trait]
impl WeatherLookup for OpenWeatherClient {
    #[instrument(level = "debug", skip(self, api_key))]
    async fn weather_for_zip(
        &self,
        zip: &str,
        api_key: &SecretString,
    ) -> LookupResult<WeatherResult> {
        let location = format!("{},{}", zip, self.config.country);
        let response = self
            .client
            .get(self.url())
            .query(&[
                ("zip", location.as_str()),
                ("units", self.config.units.as_str()),
                ("APPID", api_key.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        debug!("weather response: {}", body);
        Self::parse(&body)
    }
}
