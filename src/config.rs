use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Capacity of the in-process hub's broadcast channel.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// How long the public request API waits for a correlated response.
    #[serde(default = "default_response_timeout", with = "duration_ms")]
    pub response_timeout: Duration,

    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default = "default_units")]
    pub units: String,

    /// Connect and read timeout of the HTTP client.
    #[serde(default = "default_lookup_http_timeout", with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            country: default_country(),
            units: default_units(),
            timeout: default_lookup_http_timeout(),
        }
    }
}

/// Bounds on in-flight lookups. Both are off unless configured: the engine then
/// fires every lookup immediately and waits for it indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LimitsConfig {
    #[serde(default)]
    pub max_in_flight: Option<usize>,

    #[serde(default, with = "option_duration_ms")]
    pub lookup_timeout: Option<Duration>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to open config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> ConfigResult<T> {
    Ok(serde_json::from_str(s)?)
}

fn default_event_buffer_size() -> usize {
    1000
}
fn default_response_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}
fn default_country() -> String {
    "us".to_string()
}
fn default_units() -> String {
    "imperial".to_string()
}
fn default_lookup_http_timeout() -> Duration {
    Duration::from_millis(3000)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            response_timeout: default_response_timeout(),
            lookup: LookupConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl ExtensionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let config: Self = from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.event_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "event_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.limits.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid(
                "limits.max_in_flight must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
