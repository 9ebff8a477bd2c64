//! Wire-level names shared with the host bus and the other extensions.

pub const EXTENSION_NAME: &str = "com.acpExample.weatherExtension";
pub const EXTENSION_VERSION: &str = "1.0.0";

pub mod event_name {
    pub const GET_WEATHER: &str = "Get Weather";
    pub const WEATHER_LOADED: &str = "Weather Loaded";
    pub const SHARED_STATE_CHANGE: &str = "Shared state change";
}

pub mod shared_state {
    pub const STATE_OWNER: &str = "stateowner";
    pub const CONFIGURATION: &str = "com.adobe.module.configuration";
    pub const IDENTITY: &str = "com.adobe.module.identity";
}

pub mod keys {
    pub const IDENTITY_MID: &str = "mid";
    pub const TRIGGERED_CONSEQUENCE: &str = "triggeredconsequence";
    pub const DETAIL: &str = "detail";
    pub const WEATHER_API_KEY: &str = "weather.apiKey";
    pub const ZIP: &str = "zip";
    pub const WEATHER: &str = "weather";
    pub const TEMPERATURE: &str = "temp";
    pub const CONDITIONS: &str = "conditions";
}
