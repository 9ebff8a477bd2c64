use std::fmt;

/// Category discriminator of an [`Event`](super::event_bus::Event).
///
/// Parsing is ASCII case-insensitive, matching how the hub compares type strings.
/// Anything unknown is kept verbatim in `Custom` so it can still be forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString, Default)]
#[strum(ascii_case_insensitive)]
pub enum EventType {
    #[strum(serialize = "com.acpExample.eventType.weatherExtension")]
    WeatherExtension,
    #[strum(serialize = "com.adobe.eventType.rulesEngine")]
    RulesEngine,
    #[strum(serialize = "com.adobe.eventType.hub")]
    Hub,
    #[default]
    #[strum(disabled)]
    Unknown,
    #[strum(default)]
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::WeatherExtension => "com.acpExample.eventType.weatherExtension",
            EventType::RulesEngine => "com.adobe.eventType.rulesEngine",
            EventType::Hub => "com.adobe.eventType.hub",
            EventType::Unknown => "",
            EventType::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-category discriminator of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString, Default)]
#[strum(ascii_case_insensitive)]
pub enum EventSource {
    #[strum(serialize = "com.acpExample.eventSource.requestContent")]
    WeatherRequestContent,
    #[strum(serialize = "com.acpExample.eventSource.responseContent")]
    WeatherResponseContent,
    #[strum(serialize = "com.adobe.eventSource.responseContent")]
    ResponseContent,
    #[strum(serialize = "com.adobe.eventSource.sharedState")]
    SharedState,
    #[default]
    #[strum(disabled)]
    Unknown,
    #[strum(default)]
    Custom(String),
}

impl EventSource {
    pub fn as_str(&self) -> &str {
        match self {
            EventSource::WeatherRequestContent => "com.acpExample.eventSource.requestContent",
            EventSource::WeatherResponseContent => "com.acpExample.eventSource.responseContent",
            EventSource::ResponseContent => "com.adobe.eventSource.responseContent",
            EventSource::SharedState => "com.adobe.eventSource.sharedState",
            EventSource::Unknown => "",
            EventSource::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
