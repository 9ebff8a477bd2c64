//! # Weather extension
//!
//! An event-driven extension for a host event hub. It listens for weather
//! requests and rule consequences, looks the weather up for a zip code and
//! publishes the result back to the hub, both as its own shared state and, for
//! direct requests, as a correlated "Weather Loaded" response.
//!
//! ## Pieces
//!
//! - Events and fan-out ([`event`])
//! - The hub-facing seams: outbound [`gateway`], inbound [`shared_state`]
//! - Listener and lifecycle ([`extension`])
//! - The serialized drain loop and lookup dispatch ([`engine`])
//! - The weather provider ([`lookup`])
//! - An in-process hub for embedding and tests ([`hub`])
//! - A typed request helper ([`api`])
//!
//! ## Flow
//!
//! ```text
//! hub ──dispatch──▶ WeatherExtension::handle ──▶ EventQueue ──▶ worker (drain)
//!                                                                  │
//!                       shared state + response ◀── lookup task ◀──┘
//! ```
//!
//! Events are processed strictly in arrival order, and an event whose
//! configuration is still pending holds back everything behind it. Lookups run
//! concurrently and may finish in any order.

pub mod api;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod event;
pub mod extension;
pub mod gateway;
pub mod hub;
pub mod lookup;
pub mod shared_state;

// Re-exports
pub use api::{get_weather_by_zip, WeatherData};
pub use error::*;
pub use event::*;
pub use extension::{Extension, WeatherExtension};
pub use hub::LocalHub;

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
