use thiserror::Error;

use crate::config::ConfigError;
use crate::event::EventError;
use crate::extension::ExtensionError;
use crate::gateway::GatewayError;
use crate::lookup::LookupError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),
    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),
}

pub type InternalResult<T> = Result<T, Error>;
