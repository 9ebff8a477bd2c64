use std::{collections::HashMap, path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use weather_extension::{
    config::ExtensionConfig,
    constants::{keys, shared_state, EXTENSION_NAME},
    get_weather_by_zip,
    lookup::OpenWeatherClient,
    Error, LocalHub, Value, WeatherExtension,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// US zip code to look up
    #[arg(short, long)]
    zip: String,

    /// OpenWeatherMap API key, published as the configuration shared state
    #[arg(short = 'k', long, default_value = "")]
    api_key: String,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let config = match &cli.config {
        Some(path) => ExtensionConfig::from_file(path)?,
        None => ExtensionConfig::default(),
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let hub = Arc::new(LocalHub::new(config.event_buffer_size));
    let lookup = Arc::new(OpenWeatherClient::new(config.lookup.clone())?);
    let extension = Arc::new(WeatherExtension::new(
        &config.limits,
        hub.clone(),
        hub.clone(),
        lookup,
    ));
    hub.register_extension(extension.clone()).await;

    let mut configuration = HashMap::new();
    configuration.insert(
        keys::WEATHER_API_KEY.to_string(),
        Value::from(cli.api_key.as_str()),
    );
    hub.set_state(shared_state::CONFIGURATION, Some(configuration))
        .await?;

    match get_weather_by_zip(&hub, &cli.zip, config.response_timeout).await {
        Some(weather) => println!("{}", weather),
        None => println!("Weather is not available for {}", cli.zip),
    }

    hub.unregister_extension(EXTENSION_NAME).await?;
    extension.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
