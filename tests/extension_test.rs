mod common;

use std::{collections::HashMap, sync::Arc, time::Duration};

use common::*;
use pretty_assertions::assert_eq;
use weather_extension::{
    config::LimitsConfig,
    constants::{keys, shared_state, EXTENSION_NAME},
    engine::EngineState,
    get_weather_by_zip,
    lookup::{LookupError, MockWeatherLookup, WeatherResult},
    shared_state::{SharedState, SharedStateSource},
    InternalResult, Value,
};

fn weather(temp: &str, conditions: &str) -> HashMap<String, Value> {
    let mut data = HashMap::new();
    data.insert(keys::TEMPERATURE.to_string(), Value::from(temp));
    data.insert(keys::CONDITIONS.to_string(), Value::from(conditions));
    data
}

#[tokio::test]
async fn test_request_publishes_state_then_response() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let release = lookup.gate("10036");
    let Harness {
        hub,
        extension: _extension,
        mut events,
    } = harness(lookup.clone(), LimitsConfig::default()).await;
    configure(&hub, "k1").await;

    let request = hub.dispatch(weather_request("10036")).await?;
    release
        .send(Ok(WeatherResult::new(72.5, "Clear")))
        .unwrap();

    state_change(&mut events, EXTENSION_NAME).await;
    let response = response_to(&mut events, &request).await;

    assert_eq!(response.name, "Weather Loaded");
    assert_eq!(response.data_map(keys::WEATHER), Some(&weather("72.50", "Clear")));
    assert_eq!(
        hub.shared_state(EXTENSION_NAME, request.version).await?,
        Some(SharedState::Set(Some(weather("72.50", "Clear"))))
    );
    assert_eq!(lookup.keys_seen(), vec!["k1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_get_weather_by_zip() {
    let mut lookup = MockWeatherLookup::new();
    lookup
        .expect_weather_for_zip()
        .returning(|zip, _| match zip {
            "10036" => Ok(WeatherResult::new(72.5, "Clear")),
            _ => Err(LookupError::Status(404)),
        });
    let Harness {
        hub,
        extension: _extension,
        ..
    } = harness(Arc::new(lookup), LimitsConfig::default()).await;
    configure(&hub, "k1").await;

    let data = get_weather_by_zip(&hub, "10036", WAIT).await.unwrap();
    assert_eq!(data.to_string(), "Temperature: 72.50, Conditions: Clear");

    // a failed lookup still answers, with no data
    assert_eq!(get_weather_by_zip(&hub, "00000", WAIT).await, None);
}

#[tokio::test]
async fn test_failed_lookup_writes_null_state() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let Harness {
        hub,
        extension: _extension,
        mut events,
    } = harness(lookup, LimitsConfig::default()).await;
    configure(&hub, "").await;

    let request = hub.dispatch(weather_request("99999")).await?;
    let response = response_to(&mut events, &request).await;

    assert_eq!(
        response.data.as_ref().and_then(|data| data.get(keys::WEATHER)),
        Some(&Value::Null)
    );
    assert_eq!(
        hub.shared_state(EXTENSION_NAME, request.version).await?,
        Some(SharedState::Set(None))
    );
    Ok(())
}

#[tokio::test]
async fn test_pending_configuration_blocks_until_set() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let releases = [lookup.gate("11111"), lookup.gate("22222")];
    let Harness {
        hub,
        extension,
        mut events,
    } = harness(lookup.clone(), LimitsConfig::default()).await;

    hub.create_pending_state(shared_state::CONFIGURATION);
    let first = hub.dispatch(weather_request("11111")).await?;
    let second = hub.dispatch(weather_request("22222")).await?;

    assert_eq!(extension.flush().await?, EngineState::Blocked);
    assert_eq!(extension.queued().await, 2);
    assert_eq!(lookup.started(), 0);

    configure(&hub, "k1").await;
    assert_eq!(extension.flush().await?, EngineState::Idle);
    assert_eq!(extension.queued().await, 0);

    for release in releases {
        release.send(Ok(WeatherResult::new(40.0, "Rain"))).unwrap();
    }
    let mut answered = Vec::new();
    while answered.len() < 2 {
        let response = next_matching(&mut events, |event| {
            event.is_response_to(&first) || event.is_response_to(&second)
        })
        .await;
        answered.push(response.response_to);
    }
    assert!(answered.contains(&Some(first.id)));
    assert!(answered.contains(&Some(second.id)));
    assert_eq!(lookup.keys_seen(), vec!["k1".to_string(), "k1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_results_can_complete_out_of_order() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let release_a = lookup.gate("11111");
    let release_b = lookup.gate("22222");
    let Harness {
        hub,
        extension,
        mut events,
    } = harness(lookup.clone(), LimitsConfig::default()).await;
    configure(&hub, "k1").await;

    let a = hub.dispatch(weather_request("11111")).await?;
    let b = hub.dispatch(weather_request("22222")).await?;
    assert_eq!(extension.flush().await?, EngineState::Idle);
    wait_until(|| lookup.started() == 2).await;

    release_b.send(Ok(WeatherResult::new(80.0, "Clear"))).unwrap();
    let first = next_matching(&mut events, |event| {
        event.is_response_to(&a) || event.is_response_to(&b)
    })
    .await;
    assert!(first.is_response_to(&b));

    release_a.send(Ok(WeatherResult::new(30.0, "Snow"))).unwrap();
    response_to(&mut events, &a).await;

    assert_eq!(
        hub.shared_state(EXTENSION_NAME, a.version).await?,
        Some(SharedState::Set(Some(weather("30.00", "Snow"))))
    );
    assert_eq!(
        hub.shared_state(EXTENSION_NAME, b.version).await?,
        Some(SharedState::Set(Some(weather("80.00", "Clear"))))
    );
    Ok(())
}

#[tokio::test]
async fn test_rules_consequence_updates_state_only() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let release = lookup.gate("94103");
    let Harness {
        hub,
        extension,
        mut events,
    } = harness(lookup.clone(), LimitsConfig::default()).await;
    configure(&hub, "k1").await;

    hub.dispatch(rules_consequence(serde_json::json!({ "url": "https://example.com" })))
        .await?;
    hub.dispatch(rules_consequence(serde_json::json!({}))).await?;
    assert_eq!(extension.flush().await?, EngineState::Idle);
    assert_eq!(lookup.started(), 0);

    let consequence = hub
        .dispatch(rules_consequence(serde_json::json!({ "zip": "94103" })))
        .await?;
    release.send(Ok(WeatherResult::new(58.25, "Fog"))).unwrap();
    state_change(&mut events, EXTENSION_NAME).await;

    assert_eq!(
        hub.shared_state(EXTENSION_NAME, consequence.version).await?,
        Some(SharedState::Set(Some(weather("58.25", "Fog"))))
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_configuration_drops_events() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let Harness { hub, extension, .. } = harness(lookup.clone(), LimitsConfig::default()).await;

    hub.dispatch(weather_request("10036")).await?;
    assert_eq!(extension.flush().await?, EngineState::Idle);
    assert_eq!(extension.queued().await, 0);
    assert_eq!(lookup.started(), 0);
    Ok(())
}

#[tokio::test]
async fn test_identity_and_unregister() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let Harness {
        hub,
        extension,
        mut events,
    } = harness(lookup, LimitsConfig::default()).await;
    configure(&hub, "k1").await;

    let request = hub.dispatch(weather_request("10036")).await?;
    response_to(&mut events, &request).await;
    assert_eq!(extension.mid(), None);

    let mut identity = HashMap::new();
    identity.insert(keys::IDENTITY_MID.to_string(), Value::from("mid-42"));
    hub.set_state(shared_state::IDENTITY, Some(identity)).await?;
    let request = hub.dispatch(weather_request("10036")).await?;
    response_to(&mut events, &request).await;
    assert_eq!(extension.mid(), Some("mid-42".to_string()));
    assert!(hub
        .shared_state(EXTENSION_NAME, request.version)
        .await?
        .is_some());

    assert!(hub.unregister_extension(EXTENSION_NAME).await?);
    extension.flush().await?;
    assert_eq!(extension.mid(), None);
    assert_eq!(hub.shared_state(EXTENSION_NAME, request.version).await?, None);

    extension.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_max_in_flight_limits_concurrent_lookups() -> InternalResult<()> {
    let lookup = Arc::new(GatedLookup::default());
    let release_a = lookup.gate("11111");
    let release_b = lookup.gate("22222");
    let limits = LimitsConfig {
        max_in_flight: Some(1),
        lookup_timeout: None,
    };
    let Harness {
        hub,
        extension,
        mut events,
    } = harness(lookup.clone(), limits).await;
    configure(&hub, "k1").await;

    let a = hub.dispatch(weather_request("11111")).await?;
    let b = hub.dispatch(weather_request("22222")).await?;
    assert_eq!(extension.flush().await?, EngineState::Idle);

    wait_until(|| lookup.started() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(lookup.started(), 1);

    // whichever lookup holds the permit, releasing both lets both finish
    release_a.send(Ok(WeatherResult::new(1.0, "Clear"))).unwrap();
    release_b.send(Ok(WeatherResult::new(2.0, "Clear"))).unwrap();
    wait_until(|| lookup.started() == 2).await;

    let mut answered = 0;
    while answered < 2 {
        let event = next_matching(&mut events, |event| {
            event.is_response_to(&a) || event.is_response_to(&b)
        })
        .await;
        assert!(event.response_to.is_some());
        answered += 1;
    }
    Ok(())
}
