use alert_geocoder::config::toml_config::AiConfig;
use alert_geocoder::core::geo_validator::GeoValidator;
use alert_geocoder::domain::model::{BatchWeapon, RegionBatch, Rejection};
use alert_geocoder::domain::ports::CoordinateService;
use alert_geocoder::utils::error::AiServiceError;
use alert_geocoder::GeminiClient;
use httpmock::prelude::*;
use serde_json::json;
use std::io::Write;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

const GENERATE_PATH: &str = "/models/test-model:generateContent";

fn ai_config(server: &MockServer, max_retries: u32) -> AiConfig {
    AiConfig {
        endpoint: server.base_url(),
        model: "test-model".to_string(),
        api_key: Some("test-key".to_string()),
        min_interval_ms: 0,
        max_retries,
        retry_delay_ms: 10,
        timeout_seconds: 5,
        ..AiConfig::default()
    }
}

fn client(server: &MockServer, max_retries: u32) -> GeminiClient {
    GeminiClient::new(&ai_config(server, max_retries), GeoValidator::default()).unwrap()
}

fn kharkiv_batch(cities: &[&str]) -> RegionBatch {
    RegionBatch {
        region: "Харківщина".to_string(),
        weapons: cities
            .iter()
            .map(|city| BatchWeapon {
                weapon_type: "БпЛА".to_string(),
                count: 1,
                target_city: city.to_string(),
            })
            .collect(),
    }
}

fn target(city: &str, latitude: f64, longitude: f64) -> serde_json::Value {
    json!({
        "city": city,
        "weapon_type": "БпЛА",
        "count": 1,
        "coordinates": {"latitude": latitude, "longitude": longitude},
        "confidence": 0.9,
        "source": "Gemini"
    })
}

fn gemini_reply(answer: serde_json::Value) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": format!("```json\n{}\n```", answer)}]}
        }]
    })
}

fn kharkiv_answer(targets: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "region": "Харківщина",
        "region_coordinates": {"latitude": 49.99, "longitude": 36.23},
        "region_confidence": 0.9,
        "targets": targets
    })
}

#[tokio::test]
async fn test_valid_answer_is_resolved() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(GENERATE_PATH)
                .header("x-goog-api-key", "test-key")
                .body_contains("Кегичівку")
                .body_contains("RETURN ONLY JSON:");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(gemini_reply(kharkiv_answer(vec![target("Кегичівка", 49.29, 35.76)])));
        })
        .await;

    let resolution = client(&server, 2)
        .resolve(&kharkiv_batch(&["Кегичівку"]))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resolution.region.unwrap().latitude, 49.99);
    assert_eq!(resolution.targets.len(), 1);
    assert_eq!(resolution.targets[0].coordinate.as_ref().unwrap().longitude, 35.76);
}

#[tokio::test]
async fn test_short_answer_fails_without_retry() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200)
                .json_body(gemini_reply(kharkiv_answer(vec![target("Кегичівка", 49.29, 35.76)])));
        })
        .await;

    let err = client(&server, 2)
        .resolve(&kharkiv_batch(&["Кегичівку", "Харків"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AiServiceError::TargetCountMismatch {
            expected: 2,
            actual: 1
        }
    ));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_server_errors_are_retried_until_exhausted() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(500).body("internal error");
        })
        .await;

    let err = client(&server, 2)
        .resolve(&kharkiv_batch(&["Харків"]))
        .await
        .unwrap_err();

    match err {
        AiServiceError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, AiServiceError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert_hits_async(3).await;
}

#[tokio::test]
async fn test_empty_candidates_are_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200).json_body(json!({"candidates": []}));
        })
        .await;

    let err = client(&server, 1)
        .resolve(&kharkiv_batch(&["Харків"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AiServiceError::RetriesExhausted { attempts: 2, .. }
    ));
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(400).body("bad request");
        })
        .await;

    let err = client(&server, 2)
        .resolve(&kharkiv_batch(&["Харків"]))
        .await
        .unwrap_err();

    assert!(matches!(err, AiServiceError::Status { status: 400, .. }));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_malformed_answer_is_total_failure() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200).json_body(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"region\": \"Харківщина\", \"targets\": ["}]}}]
            }));
        })
        .await;

    let err = client(&server, 2)
        .resolve(&kharkiv_batch(&["Харків"]))
        .await
        .unwrap_err();

    assert!(matches!(err, AiServiceError::Malformed(_)));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_out_of_bounds_target_is_rejected_alone() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200).json_body(gemini_reply(kharkiv_answer(vec![
                target("Кегичівка", 49.29, 35.76),
                target("Бєлгород", 50.6, 41.0),
            ])));
        })
        .await;

    let resolution = client(&server, 0)
        .resolve(&kharkiv_batch(&["Кегичівку", "Бєлгород"]))
        .await
        .unwrap();

    assert!(resolution.targets[0].coordinate.is_ok());
    assert!(matches!(
        resolution.targets[1].coordinate,
        Err(Rejection::OutOfBounds { .. })
    ));
}

#[tokio::test]
async fn test_instructions_can_be_loaded_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "CUSTOM GEOCODER INSTRUCTIONS").unwrap();

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(GENERATE_PATH)
                .body_contains("CUSTOM GEOCODER INSTRUCTIONS");
            then.status(200)
                .json_body(gemini_reply(kharkiv_answer(vec![target("Харків", 49.99, 36.23)])));
        })
        .await;

    let config = AiConfig {
        instructions_path: Some(file.path().to_str().unwrap().to_string()),
        ..ai_config(&server, 0)
    };
    let client = GeminiClient::new(&config, GeoValidator::default()).unwrap();
    client.resolve(&kharkiv_batch(&["Харків"])).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_spaced_by_min_interval() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200)
                .json_body(gemini_reply(kharkiv_answer(vec![target("Харків", 49.99, 36.23)])));
        })
        .await;

    let config = AiConfig {
        min_interval_ms: 200,
        ..ai_config(&server, 0)
    };
    let client = GeminiClient::new(&config, GeoValidator::default()).unwrap();
    let batch = kharkiv_batch(&["Харків"]);

    let started = Instant::now();
    let (first, second, third) = tokio::join!(
        client.resolve(&batch),
        client.resolve(&batch),
        client.resolve(&batch)
    );
    let elapsed = started.elapsed();

    assert!(first.is_ok() && second.is_ok() && third.is_ok());
    mock.assert_hits_async(3).await;
    assert!(elapsed >= Duration::from_millis(400), "requests were not spaced: {elapsed:?}");
}

#[test]
fn test_missing_api_key_is_rejected() {
    let config = AiConfig {
        api_key: None,
        ..AiConfig::default()
    };
    assert!(GeminiClient::new(&config, GeoValidator::default()).is_err());
}
