use alert_geocoder::config::toml_config::{AiConfig, ResolutionConfig, StoreConfig};
use alert_geocoder::core::geo_validator::GeoValidator;
use alert_geocoder::domain::ports::Pipeline;
use alert_geocoder::{
    AlertPipeline, CoordinateStore, CycleEngine, GeminiClient, LocalStorage, Resolver,
};
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn messages() -> serde_json::Value {
    json!([
        {
            "message_id": 101,
            "text": "Харківщина:\n2х БпЛА курсом на Харків\nСумщина:\nБпЛА курсом на Суми",
            "date": "2025-03-01T12:00:00Z"
        },
        {
            "message_id": 102,
            "text": "Харківська область:\nБпЛА курсом на Кегичівку",
            "date": "2025-03-01T12:05:00Z"
        },
        {
            "message_id": 103,
            "text": "Зафіксовано пуски ударних БпЛА\nСумщина:\nБпЛА курсом на Шостку",
            "date": "2025-03-01T12:06:00Z"
        },
        {
            "message_id": 90,
            "text": "Полтавщина:\nБпЛА курсом на Полтаву",
            "date": "2025-03-01T11:00:00Z"
        }
    ])
}

fn answer(region: (&str, f64, f64), city: (&str, f64, f64)) -> serde_json::Value {
    let text = json!({
        "region": region.0,
        "region_coordinates": {"latitude": region.1, "longitude": region.2},
        "region_confidence": 0.9,
        "targets": [{
            "city": city.0,
            "weapon_type": "БпЛА",
            "count": 1,
            "coordinates": {"latitude": city.1, "longitude": city.2},
            "confidence": 0.9,
            "source": "Gemini"
        }]
    });
    json!({"candidates": [{"content": {"parts": [{"text": text.to_string()}]}}]})
}

async fn build_pipeline(
    temp_dir: &TempDir,
    server: &MockServer,
) -> AlertPipeline<LocalStorage, GeminiClient> {
    let store_config = StoreConfig {
        database_url: format!("sqlite://{}", temp_dir.path().join("coords.db").display()),
        pool_size: 2,
        acquire_timeout_seconds: 5,
    };
    let store = Arc::new(
        CoordinateStore::open(&store_config, GeoValidator::default())
            .await
            .unwrap(),
    );
    let ai_config = AiConfig {
        endpoint: server.base_url(),
        model: "test-model".to_string(),
        api_key: Some("test-key".to_string()),
        min_interval_ms: 0,
        max_retries: 0,
        ..AiConfig::default()
    };
    let ai = GeminiClient::new(&ai_config, GeoValidator::default()).unwrap();
    let resolver = Resolver::new(store, ai, &ResolutionConfig::default());

    AlertPipeline::new(
        LocalStorage::new(temp_dir.path()),
        resolver,
        "messages.json",
        "output/cycle.json",
        chrono::Duration::minutes(20),
    )
    .with_clock(Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap())
}

#[tokio::test]
async fn test_extract_merges_latest_blocks_and_skips_summaries() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("messages.json"), messages().to_string()).unwrap();
    let server = MockServer::start_async().await;
    let pipeline = build_pipeline(&temp_dir, &server).await;

    let reports = pipeline.extract().await.unwrap();

    let cities: Vec<&str> = reports.iter().map(|r| r.city.as_str()).collect();
    assert_eq!(cities, vec!["Суми", "Кегичівку"]);
    assert!(reports.iter().all(|r| r.count == 1));
}

#[tokio::test]
async fn test_cycle_writes_rendering_payload() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("messages.json"), messages().to_string()).unwrap();

    let server = MockServer::start_async().await;
    let kharkiv = server
        .mock_async(|when, then| {
            when.method(POST).body_contains("Кегичівку");
            then.status(200).json_body(answer(
                ("Харківщина", 49.99, 36.23),
                ("Кегичівка", 49.29, 35.76),
            ));
        })
        .await;
    let sumy = server
        .mock_async(|when, then| {
            when.method(POST).body_contains("Суми");
            then.status(200)
                .json_body(answer(("Сумщина", 50.91, 34.8), ("Суми", 50.91, 34.8)));
        })
        .await;

    let engine = CycleEngine::new(build_pipeline(&temp_dir, &server).await);
    let output_path = engine.run().await.unwrap();

    kharkiv.assert_async().await;
    sumy.assert_async().await;
    assert_eq!(output_path, "output/cycle.json");

    let written = std::fs::read(temp_dir.path().join("output/cycle.json")).unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&written).unwrap();

    let targets = payload["targets"].as_array().unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0]["region"], "Сумщина");
    assert_eq!(targets[1]["city"], "Кегичівка");
    assert_eq!(targets[1]["weapon_type"], "UAV");
    assert_eq!(targets[1]["resolved_via"], "AI");
    assert_eq!(payload["stats"]["ai_call_count"], 2);
    assert_eq!(payload["stats"]["resolved_count"], 2);
    assert_eq!(payload["total_weapons_count"], 2);
    assert_eq!(payload["store"]["city_count"], 2);
    assert_eq!(payload["store"]["region_count"], 2);
}

#[tokio::test]
async fn test_missing_input_file_is_an_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    let engine = CycleEngine::new(build_pipeline(&temp_dir, &server).await);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, alert_geocoder::EngineError::Io(_)));
}
