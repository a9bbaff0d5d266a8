use crate::config::toml_config::AiConfig;
use crate::core::geo_validator::GeoValidator;
use crate::domain::model::{Coordinate, RegionBatch, RegionResolution, TargetResolution};
use crate::domain::ports::CoordinateService;
use crate::utils::error::{AiServiceError, EngineError, Result};
use crate::utils::validation;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_INSTRUCTIONS: &str = include_str!("../../data/model_instructions.md");

/// Source label recorded for coordinates this client produced.
pub const SOURCE: &str = "Gemini";

/// `CoordinateService` backed by a Gemini-compatible `generateContent` API.
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
    instructions: String,
    validator: GeoValidator,
    max_retries: u32,
    retry_delay: Duration,
    min_interval: Duration,
    /// When the last request went out; shared by every caller of this client.
    last_request: Mutex<Option<Instant>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Answer shape the model is instructed to return. Every field is required.
#[derive(Debug, Deserialize)]
struct AiAnswer {
    region: String,
    region_coordinates: LatLon,
    region_confidence: f64,
    targets: Vec<AiTarget>,
}

#[derive(Debug, Deserialize)]
struct LatLon {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct AiTarget {
    city: String,
    weapon_type: String,
    count: u32,
    coordinates: LatLon,
    confidence: f64,
    source: String,
}

impl GeminiClient {
    pub fn new(config: &AiConfig, validator: GeoValidator) -> Result<Self> {
        let api_key = validation::validate_required_field("ai.api_key", &config.api_key)?;
        validation::validate_non_empty_string("ai.api_key", api_key)?;

        let instructions = match &config.instructions_path {
            Some(path) => {
                tracing::debug!("Loading model instructions from {}", path);
                std::fs::read_to_string(path)?
            }
            None => DEFAULT_INSTRUCTIONS.to_string(),
        };

        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.clone(),
            instructions,
            validator,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            min_interval: config.min_interval(),
            last_request: Mutex::new(None),
        })
    }

    pub fn build_prompt(&self, batch: &RegionBatch) -> std::result::Result<String, AiServiceError> {
        let input = serde_json::to_string(batch)
            .map_err(|e| AiServiceError::Malformed(format!("request encoding: {}", e)))?;
        Ok(format!(
            "{}\n\nINPUT:\n{}\n\nRETURN ONLY JSON:",
            self.instructions.trim(),
            input
        ))
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    /// Waits until at least `min_interval` has passed since the previous
    /// request, whichever worker sent it.
    async fn pace(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tracing::debug!("Rate limit: waiting {:?}", ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, AiServiceError> {
        self.pace().await;
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.0,
            },
        };

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AiServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| AiServiceError::Malformed(format!("response envelope: {}", e)))?;

        envelope
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(AiServiceError::EmptyResponse)
    }

    /// One initial attempt plus up to `max_retries` more for retryable
    /// failures, doubling the delay each time.
    async fn generate_with_retry(&self, prompt: &str) -> std::result::Result<String, AiServiceError> {
        let attempts = self.max_retries + 1;
        let mut delay = self.retry_delay;

        for attempt in 1..=attempts {
            tracing::debug!("Making API call (attempt {}/{})", attempt, attempts);
            match self.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt == attempts => {
                    tracing::error!("❌ All {} attempts failed: {}", attempts, e);
                    return Err(AiServiceError::RetriesExhausted {
                        attempts,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ AI call failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }

        Err(AiServiceError::EmptyResponse)
    }
}

#[async_trait]
impl CoordinateService for GeminiClient {
    async fn resolve(
        &self,
        batch: &RegionBatch,
    ) -> std::result::Result<RegionResolution, AiServiceError> {
        tracing::info!(
            "🤖 Request to AI for {} directions in {}",
            batch.weapons.len(),
            batch.region
        );
        let prompt = self.build_prompt(batch)?;
        let text = self.generate_with_retry(&prompt).await?;
        parse_answer(&text, batch, &self.validator)
    }
}

/// Removes markdown fences around a model answer.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Narrows text to its outermost `{ ... }` span; returns the input unchanged
/// when there is none.
pub fn extract_json_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// Decodes and validates one answer. Schema violations and a target count
/// that differs from the batch fail the whole answer; coordinate rejections
/// are reported per item.
pub fn parse_answer(
    text: &str,
    batch: &RegionBatch,
    validator: &GeoValidator,
) -> std::result::Result<RegionResolution, AiServiceError> {
    let cleaned = extract_json_object(strip_code_blocks(text));
    let answer: AiAnswer =
        serde_json::from_str(cleaned).map_err(|e| AiServiceError::Malformed(e.to_string()))?;

    if answer.targets.len() != batch.weapons.len() {
        return Err(AiServiceError::TargetCountMismatch {
            expected: batch.weapons.len(),
            actual: answer.targets.len(),
        });
    }

    let region_coordinate = Coordinate::new(
        answer.region_coordinates.latitude,
        answer.region_coordinates.longitude,
        answer.region_confidence,
    );
    let region = validator.validate(&region_coordinate).map(|_| region_coordinate);
    if let Err(rejection) = &region {
        tracing::warn!("⚠️ Region {} rejected: {}", answer.region, rejection);
    }

    let targets = answer
        .targets
        .into_iter()
        .map(|target| {
            let coordinate = Coordinate::new(
                target.coordinates.latitude,
                target.coordinates.longitude,
                target.confidence,
            );
            let checked = validator.validate(&coordinate).map(|_| coordinate);
            match &checked {
                Ok(_) => tracing::debug!(
                    "AI resolved {} ({} x{}) via {}",
                    target.city,
                    target.weapon_type,
                    target.count,
                    target.source
                ),
                Err(rejection) => {
                    tracing::warn!("⚠️ Target {} rejected: {}", target.city, rejection)
                }
            }
            TargetResolution {
                city: target.city,
                coordinate: checked,
                source: SOURCE.to_string(),
            }
        })
        .collect();

    Ok(RegionResolution {
        region,
        source: SOURCE.to_string(),
        targets,
    })
}
