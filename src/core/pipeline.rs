use crate::core::report_parser::{filter_recent, merge_latest_by_region, parse_reports, RawMessage};
use crate::core::resolver::Resolver;
use crate::domain::model::{CycleResult, ResolvedTarget, WeaponReport};
use crate::domain::ports::{CoordinateService, Pipeline, Storage};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};

/// Reads an exported message dump, resolves its directions and writes the
/// rendering payload.
pub struct AlertPipeline<S: Storage, A: CoordinateService> {
    storage: S,
    resolver: Resolver<A>,
    input_path: String,
    output_file: String,
    message_window: chrono::Duration,
    clock: Option<DateTime<Utc>>,
}

impl<S: Storage, A: CoordinateService> AlertPipeline<S, A> {
    pub fn new(
        storage: S,
        resolver: Resolver<A>,
        input_path: impl Into<String>,
        output_file: impl Into<String>,
        message_window: chrono::Duration,
    ) -> Self {
        Self {
            storage,
            resolver,
            input_path: input_path.into(),
            output_file: output_file.into(),
            message_window,
            clock: None,
        }
    }

    /// Fixes "now" for the recency filter, e.g. when replaying an old dump.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

}

/// Total number of weapons behind the resolved targets. Counts are summed
/// widened, so very large reported counts cannot overflow.
fn total_weapons(targets: &[ResolvedTarget]) -> u64 {
    targets.iter().map(|target| u64::from(target.count)).sum()
}

#[async_trait::async_trait]
impl<S: Storage, A: CoordinateService> Pipeline for AlertPipeline<S, A> {
    async fn extract(&self) -> Result<Vec<WeaponReport>> {
        tracing::debug!("Reading messages from {}", self.input_path);
        let raw = self.storage.read_file(&self.input_path).await?;
        let messages: Vec<RawMessage> = serde_json::from_slice(&raw)?;
        tracing::debug!("Read {} messages", messages.len());

        let now = self.clock.unwrap_or_else(Utc::now);
        let recent = filter_recent(messages, now, self.message_window);
        let blocks = merge_latest_by_region(&recent);
        Ok(parse_reports(&blocks))
    }

    async fn transform(&self, reports: Vec<WeaponReport>) -> Result<CycleResult> {
        let outcome = self.resolver.resolve_batch(reports).await?;
        let store = self.resolver.store().stats().await?;
        let total_weapons_count = total_weapons(&outcome.targets);

        Ok(CycleResult {
            generated_at: Utc::now(),
            targets: outcome.targets,
            stats: outcome.stats,
            store,
            total_weapons_count,
        })
    }

    async fn load(&self, result: CycleResult) -> Result<String> {
        let payload = serde_json::to_vec_pretty(&result)?;
        tracing::debug!(
            "Writing {} targets ({} bytes) to {}",
            result.targets.len(),
            payload.len(),
            self.output_file
        );
        self.storage.write_file(&self.output_file, &payload).await?;
        Ok(self.output_file.clone())
    }
}
