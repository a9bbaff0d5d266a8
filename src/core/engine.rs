use crate::domain::model::CycleResult;
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;

/// Drives one extract → resolve → load cycle.
pub struct CycleEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> CycleEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        let result = self.resolve().await?;

        tracing::info!("💾 Writing rendering payload...");
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("📁 Output saved to: {}", output_path);

        Ok(output_path)
    }

    /// Extract and resolve without writing anything for the renderer.
    pub async fn resolve(&self) -> Result<CycleResult> {
        tracing::info!("🚀 Starting resolution cycle...");

        tracing::info!("📥 Extracting reports...");
        let reports = self.pipeline.extract().await?;
        tracing::info!("📥 Extracted {} reports", reports.len());

        tracing::info!("🔄 Resolving coordinates...");
        let result = self.pipeline.transform(reports).await?;
        let stats = &result.stats;
        tracing::info!(
            "🔄 {} targets: {} cached, {} AI calls, {} dropped (AI {}, validation {}, storage {}), {} duplicates",
            stats.resolved_count,
            stats.cache_hit_count,
            stats.ai_call_count,
            stats.dropped_count,
            stats.dropped.ai_failure,
            stats.dropped.validation,
            stats.dropped.storage,
            stats.deduplicated_count
        );
        tracing::debug!(
            "Store holds {} regions and {} cities",
            result.store.region_count,
            result.store.city_count
        );

        Ok(result)
    }
}
