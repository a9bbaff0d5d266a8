use crate::domain::model::{CycleResult, RegionBatch, RegionResolution, WeaponReport};
use crate::utils::error::{AiServiceError, Result};
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// External AI service that turns a region-batch into coordinates.
#[async_trait]
pub trait CoordinateService: Send + Sync {
    async fn resolve(
        &self,
        batch: &RegionBatch,
    ) -> std::result::Result<RegionResolution, AiServiceError>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<WeaponReport>>;
    async fn transform(&self, reports: Vec<WeaponReport>) -> Result<CycleResult>;
    async fn load(&self, result: CycleResult) -> Result<String>;
}
