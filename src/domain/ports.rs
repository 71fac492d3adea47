use crate::domain::model::{BatchManifest, BatchPlan, FilteredSpace};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// The three batch stages: build and filter the space, select and name
/// combinations, then emit artifacts and persist the manifest.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<FilteredSpace>;
    async fn transform(&self, space: FilteredSpace) -> Result<BatchPlan>;
    async fn load(&self, plan: BatchPlan) -> Result<BatchManifest>;
}
