use crate::core::Pipeline;
use crate::domain::model::{BatchManifest, BatchPlan};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct BatchEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> BatchEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<BatchManifest> {
        tracing::info!("Starting batch generation");
        let plan = self.plan().await?;

        tracing::info!("Emitting {} combinations", plan.entries.len());
        let manifest = self.pipeline.load(plan).await?;
        self.monitor.log_stage("load");
        self.monitor.log_final_stats();

        Ok(manifest)
    }

    /// Runs the selection stages only. Nothing is written.
    pub async fn plan(&self) -> Result<BatchPlan> {
        tracing::info!("Building parameter space");
        let space = self.pipeline.extract().await?;
        tracing::info!(
            "{} of {} combinations satisfy the constraints",
            space.combinations.len(),
            space.total_combinations
        );
        self.monitor.log_stage("extract");

        let plan = self.pipeline.transform(space).await?;
        self.monitor.log_stage("transform");
        Ok(plan)
    }
}
