use crate::config::model_config::BatchConfig;
use crate::core::downselect::Downselector;
use crate::core::filter::ConstraintFilter;
use crate::core::manifest::{
    manifest_to_csv, manifest_to_json, GenerationSummary, ManifestHeader, ManifestRecorder,
};
use crate::core::naming::NamingConvention;
use crate::core::space::ParameterSpace;
use crate::domain::model::{
    BatchManifest, BatchPlan, EntryStatus, FilteredSpace, ManifestEntry, NamedCombination,
};
use crate::domain::ports::{Pipeline, Storage};
use crate::emit::emitter::{artifact_file_name, evaluate_mesh_sizes, CodeEmitter};
use crate::emit::registry::TemplateRegistry;
use crate::utils::error::{BatchError, Result};
use crate::utils::validation::Validate;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use zip::write::{FileOptions, ZipWriter};

pub const MANIFEST_JSON: &str = "manifest.json";
pub const MANIFEST_CSV: &str = "manifest.csv";
pub const SUMMARY_JSON: &str = "generation_summary.json";

/// Extract builds and filters the space, transform downselects and names,
/// load emits every (combination, dialect) on a bounded worker pool.
pub struct BatchPipeline<S: Storage> {
    storage: Arc<S>,
    config: Arc<BatchConfig>,
    emitter: CodeEmitter,
    filter: ConstraintFilter,
    naming: NamingConvention,
    cancel: CancellationToken,
}

impl<S: Storage + 'static> BatchPipeline<S> {
    /// Validates the configuration and compiles everything that can fail
    /// before a single combination is enumerated.
    pub fn new(storage: S, config: BatchConfig) -> Result<Self> {
        let mut registry = TemplateRegistry::with_builtins();
        registry.register_custom(&config.templates)?;
        Self::with_registry(storage, config, registry)
    }

    pub fn with_registry(storage: S, config: BatchConfig, registry: TemplateRegistry) -> Result<Self> {
        config.validate()?;

        let filter = ConstraintFilter::compile(
            config.batch_filtering.filter_expression().as_deref(),
            &config.model.parameters,
        )?;
        let naming = NamingConvention::from_config(
            &config.file_naming,
            &config.model.model_name,
            &config.model.parameters,
        )?;

        Ok(Self {
            storage: Arc::new(storage),
            config: Arc::new(config),
            emitter: CodeEmitter::new(Arc::new(registry)),
            filter,
            naming,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Cancelling stops new combinations from being scheduled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn warn_coverage_gaps(&self) {
        for &dialect in &self.config.output.dialects {
            for gap in self.emitter.coverage_gaps(&self.config.model, dialect) {
                tracing::warn!("{}; every {} artifact will fail", gap, dialect);
            }
        }
    }

    async fn write_outputs(&self, manifest: &BatchManifest, started: Instant) -> Result<()> {
        self.storage
            .write_file(MANIFEST_JSON, &manifest_to_json(manifest)?)
            .await?;
        self.storage
            .write_file(MANIFEST_CSV, &manifest_to_csv(manifest)?)
            .await?;

        let summary = GenerationSummary::from_manifest(manifest, started.elapsed());
        self.storage
            .write_file(SUMMARY_JSON, &serde_json::to_vec_pretty(&summary)?)
            .await?;
        summary.log();

        if let Some(archive) = &self.config.output.archive {
            let bytes = self.build_archive(manifest).await?;
            tracing::info!("Writing archive {} ({} bytes)", archive, bytes.len());
            self.storage.write_file(archive, &bytes).await?;
        }
        Ok(())
    }

    /// Bundles the manifest and every generated artifact, read back from storage.
    async fn build_archive(&self, manifest: &BatchManifest) -> Result<Vec<u8>> {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();
        files.push((
            MANIFEST_JSON.to_string(),
            self.storage.read_file(MANIFEST_JSON).await?,
        ));
        for entry in manifest.entries.iter().filter(|e| !e.status.is_failed()) {
            let data = self.storage.read_file(&entry.output_path).await?;
            files.push((entry.output_path.clone(), data));
        }

        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in files {
            zip.start_file::<_, ()>(name, FileOptions::default())?;
            zip.write_all(&data)?;
        }
        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Emits and writes every dialect for one combination, recording each outcome.
async fn generate_combination<S: Storage>(
    storage: Arc<S>,
    config: Arc<BatchConfig>,
    emitter: CodeEmitter,
    recorder: Arc<ManifestRecorder>,
    entry: NamedCombination,
    model_file: String,
) {
    let combination = &entry.combination;

    for &dialect in &config.output.dialects {
        let output_path = artifact_file_name(&entry.name, dialect);
        let outcome = match emitter.emit(&config.model, combination, dialect, &entry.name, &model_file) {
            Ok(artifact) => storage
                .write_file(&artifact.file_name, artifact.text.as_bytes())
                .await
                .map(|_| artifact.file_name),
            Err(e) => Err(e),
        };

        let status = match outcome {
            Ok(path) => {
                tracing::debug!("Wrote {}", path);
                EntryStatus::Generated
            }
            Err(e) => {
                let failure = BatchError::GenerationError {
                    name: entry.name.clone(),
                    dialect: dialect.to_string(),
                    message: e.to_string(),
                };
                tracing::error!("{}", failure);
                EntryStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        recorder
            .record(ManifestEntry {
                ordinal: combination.ordinal(),
                name: entry.name.clone(),
                dialect,
                output_path,
                model_file: model_file.clone(),
                disambiguation: entry.disambiguation,
                parameters: combination.clone(),
                status,
            })
            .await;
    }

    if config.output.write_metadata {
        if let Err(e) = write_metadata(storage.as_ref(), &config, &entry, &model_file).await {
            tracing::warn!("Could not write metadata for '{}': {}", entry.name, e);
        }
    }
}

async fn write_metadata<S: Storage>(
    storage: &S,
    config: &BatchConfig,
    entry: &NamedCombination,
    model_file: &str,
) -> Result<()> {
    let sizes = evaluate_mesh_sizes(&config.model.mesh, &config.model, &entry.combination)?;
    let units: serde_json::Map<String, serde_json::Value> = config
        .model
        .parameters
        .iter()
        .filter_map(|d| d.unit.as_ref().map(|u| (d.name.clone(), serde_json::Value::from(u.clone()))))
        .collect();

    let metadata = serde_json::json!({
        "model_name": config.model.model_name,
        "name": entry.name,
        "ordinal": entry.combination.ordinal(),
        "model_file": model_file,
        "model_parameters": entry.combination,
        "parameter_units": units,
        "mesh_parameters": sizes,
        "generator": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    });
    let mut bytes = serde_json::to_vec_pretty(&metadata)?;
    bytes.push(b'\n');
    storage
        .write_file(&format!("{}_metadata.json", entry.name), &bytes)
        .await
}

#[async_trait::async_trait]
impl<S: Storage + 'static> Pipeline for BatchPipeline<S> {
    async fn extract(&self) -> Result<FilteredSpace> {
        let space = ParameterSpace::build_with_limit(
            &self.config.model.parameters,
            self.config.batch_filtering.max_space_size,
        )?;
        tracing::info!("Total theoretical combinations: {}", space.len());

        let combinations = self.filter.apply(space.iter())?;
        if let Some(condition) = self.filter.condition() {
            tracing::info!(
                "Filter '{}' kept {} of {} combinations",
                condition,
                combinations.len(),
                space.len()
            );
        }
        if combinations.is_empty() {
            tracing::warn!("No combinations survived filtering; nothing will be generated");
        }

        Ok(FilteredSpace {
            total_combinations: space.len(),
            combinations,
        })
    }

    async fn transform(&self, space: FilteredSpace) -> Result<BatchPlan> {
        let filtered_combinations = space.combinations.len();
        let selected = Downselector::new(self.config.batch_filtering.target_count)
            .apply(space.combinations);
        let entries = self.naming.assign(selected);

        tracing::info!(
            "Selected {} of {} filtered combinations",
            entries.len(),
            filtered_combinations
        );

        Ok(BatchPlan {
            total_combinations: space.total_combinations,
            filtered_combinations,
            entries,
        })
    }

    async fn load(&self, plan: BatchPlan) -> Result<BatchManifest> {
        let started = Instant::now();
        self.warn_coverage_gaps();

        let workers = self.config.output.worker_count();
        let semaphore = Arc::new(Semaphore::new(workers));
        let recorder = Arc::new(ManifestRecorder::new());
        let mut tasks: JoinSet<()> = JoinSet::new();
        let total = plan.entries.len();
        let selected_combinations = plan.entries.len();
        let mut cancelled = false;

        tracing::info!(
            "Generating {} combinations x {} dialects on {} workers",
            total,
            self.config.output.dialects.len(),
            workers
        );

        for (idx, entry) in plan.entries.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                cancelled = true;
                break;
            };

            if (idx + 1) % 100 == 0 || idx + 1 == total {
                tracing::info!("Scheduled {}/{} combinations", idx + 1, total);
            }

            let model_file = self.naming.model_file(&entry.name);
            let storage = Arc::clone(&self.storage);
            let config = Arc::clone(&self.config);
            let emitter = self.emitter.clone();
            let recorder = Arc::clone(&recorder);
            tasks.spawn(async move {
                generate_combination(storage, config, emitter, recorder, entry, model_file).await;
                drop(permit);
            });
        }

        if cancelled {
            tracing::warn!("Cancellation requested; waiting for in-flight combinations");
        }
        while let Some(joined) = tasks.join_next().await {
            joined?;
        }

        let manifest = recorder
            .finish(ManifestHeader {
                model_name: self.config.model.model_name.clone(),
                total_combinations: plan.total_combinations,
                filtered_combinations: plan.filtered_combinations,
                selected_combinations,
                dialects: self.config.output.dialects.clone(),
                cancelled,
            })
            .await;

        self.write_outputs(&manifest, started).await?;
        Ok(manifest)
    }
}

