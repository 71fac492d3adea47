use crate::domain::model::{BatchManifest, Dialect, EntryStatus, ManifestEntry};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Collects final manifest entries from concurrent emission tasks.
///
/// Entries are keyed by (ordinal, dialect) so the finished manifest is in
/// canonical order no matter which task completes first.
#[derive(Debug, Default)]
pub struct ManifestRecorder {
    entries: Mutex<BTreeMap<(u64, Dialect), ManifestEntry>>,
}

impl ManifestRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a final entry. A second entry for the same key is ignored.
    pub async fn record(&self, entry: ManifestEntry) {
        let key = (entry.ordinal, entry.dialect);
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&key) {
            tracing::warn!(
                "Ignoring duplicate manifest entry for '{}' ({})",
                entry.name,
                entry.dialect
            );
            return;
        }
        entries.insert(key, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn finish(&self, header: ManifestHeader) -> BatchManifest {
        let entries = std::mem::take(&mut *self.entries.lock().await);
        BatchManifest {
            model_name: header.model_name,
            total_combinations: header.total_combinations,
            filtered_combinations: header.filtered_combinations,
            selected_combinations: header.selected_combinations,
            dialects: header.dialects,
            cancelled: header.cancelled,
            entries: entries.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestHeader {
    pub model_name: String,
    pub total_combinations: u64,
    pub filtered_combinations: usize,
    pub selected_combinations: usize,
    pub dialects: Vec<Dialect>,
    pub cancelled: bool,
}

pub fn manifest_to_json(manifest: &BatchManifest) -> Result<Vec<u8>> {
    let mut json = serde_json::to_vec_pretty(manifest)?;
    json.push(b'\n');
    Ok(json)
}

/// One row per entry; parameters become trailing columns in declared order.
pub fn manifest_to_csv(manifest: &BatchManifest) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let parameter_names: Vec<String> = manifest
        .entries
        .first()
        .map(|e| e.parameters.iter().map(|(n, _)| n.to_string()).collect())
        .unwrap_or_default();

    let mut header = vec![
        "ordinal".to_string(),
        "name".to_string(),
        "dialect".to_string(),
        "output_path".to_string(),
        "model_file".to_string(),
        "disambiguation".to_string(),
        "status".to_string(),
        "reason".to_string(),
    ];
    header.extend(parameter_names.iter().cloned());
    writer.write_record(&header)?;

    for entry in &manifest.entries {
        let (status, reason) = match &entry.status {
            EntryStatus::Generated => ("generated", String::new()),
            EntryStatus::Failed { reason } => ("failed", reason.clone()),
        };
        let mut row = vec![
            entry.ordinal.to_string(),
            entry.name.clone(),
            entry.dialect.to_string(),
            entry.output_path.clone(),
            entry.model_file.clone(),
            entry.disambiguation.map(|d| d.to_string()).unwrap_or_default(),
            status.to_string(),
            reason,
        ];
        row.extend(
            parameter_names
                .iter()
                .map(|n| entry.parameters.get(n).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::utils::error::BatchError::IoError(e.into_error()))
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub name: String,
    pub dialect: Dialect,
    pub reason: String,
}

/// Timestamped run report, written next to the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub generated_at: DateTime<Utc>,
    pub model_name: String,
    pub total_combinations: u64,
    pub filtered_combinations: usize,
    pub selected_combinations: usize,
    pub dialects: Vec<Dialect>,
    pub artifacts_generated: usize,
    pub artifacts_failed: usize,
    pub cancelled: bool,
    pub duration_ms: u128,
    pub failures: Vec<FailureSummary>,
}

impl GenerationSummary {
    pub fn from_manifest(manifest: &BatchManifest, duration: std::time::Duration) -> Self {
        let failures: Vec<FailureSummary> = manifest
            .failures()
            .map(|e| FailureSummary {
                name: e.name.clone(),
                dialect: e.dialect,
                reason: match &e.status {
                    EntryStatus::Failed { reason } => reason.clone(),
                    EntryStatus::Generated => String::new(),
                },
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            model_name: manifest.model_name.clone(),
            total_combinations: manifest.total_combinations,
            filtered_combinations: manifest.filtered_combinations,
            selected_combinations: manifest.selected_combinations,
            dialects: manifest.dialects.clone(),
            artifacts_generated: manifest.generated_count(),
            artifacts_failed: failures.len(),
            cancelled: manifest.cancelled,
            duration_ms: duration.as_millis(),
            failures,
        }
    }

    pub fn log(&self) {
        tracing::info!(
            "Generated {} artifacts for {} combinations ({} filtered of {} total) in {} ms",
            self.artifacts_generated,
            self.selected_combinations,
            self.filtered_combinations,
            self.total_combinations,
            self.duration_ms
        );
        for failure in &self.failures {
            tracing::error!(
                "Failed '{}' ({}): {}",
                failure.name,
                failure.dialect,
                failure.reason
            );
        }
        if self.cancelled {
            tracing::warn!("Batch was cancelled before every combination was scheduled");
        }
    }
}
