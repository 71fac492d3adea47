#![allow(dead_code)]

use batch_modelgen::core::Storage;
use batch_modelgen::utils::error::Result;
use batch_modelgen::BatchConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// In-memory storage shared between the pipeline and the assertions.
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(path).cloned()
    }

    pub async fn text(&self, path: &str) -> String {
        let data = self
            .get(path)
            .await
            .unwrap_or_else(|| panic!("{} was not written", path));
        String::from_utf8(data).unwrap()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Storage for MockStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let files = self.files.lock().await;
        let data = files.get(path).cloned();
        data.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("File not found: {}", path)).into()
        })
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut files = self.files.lock().await;
        files.insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

/// Wraps `MockStorage` and cancels the batch once `cancel_after` artifact
/// writes have landed. The token is attached after the pipeline exists.
#[derive(Debug, Clone)]
pub struct CancellingStorage {
    inner: MockStorage,
    writes: Arc<AtomicUsize>,
    cancel_after: usize,
    token: Arc<OnceLock<CancellationToken>>,
}

impl CancellingStorage {
    pub fn new(inner: MockStorage, cancel_after: usize) -> Self {
        Self {
            inner,
            writes: Arc::new(AtomicUsize::new(0)),
            cancel_after,
            token: Arc::new(OnceLock::new()),
        }
    }

    pub fn attach(&self, token: CancellationToken) {
        let _ = self.token.set(token);
    }
}

impl Storage for CancellingStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.inner.write_file(path, data).await?;
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_after {
            if let Some(token) = self.token.get() {
                token.cancel();
            }
        }
        Ok(())
    }
}

pub const CHANNEL_CONFIG: &str = r#"{
    "model_name": "microchannel",
    "parameters": {
        "K_ch": {"values": [1.0, 2.0, 3.0], "unit": "mm", "code": "K"},
        "W_ch": {"values": [1.5, 2.5], "unit": "mm", "code": "W"}
    },
    "physics": ["fluid_flow", "heat_transfer"],
    "physics_coupling": {"heat_transfer": {"source": "fluid_flow", "type": "nonisothermal_flow"}},
    "geometry": {"primitives": [{"type": "block", "properties": {"size": ["W_ch", "K_ch", 10]}}]},
    "mesh": {"element_size": "fine", "size_expressions": {"hmax": "K_ch/5"}},
    "output": {"workers": 3, "write_metadata": true}
}"#;

pub fn channel_config() -> BatchConfig {
    BatchConfig::from_json_str(CHANNEL_CONFIG).unwrap()
}

/// A config whose parameters are `a`, `b`, `c`, each with `n` values.
pub fn cube_config(n: usize, target: Option<usize>) -> BatchConfig {
    let values: Vec<String> = (0..n).map(|i| i.to_string()).collect();
    let list = values.join(", ");
    let target = target
        .map(|t| format!(r#", "batch_filtering": {{"target_count": {}}}"#, t))
        .unwrap_or_default();
    BatchConfig::from_json_str(&format!(
        r#"{{"model_name": "cube", "parameters": {{"a": [{list}], "b": [{list}], "c": [{list}]}}{target}}}"#
    ))
    .unwrap()
}
