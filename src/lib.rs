pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod emit;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig};

pub use app::pipelines::BatchPipeline;
pub use config::model_config::BatchConfig;
pub use core::engine::BatchEngine;
pub use utils::error::{BatchError, Result};
