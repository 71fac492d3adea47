pub mod cli;
pub mod model_config;

#[cfg(feature = "cli")]
use crate::domain::model::Dialect;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use model_config::ConfigOverrides;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "batch-modelgen")]
#[command(about = "Generate simulation setup code for every selected parameter combination")]
pub struct CliConfig {
    #[arg(long, help = "Batch configuration file (.json or .toml)")]
    pub config: String,

    #[arg(long, help = "Override output.directory")]
    pub output_dir: Option<String>,

    #[arg(long, value_delimiter = ',', help = "Dialects to emit: java, matlab, python")]
    pub dialect: Vec<Dialect>,

    #[arg(long, help = "Override output.workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Override batch_filtering.target_count")]
    pub target_count: Option<usize>,

    #[arg(long, help = "Select and name combinations without writing anything")]
    pub dry_run: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per stage")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            output_dir: self.output_dir.clone(),
            dialects: (!self.dialect.is_empty()).then(|| self.dialect.clone()),
            workers: self.workers,
            target_count: self.target_count,
        }
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("config", &self.config)?;
        if let Some(dir) = &self.output_dir {
            validation::validate_path("output_dir", dir)?;
        }
        if let Some(workers) = self.workers {
            validation::validate_positive_number("workers", workers, 1)?;
        }
        if let Some(target) = self.target_count {
            validation::validate_positive_number("target_count", target, 1)?;
        }
        Ok(())
    }
}
