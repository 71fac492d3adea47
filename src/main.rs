use batch_modelgen::domain::model::BatchManifest;
use batch_modelgen::utils::error::{BatchError, ErrorSeverity};
use batch_modelgen::utils::{logger, validation::Validate};
use batch_modelgen::{BatchConfig, BatchEngine, BatchPipeline, CliConfig, LocalStorage};
use clap::Parser;

fn exit_code(e: &BatchError) -> i32 {
    match e.severity() {
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(stage: &str, e: &BatchError) -> ! {
    tracing::error!(
        "{} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("{}", e.user_friendly_message());
    eprintln!("Suggestion: {}", e.recovery_suggestion());
    std::process::exit(exit_code(e));
}

fn load_config(cli: &CliConfig) -> Result<BatchConfig, BatchError> {
    cli.validate()?;
    let mut config = BatchConfig::from_file(&cli.config)?;
    config.apply_overrides(&cli.overrides());
    config.validate()?;
    Ok(config)
}

fn report(manifest: &BatchManifest) -> i32 {
    let failed = manifest.failures().count();
    println!(
        "Generated {} artifacts for {} combinations ({} failed)",
        manifest.generated_count(),
        manifest.selected_combinations,
        failed
    );
    for entry in manifest.failures() {
        if let batch_modelgen::domain::model::EntryStatus::Failed { reason } = &entry.status {
            eprintln!("  {} [{}]: {}", entry.name, entry.dialect, reason);
        }
    }
    if manifest.cancelled {
        eprintln!("Run was cancelled before every combination was scheduled");
    }

    if manifest.is_complete_success() {
        0
    } else {
        2
    }
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting batch-modelgen");
    tracing::debug!("CLI config: {:?}", cli);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => fail("Configuration", &e),
    };

    if cli.monitor {
        tracing::info!("System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output.directory.clone());
    let pipeline = match BatchPipeline::new(storage, config) {
        Ok(pipeline) => pipeline,
        Err(e) => fail("Configuration", &e),
    };

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight combinations");
            cancel.cancel();
        }
    });

    let engine = BatchEngine::new_with_monitoring(pipeline, cli.monitor);

    if cli.dry_run {
        match engine.plan().await {
            Ok(plan) => {
                for entry in &plan.entries {
                    println!("{:>8}  {}", entry.combination.ordinal(), entry.name);
                }
                println!(
                    "{} of {} filtered combinations selected ({} total)",
                    plan.entries.len(),
                    plan.filtered_combinations,
                    plan.total_combinations
                );
            }
            Err(e) => fail("Planning", &e),
        }
        return;
    }

    match engine.run().await {
        Ok(manifest) => {
            let code = report(&manifest);
            if code == 0 {
                tracing::info!("Batch generation completed successfully");
            } else {
                tracing::warn!("Batch generation completed with failures");
            }
            std::process::exit(code);
        }
        Err(e) => fail("Batch generation", &e),
    }
}
