use alert_geocoder::core::geo_validator::GeoValidator;
use alert_geocoder::utils::error::{EngineError, ErrorSeverity};
use alert_geocoder::utils::logger;
use alert_geocoder::{
    AlertPipeline, CliArgs, CoordinateStore, CycleEngine, EngineConfig, GeminiClient, LocalStorage,
    Resolver,
};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting alert-geocoder");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    match run(&args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("❌ Cycle failed: {} (Severity: {:?})", e, e.severity());
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
            Ok(())
        }
    }
}

async fn run(args: &CliArgs) -> Result<(), EngineError> {
    let config = args.load_config()?;
    let validator = GeoValidator::new(&config.validator);
    let store = Arc::new(CoordinateStore::open(&config.store, validator.clone()).await?);

    // The store is closed on failure too, so SQLite checkpoints its WAL.
    let result = run_cycle(args, &config, validator, Arc::clone(&store)).await;
    store.close().await;
    result
}

async fn run_cycle(
    args: &CliArgs,
    config: &EngineConfig,
    validator: GeoValidator,
    store: Arc<CoordinateStore>,
) -> Result<(), EngineError> {
    let ai = GeminiClient::new(&config.ai, validator)?;
    let resolver = Resolver::new(store, ai, &config.resolution);

    let output_file = Path::new(&config.output.output_path)
        .join(&config.output.filename)
        .to_string_lossy()
        .into_owned();
    let mut pipeline = AlertPipeline::new(
        LocalStorage::new("."),
        resolver,
        args.input.clone(),
        output_file,
        config.resolution.message_window(),
    );
    if let Some(now) = args.now {
        pipeline = pipeline.with_clock(now);
    }

    let engine = CycleEngine::new(pipeline);
    if args.dry_run {
        let result = engine.resolve().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let output_path = engine.run().await?;
        tracing::info!("✅ Cycle completed successfully!");
        println!("✅ Output saved to: {}", output_path);
    }

    Ok(())
}
