use clap::Parser;
use reconcile_etl::core::ConfigProvider;
use reconcile_etl::utils::{logger, validation::Validate};
use reconcile_etl::{CliConfig, CsvSource, EtlEngine, LocalStorage, ReconcilePipeline, StorageSink};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting reconcile-etl CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.severity().exit_code());
    }

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let source = CsvSource::new(
        LocalStorage::new(config.input_dir.clone()),
        config.transactions.clone(),
        config.line_items.clone(),
    );
    let sink = StorageSink::new(
        LocalStorage::new(config.output_path.clone()),
        config.format.clone(),
        config.archive_name().map(str::to_string),
    );
    tracing::info!(
        "📁 Reading {} and {}",
        Path::new(&config.input_dir).join(&config.transactions).display(),
        Path::new(&config.input_dir).join(&config.line_items).display()
    );

    let pipeline = ReconcilePipeline::new(source, sink, config);
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Reconciliation completed successfully!");
            println!("✅ Reconciliation completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Reconciliation failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = e.severity().exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
