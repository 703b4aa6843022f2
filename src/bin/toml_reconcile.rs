use clap::Parser;
use reconcile_etl::config::toml_config::{SourceKind, TomlConfig};
use reconcile_etl::core::{ConfigProvider, RecordSource};
use reconcile_etl::utils::{logger, validation::Validate};
use reconcile_etl::{ApiSource, CsvSource, EtlEngine, LocalStorage, ReconcilePipeline, StorageSink};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "toml-reconcile")]
#[command(about = "Offer reconciliation driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "reconcile.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Allocate and report without writing any output
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 先載入配置，才知道要用哪種日誌格式
    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if config.json_logs() {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting TOML-based reconciliation");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.severity().exit_code());
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    match config.source.r#type {
        SourceKind::Csv => {
            let source = CsvSource::new(
                LocalStorage::new(config.input_dir().to_string()),
                config.source.transactions.clone(),
                config.source.line_items.clone(),
            );
            run(source, config, monitor_enabled, args.dry_run).await
        }
        SourceKind::Api => {
            let mut source = ApiSource::new(
                config.source.transactions.clone(),
                config.source.line_items.clone(),
            );
            if let Some(headers) = &config.source.headers {
                source = source.with_headers(headers.clone());
            }
            if let Some(timeout) = config.source.timeout_seconds {
                source = source.with_timeout(Duration::from_secs(timeout));
            }
            run(source, config, monitor_enabled, args.dry_run).await
        }
    }
}

async fn run<Src: RecordSource>(
    source: Src,
    config: TomlConfig,
    monitor_enabled: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let sink = StorageSink::new(
        LocalStorage::new(config.output_path().to_string()),
        config.output_formats().to_vec(),
        config.archive_name().map(str::to_string),
    );
    let pipeline = ReconcilePipeline::new(source, sink, config);
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    if dry_run {
        let summary = engine.dry_run().await?;
        println!("🔍 Dry run summary:");
        println!("  Transactions: {}", summary.transactions);
        println!("  Line items: {} ({} to allocate)", summary.line_items, summary.allocated_items);
        println!("  Offers total: {}", summary.target_total);
        println!("  Existing total: {}", summary.existing_total);
        println!("  Allocated total: {}", summary.allocated_total);
        for (kind, count) in &summary.warnings {
            println!("  ⚠️ {}: {}", kind.as_str(), count);
        }
        return Ok(());
    }

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

fn display_config_summary(config: &TomlConfig, args: &Args) {
    let policy = config.precedence();

    println!("📋 Configuration Summary:");
    println!("  Job: {}", config.job.name);
    println!("  Source: {:?}", config.source.r#type);
    println!("    Transactions: {}", config.source.transactions);
    println!("    Line items: {}", config.source.line_items);
    println!("  Output: {}", config.output_path());
    println!("  Formats: {}", config.output_formats().join(", "));
    if let Some(archive) = config.archive_name() {
        println!("  Archive: {}", archive);
    }
    println!(
        "  Price source: {:?} (preserve buy price: {})",
        policy.source_of_truth, policy.preserve_buy_price
    );
    println!("  Workers: {}", config.workers());
    if let Some(max) = config.max_transactions() {
        println!("  Max Transactions: {}", max);
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}
