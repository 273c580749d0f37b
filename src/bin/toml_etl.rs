use clap::Parser;
use trip_analytics::config::toml_config::TomlConfig;
use trip_analytics::core::{ConfigProvider, Storage};
use trip_analytics::utils::{logger, validation::Validate};
use trip_analytics::{EtlEngine, LocalStorage, StorageSink, TripPipeline};

#[derive(Parser)]
#[command(name = "toml-etl")]
#[command(about = "Trip analytics driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "trip-analytics.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// List the archives that would be processed without running
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 載入 TOML 配置
    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(args.verbose);
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if config.json_logs() {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting TOML-based trip analytics");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    // 驗證配置
    if let Err(e) = config.validate() {
        std::process::exit(e.report());
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config).await?;
        return Ok(());
    }

    // 決定監控設定
    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let source = LocalStorage::new(config.input_path());
    let sink = StorageSink::new(LocalStorage::new(config.output_path()), config.output_format());
    let output_path = config.output_path().to_string();
    let pipeline = TripPipeline::new(source, sink, config);

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(summary) => {
            println!("✅ Trip analytics completed");
            println!(
                "📁 {} reports saved to: {}",
                summary.results_written.len(),
                output_path
            );
            if summary.skipped_inputs() > 0 {
                println!(
                    "⚠️ Skipped {} archives and {} tables, see the log for reasons",
                    summary.archives_failed.len(),
                    summary.tables_rejected.len()
                );
            }
            if summary.has_failures() {
                eprintln!("❌ {} reports could not be written", summary.results_failed.len());
                std::process::exit(2);
            }
        }
        Err(e) => {
            let exit_code = e.report();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name, config.pipeline.version
    );
    if let Some(description) = &config.pipeline.description {
        println!("  Description: {}", description);
    }
    println!(
        "  Input: {} (*.{} containing *.{})",
        config.input_path(),
        config.archive_extension(),
        config.table_extension()
    );
    println!(
        "  Output: {} ({})",
        config.output_path(),
        config.output_format().extension()
    );
    println!("  Schema mismatch: {:?}", config.schema_mismatch_policy());
    println!("  Parallel archives: {}", config.max_parallel_archives());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

async fn perform_dry_run(config: &TomlConfig) -> anyhow::Result<()> {
    println!("🔍 Dry Run Analysis:");
    println!();

    let source = LocalStorage::new(config.input_path());
    let archives = source.list_files(config.archive_extension()).await?;

    println!("📦 Archives found: {}", archives.len());
    for name in &archives {
        println!("  {}", name);
    }

    let mapping = config.column_mapping();
    println!();
    println!("🔄 Column Mapping:");
    println!("  start_time <- {}", mapping.start_time.join(" | "));
    println!(
        "  trip_duration_seconds <- {}",
        mapping.trip_duration_seconds.join(" | ")
    );
    println!("  from_station_id <- {}", mapping.from_station_id.join(" | "));
    println!(
        "  from_station_name <- {}",
        mapping.from_station_name.join(" | ")
    );
    println!("  gender <- {}", mapping.gender.join(" | "));
    println!("  birth_year <- {}", mapping.birth_year.join(" | "));

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");

    Ok(())
}
