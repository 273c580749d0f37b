use clap::Parser;
use trip_analytics::core::{ConfigProvider, RunSummary};
use trip_analytics::utils::{logger, validation::Validate};
use trip_analytics::{CliConfig, EtlEngine, LocalStorage, StorageSink, TripPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting trip-analytics CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        std::process::exit(e.report());
    }

    let monitor_enabled = config.monitor;
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
            print_summary(&summary, &output_path);
            if summary.has_failures() {
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

fn print_summary(summary: &RunSummary, output_path: &str) {
    println!("✅ Trip analytics completed");
    println!(
        "📦 Archives: {} read, {} skipped",
        summary.archives_total,
        summary.archives_failed.len()
    );
    println!(
        "📄 Tables: {} merged, {} empty, {} rejected ({} rows)",
        summary.tables_merged,
        summary.empty_tables_skipped,
        summary.tables_rejected.len(),
        summary.rows_merged
    );
    println!(
        "💾 Reports: {} written to {}, {} failed",
        summary.results_written.len(),
        output_path,
        summary.results_failed.len()
    );
}
