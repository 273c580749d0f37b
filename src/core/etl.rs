use crate::core::{Pipeline, RunSummary};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("🚀 Starting trip analytics run");

        tracing::info!("📦 Extracting archives...");
        let (archives, summary) = self.pipeline.extract().await?;
        tracing::info!(
            "Decoded {} of {} archives",
            archives.len(),
            summary.archives_total
        );
        self.monitor.log_phase("extract");

        tracing::info!("🔄 Merging and aggregating...");
        let transformed = self.pipeline.transform(archives, summary).await?;
        tracing::info!("Computed {} result tables", transformed.results.len());
        self.monitor.log_phase("transform");

        tracing::info!("💾 Writing results...");
        let summary = self.pipeline.load(transformed).await?;
        self.monitor.log_phase("load");

        log_summary(&summary);
        self.monitor.log_final_stats();
        Ok(summary)
    }
}

pub fn log_summary(summary: &RunSummary) {
    tracing::info!(
        archives = summary.archives_total,
        archives_failed = summary.archives_failed.len(),
        tables_merged = summary.tables_merged,
        empty_tables = summary.empty_tables_skipped,
        tables_rejected = summary.tables_rejected.len(),
        rows = summary.rows_merged,
        "📋 Run summary"
    );

    for (archive, reason) in &summary.archives_failed {
        tracing::warn!("Skipped archive {}: {}", archive, reason);
    }
    for (table, reason) in &summary.tables_rejected {
        tracing::warn!("Rejected table {}: {}", table, reason);
    }
    for (name, reason) in &summary.results_failed {
        tracing::error!("Result {} was not written: {}", name, reason);
    }
}
