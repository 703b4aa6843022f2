use crate::domain::model::RunSummary;
use crate::domain::ports::Pipeline;
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

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting reconciliation run");

        tracing::info!("📥 Extracting transactions...");
        let transactions = self.pipeline.extract().await?;
        tracing::info!("Extracted {} transactions", transactions.len());
        self.monitor.log_stats("Extract", transactions.len());

        tracing::info!("⚙️ Allocating offers...");
        let batch = self.pipeline.transform(transactions).await?;
        tracing::info!("Produced {} allocation rows", batch.rows.len());
        self.monitor.log_stats("Transform", batch.rows.len());

        tracing::info!("💾 Loading results...");
        let rows = batch.rows.len();
        let output_path = self.pipeline.load(batch).await?;
        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_stats("Load", rows);

        self.monitor.log_final_stats();
        Ok(output_path)
    }

    /// 只執行 extract 與 transform，不寫入任何輸出
    pub async fn dry_run(&self) -> Result<RunSummary> {
        tracing::info!("🔍 Dry run: nothing will be written");

        let transactions = self.pipeline.extract().await?;
        self.monitor.log_stats("Extract", transactions.len());

        let batch = self.pipeline.transform(transactions).await?;
        self.monitor.log_stats("Transform", batch.rows.len());
        self.monitor.log_final_stats();

        Ok(batch.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ReconciledBatch, Transaction};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPipeline {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<Vec<Transaction>> {
            Ok(vec![Transaction {
                id: "T1".to_string(),
                target: None,
                items: vec![],
            }])
        }

        async fn transform(&self, data: Vec<Transaction>) -> Result<ReconciledBatch> {
            Ok(ReconciledBatch {
                rows: vec![],
                warnings: vec![],
                summary: RunSummary {
                    generated_at: chrono::Utc::now(),
                    transactions: data.len(),
                    line_items: 0,
                    allocated_items: 0,
                    target_total: Default::default(),
                    existing_total: Default::default(),
                    allocated_total: Default::default(),
                    warnings: Default::default(),
                },
            })
        }

        async fn load(&self, _batch: ReconciledBatch) -> Result<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok("out/allocations.csv".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_loads_once() {
        let engine = EtlEngine::new(CountingPipeline::default());

        let output = engine.run().await.unwrap();

        assert_eq!(output, "out/allocations.csv");
        assert_eq!(engine.pipeline.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_skips_load() {
        let engine = EtlEngine::new_with_monitoring(CountingPipeline::default(), true);

        let summary = engine.dry_run().await.unwrap();

        assert_eq!(summary.transactions, 1);
        assert_eq!(engine.pipeline.loads.load(Ordering::SeqCst), 0);
    }
}
