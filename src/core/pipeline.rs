use crate::core::allocator::{allocate, with_cents};
use crate::core::mapping::map_transactions;
use crate::core::warnings::WarningCollector;
use crate::domain::model::{
    AllocationRow, Discrepancy, PrecedencePolicy, PriceOrigin, ReconciledBatch, RunSummary,
    Transaction,
};
use crate::domain::ports::{ConfigProvider, Pipeline, RecordSink, RecordSource};
use crate::utils::error::{EtlError, Result};
use rust_decimal::Decimal;
use std::sync::Mutex;
use tokio::task::JoinSet;

/// Reads transactions and line items from a source, allocates each
/// transaction's offer across its items and hands the rows to a sink.
pub struct ReconcilePipeline<Src: RecordSource, Snk: RecordSink, C: ConfigProvider> {
    source: Src,
    sink: Snk,
    config: C,
    // extract 階段的警告，transform 時併入批次結果
    pending_warnings: Mutex<WarningCollector>,
}

impl<Src: RecordSource, Snk: RecordSink, C: ConfigProvider> ReconcilePipeline<Src, Snk, C> {
    pub fn new(source: Src, sink: Snk, config: C) -> Self {
        Self {
            source,
            sink,
            config,
            pending_warnings: Mutex::new(WarningCollector::new()),
        }
    }

    fn take_pending_warnings(&self) -> Result<WarningCollector> {
        let mut pending = self
            .pending_warnings
            .lock()
            .map_err(|_| EtlError::ProcessingError {
                message: "warning collector lock poisoned".to_string(),
            })?;
        Ok(std::mem::take(&mut *pending))
    }

    fn store_pending_warnings(&self, collector: WarningCollector) -> Result<()> {
        let mut pending = self
            .pending_warnings
            .lock()
            .map_err(|_| EtlError::ProcessingError {
                message: "warning collector lock poisoned".to_string(),
            })?;
        pending.absorb(collector);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ChunkOutcome {
    rows: Vec<AllocationRow>,
    warnings: WarningCollector,
    line_items: usize,
    allocated_items: usize,
    target_total: Decimal,
    existing_total: Decimal,
    allocated_total: Decimal,
}

/// 分配一段連續的交易；結果順序與輸入相同
fn reconcile_chunk(transactions: Vec<Transaction>, policy: PrecedencePolicy) -> ChunkOutcome {
    let mut outcome = ChunkOutcome::default();

    for transaction in transactions {
        let target = transaction.target.unwrap_or(Decimal::ZERO);
        let result = allocate(target, &transaction.items, policy);

        if result.discrepancies.contains(&Discrepancy::ArithmeticOverflow) {
            outcome
                .warnings
                .record_discrepancy(&transaction.id, &Discrepancy::ArithmeticOverflow);
            continue;
        }

        let totals = (
            outcome.target_total.checked_add(target),
            outcome.existing_total.checked_add(result.existing_total()),
            outcome.allocated_total.checked_add(result.allocated_total()),
        );
        let (Some(target_total), Some(existing_total), Some(allocated_total)) = totals else {
            outcome
                .warnings
                .record_discrepancy(&transaction.id, &Discrepancy::ArithmeticOverflow);
            continue;
        };

        for discrepancy in &result.discrepancies {
            // 缺少 offer 的交易在讀取時已經回報過
            if transaction.target.is_none()
                && matches!(discrepancy, Discrepancy::ExistingExceedsTarget { .. })
            {
                continue;
            }
            outcome
                .warnings
                .record_discrepancy(&transaction.id, discrepancy);
        }

        outcome.line_items += transaction.items.len();
        outcome.target_total = target_total;
        outcome.existing_total = existing_total;
        outcome.allocated_total = allocated_total;

        for price in result.prices {
            if price.origin == PriceOrigin::Allocated {
                outcome.allocated_items += 1;
            }
            outcome.rows.push(AllocationRow {
                transaction_id: transaction.id.clone(),
                item_id: price.id,
                price: with_cents(price.price),
                buy_price: with_cents(price.buy_price),
                origin: price.origin,
            });
        }
    }

    outcome
}

#[async_trait::async_trait]
impl<Src: RecordSource, Snk: RecordSink, C: ConfigProvider> Pipeline
    for ReconcilePipeline<Src, Snk, C>
{
    async fn extract(&self) -> Result<Vec<Transaction>> {
        let transaction_rows = self.source.transactions().await?;
        let line_item_rows = self.source.line_items().await?;
        tracing::info!(
            "📥 Read {} transaction rows and {} line item rows",
            transaction_rows.len(),
            line_item_rows.len()
        );

        let mut collector = WarningCollector::new();
        let mut transactions = map_transactions(
            &transaction_rows,
            &line_item_rows,
            &self.config.field_mapping(),
            &mut collector,
        );

        if let Some(limit) = self.config.max_transactions() {
            if transactions.len() > limit {
                tracing::info!("🎯 Limiting run to the first {} transactions", limit);
                transactions.truncate(limit);
            }
        }

        self.store_pending_warnings(collector)?;
        Ok(transactions)
    }

    async fn transform(&self, data: Vec<Transaction>) -> Result<ReconciledBatch> {
        let policy = self.config.precedence();
        let workers = self.config.workers().max(1);
        let transaction_count = data.len();
        let chunk_size = transaction_count.div_ceil(workers).max(1);

        tracing::debug!(
            "Allocating {} transactions with {} workers (chunk size {}), policy {:?}",
            transaction_count,
            workers,
            chunk_size,
            policy
        );

        let mut tasks = JoinSet::new();
        let mut remaining = data.into_iter();
        let mut chunk_index = 0usize;
        loop {
            let chunk: Vec<Transaction> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let index = chunk_index;
            tasks.spawn_blocking(move || (index, reconcile_chunk(chunk, policy)));
            chunk_index += 1;
        }

        let mut outcomes = Vec::with_capacity(chunk_index);
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| EtlError::ProcessingError {
                message: format!("allocation worker failed: {}", e),
            })?;
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let mut warnings = self.take_pending_warnings()?;
        let mut rows = Vec::new();
        let mut summary = RunSummary {
            generated_at: chrono::Utc::now(),
            transactions: transaction_count,
            line_items: 0,
            allocated_items: 0,
            target_total: Decimal::ZERO,
            existing_total: Decimal::ZERO,
            allocated_total: Decimal::ZERO,
            warnings: Default::default(),
        };

        for (_, outcome) in outcomes {
            rows.extend(outcome.rows);
            warnings.absorb(outcome.warnings);
            summary.line_items += outcome.line_items;
            summary.allocated_items += outcome.allocated_items;
            // 各 chunk 已檢查過溢位；跨 chunk 的總和只做飽和加法
            summary.target_total = summary.target_total.saturating_add(outcome.target_total);
            summary.existing_total = summary.existing_total.saturating_add(outcome.existing_total);
            summary.allocated_total = summary.allocated_total.saturating_add(outcome.allocated_total);
        }

        summary.target_total = with_cents(summary.target_total);
        summary.existing_total = with_cents(summary.existing_total);
        summary.allocated_total = with_cents(summary.allocated_total);
        summary.warnings = warnings.counts();
        warnings.log_report();

        tracing::info!(
            "💰 Allocated {} of {} line items: offers {}, existing {}, allocated {}",
            summary.allocated_items,
            summary.line_items,
            summary.target_total,
            summary.existing_total,
            summary.allocated_total
        );

        Ok(ReconciledBatch {
            rows,
            warnings: warnings.into_warnings(),
            summary,
        })
    }

    async fn load(&self, batch: ReconciledBatch) -> Result<String> {
        tracing::debug!(
            "Writing {} allocation rows and {} warnings",
            batch.rows.len(),
            batch.warnings.len()
        );
        self.sink.write(&batch).await
    }
}
