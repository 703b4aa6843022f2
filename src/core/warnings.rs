use crate::domain::model::{BatchWarning, Discrepancy, WarningKind};
use std::collections::BTreeMap;

/// Collects data-quality warnings for one batch run.
///
/// Every warning is logged when recorded so operators can follow a run live;
/// the full list is handed to the sink at the end for auditing.
#[derive(Debug, Default)]
pub struct WarningCollector {
    warnings: Vec<BatchWarning>,
}

impl WarningCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        kind: WarningKind,
        transaction_id: Option<&str>,
        item_id: Option<&str>,
        detail: impl Into<String>,
    ) {
        let warning = BatchWarning {
            transaction_id: transaction_id.map(str::to_string),
            item_id: item_id.map(str::to_string),
            kind,
            detail: detail.into(),
        };

        tracing::warn!(
            "⚠️ {} transaction={} item={}: {}",
            kind.as_str(),
            warning.transaction_id.as_deref().unwrap_or("-"),
            warning.item_id.as_deref().unwrap_or("-"),
            warning.detail
        );
        self.warnings.push(warning);
    }

    /// 將分配器回報的差異轉成批次警告
    pub fn record_discrepancy(&mut self, transaction_id: &str, discrepancy: &Discrepancy) {
        match discrepancy {
            Discrepancy::ResidualClamped { item_id, residual } => self.record(
                WarningKind::ResidualClamped,
                Some(transaction_id),
                Some(item_id),
                format!("rounding residual {} clamped to 0.00", residual),
            ),
            Discrepancy::ExistingExceedsTarget { existing, target } => self.record(
                WarningKind::ExistingExceedsTarget,
                Some(transaction_id),
                None,
                format!("existing prices {} exceed offer {}", existing, target),
            ),
            Discrepancy::ArithmeticOverflow => self.record(
                WarningKind::ArithmeticOverflow,
                Some(transaction_id),
                None,
                "amounts exceed the decimal range, transaction skipped",
            ),
        }
    }

    /// Appends warnings gathered by another collector, e.g. a worker task.
    pub fn absorb(&mut self, other: WarningCollector) {
        self.warnings.extend(other.warnings);
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn counts(&self) -> BTreeMap<WarningKind, usize> {
        let mut counts = BTreeMap::new();
        for warning in &self.warnings {
            *counts.entry(warning.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn log_report(&self) {
        if self.warnings.is_empty() {
            tracing::info!("✅ No warnings recorded");
            return;
        }
        for (kind, count) in self.counts() {
            tracing::warn!("⚠️ {} warning(s) of kind {}", count, kind.as_str());
        }
    }

    pub fn into_warnings(self) -> Vec<BatchWarning> {
        self.warnings
    }
}
