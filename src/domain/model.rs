use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 來源端的原始資料列
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
    /// 格式不符的原因（例如欄位數量不對），此列不會被轉換
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed: Option<String>,
}

impl Record {
    pub fn new(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data,
            malformed: None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.data.get(field)
    }
}

/// One line item within a transaction. `price` is the existing per-item
/// value, `buy_price` the override signal and `weight` the mass used to
/// apportion value when neither is usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub price: Option<Decimal>,
    pub buy_price: Option<Decimal>,
    pub weight: Option<Decimal>,
}

impl LineItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            price: None,
            buy_price: None,
            weight: None,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_buy_price(mut self, buy_price: Decimal) -> Self {
        self.buy_price = Some(buy_price);
        self
    }

    pub fn with_weight(mut self, weight: Decimal) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// An aggregate offer and its line items in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub target: Option<Decimal>,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceOrigin {
    Existing,
    Allocated,
}

impl PriceOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceOrigin::Existing => "existing",
            PriceOrigin::Allocated => "allocated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedPrice {
    pub id: String,
    pub price: Decimal,
    pub buy_price: Decimal,
    pub origin: PriceOrigin,
}

/// Something the allocator could not reconcile exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// The item absorbing the rounding residual would have gone negative.
    ResidualClamped { item_id: String, residual: Decimal },
    /// Existing prices alone exceed the target; they are never reduced.
    ExistingExceedsTarget { existing: Decimal, target: Decimal },
    /// Amounts exceed the `Decimal` range; no prices were produced.
    ArithmeticOverflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationResult {
    pub prices: Vec<AllocatedPrice>,
    pub discrepancies: Vec<Discrepancy>,
}

impl AllocationResult {
    pub fn get(&self, id: &str) -> Option<&AllocatedPrice> {
        self.prices.iter().find(|p| p.id == id)
    }

    pub fn allocated_total(&self) -> Decimal {
        self.total_for(PriceOrigin::Allocated)
    }

    pub fn existing_total(&self) -> Decimal {
        self.total_for(PriceOrigin::Existing)
    }

    fn total_for(&self, origin: PriceOrigin) -> Decimal {
        self.prices
            .iter()
            .filter(|p| p.origin == origin)
            .map(|p| p.price)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ResidualClamped,
    ExistingExceedsTarget,
    MissingTarget,
    InvalidNumber,
    OrphanLineItem,
    MissingIdentifier,
    DuplicateTransaction,
    ArithmeticOverflow,
    MalformedRow,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::ResidualClamped => "residual_clamped",
            WarningKind::ExistingExceedsTarget => "existing_exceeds_target",
            WarningKind::MissingTarget => "missing_target",
            WarningKind::InvalidNumber => "invalid_number",
            WarningKind::OrphanLineItem => "orphan_line_item",
            WarningKind::MissingIdentifier => "missing_identifier",
            WarningKind::DuplicateTransaction => "duplicate_transaction",
            WarningKind::ArithmeticOverflow => "arithmetic_overflow",
            WarningKind::MalformedRow => "malformed_row",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWarning {
    pub transaction_id: Option<String>,
    pub item_id: Option<String>,
    pub kind: WarningKind,
    pub detail: String,
}

/// 寫入 sink 的單列結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub transaction_id: String,
    pub item_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub buy_price: Decimal,
    pub origin: PriceOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub transactions: usize,
    pub line_items: usize,
    pub allocated_items: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub target_total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub existing_total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub allocated_total: Decimal,
    pub warnings: BTreeMap<WarningKind, usize>,
}

#[derive(Debug, Clone)]
pub struct ReconciledBatch {
    pub rows: Vec<AllocationRow>,
    pub warnings: Vec<BatchWarning>,
    pub summary: RunSummary,
}

/// Which field wins for an item that already carries a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceSource {
    /// `price` when positive, otherwise `buy_price`.
    #[default]
    Price,
    /// `buy_price` when positive, otherwise `price`.
    BuyPrice,
}

impl std::str::FromStr for PriceSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "price" => Ok(PriceSource::Price),
            "buy-price" => Ok(PriceSource::BuyPrice),
            other => Err(format!(
                "unknown price source '{}', expected 'price' or 'buy-price'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecedencePolicy {
    pub source_of_truth: PriceSource,
    /// Keep an existing item's own `buy_price` instead of mirroring the
    /// resolved price.
    pub preserve_buy_price: bool,
}

impl Default for PrecedencePolicy {
    fn default() -> Self {
        Self {
            source_of_truth: PriceSource::Price,
            preserve_buy_price: true,
        }
    }
}

/// 來源欄位名稱對應
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub transaction_id: String,
    pub transaction_target: String,
    pub item_id: String,
    pub item_transaction_id: String,
    pub item_price: String,
    pub item_buy_price: String,
    pub item_weight: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            transaction_id: "id".to_string(),
            transaction_target: "offer".to_string(),
            item_id: "id".to_string(),
            item_transaction_id: "transaction_id".to_string(),
            item_price: "price".to_string(),
            item_buy_price: "buy_price".to_string(),
            item_weight: "weight".to_string(),
        }
    }
}
