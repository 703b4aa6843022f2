use crate::core::warnings::WarningCollector;
use crate::domain::model::{FieldMapping, LineItem, Record, Transaction, WarningKind};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// 讀取識別碼，接受字串或數字
pub fn read_identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a money or weight cell.
///
/// `null`, missing and blank cells are `Ok(None)`. Strings may carry a
/// currency sign and thousands separators. Anything else that does not
/// parse is an `Err` with the offending text.
pub fn read_decimal(value: Option<&Value>) -> std::result::Result<Option<Decimal>, String> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(other.to_string()),
    };

    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map(Some)
        .map_err(|_| raw)
}

fn read_field(
    record: &Record,
    field: &str,
    transaction_id: Option<&str>,
    item_id: Option<&str>,
    collector: &mut WarningCollector,
) -> Option<Decimal> {
    match read_decimal(record.get(field)) {
        Ok(value) => value,
        Err(raw) => {
            collector.record(
                WarningKind::InvalidNumber,
                transaction_id,
                item_id,
                format!("field '{}' has unparsable value {}", field, raw),
            );
            None
        }
    }
}

/// Builds transactions from raw rows.
///
/// Transactions keep the order of `transactions`; each transaction's items
/// keep the order of `line_items`. Rows that cannot be attached are reported
/// to `collector` and skipped.
pub fn map_transactions(
    transactions: &[Record],
    line_items: &[Record],
    mapping: &FieldMapping,
    collector: &mut WarningCollector,
) -> Vec<Transaction> {
    let mut mapped: Vec<Transaction> = Vec::with_capacity(transactions.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(transactions.len());

    for (row, record) in transactions.iter().enumerate() {
        if let Some(reason) = &record.malformed {
            let id = read_identifier(record.get(&mapping.transaction_id));
            collector.record(
                WarningKind::MalformedRow,
                id.as_deref(),
                None,
                format!("transaction row {} skipped: {}", row + 1, reason),
            );
            continue;
        }

        let Some(id) = read_identifier(record.get(&mapping.transaction_id)) else {
            collector.record(
                WarningKind::MissingIdentifier,
                None,
                None,
                format!("transaction row {} has no '{}'", row + 1, mapping.transaction_id),
            );
            continue;
        };

        if index.contains_key(&id) {
            collector.record(
                WarningKind::DuplicateTransaction,
                Some(&id),
                None,
                format!("transaction row {} repeats an earlier id, row ignored", row + 1),
            );
            continue;
        }

        let target = read_field(record, &mapping.transaction_target, Some(&id), None, collector);
        if target.is_none() {
            collector.record(
                WarningKind::MissingTarget,
                Some(&id),
                None,
                format!("no usable '{}', allocating against 0.00", mapping.transaction_target),
            );
        }

        index.insert(id.clone(), mapped.len());
        mapped.push(Transaction {
            id,
            target,
            items: Vec::new(),
        });
    }

    for (row, record) in line_items.iter().enumerate() {
        let transaction_id = read_identifier(record.get(&mapping.item_transaction_id));

        if let Some(reason) = &record.malformed {
            let item_id = read_identifier(record.get(&mapping.item_id));
            collector.record(
                WarningKind::MalformedRow,
                transaction_id.as_deref(),
                item_id.as_deref(),
                format!("line item row {} skipped: {}", row + 1, reason),
            );
            continue;
        }

        let Some(item_id) = read_identifier(record.get(&mapping.item_id)) else {
            collector.record(
                WarningKind::MissingIdentifier,
                transaction_id.as_deref(),
                None,
                format!("line item row {} has no '{}'", row + 1, mapping.item_id),
            );
            continue;
        };

        let Some(position) = transaction_id.as_ref().and_then(|id| index.get(id)).copied() else {
            collector.record(
                WarningKind::OrphanLineItem,
                transaction_id.as_deref(),
                Some(&item_id),
                "line item does not belong to a known transaction",
            );
            continue;
        };

        let owner = mapped[position].id.clone();
        let item = LineItem {
            price: read_field(record, &mapping.item_price, Some(&owner), Some(&item_id), collector),
            buy_price: read_field(record, &mapping.item_buy_price, Some(&owner), Some(&item_id), collector),
            weight: read_field(record, &mapping.item_weight, Some(&owner), Some(&item_id), collector),
            id: item_id,
        };
        mapped[position].items.push(item);
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        let data = value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Record::new(data)
    }

    #[test]
    fn test_read_decimal_variants() {
        assert_eq!(read_decimal(Some(&json!("12.50"))), Ok(Some(dec!(12.50))));
        assert_eq!(read_decimal(Some(&json!(" $1,250.75 "))), Ok(Some(dec!(1250.75))));
        assert_eq!(read_decimal(Some(&json!(3.2))), Ok(Some(dec!(3.2))));
        assert_eq!(read_decimal(Some(&json!(7))), Ok(Some(dec!(7))));
        assert_eq!(read_decimal(Some(&json!("1e2"))), Ok(Some(dec!(100))));
        assert_eq!(read_decimal(Some(&json!(""))), Ok(None));
        assert_eq!(read_decimal(Some(&Value::Null)), Ok(None));
        assert_eq!(read_decimal(None), Ok(None));
        assert!(read_decimal(Some(&json!("n/a"))).is_err());
        assert!(read_decimal(Some(&json!(true))).is_err());
    }

    #[test]
    fn test_read_identifier_accepts_numbers() {
        assert_eq!(read_identifier(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(read_identifier(Some(&json!(" T-1 "))), Some("T-1".to_string()));
        assert_eq!(read_identifier(Some(&json!("  "))), None);
        assert_eq!(read_identifier(None), None);
    }

    #[test]
    fn test_map_transactions_groups_items_in_order() {
        let transactions = vec![
            record(json!({"id": "T1", "offer": "100.00"})),
            record(json!({"id": "T2", "offer": 40})),
        ];
        let items = vec![
            record(json!({"id": "I1", "transaction_id": "T2", "weight": "2"})),
            record(json!({"id": "I2", "transaction_id": "T1", "price": "10"})),
            record(json!({"id": "I3", "transaction_id": "T1", "weight": "1.5"})),
        ];
        let mut collector = WarningCollector::new();

        let mapped = map_transactions(&transactions, &items, &FieldMapping::default(), &mut collector);

        assert!(collector.is_empty());
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].id, "T1");
        assert_eq!(mapped[0].target, Some(dec!(100.00)));
        let ids: Vec<&str> = mapped[0].items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["I2", "I3"]);
        assert_eq!(mapped[0].items[1].weight, Some(dec!(1.5)));
        assert_eq!(mapped[1].items[0].id, "I1");
    }

    #[test]
    fn test_map_transactions_reports_bad_rows() {
        let transactions = vec![
            record(json!({"id": "T1", "offer": "abc"})),
            record(json!({"offer": "5"})),
            record(json!({"id": "T1", "offer": "9"})),
        ];
        let items = vec![
            record(json!({"id": "I1", "transaction_id": "T9"})),
            record(json!({"transaction_id": "T1"})),
            record(json!({"id": "I2", "transaction_id": "T1", "weight": "heavy"})),
        ];
        let mut collector = WarningCollector::new();

        let mapped = map_transactions(&transactions, &items, &FieldMapping::default(), &mut collector);
        let counts = collector.counts();

        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].target, None);
        assert_eq!(mapped[0].items.len(), 1);
        assert_eq!(mapped[0].items[0].weight, None);
        assert_eq!(counts.get(&WarningKind::InvalidNumber), Some(&2));
        assert_eq!(counts.get(&WarningKind::MissingTarget), Some(&1));
        assert_eq!(counts.get(&WarningKind::MissingIdentifier), Some(&2));
        assert_eq!(counts.get(&WarningKind::DuplicateTransaction), Some(&1));
        assert_eq!(counts.get(&WarningKind::OrphanLineItem), Some(&1));
    }

    #[test]
    fn test_malformed_rows_are_skipped_with_warning() {
        let mut ragged_transaction = record(json!({"id": "T2", "offer": "5"}));
        ragged_transaction.malformed = Some("line 3 has 3 fields, header has 2".to_string());
        let mut ragged_item = record(json!({"id": "I2", "transaction_id": "T1", "price": "1"}));
        ragged_item.malformed = Some("line 3 has 6 fields, header has 5".to_string());

        let transactions = vec![record(json!({"id": "T1", "offer": "20"})), ragged_transaction];
        let items = vec![record(json!({"id": "I1", "transaction_id": "T1"})), ragged_item];
        let mut collector = WarningCollector::new();

        let mapped = map_transactions(&transactions, &items, &FieldMapping::default(), &mut collector);

        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].items.len(), 1);
        assert_eq!(mapped[0].items[0].id, "I1");

        let warnings = collector.into_warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.kind == WarningKind::MalformedRow));
        assert_eq!(warnings[0].transaction_id.as_deref(), Some("T2"));
        assert_eq!(warnings[1].item_id.as_deref(), Some("I2"));
        assert!(warnings[1].detail.contains("6 fields"));
    }

    #[test]
    fn test_custom_field_mapping() {
        let mapping = FieldMapping {
            transaction_id: "trade_id".to_string(),
            transaction_target: "final_offer".to_string(),
            item_transaction_id: "trade_id".to_string(),
            item_weight: "dwt".to_string(),
            ..FieldMapping::default()
        };
        let transactions = vec![record(json!({"trade_id": 7, "final_offer": "55"}))];
        let items = vec![record(json!({"id": 1, "trade_id": 7, "dwt": "3.1"}))];
        let mut collector = WarningCollector::new();

        let mapped = map_transactions(&transactions, &items, &mapping, &mut collector);

        assert_eq!(mapped[0].id, "7");
        assert_eq!(mapped[0].items[0].weight, Some(dec!(3.1)));
    }
}
