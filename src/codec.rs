// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Shape validation for documents crossing a persistence boundary.
//!
//! Remote collections are JSON objects mapping a backend key to a record;
//! the category set is a single `{expense: [...], income: [...]}` document.
//! Anything with the wrong shape decodes to the empty/default value.

use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{CachedLedger, CategorySet, Ledger, LedgerEntry, Outbox, Transaction};

/// Checks the invariants serde cannot express for a decoded record.
fn sanitize(mut transaction: Transaction) -> Option<Transaction> {
    if transaction.amount.is_sign_negative() && !transaction.amount.is_zero() {
        return None;
    }
    transaction.category = transaction.category.trim().to_string();
    if transaction.category.is_empty() {
        return None;
    }
    if transaction.note.as_deref().is_some_and(|n| n.trim().is_empty()) {
        transaction.note = None;
    }
    Some(transaction)
}

pub fn encode_record(transaction: &Transaction) -> Value {
    serde_json::to_value(transaction).unwrap_or(Value::Null)
}

pub fn decode_record(value: Value) -> Option<Transaction> {
    serde_json::from_value::<Transaction>(value)
        .ok()
        .and_then(sanitize)
}

/// Builds the keyed document a backend stores for a collection. Entries not
/// yet accepted by a backend are keyed by their value identity.
pub fn encode_collection<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Value {
    let mut doc = Map::new();
    for entry in entries {
        let key = entry
            .key
            .clone()
            .unwrap_or_else(|| entry.transaction.id.to_string());
        doc.insert(key, encode_record(&entry.transaction));
    }
    Value::Object(doc)
}

/// Decodes a keyed collection document in key order. Records that fail
/// validation are dropped individually.
pub fn decode_collection(value: Value) -> Vec<LedgerEntry> {
    match value {
        Value::Null => Vec::new(),
        Value::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (key, raw) in map {
                match decode_record(raw) {
                    Some(transaction) => entries.push(LedgerEntry::keyed(key, transaction)),
                    None => warn!("dropping malformed record '{key}' from remote collection"),
                }
            }
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            entries
        }
        other => {
            warn!(
                "discarding remote collection with unexpected shape ({})",
                shape_name(&other)
            );
            Vec::new()
        }
    }
}

pub fn encode_categories(categories: &CategorySet) -> Value {
    serde_json::to_value(categories).unwrap_or(Value::Null)
}

/// Decodes a category document; a missing or mistyped list falls back to
/// its defaults.
pub fn decode_categories(value: Value) -> CategorySet {
    let mut map = match value {
        Value::Object(map) => map,
        Value::Null => return CategorySet::default(),
        other => {
            warn!(
                "discarding remote categories with unexpected shape ({})",
                shape_name(&other)
            );
            return CategorySet::default();
        }
    };
    let defaults = CategorySet::default();
    let mut list = |field: &str, fallback: Vec<String>| match map.remove(field) {
        Some(Value::Array(items)) => {
            let names: Option<Vec<String>> = items
                .into_iter()
                .map(|v| v.as_str().map(|s| s.trim().to_string()))
                .collect();
            names.unwrap_or_else(|| {
                warn!("category list '{field}' contains non-string names, using defaults");
                fallback
            })
        }
        Some(_) => {
            warn!("category list '{field}' is not an array, using defaults");
            fallback
        }
        None => fallback,
    };
    let expense = list("expense", defaults.expense);
    let income = list("income", defaults.income);
    CategorySet { expense, income }.normalized()
}

/// Drops cached entries that fail validation.
fn sanitize_ledger(ledger: Ledger) -> Ledger {
    let keep = |entries: Vec<LedgerEntry>| -> Vec<LedgerEntry> {
        entries
            .into_iter()
            .filter_map(|e| {
                sanitize(e.transaction).map(|transaction| LedgerEntry {
                    key: e.key,
                    transaction,
                })
            })
            .collect()
    };
    Ledger {
        expenses: keep(ledger.expenses),
        incomes: keep(ledger.incomes),
        categories: ledger.categories.normalized(),
    }
}

/// Parses a cache document: the ledger fields plus an optional `outbox`.
/// Entries that fail validation are dropped.
/// An unreadable outbox is dropped rather than failing the whole document.
pub fn decode_cached(body: &str) -> Result<CachedLedger, serde_json::Error> {
    let mut doc: Value = serde_json::from_str(body)?;
    let outbox = match doc.as_object_mut().and_then(|m| m.remove("outbox")) {
        Some(raw) => serde_json::from_value::<Outbox>(raw).unwrap_or_else(|e| {
            warn!("discarding unreadable outbox from cached ledger: {e}");
            Outbox::default()
        }),
        None => Outbox::default(),
    };
    let ledger = sanitize_ledger(serde_json::from_value(doc)?);
    Ok(CachedLedger { ledger, outbox })
}

pub fn encode_cached(ledger: &Ledger, outbox: &Outbox) -> Result<String, serde_json::Error> {
    let mut doc = serde_json::to_value(ledger)?;
    if !outbox.is_empty() {
        if let Value::Object(map) = &mut doc {
            map.insert("outbox".to_string(), serde_json::to_value(outbox)?);
        }
    }
    serde_json::to_string(&doc)
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Collection, TransactionId};
    use serde_json::json;

    #[test]
    fn decodes_firebase_style_collection_in_key_order() {
        let doc = json!({
            "-Nb": {"id": 1704067200001i64, "amount": 12.5, "category": "Food", "date": "2024-01-02", "note": ""},
            "-Na": {"id": "1704067200000", "amount": "50", "category": "Food", "date": "2024-01-01"}
        });
        let entries = decode_collection(doc);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key.as_deref(), Some("-Na"));
        assert_eq!(entries[0].transaction.id, TransactionId::from(1704067200000));
        assert_eq!(entries[1].transaction.note, None);
        assert_eq!(entries[1].transaction.amount.to_string(), "12.5");
    }

    #[test]
    fn drops_only_malformed_records() {
        let doc = json!({
            "a": {"id": 1, "amount": "ten", "category": "Food", "date": "2024-01-01"},
            "b": {"id": 2, "amount": -3, "category": "Food", "date": "2024-01-01"},
            "c": {"id": 3, "amount": 3, "category": "  ", "date": "2024-01-01"},
            "d": {"id": 4, "amount": 3, "category": "Food", "date": "2024-01-01"}
        });
        let entries = decode_collection(doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.as_deref(), Some("d"));
    }

    #[test]
    fn wrong_shapes_fall_back_to_defaults() {
        assert!(decode_collection(json!([1, 2, 3])).is_empty());
        assert!(decode_collection(json!("nope")).is_empty());
        assert_eq!(decode_categories(json!(42)), CategorySet::default());
        assert_eq!(decode_categories(Value::Null), CategorySet::default());

        let partial = decode_categories(json!({"expense": ["Rent", "Rent", "Food"], "income": 7}));
        assert_eq!(partial.expense, vec!["Rent", "Food"]);
        assert_eq!(partial.income, CategorySet::default().income);
    }

    #[test]
    fn keyless_entries_are_keyed_by_id_when_encoded() {
        let ledger = decode_cached(
            r#"{"expenses":[{"transaction":{"id":5,"amount":"1","category":"Food","date":"2024-03-01"}}]}"#,
        )
        .unwrap()
        .ledger;
        let doc = encode_collection(ledger.entries(Collection::Expenses));
        assert!(doc.get("5").is_some());
        assert_eq!(ledger.categories, CategorySet::default());
    }

    #[test]
    fn cache_documents_carry_the_outbox() {
        use crate::models::PendingDelete;

        let outbox = Outbox {
            deletes: vec![PendingDelete {
                collection: Collection::Incomes,
                id: TransactionId::from(8),
                key: "-Nz".into(),
            }],
            categories: true,
        };
        let body = encode_cached(&Ledger::default(), &outbox).unwrap();
        let cached = decode_cached(&body).unwrap();
        assert_eq!(cached.outbox, outbox);
        assert_eq!(cached.ledger, Ledger::default());

        let plain = encode_cached(&Ledger::default(), &Outbox::default()).unwrap();
        assert!(!plain.contains("outbox"));

        let damaged = decode_cached(r#"{"outbox": {"deletes": 3}, "incomes": []}"#).unwrap();
        assert!(damaged.outbox.is_empty());
    }
}
