// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_EXPENSE_CATEGORIES: [&str; 5] =
    ["Food", "Transport", "Entertainment", "Utilities", "Other"];
pub const DEFAULT_INCOME_CATEGORIES: [&str; 4] = ["Salary", "Freelance", "Investment", "Other"];

/// Which transaction collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Expenses,
    Incomes,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Expenses, Collection::Incomes];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Expenses => "expenses",
            Collection::Incomes => "incomes",
        }
    }

    /// The category list that records of this collection must reference.
    pub fn category_kind(self) -> CategoryKind {
        match self {
            Collection::Expenses => CategoryKind::Expense,
            Collection::Incomes => CategoryKind::Income,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Expense,
    Income,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Expense => "expense",
            CategoryKind::Income => "income",
        }
    }

    pub fn collection(self) -> Collection {
        match self {
            CategoryKind::Expense => Collection::Expenses,
            CategoryKind::Income => Collection::Incomes,
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expense" | "expenses" => Ok(CategoryKind::Expense),
            "income" | "incomes" => Ok(CategoryKind::Income),
            other => Err(format!("unknown category type '{}'", other)),
        }
    }
}

/// Value identity of a transaction, as seen by readers of the ledger.
///
/// Independent of the key a remote backend uses to address the record.
/// Accepts JSON numbers (timestamp ids) as well as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransactionId(String);

static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(0);

impl TransactionId {
    /// Timestamp-derived id in milliseconds, strictly increasing within the
    /// process so two adds in the same millisecond never collide.
    pub fn generate() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = LAST_ISSUED_MS.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_ISSUED_MS.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return TransactionId(next.to_string()),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Numeric ids order by value and come before any non-numeric id, which
/// order as text.
impl Ord for TransactionId {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        match (self.0.parse::<i64>(), other.0.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => CmpOrdering::Less,
            (Err(_), Ok(_)) => CmpOrdering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for TransactionId {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        TransactionId(s.trim().to_string())
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        TransactionId(s.trim().to_string())
    }
}

impl From<i64> for TransactionId {
    fn from(n: i64) -> Self {
        TransactionId(n.to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }
        let id = match Raw::deserialize(deserializer)? {
            Raw::Signed(n) => n.to_string(),
            Raw::Unsigned(n) => n.to_string(),
            Raw::Text(s) => s,
        };
        if id.trim().is_empty() {
            return Err(serde::de::Error::custom("transaction id must not be empty"));
        }
        Ok(TransactionId(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Decimal,
    pub category: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A transaction plus the key its remote backend addresses it by.
///
/// `key` stays `None` until a backend has accepted the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(default)]
    pub key: Option<String>,
    pub transaction: Transaction,
}

impl LedgerEntry {
    pub fn local(transaction: Transaction) -> Self {
        Self {
            key: None,
            transaction,
        }
    }

    pub fn keyed(key: impl Into<String>, transaction: Transaction) -> Self {
        Self {
            key: Some(key.into()),
            transaction,
        }
    }
}

fn default_expense_categories() -> Vec<String> {
    DEFAULT_EXPENSE_CATEGORIES.iter().map(|s| s.to_string()).collect()
}

fn default_income_categories() -> Vec<String> {
    DEFAULT_INCOME_CATEGORIES.iter().map(|s| s.to_string()).collect()
}

/// Ordered, user-visible category names for each transaction kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySet {
    #[serde(default = "default_expense_categories")]
    pub expense: Vec<String>,
    #[serde(default = "default_income_categories")]
    pub income: Vec<String>,
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            expense: default_expense_categories(),
            income: default_income_categories(),
        }
    }
}

impl CategorySet {
    pub fn get(&self, kind: CategoryKind) -> &[String] {
        match kind {
            CategoryKind::Expense => &self.expense,
            CategoryKind::Income => &self.income,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: CategoryKind) -> &mut Vec<String> {
        match kind {
            CategoryKind::Expense => &mut self.expense,
            CategoryKind::Income => &mut self.income,
        }
    }

    pub fn contains(&self, kind: CategoryKind, name: &str) -> bool {
        self.get(kind).iter().any(|c| c == name)
    }

    /// Drops empty names and repeated names, keeping the first occurrence.
    pub(crate) fn normalized(mut self) -> Self {
        for kind in [CategoryKind::Expense, CategoryKind::Income] {
            let list = self.get_mut(kind);
            let mut seen = std::collections::HashSet::new();
            list.retain(|name| !name.is_empty() && seen.insert(name.clone()));
        }
        self
    }
}

/// Immutable view of everything the active session tracks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub expenses: Vec<LedgerEntry>,
    #[serde(default)]
    pub incomes: Vec<LedgerEntry>,
    #[serde(default)]
    pub categories: CategorySet,
}

impl Ledger {
    pub fn entries(&self, collection: Collection) -> &[LedgerEntry] {
        match collection {
            Collection::Expenses => &self.expenses,
            Collection::Incomes => &self.incomes,
        }
    }

    pub(crate) fn entries_mut(&mut self, collection: Collection) -> &mut Vec<LedgerEntry> {
        match collection {
            Collection::Expenses => &mut self.expenses,
            Collection::Incomes => &mut self.incomes,
        }
    }

    /// First entry whose value identity matches `id`.
    pub fn find(&self, collection: Collection, id: &TransactionId) -> Option<&LedgerEntry> {
        self.entries(collection)
            .iter()
            .find(|e| &e.transaction.id == id)
    }

    pub fn transactions(&self, collection: Collection) -> impl Iterator<Item = &Transaction> {
        self.entries(collection).iter().map(|e| &e.transaction)
    }

    /// Sum of the amounts in `collection`, saturating at `Decimal::MAX`.
    pub fn total(&self, collection: Collection) -> Decimal {
        self.transactions(collection)
            .fold(Decimal::ZERO, |acc, t| acc.saturating_add(t.amount))
    }
}

/// A backend record deleted locally whose remote delete is not confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelete {
    pub collection: Collection,
    pub id: TransactionId,
    pub key: String,
}

/// Local changes a backend has not acknowledged yet. Unsynced additions
/// need no entry here: they are the ledger entries without a key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Outbox {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deletes: Vec<PendingDelete>,
    /// The category set changed after its last confirmed upload.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub categories: bool,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && !self.categories
    }
}

/// What the local cache holds for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CachedLedger {
    pub ledger: Ledger,
    pub outbox: Outbox,
}

/// Raw form input for a new expense or income.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionDraft {
    pub amount: String,
    pub category: String,
    /// `YYYY-MM-DD`; today when absent.
    pub date: Option<String>,
    pub note: Option<String>,
}

impl TransactionDraft {
    pub fn new(amount: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            category: category.into(),
            date: None,
            note: None,
        }
    }

    pub fn on(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Checks the field shapes without assigning an identity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.parse().map(|_| ())
    }

    pub fn build(&self, id: TransactionId) -> Result<Transaction, ValidationError> {
        let (amount, category, date, note) = self.parse()?;
        Ok(Transaction {
            id,
            amount,
            category,
            date,
            note,
        })
    }

    fn parse(&self) -> Result<(Decimal, String, NaiveDate, Option<String>), ValidationError> {
        let raw = self.amount.trim();
        let amount = raw
            .parse::<Decimal>()
            .map_err(|_| ValidationError::InvalidAmount(raw.to_string()))?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::NegativeAmount(amount));
        }
        let category = self.category.trim();
        if category.is_empty() {
            return Err(ValidationError::MissingCategory);
        }
        let date = match self.date.as_deref().map(str::trim) {
            Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| ValidationError::InvalidDate(d.to_string()))?,
            None => chrono::Local::now().date_naive(),
        };
        let note = self
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        Ok((amount, category.to_string(), date, note))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_order_by_value() {
        let mut ids: Vec<TransactionId> = ["1000", "abc", "999", "-3", "0999"]
            .into_iter()
            .map(TransactionId::from)
            .collect();
        ids.sort();
        let ids: Vec<&str> = ids.iter().map(TransactionId::as_str).collect();
        assert_eq!(ids, ["-3", "0999", "999", "1000", "abc"]);
    }

    #[test]
    fn totals_saturate_instead_of_overflowing() {
        let tx = |amount: Decimal| Transaction {
            id: TransactionId::generate(),
            amount,
            category: "Salary".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            note: None,
        };
        let mut ledger = Ledger::default();
        ledger.incomes.push(LedgerEntry::local(tx(Decimal::MAX)));
        ledger.incomes.push(LedgerEntry::local(tx(Decimal::ONE)));
        assert_eq!(ledger.total(Collection::Incomes), Decimal::MAX);
    }
}
