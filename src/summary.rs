// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Dashboard totals derived from a ledger snapshot.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{CategoryKind, Collection, Ledger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub kind: CategoryKind,
    pub category: String,
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    /// Income minus expenses.
    pub balance: Decimal,
    /// Expense categories first, then income, each in category order.
    pub by_category: Vec<CategoryTotal>,
}

impl Summary {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        let total_income = ledger.total(Collection::Incomes);
        let total_expenses = ledger.total(Collection::Expenses);
        let mut by_category = Vec::new();
        for kind in [CategoryKind::Expense, CategoryKind::Income] {
            for name in ledger.categories.get(kind) {
                let matching: Vec<_> = ledger
                    .transactions(kind.collection())
                    .filter(|t| &t.category == name)
                    .collect();
                by_category.push(CategoryTotal {
                    kind,
                    category: name.clone(),
                    total: matching
                        .iter()
                        .fold(Decimal::ZERO, |acc, t| acc.saturating_add(t.amount)),
                    count: matching.len(),
                });
            }
        }
        Self {
            total_income,
            total_expenses,
            balance: total_income - total_expenses,
            by_category,
        }
    }

    pub fn category(&self, kind: CategoryKind, name: &str) -> Option<&CategoryTotal> {
        self.by_category
            .iter()
            .find(|c| c.kind == kind && c.category == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LedgerEntry, Transaction, TransactionId};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn entry(id: i64, category: &str, amount: Decimal) -> LedgerEntry {
        LedgerEntry::local(Transaction {
            id: TransactionId::from(id),
            amount,
            category: category.into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            note: None,
        })
    }

    #[test]
    fn balance_and_category_totals() {
        let mut ledger = Ledger::default();
        ledger.expenses.push(entry(1, "Food", dec!(12.50)));
        ledger.expenses.push(entry(2, "Food", dec!(7.50)));
        ledger.expenses.push(entry(3, "Transport", dec!(30)));
        ledger.incomes.push(entry(4, "Salary", dec!(1000)));

        let s = Summary::from_ledger(&ledger);
        assert_eq!(s.total_expenses, dec!(50));
        assert_eq!(s.total_income, dec!(1000));
        assert_eq!(s.balance, dec!(950));

        let food = s.category(CategoryKind::Expense, "Food").unwrap();
        assert_eq!((food.total, food.count), (dec!(20), 2));
        let other = s.category(CategoryKind::Income, "Other").unwrap();
        assert_eq!(other.total, Decimal::ZERO);
        assert_eq!(s.by_category[0].category, ledger.categories.expense[0]);
    }

    #[test]
    fn empty_ledger_balances_to_zero() {
        let s = Summary::from_ledger(&Ledger::default());
        assert_eq!(s.balance, Decimal::ZERO);
        assert!(s.by_category.iter().all(|c| c.count == 0));
    }

    #[test]
    fn huge_amounts_saturate() {
        let mut ledger = Ledger::default();
        ledger.expenses.push(entry(1, "Food", Decimal::MAX));
        ledger.expenses.push(entry(2, "Food", dec!(1)));

        let s = Summary::from_ledger(&ledger);
        assert_eq!(s.total_expenses, Decimal::MAX);
        assert_eq!(s.category(CategoryKind::Expense, "Food").unwrap().total, Decimal::MAX);
        assert_eq!(s.balance, -Decimal::MAX);
    }
}
