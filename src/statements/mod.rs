//! From raw facts to ordered statement sections.

pub mod classify;
pub mod normalize;
pub mod policy;
pub mod resolve;
pub mod taxonomy;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use strum::EnumIter;

use crate::edgar::parsing::types::Period;
use taxonomy::DataType;

pub use classify::Classifier;
pub use normalize::{FactValue, NormalizedFact};
pub use policy::RolePolicy;
pub use resolve::{ResolvedFact, Unit, UnitKind};
pub use taxonomy::TaxonomyTable;

/// The four statements a workbook is built from, in sheet order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    Equity,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::BalanceSheet => write!(f, "Balance Sheet"),
            StatementKind::IncomeStatement => write!(f, "Income Statement"),
            StatementKind::CashFlow => write!(f, "Cash Flow"),
            StatementKind::Equity => write!(f, "Stockholders Equity"),
        }
    }
}

impl FromStr for StatementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "balance_sheet" => Ok(StatementKind::BalanceSheet),
            "income_statement" => Ok(StatementKind::IncomeStatement),
            "cash_flow" => Ok(StatementKind::CashFlow),
            "equity" | "stockholders_equity" => Ok(StatementKind::Equity),
            _ => Err(format!("Invalid statement kind: {}", s)),
        }
    }
}

/// One line of a statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub label: String,
    pub depth: usize,
    pub concept: String,
    pub data_type: DataType,
    /// Abstract heading without values of its own.
    pub is_header: bool,
    /// Column index into [`StatementSection::periods`] -> value.
    pub values: BTreeMap<usize, Decimal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatementSection {
    pub kind: StatementKind,
    pub role_uri: String,
    pub title: String,
    /// Columns, most recent first.
    pub periods: Vec<Period>,
    pub rows: Vec<Row>,
}

impl StatementSection {
    pub fn row(&self, concept: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.concept == concept)
    }

    pub fn column(&self, period: &Period) -> Option<usize> {
        self.periods.iter().position(|p| p == period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_statement_kind_order_and_names() {
        let kinds: Vec<String> = StatementKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            kinds,
            vec!["Balance Sheet", "Income Statement", "Cash Flow", "Stockholders Equity"]
        );
        assert!(StatementKind::BalanceSheet < StatementKind::Equity);
        assert_eq!(
            "cash-flow".parse::<StatementKind>().unwrap(),
            StatementKind::CashFlow
        );
    }
}
