use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::edgar::parsing::types::local_part;

/// Standard concepts shipped with the crate. Filer extension schemas extend
/// this per run.
const STANDARD_CONCEPTS: &str = include_str!("taxonomy/standard_concepts.json");

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Monetary,
    Shares,
    Percent,
    PerShare,
    Decimal,
    String,
    Date,
    TextBlock,
    Boolean,
}

impl DataType {
    /// Map an XBRL item type such as `xbrli:monetaryItemType`.
    pub fn from_xbrl_type(raw: &str) -> Self {
        match local_part(raw).to_ascii_lowercase().as_str() {
            "monetaryitemtype" => DataType::Monetary,
            "sharesitemtype" => DataType::Shares,
            "percentitemtype" => DataType::Percent,
            "pershareitemtype" => DataType::PerShare,
            "decimalitemtype" | "integeritemtype" | "pureitemtype" | "nonnegativeintegeritemtype"
            | "floatitemtype" | "doubleitemtype" => DataType::Decimal,
            "dateitemtype" => DataType::Date,
            "textblockitemtype" => DataType::TextBlock,
            "booleanitemtype" => DataType::Boolean,
            _ => DataType::String,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Monetary
                | DataType::Shares
                | DataType::Percent
                | DataType::PerShare
                | DataType::Decimal
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    Debit,
    Credit,
    None,
}

impl BalanceType {
    pub fn from_xbrl(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debit" => BalanceType::Debit,
            "credit" => BalanceType::Credit,
            _ => BalanceType::None,
        }
    }

    /// Multiplier from reported to canonical sign.
    pub fn sign_factor(&self) -> i64 {
        match self {
            BalanceType::Credit => -1,
            BalanceType::Debit | BalanceType::None => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Instant,
    Duration,
}

impl PeriodType {
    pub fn from_xbrl(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("instant") {
            PeriodType::Instant
        } else {
            PeriodType::Duration
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Concept {
    #[serde(rename = "name")]
    pub qname: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_balance")]
    pub balance: BalanceType,
    #[serde(rename = "period")]
    pub period_type: PeriodType,
    #[serde(default, rename = "abstract")]
    pub abstract_item: bool,
}

fn default_balance() -> BalanceType {
    BalanceType::None
}

/// Read-only concept lookup for one pipeline run.
#[derive(Clone, Debug, Default)]
pub struct TaxonomyTable {
    concepts: HashMap<String, Concept>,
}

impl TaxonomyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table seeded with the embedded standard concepts.
    pub fn standard() -> serde_json::Result<Self> {
        let concepts: Vec<Concept> = serde_json::from_str(STANDARD_CONCEPTS)?;
        let mut table = Self::empty();
        table.extend(concepts);
        Ok(table)
    }

    /// Later definitions replace earlier ones, so an extension schema can
    /// override the seed.
    pub fn extend(&mut self, concepts: impl IntoIterator<Item = Concept>) {
        for concept in concepts {
            self.concepts.insert(concept.qname.clone(), concept);
        }
    }

    pub fn get(&self, qname: &str) -> Option<&Concept> {
        self.concepts.get(qname)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}
