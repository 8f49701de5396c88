//! Lay statement sections out as sheets. No business logic lives here: the
//! numbers come in final and only get placed and styled.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::core::SignConvention;
use crate::edgar::parsing::types::Period;
use crate::statements::normalize::{FactValue, NormalizedFact};
use crate::statements::taxonomy::DataType;
use crate::statements::StatementSection;

const MAX_SHEET_NAME: usize = 31;
const INVALID_SHEET_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];
/// Excel refuses longer cell text.
const MAX_CELL_CHARS: usize = 32_767;
pub const ALL_FACTS_SHEET: &str = "All Facts";
pub const LINE_ITEM_HEADER: &str = "Line Item";

#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Number { value: Decimal, data_type: DataType },
    Text(String),
    Date(NaiveDate),
    Blank,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SheetRow {
    pub label: String,
    pub depth: usize,
    pub bold: bool,
    pub cells: Vec<CellValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub title: String,
    /// Column headers after the line item column.
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet, renaming it if the name is unusable or already taken.
    pub fn add_sheet(&mut self, mut sheet: Sheet) {
        let existing: Vec<&str> = self.sheets.iter().map(|s| s.name.as_str()).collect();
        sheet.name = safe_sheet_name(&sheet.name, &existing);
        self.sheets.push(sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Sheet {
    pub fn row(&self, label: &str) -> Option<&SheetRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// One sheet per section, in section order.
pub fn sections_to_workbook(sections: &[StatementSection]) -> Workbook {
    let mut workbook = Workbook::new();
    for section in sections {
        workbook.add_sheet(section_sheet(section));
    }
    workbook
}

pub fn section_sheet(section: &StatementSection) -> Sheet {
    let rows = section
        .rows
        .iter()
        .map(|row| SheetRow {
            label: row.label.clone(),
            depth: row.depth,
            bold: row.is_header,
            cells: (0..section.periods.len())
                .map(|column| match row.values.get(&column) {
                    Some(value) => CellValue::Number {
                        value: *value,
                        data_type: row.data_type,
                    },
                    None => CellValue::Blank,
                })
                .collect(),
        })
        .collect();

    Sheet {
        name: section.kind.to_string(),
        title: section.title.clone(),
        headers: section.periods.iter().map(Period::header).collect(),
        rows,
    }
}

/// Concept by period pivot of every fact, dimensional ones included.
pub fn all_facts_sheet(facts: &[NormalizedFact], convention: SignConvention) -> Option<Sheet> {
    if facts.is_empty() {
        return None;
    }

    let mut periods: Vec<Period> = Vec::new();
    for fact in facts {
        if !periods.contains(&fact.context.period) {
            periods.push(fact.context.period);
        }
    }
    periods.sort_by(|a, b| a.column_cmp(b));

    let mut rows: Vec<SheetRow> = Vec::new();
    let mut row_index: HashMap<(String, String), usize> = HashMap::new();

    let mut ordered: Vec<&NormalizedFact> = facts.iter().collect();
    ordered.sort_by_key(|f| f.raw.doc_order);

    for fact in ordered {
        let members = fact
            .context
            .dimensions
            .iter()
            .map(|d| d.member.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        let key = (fact.raw.concept.clone(), members);
        let index = *row_index.entry(key.clone()).or_insert_with(|| {
            let label = if key.1.is_empty() {
                key.0.clone()
            } else {
                format!("{} [{}]", key.0, key.1)
            };
            rows.push(SheetRow {
                label,
                depth: usize::from(!key.1.is_empty()),
                bold: false,
                cells: vec![CellValue::Blank; periods.len()],
            });
            rows.len() - 1
        });

        let Some(column) = periods.iter().position(|p| *p == fact.context.period) else {
            continue;
        };
        rows[index].cells[column] = fact_cell(fact, convention);
    }

    Some(Sheet {
        name: ALL_FACTS_SHEET.to_string(),
        title: ALL_FACTS_SHEET.to_string(),
        headers: periods.iter().map(Period::header).collect(),
        rows,
    })
}

fn fact_cell(fact: &NormalizedFact, convention: SignConvention) -> CellValue {
    match &fact.value {
        FactValue::Number { .. } => match fact.number(convention) {
            Some(value) => CellValue::Number {
                value,
                data_type: fact.data_type(),
            },
            None => CellValue::Blank,
        },
        FactValue::Text(text) => CellValue::Text(text.chars().take(MAX_CELL_CHARS).collect()),
        FactValue::Date(date) => CellValue::Date(*date),
        FactValue::Nil => CellValue::Blank,
    }
}

/// Excel-safe, unique sheet name. Collisions get `_1`, `_2`, ...
pub fn safe_sheet_name(name: &str, existing: &[&str]) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '-' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'');
    let base: String = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME).collect()
    };

    let taken = |candidate: &str| existing.iter().any(|e| e.eq_ignore_ascii_case(candidate));

    let mut candidate = base.clone();
    let mut counter = 1;
    while taken(&candidate) {
        let suffix = format!("_{}", counter);
        let stem: String = base
            .chars()
            .take(MAX_SHEET_NAME.saturating_sub(suffix.len()))
            .collect();
        candidate = format!("{}{}", stem, suffix);
        counter += 1;
    }
    candidate
}

/// Plain-text rendering of a cell, matching the number formats the workbook
/// applies.
pub fn display_value(cell: &CellValue) -> String {
    match cell {
        CellValue::Number { value, data_type } => match data_type {
            DataType::Percent => format!("{}%", group_thousands(&(value * Decimal::ONE_HUNDRED).round_dp(2))),
            DataType::PerShare => group_thousands(&value.round_dp(2)),
            DataType::Monetary | DataType::Shares => group_thousands(&value.round_dp(0)),
            _ => group_thousands(&value.normalize()),
        },
        CellValue::Text(text) => text.clone(),
        CellValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        CellValue::Blank => String::new(),
    }
}

fn group_thousands(value: &Decimal) -> String {
    let raw = value.abs().to_string();
    let (int_part, dec_part) = match raw.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (raw.as_str(), None),
    };

    let mut result = String::new();
    let chars: Vec<_> = int_part.chars().collect();
    for (i, c) in chars.iter().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.insert(0, ',');
        }
        result.insert(0, *c);
    }
    if value.is_sign_negative() && !value.is_zero() {
        result.insert(0, '-');
    }
    match dec_part {
        Some(d) => format!("{}.{}", result, d),
        None => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::{Row, StatementKind};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn balance_section() -> StatementSection {
        StatementSection {
            kind: StatementKind::BalanceSheet,
            role_uri: "r2".to_string(),
            title: "CONSOLIDATED BALANCE SHEETS".to_string(),
            periods: vec![
                Period::Instant(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()),
                Period::Instant(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()),
            ],
            rows: vec![
                Row {
                    label: "Assets".to_string(),
                    depth: 0,
                    concept: "us-gaap:AssetsAbstract".to_string(),
                    data_type: DataType::Monetary,
                    is_header: true,
                    values: BTreeMap::new(),
                },
                Row {
                    label: "Total Assets".to_string(),
                    depth: 1,
                    concept: "us-gaap:Assets".to_string(),
                    data_type: DataType::Monetary,
                    is_header: false,
                    values: BTreeMap::from([(0, dec("1000000000"))]),
                },
            ],
        }
    }

    #[test]
    fn test_section_layout() {
        let workbook = sections_to_workbook(&[balance_section()]);
        assert_eq!(workbook.sheet_names(), vec!["Balance Sheet"]);
        let sheet = &workbook.sheets[0];
        assert_eq!(sheet.title, "CONSOLIDATED BALANCE SHEETS");
        assert_eq!(sheet.headers, vec!["2025-06-30", "2024-06-30"]);

        let header = sheet.row("Assets").unwrap();
        assert!(header.bold);
        let total = sheet.row("Total Assets").unwrap();
        assert_eq!(total.depth, 1);
        assert_eq!(
            total.cells,
            vec![
                CellValue::Number {
                    value: dec("1000000000"),
                    data_type: DataType::Monetary
                },
                CellValue::Blank
            ]
        );
        assert_eq!(display_value(&total.cells[0]), "1,000,000,000");
    }

    #[test]
    fn test_duplicate_kinds_get_unique_sheet_names() {
        let workbook = sections_to_workbook(&[balance_section(), balance_section()]);
        assert_eq!(workbook.sheet_names(), vec!["Balance Sheet", "Balance Sheet_1"]);
    }

    #[test]
    fn test_safe_sheet_name() {
        assert_eq!(safe_sheet_name("Income [Loss] / Q3?", &[]), "Income -Loss- - Q3-");
        let long = "Consolidated Statements of Comprehensive Income";
        let name = safe_sheet_name(long, &[]);
        assert_eq!(name.chars().count(), 31);
        let taken = [name.as_str()];
        assert_eq!(
            safe_sheet_name(long, &taken),
            "Consolidated Statements of Co_1"
        );
        assert_eq!(safe_sheet_name("  ", &[]), "Sheet");
    }

    #[test]
    fn test_long_suffixes_stay_within_limit() {
        let long = "Consolidated Statements of Comprehensive Income";
        let mut names: Vec<String> = vec![safe_sheet_name(long, &[])];
        for _ in 0..100 {
            let taken: Vec<&str> = names.iter().map(String::as_str).collect();
            let next = safe_sheet_name(long, &taken);
            names.push(next);
        }
        assert!(names.iter().all(|n| n.chars().count() <= 31));
        assert_eq!(names[100], "Consolidated Statements of _100");
    }

    #[test]
    fn test_display_value_formats() {
        let number = |v: &str, data_type| CellValue::Number {
            value: dec(v),
            data_type,
        };
        assert_eq!(display_value(&number("-1234567", DataType::Monetary)), "-1,234,567");
        assert_eq!(display_value(&number("2.456", DataType::PerShare)), "2.46");
        assert_eq!(display_value(&number("0.215", DataType::Percent)), "21.50%");
        assert_eq!(display_value(&number("12000", DataType::Shares)), "12,000");
        assert_eq!(display_value(&CellValue::Blank), "");
    }
}
