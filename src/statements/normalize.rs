use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::rc::Rc;
use std::str::FromStr;

use super::resolve::{Context, ResolvedFact, Unit, UnitKind};
use super::taxonomy::{BalanceType, Concept, DataType, TaxonomyTable};
use crate::core::{SignConvention, Warning, Warnings};
use crate::edgar::parsing::types::{local_part, FactKind, RawFact};
use crate::edgar::parsing::xbrl::parse_xbrl_date;

static DASH_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s\-‐-―−]+$").unwrap());

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%B %d %Y", "%d %B %Y", "%m/%d/%Y"];

#[derive(Clone, Debug, PartialEq)]
pub enum FactValue {
    /// `reported` is the tagged value after scale and `sign`; `canonical`
    /// additionally carries the balance-type sign.
    Number { canonical: Decimal, reported: Decimal },
    Text(String),
    Date(NaiveDate),
    Nil,
}

#[derive(Clone, Debug)]
pub struct NormalizedFact {
    pub raw: RawFact,
    pub context: Rc<Context>,
    pub unit: Option<Rc<Unit>>,
    /// `None` when the concept is not in the taxonomy table.
    pub concept: Option<Concept>,
    pub value: FactValue,
}

impl NormalizedFact {
    /// Data type used for display: the concept's own, or a guess from the unit.
    pub fn data_type(&self) -> DataType {
        if let Some(concept) = &self.concept {
            return concept.data_type;
        }
        match (&self.raw.kind, self.unit.as_deref().map(|u| &u.kind)) {
            (FactKind::Numeric, Some(UnitKind::Monetary(_))) => DataType::Monetary,
            (FactKind::Numeric, Some(UnitKind::Shares)) => DataType::Shares,
            (FactKind::Numeric, Some(UnitKind::PerShare)) => DataType::PerShare,
            (FactKind::Numeric, _) => DataType::Decimal,
            (FactKind::NonNumeric, _) => match &self.value {
                FactValue::Date(_) => DataType::Date,
                _ => DataType::String,
            },
        }
    }

    pub fn number(&self, convention: SignConvention) -> Option<Decimal> {
        match self.value {
            FactValue::Number {
                canonical,
                reported,
            } => Some(match convention {
                SignConvention::Canonical => canonical,
                SignConvention::Reported => reported,
            }),
            _ => None,
        }
    }
}

pub fn normalize(
    facts: Vec<ResolvedFact>,
    taxonomy: &TaxonomyTable,
    warnings: &mut Warnings,
) -> Vec<NormalizedFact> {
    let mut unclassified: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(facts.len());

    for fact in facts {
        let concept = taxonomy.get(&fact.raw.concept).cloned();
        if concept.is_none() && unclassified.insert(fact.raw.concept.clone()) {
            warnings.push(Warning::UnclassifiedConcept {
                concept: fact.raw.concept.clone(),
            });
        }

        let value = match fact.raw.kind {
            FactKind::Numeric => numeric_value(&fact.raw, concept.as_ref()),
            FactKind::NonNumeric => text_value(&fact.raw, concept.as_ref()),
        };

        out.push(NormalizedFact {
            raw: fact.raw,
            context: fact.context,
            unit: fact.unit,
            concept,
            value,
        });
    }

    log::info!(
        "Normalized {} facts, {} concepts unclassified",
        out.len(),
        unclassified.len()
    );
    out
}

fn numeric_value(raw: &RawFact, concept: Option<&Concept>) -> FactValue {
    if raw.nil {
        return FactValue::Nil;
    }
    let Some(magnitude) = parse_number(&raw.raw_text, raw.format_hint.as_deref()) else {
        log::debug!("No number in '{}' for {}", raw.raw_text, raw.concept);
        return FactValue::Nil;
    };
    let Some(scaled) = apply_scale(magnitude, raw.scale) else {
        log::debug!("Scale {} overflows for {}", raw.scale, raw.concept);
        return FactValue::Nil;
    };
    let reported = if raw.sign_negative { -scaled } else { scaled };
    let balance = concept.map(|c| c.balance).unwrap_or(BalanceType::None);

    FactValue::Number {
        canonical: canonical_value(reported, balance),
        reported,
    }
}

/// `reported * balance factor`: a debit reported `+x` and a credit reported
/// `-x` end up with the same sign.
pub fn canonical_value(reported: Decimal, balance: BalanceType) -> Decimal {
    reported * Decimal::from(balance.sign_factor())
}

/// Parse displayed digits according to the `format` transform.
///
/// Returns `None` when the text carries no number, which is treated as nil.
pub fn parse_number(text: &str, format: Option<&str>) -> Option<Decimal> {
    let format = format
        .map(|f| local_part(f).to_ascii_lowercase().replace('-', ""))
        .unwrap_or_default();
    let text = text.trim();

    let zero_dash = matches!(format.as_str(), "fixedzero" | "zerodash" | "numdash");
    if format == "fixedzero" || (zero_dash && DASH_ONLY.is_match(text)) {
        return Some(Decimal::ZERO);
    }
    if text.is_empty() || DASH_ONLY.is_match(text) {
        return None;
    }
    if format.starts_with("numword") {
        let lower = text.to_lowercase();
        if matches!(lower.as_str(), "no" | "none" | "nil" | "zero") {
            return Some(Decimal::ZERO);
        }
    }

    let comma_decimal = matches!(
        format.as_str(),
        "numcommadecimal" | "numdotcomma" | "numspacecomma" | "numcomma"
    );

    let mut digits = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ',' if comma_decimal => digits.push('.'),
            '.' if !comma_decimal => digits.push('.'),
            _ => {}
        }
    }
    let digits = digits.trim_matches('.');
    if digits.is_empty() {
        return None;
    }
    Decimal::from_str(digits).ok()
}

/// Multiply by `10^scale` without leaving decimal arithmetic.
pub fn apply_scale(value: Decimal, scale: i32) -> Option<Decimal> {
    let mut out = value;
    for _ in 0..scale.unsigned_abs() {
        out = if scale > 0 {
            out.checked_mul(Decimal::TEN)?
        } else {
            out.checked_div(Decimal::TEN)?
        };
    }
    Some(out.normalize())
}

fn text_value(raw: &RawFact, concept: Option<&Concept>) -> FactValue {
    if raw.nil {
        return FactValue::Nil;
    }
    let is_date_format = raw
        .format_hint
        .as_deref()
        .is_some_and(|f| local_part(f).to_ascii_lowercase().starts_with("date"));
    let is_date_concept = concept.is_some_and(|c| c.data_type == DataType::Date);

    if is_date_concept || is_date_format {
        if let Some(date) = parse_date(&raw.raw_text) {
            return FactValue::Date(date);
        }
    }
    FactValue::Text(raw.raw_text.trim().to_string())
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(date) = parse_xbrl_date(text) {
        return Some(date);
    }
    let cleaned = text.replace('\u{a0}', " ");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::parsing::types::{ContextDecl, Entity, Measure, Period, Precision};
    use crate::statements::taxonomy::PeriodType;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn resolved(concept: &str, text: &str, scale: i32, negative: bool) -> ResolvedFact {
        ResolvedFact {
            raw: RawFact {
                id: None,
                concept: concept.to_string(),
                context_ref: "c1".to_string(),
                unit_ref: Some("usd".to_string()),
                raw_text: text.to_string(),
                format_hint: Some("ixt:num-dot-decimal".to_string()),
                sign_negative: negative,
                precision: Precision::Decimals(0),
                scale,
                nil: false,
                kind: FactKind::Numeric,
                doc_order: 0,
            },
            context: Rc::new(ContextDecl {
                id: "c1".to_string(),
                entity: Entity {
                    scheme: String::new(),
                    identifier: "1".to_string(),
                },
                period: Period::Instant(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()),
                dimensions: vec![],
            }),
            unit: Some(Rc::new(Unit {
                id: "usd".to_string(),
                measure: Measure::Simple(vec!["iso4217:USD".to_string()]),
                kind: UnitKind::Monetary("USD".to_string()),
            })),
        }
    }

    fn taxonomy() -> TaxonomyTable {
        let mut table = TaxonomyTable::empty();
        table.extend(vec![
            Concept {
                qname: "us-gaap:Assets".to_string(),
                data_type: DataType::Monetary,
                balance: BalanceType::Debit,
                period_type: PeriodType::Instant,
                abstract_item: false,
            },
            Concept {
                qname: "us-gaap:LiabilitiesAndStockholdersEquity".to_string(),
                data_type: DataType::Monetary,
                balance: BalanceType::Credit,
                period_type: PeriodType::Instant,
                abstract_item: false,
            },
        ]);
        table
    }

    #[test]
    fn test_scale_applied() {
        let mut warnings = Warnings::new();
        let facts = normalize(
            vec![resolved("us-gaap:Assets", "1000000", 3, false)],
            &taxonomy(),
            &mut warnings,
        );
        assert_eq!(
            facts[0].value,
            FactValue::Number {
                canonical: dec("1000000000"),
                reported: dec("1000000000"),
            }
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_sign_convention_idempotence() {
        let mut warnings = Warnings::new();
        let facts = normalize(
            vec![
                resolved("us-gaap:Assets", "250", 0, false),
                resolved("us-gaap:LiabilitiesAndStockholdersEquity", "250", 0, true),
            ],
            &taxonomy(),
            &mut warnings,
        );
        let debit = facts[0].number(SignConvention::Canonical).unwrap();
        let credit = facts[1].number(SignConvention::Canonical).unwrap();
        assert_eq!(debit, credit);
        assert!(debit.is_sign_positive());
        assert_eq!(facts[1].number(SignConvention::Reported), Some(dec("-250")));
    }

    #[test]
    fn test_unknown_concept_kept_and_warned_once() {
        let mut warnings = Warnings::new();
        let facts = normalize(
            vec![
                resolved("acme:WidgetRevenue", "5", 0, false),
                resolved("acme:WidgetRevenue", "6", 0, false),
            ],
            &taxonomy(),
            &mut warnings,
        );
        assert_eq!(facts.len(), 2);
        assert!(facts[0].concept.is_none());
        assert_eq!(facts[0].data_type(), DataType::Monetary);
        assert_eq!(
            warnings.into_vec(),
            vec![Warning::UnclassifiedConcept {
                concept: "acme:WidgetRevenue".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_number_formats() {
        assert_eq!(parse_number("1,234.5", None), Some(dec("1234.5")));
        assert_eq!(parse_number("$ (1,234)", Some("ixt:num-dot-decimal")), Some(dec("1234")));
        assert_eq!(parse_number("1.234,56", Some("ixt:num-comma-decimal")), Some(dec("1234.56")));
        assert_eq!(parse_number("—", Some("ixt:fixed-zero")), Some(Decimal::ZERO));
        assert_eq!(parse_number("—", Some("ixt-sec:zerodash")), Some(Decimal::ZERO));
        assert_eq!(parse_number("-", None), None);
        assert_eq!(parse_number("none", Some("ixt-sec:numwordsen")), Some(Decimal::ZERO));
        assert_eq!(parse_number("12.5%", None), Some(dec("12.5")));
    }

    #[test]
    fn test_apply_scale() {
        assert_eq!(apply_scale(dec("1.5"), 6), Some(dec("1500000")));
        assert_eq!(apply_scale(dec("25"), -2), Some(dec("0.25")));
        assert_eq!(apply_scale(dec("7"), 0), Some(dec("7")));
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 30);
        assert_eq!(parse_date("2025-06-30"), expected);
        assert_eq!(parse_date("June 30, 2025"), expected);
        assert_eq!(parse_date("06/30/2025"), expected);
        assert_eq!(parse_date("FY2025"), None);
    }
}
