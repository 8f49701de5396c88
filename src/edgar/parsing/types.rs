use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::namespaces::Namespaces;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Entity {
    pub scheme: String,
    pub identifier: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Period {
    Instant(NaiveDate),
    Duration { start: NaiveDate, end: NaiveDate },
    Forever,
}

impl Period {
    pub fn end(&self) -> Option<NaiveDate> {
        match self {
            Period::Instant(d) => Some(*d),
            Period::Duration { end, .. } => Some(*end),
            Period::Forever => None,
        }
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, Period::Instant(_))
    }

    /// Whole months covered by a duration, rounded to the nearest month.
    pub fn months(&self) -> Option<i64> {
        match self {
            Period::Duration { start, end } => {
                let days = (*end - *start).num_days() + 1;
                Some(((days as f64) / 30.4375).round() as i64)
            }
            _ => None,
        }
    }

    /// Column header text: `2025-06-30` or `12 Months Ended 2025-06-30`.
    pub fn header(&self) -> String {
        match self {
            Period::Instant(d) => d.format("%Y-%m-%d").to_string(),
            Period::Duration { end, .. } => format!(
                "{} Months Ended {}",
                self.months().unwrap_or(0),
                end.format("%Y-%m-%d")
            ),
            Period::Forever => "Forever".to_string(),
        }
    }

    /// Column order: most recent end first, then shorter durations first.
    pub fn column_cmp(&self, other: &Period) -> Ordering {
        let start = |p: &Period| match p {
            Period::Duration { start, .. } => Some(*start),
            _ => p.end(),
        };
        other
            .end()
            .cmp(&self.end())
            .then_with(|| start(other).cmp(&start(self)))
            .then_with(|| self.is_instant().cmp(&other.is_instant()).reverse())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dimension {
    pub axis: String,
    pub member: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContextDecl {
    pub id: String,
    pub entity: Entity,
    pub period: Period,
    /// Sorted by axis so structurally equal contexts compare equal.
    pub dimensions: Vec<Dimension>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Measure {
    Simple(Vec<String>),
    Divide {
        numerator: Vec<String>,
        denominator: Vec<String>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UnitDecl {
    pub id: String,
    pub measure: Measure,
}

/// Precision of a numeric fact from its `decimals` attribute.
///
/// Ordered from least to most specific.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    Unspecified,
    Decimals(i32),
    Infinite,
}

impl Precision {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") => Some(Precision::Unspecified),
            Some(v) if v.eq_ignore_ascii_case("INF") => Some(Precision::Infinite),
            Some(v) => v.parse::<i32>().ok().map(Precision::Decimals),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum FactKind {
    Numeric,
    NonNumeric,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RawFact {
    pub id: Option<String>,
    /// Canonical `prefix:LocalName`.
    pub concept: String,
    pub context_ref: String,
    pub unit_ref: Option<String>,
    pub raw_text: String,
    pub format_hint: Option<String>,
    pub sign_negative: bool,
    pub precision: Precision,
    pub scale: i32,
    pub nil: bool,
    pub kind: FactKind,
    /// Position among all tagged elements of the document.
    pub doc_order: usize,
}

impl RawFact {
    pub fn local_name(&self) -> &str {
        local_part(&self.concept)
    }
}

/// Every element the extractor cares about, classified at parse time.
#[derive(Clone, Debug, PartialEq)]
pub enum TaggedElement {
    NumericFact(RawFact),
    NonNumericFact(RawFact),
    ContextDecl(ContextDecl),
    UnitDecl(UnitDecl),
}

/// One row of a statement as declared by the filer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationNode {
    pub concept: String,
    pub depth: usize,
    /// Declared order within the role after flattening the hierarchy.
    pub order: f64,
    pub preferred_label: Option<String>,
    /// Label printed in the document next to the value, if known.
    pub label: Option<String>,
    /// Contexts this row takes its values from. Empty means any context.
    #[serde(default)]
    pub contexts: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationRole {
    pub uri: String,
    pub title: String,
    pub sort_key: String,
    pub nodes: Vec<PresentationNode>,
}

/// Output of the extractor: facts in document order plus declarations.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    pub facts: Vec<RawFact>,
    pub contexts: Vec<ContextDecl>,
    pub units: Vec<UnitDecl>,
    pub schema_refs: Vec<String>,
    pub namespaces: Namespaces,
    /// Presentation recovered from the document's own tables.
    pub layout_roles: Vec<PresentationRole>,
}

impl Extraction {
    pub fn from_elements(elements: Vec<TaggedElement>) -> Self {
        let mut extraction = Extraction::default();
        for element in elements {
            match element {
                TaggedElement::NumericFact(f) | TaggedElement::NonNumericFact(f) => {
                    extraction.facts.push(f)
                }
                TaggedElement::ContextDecl(c) => extraction.contexts.push(c),
                TaggedElement::UnitDecl(u) => extraction.units.push(u),
            }
        }
        extraction
    }
}

pub fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map(|(_, l)| l).unwrap_or(qname)
}

pub fn prefix_part(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(p, _)| p)
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Instant(d) => write!(f, "{}", d),
            Period::Duration { start, end } => write!(f, "{}/{}", start, end),
            Period::Forever => write!(f, "forever"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_precision_ordering() {
        assert!(Precision::Infinite > Precision::Decimals(2));
        assert!(Precision::Decimals(-3) > Precision::Unspecified);
        assert!(Precision::Decimals(0) > Precision::Decimals(-6));
        assert_eq!(Precision::parse(Some("INF")), Some(Precision::Infinite));
        assert_eq!(Precision::parse(Some("-6")), Some(Precision::Decimals(-6)));
        assert_eq!(Precision::parse(Some("abc")), None);
    }

    #[test]
    fn test_period_header_and_months() {
        let fy = Period::Duration {
            start: d("2024-07-01"),
            end: d("2025-06-30"),
        };
        assert_eq!(fy.months(), Some(12));
        assert_eq!(fy.header(), "12 Months Ended 2025-06-30");
        assert_eq!(Period::Instant(d("2025-06-30")).header(), "2025-06-30");
    }

    #[test]
    fn test_column_order_most_recent_first() {
        let q = Period::Duration {
            start: d("2025-04-01"),
            end: d("2025-06-30"),
        };
        let ytd = Period::Duration {
            start: d("2025-01-01"),
            end: d("2025-06-30"),
        };
        let prior = Period::Duration {
            start: d("2024-04-01"),
            end: d("2024-06-30"),
        };
        let mut periods = vec![prior, ytd, q];
        periods.sort_by(|a, b| a.column_cmp(b));
        assert_eq!(periods, vec![q, ytd, prior]);
    }

    #[test]
    fn test_qname_parts() {
        assert_eq!(local_part("us-gaap:Assets"), "Assets");
        assert_eq!(prefix_part("us-gaap:Assets"), Some("us-gaap"));
        assert_eq!(local_part("Assets"), "Assets");
    }
}
