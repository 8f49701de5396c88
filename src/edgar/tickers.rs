use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::report::ReportType;
use crate::core::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(ticker: String) -> Result<Self> {
        let uppercase_ticker = ticker.trim().to_uppercase();
        if uppercase_ticker.is_empty() {
            return Err(EngineError::Config("Ticker cannot be empty".to_string()));
        }
        if !uppercase_ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(EngineError::Config(format!(
                "Ticker must contain only alphanumeric characters, dots or hyphens: {}",
                ticker
            )));
        }
        Ok(Ticker(uppercase_ticker))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self> {
        Ticker::new(s)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the caller knows about a filing. Only used to name the output file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingMetadata {
    pub ticker: Option<Ticker>,
    pub report_type: Option<ReportType>,
    pub filing_date: Option<NaiveDate>,
}

impl FilingMetadata {
    /// `{TICKER}_{FORM}_{DATE}` when all three are known, otherwise the
    /// document's own file stem.
    pub fn file_stem(&self, document: &str) -> String {
        match (&self.ticker, &self.report_type, &self.filing_date) {
            (Some(ticker), Some(report_type), Some(date)) => format!(
                "{}_{}_{}",
                ticker,
                report_type.to_string().replace([' ', '/'], "-"),
                date.format("%Y-%m-%d")
            ),
            _ => document_stem(document),
        }
    }

    pub fn file_name(&self, document: &str) -> String {
        format!("{}.xlsx", self.file_stem(document))
    }
}

fn document_stem(document: &str) -> String {
    let last = document
        .split(['?', '#'])
        .next()
        .unwrap_or(document)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(document);
    Path::new(last)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("filing")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_validation() {
        assert_eq!(Ticker::new("brk.b".to_string()).unwrap().as_str(), "BRK.B");
        assert!(Ticker::new("".to_string()).is_err());
        assert!(Ticker::new("AA PL".to_string()).is_err());
    }

    #[test]
    fn test_file_name_from_metadata() {
        let metadata = FilingMetadata {
            ticker: Some(Ticker::new("acme".to_string()).unwrap()),
            report_type: Some(ReportType::Form10K),
            filing_date: NaiveDate::from_ymd_opt(2025, 8, 15),
        };
        assert_eq!(
            metadata.file_name("acme-20250630.htm"),
            "ACME_10-K_2025-08-15.xlsx"
        );
    }

    #[test]
    fn test_file_name_falls_back_to_document() {
        let metadata = FilingMetadata::default();
        assert_eq!(
            metadata.file_name("https://www.sec.gov/Archives/edgar/data/1/0001/acme-20250630.htm"),
            "acme-20250630.xlsx"
        );
        assert_eq!(metadata.file_name("/tmp/filings/acme.html"), "acme.xlsx");
        assert_eq!(metadata.file_name("https://example.com/"), "example.xlsx");
    }
}
