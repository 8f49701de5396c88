use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// Filing form, used only to name output files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum ReportType {
    Form10K,
    Form10Q,
    Form20F,
    Form40F,
    Form6K,
    Form8K,
    FormS1,
    Other(String),
}

impl TryFrom<String> for ReportType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ReportType::from_str(&s)
    }
}

impl From<ReportType> for String {
    fn from(report_type: ReportType) -> Self {
        report_type.to_string()
    }
}

impl ReportType {
    /// Form code as EDGAR prints it, e.g. `10-K`.
    pub fn code(&self) -> &str {
        match self {
            ReportType::Form10K => "10-K",
            ReportType::Form10Q => "10-Q",
            ReportType::Form20F => "20-F",
            ReportType::Form40F => "40-F",
            ReportType::Form6K => "6-K",
            ReportType::Form8K => "8-K",
            ReportType::FormS1 => "S-1",
            ReportType::Other(code) => code,
        }
    }

    pub fn list_types() -> &'static str {
        &KNOWN_FORMS
    }
}

static KNOWN_FORMS: Lazy<String> = Lazy::new(|| {
    ReportType::iter()
        .filter(|t| !matches!(t, ReportType::Other(_)))
        .map(|t| t.code().to_string())
        .join(", ")
});

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ReportType {
    type Err = String;

    /// Case and hyphen insensitive; unknown forms are kept verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        if code.is_empty() {
            return Err("Report type cannot be empty".to_string());
        }
        let bare = code.replace('-', "");
        Ok(ReportType::iter()
            .find(|t| !matches!(t, ReportType::Other(_)) && t.code().replace('-', "") == bare)
            .unwrap_or(ReportType::Other(code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_round_trip_names() {
        assert_eq!("10-k".parse::<ReportType>().unwrap(), ReportType::Form10K);
        assert_eq!("20-F".parse::<ReportType>().unwrap(), ReportType::Form20F);
        assert_eq!(
            "10-KT".parse::<ReportType>().unwrap(),
            ReportType::Other("10-KT".to_string())
        );
        assert!("".parse::<ReportType>().is_err());
        assert_eq!(ReportType::Form10Q.to_string(), "10-Q");
        assert!(ReportType::list_types().starts_with("10-K, 10-Q"));
    }

    #[test]
    fn test_report_type_serde() {
        let json = serde_json::to_string(&ReportType::Form10K).unwrap();
        assert_eq!(json, "\"10-K\"");
        let parsed: ReportType = serde_json::from_str("\"10-q\"").unwrap();
        assert_eq!(parsed, ReportType::Form10Q);
    }
}
