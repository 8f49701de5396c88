//! Getting a filing's bytes and turning its markup into tagged elements.

pub mod filing;
pub mod parsing;
pub mod rate_limiter;
pub mod report;
pub mod tickers;
pub mod utils;

pub use filing::{CompanionOverrides, DocumentLoader, FilingBundle, FilingSource};
pub use report::ReportType;
pub use tickers::{FilingMetadata, Ticker};
