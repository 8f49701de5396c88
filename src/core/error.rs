use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::statements::StatementKind;

/// Failures that stop a pipeline run.
///
/// Everything per-fact or per-section is a [`Warning`] instead and ends up in
/// the warning list returned next to the workbook.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("failed to fetch {url} after {attempts} attempt(s): {reason}")]
    FetchFailure {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for EngineError {
    fn from(e: zip::result::ZipError) -> Self {
        EngineError::Workbook(e.to_string())
    }
}

impl From<std::fmt::Error> for EngineError {
    fn from(e: std::fmt::Error) -> Self {
        EngineError::Workbook(format!("XML write error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Non-fatal diagnostics accumulated during a run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum Warning {
    /// A fact pointed at a context or unit id that was never declared.
    UnresolvedReference {
        concept: String,
        reference: String,
    },
    /// Concept missing from the taxonomy table; the fact was kept.
    UnclassifiedConcept { concept: String },
    /// No facts classified into this statement kind; sheet omitted.
    EmptyClassification { kind: StatementKind },
    /// Role matching found zero or more than four statement roles.
    ManualReview { matched_roles: usize },
    /// A companion taxonomy file could not be loaded.
    MissingLinkbase { location: String, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnresolvedReference { concept, reference } => {
                write!(f, "unresolved reference '{}' on fact {}", reference, concept)
            }
            Warning::UnclassifiedConcept { concept } => {
                write!(f, "concept {} not found in taxonomy", concept)
            }
            Warning::EmptyClassification { kind } => {
                write!(f, "no facts classified as {}", kind)
            }
            Warning::ManualReview { matched_roles } => write!(
                f,
                "{} statement roles matched, filing needs manual review",
                matched_roles
            ),
            Warning::MissingLinkbase { location, reason } => {
                write!(f, "could not load {}: {}", location, reason)
            }
        }
    }
}

/// Collects warnings and mirrors each one to the log.
#[derive(Debug, Default)]
pub struct Warnings {
    items: Vec<Warning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: Warning) {
        log::warn!("{}", warning);
        self.items.push(warning);
    }

    pub fn extend(&mut self, other: Warnings) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Warning> {
        self.items
    }
}
