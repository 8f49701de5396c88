use serde::{Deserialize, Serialize};
use std::path::Path;

use super::StatementKind;
use crate::core::{EngineError, Result};

/// Keywords for one statement kind, matched against lowercased role titles.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoleRule {
    pub kind: StatementKind,
    pub keywords: Vec<String>,
}

/// Maps filer role titles to statement kinds.
///
/// Rules are tried in order and the first hit wins. A title containing any
/// exclusion keyword never matches. A title containing a `secondary` keyword
/// only counts when no other role matched the same kind, so a separate
/// comprehensive income statement does not shadow the income statement.
///
/// `concept_rules` are the last resort when no role title matches at all:
/// they are tried against each concept's humanized name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RolePolicy {
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
    pub rules: Vec<RoleRule>,
    #[serde(default = "default_concept_rules")]
    pub concept_rules: Vec<RoleRule>,
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_concept_rules() -> Vec<RoleRule> {
    vec![
        RoleRule {
            kind: StatementKind::CashFlow,
            keywords: words(&[
                "operating activities",
                "investing activities",
                "financing activities",
            ]),
        },
        RoleRule {
            kind: StatementKind::IncomeStatement,
            keywords: words(&["income", "revenue", "expense", "profit"]),
        },
        RoleRule {
            kind: StatementKind::BalanceSheet,
            keywords: words(&["asset", "liabilit"]),
        },
        RoleRule {
            kind: StatementKind::Equity,
            keywords: words(&["equity"]),
        },
        RoleRule {
            kind: StatementKind::CashFlow,
            keywords: words(&["cash"]),
        },
    ]
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            exclude: words(&[
                "parenthetical",
                "(details",
                "(tables",
                "(policies",
                "- disclosure -",
                "- document -",
                "details",
                "narrative",
            ]),
            secondary: words(&["comprehensive"]),
            rules: vec![
                RoleRule {
                    kind: StatementKind::CashFlow,
                    keywords: words(&["cash flow"]),
                },
                RoleRule {
                    kind: StatementKind::Equity,
                    keywords: words(&[
                        "stockholders",
                        "shareholders",
                        "changes in equity",
                        "statement of equity",
                        "statements of equity",
                        "partners' capital",
                        "members' equity",
                    ]),
                },
                RoleRule {
                    kind: StatementKind::BalanceSheet,
                    keywords: words(&["balance sheet", "financial position", "financial condition"]),
                },
                RoleRule {
                    kind: StatementKind::IncomeStatement,
                    keywords: words(&["income", "operations", "earnings", "profit or loss"]),
                },
            ],
            concept_rules: default_concept_rules(),
        }
    }
}

impl RolePolicy {
    pub fn from_json(content: &str) -> Result<Self> {
        let mut policy: RolePolicy = serde_json::from_str(content)
            .map_err(|e| EngineError::Config(format!("invalid role policy: {}", e)))?;
        policy.lowercase();
        Ok(policy)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let policy = Self::from_json(&content)?;
        log::info!("Loaded role policy from {}", path.display());
        Ok(policy)
    }

    /// Load from `path` when given, otherwise the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn classify(&self, title: &str) -> Option<StatementKind> {
        let title = normalize_title(title);
        if self.exclude.iter().any(|k| title.contains(k.as_str())) {
            return None;
        }
        first_match(&self.rules, &title)
    }

    pub fn is_secondary(&self, title: &str) -> bool {
        let title = normalize_title(title);
        self.secondary.iter().any(|k| title.contains(k.as_str()))
    }

    /// Classify every title, then drop secondary matches for kinds that also
    /// have a primary match. Returns `(index, kind)` in input order.
    pub fn select<'t>(&self, titles: impl IntoIterator<Item = &'t str>) -> Vec<(usize, StatementKind)> {
        let matched: Vec<(usize, StatementKind, bool)> = titles
            .into_iter()
            .enumerate()
            .filter_map(|(i, title)| {
                self.classify(title)
                    .map(|kind| (i, kind, self.is_secondary(title)))
            })
            .collect();

        matched
            .iter()
            .filter(|(_, kind, secondary)| {
                !*secondary || !matched.iter().any(|(_, k, s)| k == kind && !*s)
            })
            .map(|(i, kind, _)| (*i, *kind))
            .collect()
    }

    /// Statement kind for a concept by its humanized name, used when no role
    /// title matched.
    pub fn classify_concept(&self, name: &str) -> Option<StatementKind> {
        first_match(&self.concept_rules, &name.to_lowercase())
    }

    fn lowercase(&mut self) {
        for keyword in self
            .exclude
            .iter_mut()
            .chain(self.secondary.iter_mut())
            .chain(self.rules.iter_mut().flat_map(|r| r.keywords.iter_mut()))
            .chain(self.concept_rules.iter_mut().flat_map(|r| r.keywords.iter_mut()))
        {
            *keyword = keyword.to_lowercase();
        }
    }
}

fn normalize_title(title: &str) -> String {
    title.to_lowercase().replace(['’', '`'], "'")
}

fn first_match(rules: &[RoleRule], text: &str) -> Option<StatementKind> {
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| text.contains(k.as_str())))
        .map(|rule| rule.kind)
}
