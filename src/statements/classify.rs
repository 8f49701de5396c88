//! Group normalized facts into statement sections.
//!
//! Sections come from presentation roles whose title the [`RolePolicy`]
//! recognizes, or from concept names when no title does. Rows follow the
//! filer's presentation order and depth, columns are the periods the section
//! actually has values for.

use itertools::Itertools;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use strum::IntoEnumIterator;

use super::normalize::NormalizedFact;
use super::policy::RolePolicy;
use super::taxonomy::{DataType, TaxonomyTable};
use super::{Row, StatementKind, StatementSection};
use crate::core::{SignConvention, Warning, Warnings};
use crate::edgar::parsing::linkbase::{display_title, humanize, LabelTable};
use crate::edgar::parsing::types::{local_part, Dimension, Period, PresentationNode, PresentationRole};

/// More matched roles than this and the title heuristics are probably wrong.
const MAX_MATCHED_ROLES: usize = 4;

/// Hypercube scaffolding that never carries values itself.
const STRUCTURAL_SUFFIXES: &[&str] = &["Table", "Axis", "Domain", "Member", "LineItems"];

pub struct Classifier<'a> {
    policy: &'a RolePolicy,
    labels: &'a LabelTable,
    taxonomy: &'a TaxonomyTable,
    sign_convention: SignConvention,
    include_dimensional: bool,
}

type FactIndex<'f> = HashMap<&'f str, Vec<&'f NormalizedFact>>;

impl<'a> Classifier<'a> {
    pub fn new(policy: &'a RolePolicy, labels: &'a LabelTable, taxonomy: &'a TaxonomyTable) -> Self {
        Self {
            policy,
            labels,
            taxonomy,
            sign_convention: SignConvention::Reported,
            include_dimensional: true,
        }
    }

    pub fn sign_convention(mut self, convention: SignConvention) -> Self {
        self.sign_convention = convention;
        self
    }

    pub fn include_dimensional(mut self, include: bool) -> Self {
        self.include_dimensional = include;
        self
    }

    pub fn classify(
        &self,
        roles: &[PresentationRole],
        facts: &[NormalizedFact],
        warnings: &mut Warnings,
    ) -> Vec<StatementSection> {
        let mut ordered: Vec<&PresentationRole> = roles.iter().collect();
        ordered.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));

        let selected = self.policy.select(ordered.iter().map(|role| role.title.as_str()));
        if selected.is_empty() || selected.len() > MAX_MATCHED_ROLES {
            warnings.push(Warning::ManualReview {
                matched_roles: selected.len(),
            });
        }

        let by_concept = if selected.is_empty() {
            self.concept_roles(roles, facts)
        } else {
            Vec::new()
        };
        let matched: Vec<(StatementKind, &PresentationRole)> = if selected.is_empty() {
            by_concept.iter().map(|(kind, role)| (*kind, role)).collect()
        } else {
            selected.into_iter().map(|(i, kind)| (kind, ordered[i])).collect()
        };
        for (kind, role) in &matched {
            log::info!("Role '{}' classified as {}", role.title, kind);
        }

        let mut index: FactIndex<'_> = HashMap::new();
        for fact in facts.iter().filter(|f| f.number(self.sign_convention).is_some()) {
            index.entry(fact.raw.concept.as_str()).or_default().push(fact);
        }

        let mut sections: Vec<StatementSection> = matched
            .into_iter()
            .filter_map(|(kind, role)| self.build_section(kind, role, &index))
            .collect();
        sections.sort_by_key(|s| s.kind);

        for kind in StatementKind::iter() {
            if !sections.iter().any(|s| s.kind == kind) {
                warnings.push(Warning::EmptyClassification { kind });
            }
        }

        sections
    }

    /// One role per statement kind, built from concept names alone.
    ///
    /// Used when no role title is recognized. Takes every non-dimensional
    /// numeric fact whose concept name matches a keyword rule, in document
    /// order, and borrows the printed label from any table row tagging it.
    fn concept_roles(
        &self,
        roles: &[PresentationRole],
        facts: &[NormalizedFact],
    ) -> Vec<(StatementKind, PresentationRole)> {
        let mut candidates: Vec<&NormalizedFact> = facts
            .iter()
            .filter(|f| f.context.dimensions.is_empty() && f.number(self.sign_convention).is_some())
            .collect();
        candidates.sort_by_key(|f| f.raw.doc_order);

        let mut by_kind: BTreeMap<StatementKind, Vec<PresentationNode>> = BTreeMap::new();
        for fact in candidates {
            let concept = &fact.raw.concept;
            let Some(kind) = self.policy.classify_concept(&humanize(concept)) else {
                continue;
            };
            let nodes = by_kind.entry(kind).or_default();
            if nodes.iter().any(|n| &n.concept == concept) {
                continue;
            }
            let label = roles
                .iter()
                .flat_map(|role| role.nodes.iter())
                .find(|n| &n.concept == concept && n.label.is_some())
                .and_then(|n| n.label.clone());
            nodes.push(PresentationNode {
                concept: concept.clone(),
                depth: 0,
                order: nodes.len() as f64,
                preferred_label: None,
                label,
                contexts: Vec::new(),
            });
        }

        by_kind
            .into_iter()
            .map(|(kind, nodes)| {
                log::info!("{} concept(s) grouped as {} by name", nodes.len(), kind);
                let role = PresentationRole {
                    uri: format!("urn:ixsheet:concepts:{:?}", kind),
                    title: kind.to_string(),
                    sort_key: String::new(),
                    nodes,
                };
                (kind, role)
            })
            .collect()
    }

    fn build_section(
        &self,
        kind: StatementKind,
        role: &PresentationRole,
        index: &FactIndex<'_>,
    ) -> Option<StatementSection> {
        let first_seen = |concept: &str| {
            index
                .get(concept)
                .and_then(|facts| facts.iter().map(|f| f.raw.doc_order).min())
                .unwrap_or(usize::MAX)
        };
        let mut nodes: Vec<&PresentationNode> = role.nodes.iter().collect();
        nodes.sort_by(|a, b| {
            a.order
                .total_cmp(&b.order)
                .then_with(|| first_seen(&a.concept).cmp(&first_seen(&b.concept)))
        });

        // Members only show under roles that present their axis, and rows
        // recovered from a table only take the contexts tagged in that row.
        let role_axes: Vec<&str> = role
            .nodes
            .iter()
            .map(|n| n.concept.as_str())
            .filter(|c| local_part(c).ends_with("Axis"))
            .collect();
        let in_scope = |node: &PresentationNode, fact: &NormalizedFact| {
            let dims = &fact.context.dimensions;
            if !dims.is_empty() && !self.include_dimensional {
                return false;
            }
            if !node.contexts.is_empty() {
                return node.contexts.contains(&fact.context.id);
            }
            dims.iter().all(|d| role_axes.contains(&d.axis.as_str()))
        };
        let facts_of = |node: &PresentationNode| {
            index
                .get(node.concept.as_str())
                .map(|facts| {
                    facts
                        .iter()
                        .copied()
                        .filter(|f| in_scope(node, *f))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        let mut section_periods: Vec<Period> = Vec::new();
        for node in nodes.iter().copied() {
            for fact in facts_of(node) {
                if !section_periods.contains(&fact.context.period) {
                    section_periods.push(fact.context.period);
                }
            }
        }
        if section_periods.is_empty() {
            log::debug!("Role '{}' has no facts", role.title);
            return None;
        }

        // Mixed sections (equity roll-forwards) use duration columns and
        // place balances by their instant.
        let has_duration = section_periods
            .iter()
            .any(|p| matches!(p, Period::Duration { .. }));
        let mut periods: Vec<Period> = section_periods
            .into_iter()
            .filter(|p| !(has_duration && p.is_instant()))
            .collect();
        periods.sort_by(|a, b| a.column_cmp(b));

        let mut rows: Vec<Row> = Vec::new();
        for node in nodes {
            let period_start = node
                .preferred_label
                .as_deref()
                .is_some_and(|l| l.ends_with("periodStartLabel"));
            let facts = facts_of(node);

            let mut values: BTreeMap<usize, Decimal> = BTreeMap::new();
            let mut members: Vec<(&[Dimension], BTreeMap<usize, Decimal>)> = Vec::new();

            for fact in &facts {
                let Some(column) = column_for(&periods, &fact.context.period, period_start) else {
                    log::debug!(
                        "No column for {} at {} in '{}'",
                        node.concept,
                        fact.context.period,
                        role.title
                    );
                    continue;
                };
                let Some(value) = fact.number(self.sign_convention) else {
                    continue;
                };
                let dims = fact.context.dimensions.as_slice();
                if dims.is_empty() {
                    values.entry(column).or_insert(value);
                } else {
                    match members.iter_mut().find(|(d, _)| *d == dims) {
                        Some((_, member_values)) => {
                            member_values.entry(column).or_insert(value);
                        }
                        None => members.push((dims, BTreeMap::from([(column, value)]))),
                    }
                }
            }

            if values.is_empty() && members.is_empty() && is_structural(&node.concept) {
                continue;
            }

            let data_type = self.data_type(&node.concept, &facts);
            rows.push(Row {
                label: self.label(node),
                depth: node.depth,
                concept: node.concept.clone(),
                data_type,
                is_header: values.is_empty(),
                values,
            });
            for (dims, member_values) in members {
                rows.push(Row {
                    label: self.member_label(dims),
                    depth: node.depth + 1,
                    concept: node.concept.clone(),
                    data_type,
                    is_header: false,
                    values: member_values,
                });
            }
        }

        let rows = prune_empty_rows(rows);
        if rows.is_empty() {
            return None;
        }

        let title = display_title(&role.title);
        log::info!(
            "Section '{}': {} rows x {} periods",
            title,
            rows.len(),
            periods.len()
        );

        Some(StatementSection {
            kind,
            role_uri: role.uri.clone(),
            title,
            periods,
            rows,
        })
    }

    /// Preferred label role, then the standard label, then what the document
    /// printed, then the concept name itself.
    fn label(&self, node: &PresentationNode) -> String {
        self.labels
            .get(&node.concept, node.preferred_label.as_deref())
            .map(str::to_string)
            .or_else(|| node.label.clone().filter(|l| !l.is_empty()))
            .unwrap_or_else(|| humanize(&node.concept))
    }

    fn member_label(&self, dims: &[Dimension]) -> String {
        dims.iter()
            .map(|d| {
                if d.member.contains(':') {
                    let label = self
                        .labels
                        .get(&d.member, None)
                        .map(str::to_string)
                        .unwrap_or_else(|| humanize(&d.member));
                    strip_member_suffix(&label)
                } else {
                    d.member.clone()
                }
            })
            .join(" | ")
    }

    fn data_type(&self, concept: &str, facts: &[&NormalizedFact]) -> DataType {
        self.taxonomy
            .get(concept)
            .map(|c| c.data_type)
            .or_else(|| facts.first().map(|f| f.data_type()))
            .unwrap_or(DataType::Decimal)
    }
}

fn column_for(periods: &[Period], period: &Period, period_start: bool) -> Option<usize> {
    if let Some(exact) = periods.iter().position(|p| p == period) {
        return Some(exact);
    }
    let Period::Instant(date) = period else {
        return None;
    };
    periods.iter().position(|p| match p {
        Period::Duration { start, .. } if period_start => {
            start == date || start.pred_opt().as_ref() == Some(date)
        }
        Period::Duration { end, .. } => end == date,
        _ => false,
    })
}

fn is_structural(concept: &str) -> bool {
    let local = local_part(concept);
    STRUCTURAL_SUFFIXES.iter().any(|s| local.ends_with(s))
}

fn strip_member_suffix(label: &str) -> String {
    let label = label.trim();
    label
        .strip_suffix("[Member]")
        .or_else(|| label.strip_suffix(" Member"))
        .unwrap_or(label)
        .trim()
        .to_string()
}

/// Drop rows without values unless a row nested below them has values, then
/// shift depths so the shallowest kept row sits at zero.
fn prune_empty_rows(rows: Vec<Row>) -> Vec<Row> {
    let keep: Vec<bool> = (0..rows.len())
        .map(|i| {
            !rows[i].values.is_empty()
                || rows[i + 1..]
                    .iter()
                    .take_while(|r| r.depth > rows[i].depth)
                    .any(|r| !r.values.is_empty())
        })
        .collect();

    let mut kept: Vec<Row> = rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();

    if let Some(min_depth) = kept.iter().map(|r| r.depth).min() {
        for row in &mut kept {
            row.depth -= min_depth;
        }
    }
    kept
}
