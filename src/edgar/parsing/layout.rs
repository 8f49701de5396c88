//! Presentation recovered from the filing's own tables.
//!
//! Used when no presentation linkbase is available. Only row order, indent
//! and the printed label come from here; values always come from the tags.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use std::collections::HashMap;

use super::linkbase::{PERIOD_END_LABEL_ROLE, PERIOD_START_LABEL_ROLE};
use super::namespaces::Namespaces;
use super::types::{PresentationNode, PresentationRole};
use super::xbrl::{attr, element_text, local_tag};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static INDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(padding-left|margin-left|text-indent)\s*:\s*(-?[0-9.]+)\s*(pt|px|em|in|rem)?")
        .unwrap()
});

static BALANCE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(balances?|beginning of)\b").unwrap());

/// Points of indent per depth level.
const INDENT_STEP_PT: f64 = 9.0;
const MAX_DEPTH: usize = 8;
const MAX_TITLE_BLOCKS: usize = 2;
const MAX_BLOCK_CHARS: usize = 200;

/// One table row that carries facts.
struct FactRow {
    label: Option<String>,
    depth: usize,
    /// Concepts in cell order, each with the contexts tagged in this row.
    facts: Vec<(String, Vec<String>)>,
}

pub fn scan_tables(html: &Html, ns: &Namespaces) -> Vec<PresentationRole> {
    let mut roles = Vec::new();

    for (index, table) in html.select(&TABLE).enumerate() {
        let rows: Vec<FactRow> = table
            .select(&ROW)
            .filter(|row| closest_table(row).map(|t| t.id()) == Some(table.id()))
            .filter_map(|row| fact_row(&row, ns))
            .collect();
        let nodes = table_nodes(&rows);
        if nodes.is_empty() {
            continue;
        }

        let title = preceding_title(&table).unwrap_or_else(|| format!("Table {}", index + 1));
        log::debug!("Layout table {} '{}' with {} rows", index + 1, title, nodes.len());

        roles.push(PresentationRole {
            uri: format!("urn:ixsheet:table:{}", index + 1),
            title,
            sort_key: format!("{:010}", index),
            nodes,
        });
    }

    roles
}

fn fact_row(row: &ElementRef<'_>, ns: &Namespaces) -> Option<FactRow> {
    let mut facts: Vec<(String, Vec<String>)> = Vec::new();
    for fact in row
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| local_tag(e).eq_ignore_ascii_case("nonfraction"))
    {
        let Some(name) = attr(&fact, "name") else {
            continue;
        };
        let concept = ns.canonicalize(name);
        let context = attr(&fact, "contextRef").map(str::to_string);
        let position = match facts.iter().position(|(c, _)| *c == concept) {
            Some(position) => position,
            None => {
                facts.push((concept, Vec::new()));
                facts.len() - 1
            }
        };
        if let Some(context) = context {
            if !facts[position].1.contains(&context) {
                facts[position].1.push(context);
            }
        }
    }
    if facts.is_empty() {
        return None;
    }

    let (label, depth) = label_cell(row)
        .map(|cell| (Some(element_text(&cell)), cell_depth(&cell)))
        .unwrap_or((None, 0));
    Some(FactRow {
        label,
        depth,
        facts,
    })
}

/// Turn fact rows into presentation nodes, each scoped to the contexts
/// tagged in its own row.
///
/// A concept that repeats down the table is either a roll-forward balance
/// (it opens the table or its first label reads like a balance) or a flow
/// reported once per period. Balances become an opening node at the first
/// row and a closing node at the last; flows collapse into their first row.
/// Both take every context the concept was tagged with in the table.
fn table_nodes(rows: &[FactRow]) -> Vec<PresentationNode> {
    let mut occurrences: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        for (concept, _) in &row.facts {
            occurrences.entry(concept.as_str()).or_default().push(i);
        }
    }
    let all_contexts = |concept: &str| -> Vec<String> {
        let mut contexts: Vec<String> = Vec::new();
        for row in rows {
            for (c, refs) in &row.facts {
                if c == concept {
                    for r in refs {
                        if !contexts.contains(r) {
                            contexts.push(r.clone());
                        }
                    }
                }
            }
        }
        contexts
    };

    let mut nodes: Vec<PresentationNode> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        for (concept, contexts) in &row.facts {
            let seen = &occurrences[concept.as_str()];
            let first = seen[0];
            let last = seen[seen.len() - 1];

            let (preferred_label, contexts) = if seen.len() == 1 {
                (None, contexts.clone())
            } else if is_balance(rows, first) {
                match i {
                    i if i == first => (Some(PERIOD_START_LABEL_ROLE), all_contexts(concept)),
                    i if i == last => (Some(PERIOD_END_LABEL_ROLE), all_contexts(concept)),
                    _ => continue,
                }
            } else if i == first {
                (None, all_contexts(concept))
            } else {
                continue;
            };

            nodes.push(PresentationNode {
                concept: concept.clone(),
                depth: row.depth,
                order: nodes.len() as f64,
                preferred_label: preferred_label.map(str::to_string),
                label: row.label.clone(),
                contexts,
            });
        }
    }
    nodes
}

fn is_balance(rows: &[FactRow], first: usize) -> bool {
    first == 0
        || rows[first]
            .label
            .as_deref()
            .is_some_and(|label| BALANCE_LABEL.is_match(label))
}

fn closest_table<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name().eq_ignore_ascii_case("table"))
}

/// First cell with text that is not itself a value cell.
fn label_cell<'a>(row: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .find(|c| {
            let has_fact = c
                .descendants()
                .filter_map(ElementRef::wrap)
                .any(|e| local_tag(&e).eq_ignore_ascii_case("nonfraction"));
            !has_fact && !element_text(c).is_empty()
        })
}

fn cell_depth(cell: &ElementRef<'_>) -> usize {
    let indent_pt = cell
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|e| e.value().attr("style"))
        .map(indent_points)
        .fold(0.0_f64, f64::max);
    ((indent_pt / INDENT_STEP_PT).round().max(0.0) as usize).min(MAX_DEPTH)
}

/// Sum of left padding, left margin and positive text indent, in points.
pub fn indent_points(style: &str) -> f64 {
    INDENT
        .captures_iter(style)
        .filter_map(|cap| {
            let value: f64 = cap[2].parse().ok()?;
            let points = match cap.get(3).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
                Some("px") => value * 0.75,
                Some("em") | Some("rem") => value * 12.0,
                Some("in") => value * 72.0,
                _ => value,
            };
            if cap[1].eq_ignore_ascii_case("text-indent") && points < 0.0 {
                return Some(0.0);
            }
            Some(points)
        })
        .sum()
}

/// Text blocks right before the table, nearest last.
fn preceding_title(table: &ElementRef<'_>) -> Option<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current = *table;

    'levels: for _ in 0..4 {
        for sibling in current.prev_siblings() {
            let text = if let Some(el) = ElementRef::wrap(sibling) {
                if el.select(&TABLE).next().is_some() || el.value().name() == "table" {
                    break 'levels;
                }
                element_text(&el)
            } else if let Some(text) = sibling.value().as_text() {
                text.trim().to_string()
            } else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            blocks.push(text.chars().take(MAX_BLOCK_CHARS).collect());
            if blocks.len() >= MAX_TITLE_BLOCKS {
                break 'levels;
            }
        }
        match current.parent().and_then(ElementRef::wrap) {
            Some(parent) if parent.value().name() != "body" => current = parent,
            _ => break,
        }
    }

    if blocks.is_empty() {
        return None;
    }
    blocks.reverse();
    Some(blocks.join(" "))
}
