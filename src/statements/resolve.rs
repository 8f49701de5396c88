use std::collections::HashMap;
use std::rc::Rc;

use crate::core::{Warning, Warnings};
use crate::edgar::parsing::types::{
    ContextDecl, Dimension, Entity, FactKind, Measure, Period, RawFact, UnitDecl,
};

/// Contexts are shared read-only by every fact that points at them.
pub type Context = ContextDecl;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitKind {
    Monetary(String),
    Shares,
    Pure,
    PerShare,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub id: String,
    pub measure: Measure,
    pub kind: UnitKind,
}

impl Unit {
    pub fn from_decl(decl: &UnitDecl) -> Self {
        Unit {
            id: decl.id.clone(),
            measure: decl.measure.clone(),
            kind: unit_kind(&decl.measure),
        }
    }
}

fn unit_kind(measure: &Measure) -> UnitKind {
    let is_currency = |m: &str| m.starts_with("iso4217:");
    let is_shares = |m: &str| m.eq_ignore_ascii_case("xbrli:shares") || m.ends_with(":shares");

    match measure {
        Measure::Simple(measures) => match measures.as_slice() {
            [m] if is_currency(m) => UnitKind::Monetary(m["iso4217:".len()..].to_string()),
            [m] if is_shares(m) => UnitKind::Shares,
            [m] if m.ends_with(":pure") => UnitKind::Pure,
            _ => UnitKind::Other,
        },
        Measure::Divide {
            numerator,
            denominator,
        } => match (numerator.as_slice(), denominator.as_slice()) {
            ([n], [d]) if is_currency(n) && is_shares(d) => UnitKind::PerShare,
            _ => UnitKind::Other,
        },
    }
}

/// A raw fact with its context and unit looked up.
#[derive(Clone, Debug)]
pub struct ResolvedFact {
    pub raw: RawFact,
    pub context: Rc<Context>,
    pub unit: Option<Rc<Unit>>,
}

type ContextKey = (Entity, Period, Vec<Dimension>);

/// Id -> context table where structurally equal contexts share one entry.
#[derive(Debug, Default)]
pub struct ContextTable {
    by_id: HashMap<String, Rc<Context>>,
    canonical: Vec<Rc<Context>>,
}

impl ContextTable {
    pub fn build(decls: &[ContextDecl]) -> Self {
        let mut table = ContextTable::default();
        let mut by_structure: HashMap<ContextKey, Rc<Context>> = HashMap::new();

        for decl in decls {
            if table.by_id.contains_key(&decl.id) {
                log::debug!("Context id {} declared twice, keeping the first", decl.id);
                continue;
            }
            let key = (decl.entity.clone(), decl.period, decl.dimensions.clone());
            let context = match by_structure.get(&key) {
                Some(existing) => {
                    log::debug!("Context {} merged into {}", decl.id, existing.id);
                    Rc::clone(existing)
                }
                None => {
                    let context = Rc::new(decl.clone());
                    by_structure.insert(key, Rc::clone(&context));
                    table.canonical.push(Rc::clone(&context));
                    context
                }
            };
            table.by_id.insert(decl.id.clone(), context);
        }

        log::info!(
            "{} contexts declared, {} after merging",
            table.by_id.len(),
            table.canonical.len()
        );
        table
    }

    pub fn get(&self, id: &str) -> Option<&Rc<Context>> {
        self.by_id.get(id)
    }

    /// Rewrite context ids to the id of the context they merged into and
    /// drop duplicates. Unknown ids stay as they are and match nothing.
    pub fn canonicalize_refs(&self, refs: &mut Vec<String>) {
        let mut canonical: Vec<String> = Vec::with_capacity(refs.len());
        for id in refs.iter() {
            let id = self.by_id.get(id).map(|c| &c.id).unwrap_or(id);
            if !canonical.contains(id) {
                canonical.push(id.clone());
            }
        }
        *refs = canonical;
    }

    /// Distinct contexts in declaration order.
    pub fn canonical(&self) -> &[Rc<Context>] {
        &self.canonical
    }
}

/// Resolve references, drop what cannot be resolved and keep one fact per
/// (concept, context).
pub fn resolve(
    facts: Vec<RawFact>,
    contexts: &[ContextDecl],
    units: &[UnitDecl],
    warnings: &mut Warnings,
) -> Vec<ResolvedFact> {
    resolve_with(facts, &ContextTable::build(contexts), units, warnings)
}

pub fn resolve_with(
    facts: Vec<RawFact>,
    contexts: &ContextTable,
    units: &[UnitDecl],
    warnings: &mut Warnings,
) -> Vec<ResolvedFact> {
    let units: HashMap<&str, Rc<Unit>> = units
        .iter()
        .map(|u| (u.id.as_str(), Rc::new(Unit::from_decl(u))))
        .collect();

    let mut resolved: Vec<ResolvedFact> = Vec::new();
    let mut slots: HashMap<(String, String), usize> = HashMap::new();

    for raw in facts {
        let Some(context) = contexts.get(&raw.context_ref).cloned() else {
            warnings.push(Warning::UnresolvedReference {
                concept: raw.concept.clone(),
                reference: raw.context_ref.clone(),
            });
            continue;
        };

        let unit = match (&raw.kind, &raw.unit_ref) {
            (_, Some(unit_ref)) => match units.get(unit_ref.as_str()) {
                Some(unit) => Some(Rc::clone(unit)),
                None => {
                    warnings.push(Warning::UnresolvedReference {
                        concept: raw.concept.clone(),
                        reference: unit_ref.clone(),
                    });
                    continue;
                }
            },
            (FactKind::Numeric, None) if !raw.nil => {
                warnings.push(Warning::UnresolvedReference {
                    concept: raw.concept.clone(),
                    reference: "unitRef".to_string(),
                });
                continue;
            }
            _ => None,
        };

        let key = (raw.concept.clone(), context.id.clone());
        let fact = ResolvedFact { raw, context, unit };

        match slots.get(&key) {
            Some(&index) => {
                let existing = &resolved[index];
                if existing.raw.raw_text != fact.raw.raw_text
                    || existing.raw.scale != fact.raw.scale
                    || existing.raw.sign_negative != fact.raw.sign_negative
                {
                    log::debug!(
                        "Inconsistent duplicate {} in {}: '{}' vs '{}'",
                        key.0,
                        key.1,
                        existing.raw.raw_text,
                        fact.raw.raw_text
                    );
                }
                if fact.raw.precision >= existing.raw.precision {
                    resolved[index] = fact;
                }
            }
            None => {
                slots.insert(key, resolved.len());
                resolved.push(fact);
            }
        }
    }

    log::info!("Resolved {} distinct facts", resolved.len());
    resolved
}
