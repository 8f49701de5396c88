//! One filing in, one workbook and its warnings out.
//!
//! Stages run in order on a single thread: extract, resolve, normalize,
//! classify, assemble. The cancel flag is checked between stages.

use std::collections::HashMap;
use std::path::Path;

use crate::core::{CancelFlag, EngineConfig, EngineError, Result, Warning, Warnings};
use crate::edgar::filing::{CompanionOverrides, DocumentLoader, FilingBundle, FilingSource};
use crate::edgar::parsing::linkbase::{parse_labels, parse_presentation, parse_schema, LabelTable};
use crate::edgar::parsing::namespaces::Namespaces;
use crate::edgar::parsing::types::{Extraction, PresentationRole};
use crate::edgar::parsing::xbrl::extract_facts;
use crate::statements::resolve::{self, ContextTable};
use crate::statements::{normalize, Classifier, RolePolicy, StatementSection, TaxonomyTable};
use crate::workbook::{all_facts_sheet, sections_to_workbook, xlsx, Workbook};

/// Result of a successful run.
#[derive(Debug)]
pub struct Conversion {
    pub sections: Vec<StatementSection>,
    pub workbook: Workbook,
    pub warnings: Vec<Warning>,
}

impl Conversion {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        xlsx::to_bytes(&self.workbook)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        xlsx::save(&self.workbook, path)
    }
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    config: EngineConfig,
    policy: RolePolicy,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(config: EngineConfig, cancel: CancelFlag) -> Result<Self> {
        let policy = RolePolicy::load(config.role_policy_path.as_deref())?;
        Ok(Self {
            config,
            policy,
            cancel,
        })
    }

    pub fn with_policy(mut self, policy: RolePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Fetch `source` and its companions, then run every stage.
    ///
    /// Parsing runs on the blocking pool so batch runs keep the runtime free
    /// for network work.
    pub async fn convert(
        &self,
        source: &FilingSource,
        overrides: &CompanionOverrides,
    ) -> Result<Conversion> {
        let loader = DocumentLoader::from_config(&self.config, self.cancel.clone())?;
        let bundle = loader.load(source, overrides).await?;

        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.process_bundle(bundle))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    EngineError::Cancelled
                } else {
                    EngineError::Io(std::io::Error::other(e.to_string()))
                }
            })?
    }

    /// Run every stage over a document already in memory, without companions.
    pub fn convert_text(&self, document: &str) -> Result<Conversion> {
        self.process_bundle(FilingBundle {
            location: FilingSource::Path("<memory>".into()),
            document: document.to_string(),
            schema: None,
            presentation: None,
            labels: None,
            warnings: Warnings::new(),
        })
    }

    pub fn process_bundle(&self, bundle: FilingBundle) -> Result<Conversion> {
        let FilingBundle {
            location,
            document,
            schema,
            presentation,
            labels,
            warnings: mut all_warnings,
        } = bundle;

        self.cancel.check()?;
        log::info!("Extracting facts from {}", location);
        let Extraction {
            facts,
            contexts,
            units,
            namespaces,
            mut layout_roles,
            ..
        } = extract_facts(&document)?;
        drop(document);

        self.cancel.check()?;
        let mut warnings = Warnings::new();
        let context_table = ContextTable::build(&contexts);
        let resolved = resolve::resolve_with(facts, &context_table, &units, &mut warnings);
        log::info!("Resolved {} facts", resolved.len());
        for node in layout_roles.iter_mut().flat_map(|role| role.nodes.iter_mut()) {
            context_table.canonicalize_refs(&mut node.contexts);
        }

        self.cancel.check()?;
        let mut taxonomy = TaxonomyTable::standard()
            .map_err(|e| EngineError::Config(format!("embedded taxonomy is invalid: {}", e)))?;
        let mut role_definitions = HashMap::new();
        if let Some(schema) = &schema {
            match parse_schema(schema, &namespaces) {
                Ok(info) => {
                    taxonomy.extend(info.concepts);
                    role_definitions = info.role_definitions;
                }
                Err(e) => warnings.push(companion_warning(&location, "schema", e)),
            }
        }
        let facts = normalize::normalize(resolved, &taxonomy, &mut warnings);
        log::info!("Normalized {} facts", facts.len());

        self.cancel.check()?;
        let label_table = match &labels {
            Some(labels) => parse_labels(labels, &namespaces).unwrap_or_else(|e| {
                warnings.push(companion_warning(&location, "label linkbase", e));
                LabelTable::new()
            }),
            None => LabelTable::new(),
        };
        let roles = self.presentation_roles(
            presentation.as_deref(),
            &namespaces,
            &role_definitions,
            layout_roles,
            &location,
            &mut warnings,
        );

        let sections = Classifier::new(&self.policy, &label_table, &taxonomy)
            .sign_convention(self.config.sign_convention)
            .include_dimensional(self.config.include_dimensional)
            .classify(&roles, &facts, &mut warnings);

        self.cancel.check()?;
        let mut workbook = sections_to_workbook(&sections);
        if self.config.include_all_facts {
            if let Some(sheet) = all_facts_sheet(&facts, self.config.sign_convention) {
                workbook.add_sheet(sheet);
            }
        }
        log::info!(
            "Workbook for {} has {} sheet(s), {} warning(s)",
            location,
            workbook.sheets.len(),
            all_warnings.len() + warnings.len()
        );

        all_warnings.extend(warnings);
        Ok(Conversion {
            sections,
            workbook,
            warnings: all_warnings.into_vec(),
        })
    }

    /// Linkbase roles when the linkbase parses and has any, otherwise the
    /// document's own tables.
    fn presentation_roles(
        &self,
        presentation: Option<&str>,
        namespaces: &Namespaces,
        role_definitions: &HashMap<String, String>,
        layout_roles: Vec<PresentationRole>,
        location: &FilingSource,
        warnings: &mut Warnings,
    ) -> Vec<PresentationRole> {
        if let Some(presentation) = presentation {
            match parse_presentation(presentation, namespaces, role_definitions) {
                Ok(roles) if !roles.is_empty() => {
                    log::info!("Using {} presentation roles from linkbase", roles.len());
                    return roles;
                }
                Ok(_) => log::debug!("Presentation linkbase has no roles"),
                Err(e) => warnings.push(companion_warning(location, "presentation linkbase", e)),
            }
        }
        log::info!("Using {} tables from the document layout", layout_roles.len());
        layout_roles
    }
}

fn companion_warning(location: &FilingSource, what: &str, error: EngineError) -> Warning {
    Warning::MissingLinkbase {
        location: format!("{} ({})", location, what),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::parsing::tests::read_test_file;
    use crate::statements::StatementKind;
    use rust_decimal::Decimal;

    fn pipeline() -> Pipeline {
        Pipeline::new(EngineConfig::default(), CancelFlag::new()).unwrap()
    }

    fn millions(n: i64) -> Decimal {
        Decimal::from(n * 1_000_000)
    }

    fn values(section: &StatementSection, label: &str) -> Vec<Option<Decimal>> {
        let row = section.rows.iter().find(|r| r.label == label).unwrap();
        (0..section.periods.len())
            .map(|i| row.values.get(&i).copied())
            .collect()
    }

    fn fixture_bundle() -> FilingBundle {
        FilingBundle {
            location: FilingSource::Path("acme-20250630.htm".into()),
            document: read_test_file("acme-20250630.htm"),
            schema: Some(read_test_file("acme-20250630.xsd")),
            presentation: Some(read_test_file("acme-20250630_pre.xml")),
            labels: Some(read_test_file("acme-20250630_lab.xml")),
            warnings: Warnings::new(),
        }
    }

    #[test]
    fn test_fixture_produces_four_statements() {
        let conversion = pipeline().process_bundle(fixture_bundle()).unwrap();
        let kinds: Vec<StatementKind> = conversion.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StatementKind::BalanceSheet,
                StatementKind::IncomeStatement,
                StatementKind::CashFlow,
                StatementKind::Equity,
            ]
        );
        assert_eq!(conversion.workbook.sheets.len(), 5);
        assert!(!conversion
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::ManualReview { .. } | Warning::EmptyClassification { .. })));
    }

    #[test]
    fn test_layout_fallback_without_linkbase() {
        let mut bundle = fixture_bundle();
        bundle.presentation = None;
        bundle.labels = None;
        let conversion = pipeline().process_bundle(bundle).unwrap();
        assert_eq!(conversion.sections.len(), 4);
        let balance = &conversion.sections[0];
        assert_eq!(balance.title, "CONSOLIDATED BALANCE SHEETS (in thousands)");
        assert_eq!(balance.row("us-gaap:Assets").unwrap().label, "Total assets");
        assert_eq!(
            values(balance, "Total assets"),
            vec![Some(millions(1000)), Some(millions(900))]
        );

        let income = &conversion.sections[1];
        assert!(!income.rows.iter().any(|r| r.label == "Retained Earnings"));

        let cash_flow = &conversion.sections[2];
        assert_eq!(
            values(cash_flow, "Net cash used in investing activities"),
            vec![Some(millions(-90)), Some(millions(-80))]
        );

        let equity = &conversion.sections[3];
        assert_eq!(equity.kind, StatementKind::Equity);
        assert_eq!(
            values(equity, "Balance at June 30, 2023"),
            vec![Some(millions(520)), Some(millions(470))]
        );
        assert_eq!(
            values(equity, "Net income"),
            vec![Some(millions(150)), Some(millions(110))]
        );
        assert_eq!(
            values(equity, "Dividends declared"),
            vec![Some(millions(70)), Some(millions(60))]
        );
        assert_eq!(
            values(equity, "Balance at June 30, 2025"),
            vec![Some(millions(600)), Some(millions(520))]
        );
        assert_eq!(equity.rows.iter().filter(|r| r.label == "Net income").count(), 1);
    }

    #[test]
    fn test_broken_companion_is_a_warning() {
        let mut bundle = fixture_bundle();
        bundle.presentation = Some("<not xml".to_string());
        let conversion = pipeline().process_bundle(bundle).unwrap();
        assert!(conversion.warnings.iter().any(|w| matches!(
            w,
            Warning::MissingLinkbase { location, .. } if location.contains("presentation linkbase")
        )));
        assert_eq!(conversion.sections.len(), 4);
    }

    #[test]
    fn test_cancelled_run_stops() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let pipeline = Pipeline::new(EngineConfig::default(), cancel).unwrap();
        assert!(matches!(
            pipeline.process_bundle(fixture_bundle()),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn test_all_facts_sheet_is_optional() {
        let config = EngineConfig {
            include_all_facts: false,
            ..EngineConfig::default()
        };
        let pipeline = Pipeline::new(config, CancelFlag::new()).unwrap();
        let conversion = pipeline.process_bundle(fixture_bundle()).unwrap();
        assert_eq!(conversion.workbook.sheets.len(), 4);
    }
}
