use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use unicode_normalization::UnicodeNormalization;

use super::layout;
use super::namespaces::Namespaces;
use super::types::{
    ContextDecl, Dimension, Entity, Extraction, FactKind, Measure, Period, Precision, RawFact,
    TaggedElement, UnitDecl,
};
use crate::core::{EngineError, Result};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Parse an inline XBRL document into raw facts and their declarations.
///
/// The HTML parser recovers from unclosed or misnested markup, and a single
/// broken tag only drops that tag. The only failure is a document without
/// any fact at all.
pub fn extract_facts(content: &str) -> Result<Extraction> {
    let html = Html::parse_document(content);
    let namespaces = collect_namespaces(&html);

    let mut elements = Vec::new();
    let mut schema_refs = Vec::new();

    for el in html.root_element().descendants().filter_map(ElementRef::wrap) {
        if local_tag(&el).eq_ignore_ascii_case("schemaref") {
            if let Some(href) = attr(&el, "xlink:href") {
                schema_refs.push(href.trim().to_string());
            }
            continue;
        }
        if let Some(element) = classify_element(&el, &namespaces, elements.len()) {
            elements.push(element);
        }
    }

    let mut extraction = Extraction::from_elements(elements);
    if extraction.facts.is_empty() {
        return Err(EngineError::MalformedDocument(
            "no inline XBRL facts found".to_string(),
        ));
    }

    log::info!(
        "Extracted {} facts, {} contexts, {} units",
        extraction.facts.len(),
        extraction.contexts.len(),
        extraction.units.len()
    );

    extraction.layout_roles = layout::scan_tables(&html, &namespaces);
    extraction.schema_refs = schema_refs;
    extraction.namespaces = namespaces;
    Ok(extraction)
}

/// Decide what an element is. Anything that is not a fact, context or unit
/// declaration is ignored.
pub fn classify_element(
    el: &ElementRef<'_>,
    ns: &Namespaces,
    doc_order: usize,
) -> Option<TaggedElement> {
    let tag = local_tag(el).to_ascii_lowercase();
    match tag.as_str() {
        "nonfraction" => parse_fact(el, ns, FactKind::Numeric, doc_order).map(TaggedElement::NumericFact),
        "nonnumeric" => {
            parse_fact(el, ns, FactKind::NonNumeric, doc_order).map(TaggedElement::NonNumericFact)
        }
        "context" => parse_context(el, ns).map(TaggedElement::ContextDecl),
        "unit" => parse_unit(el, ns).map(TaggedElement::UnitDecl),
        _ => None,
    }
}

fn parse_fact(
    el: &ElementRef<'_>,
    ns: &Namespaces,
    kind: FactKind,
    doc_order: usize,
) -> Option<RawFact> {
    let Some(name) = attr(el, "name") else {
        log::debug!("Skipping {} without name", el.value().name());
        return None;
    };
    let Some(context_ref) = attr(el, "contextref") else {
        log::debug!("Skipping fact {} without contextRef", name);
        return None;
    };

    let scale = match attr(el, "scale").map(str::trim) {
        None | Some("") => 0,
        Some(s) => match s.parse::<i32>() {
            Ok(v) => v,
            Err(_) => {
                log::debug!("Skipping fact {} with bad scale '{}'", name, s);
                return None;
            }
        },
    };

    let Some(precision) = Precision::parse(attr(el, "decimals")) else {
        log::debug!("Skipping fact {} with bad decimals", name);
        return None;
    };

    let mut raw_text = String::new();
    collect_text(*el, kind == FactKind::NonNumeric, &mut raw_text);

    let fact = RawFact {
        id: attr(el, "id").map(str::to_string),
        concept: ns.canonicalize(name),
        context_ref: context_ref.trim().to_string(),
        unit_ref: attr(el, "unitref").map(|u| u.trim().to_string()),
        raw_text: clean_text(&raw_text),
        format_hint: attr(el, "format").map(|f| f.trim().to_string()),
        sign_negative: attr(el, "sign").map(str::trim) == Some("-"),
        precision,
        scale,
        nil: attr(el, "xsi:nil").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
        kind,
        doc_order,
    };

    log::debug!(
        "Fact: {} {} {} {}",
        fact.concept,
        fact.raw_text.chars().take(40).collect::<String>(),
        fact.context_ref,
        fact.unit_ref.as_deref().unwrap_or("no unit")
    );

    Some(fact)
}

fn parse_context(el: &ElementRef<'_>, ns: &Namespaces) -> Option<ContextDecl> {
    let id = attr(el, "id")?.trim().to_string();

    let entity = find_descendant(el, "identifier")
        .map(|ident| Entity {
            scheme: attr(&ident, "scheme").unwrap_or("").trim().to_string(),
            identifier: element_text(&ident),
        })
        .unwrap_or(Entity {
            scheme: String::new(),
            identifier: String::new(),
        });

    let Some(period) = find_descendant(el, "period").and_then(|p| parse_period(&p)) else {
        log::debug!("Context {} has no usable period", id);
        return None;
    };

    let mut dimensions = Vec::new();
    for member in el.descendants().filter_map(ElementRef::wrap) {
        let tag = local_tag(&member).to_ascii_lowercase();
        if tag != "explicitmember" && tag != "typedmember" {
            continue;
        }
        let Some(axis) = attr(&member, "dimension") else {
            continue;
        };
        let value = element_text(&member);
        let member_name = if tag == "explicitmember" {
            ns.canonicalize(&value)
        } else {
            value
        };
        dimensions.push(Dimension {
            axis: ns.canonicalize(axis),
            member: member_name,
        });
    }
    dimensions.sort();
    dimensions.dedup();

    log::debug!("Context {} {} ({} dims)", id, period, dimensions.len());

    Some(ContextDecl {
        id,
        entity,
        period,
        dimensions,
    })
}

fn parse_period(period: &ElementRef<'_>) -> Option<Period> {
    let mut instant = None;
    let mut start = None;
    let mut end = None;
    let mut forever = false;

    for child in period.descendants().filter_map(ElementRef::wrap) {
        match local_tag(&child).to_ascii_lowercase().as_str() {
            "instant" => instant = parse_xbrl_date(&element_text(&child)),
            "startdate" => start = parse_xbrl_date(&element_text(&child)),
            "enddate" => end = parse_xbrl_date(&element_text(&child)),
            "forever" => forever = true,
            _ => {}
        }
    }

    match (instant, start, end) {
        (Some(d), _, _) => Some(Period::Instant(d)),
        (None, Some(start), Some(end)) => Some(Period::Duration { start, end }),
        _ if forever => Some(Period::Forever),
        _ => None,
    }
}

/// XBRL dates may carry a time component; only the date part is kept.
pub fn parse_xbrl_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn parse_unit(el: &ElementRef<'_>, ns: &Namespaces) -> Option<UnitDecl> {
    let id = attr(el, "id")?.trim().to_string();

    let measures_under = |parent: &ElementRef<'_>| -> Vec<String> {
        parent
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|m| local_tag(m).eq_ignore_ascii_case("measure"))
            .map(|m| ns.canonicalize(&element_text(&m)))
            .filter(|m| !m.is_empty())
            .collect()
    };

    let measure = match find_descendant(el, "divide") {
        Some(divide) => {
            let numerator = find_descendant(&divide, "unitnumerator")
                .map(|n| measures_under(&n))
                .unwrap_or_default();
            let denominator = find_descendant(&divide, "unitdenominator")
                .map(|d| measures_under(&d))
                .unwrap_or_default();
            if numerator.is_empty() || denominator.is_empty() {
                log::debug!("Unit {} has an incomplete divide", id);
                return None;
            }
            Measure::Divide {
                numerator,
                denominator,
            }
        }
        None => {
            let measures = measures_under(el);
            if measures.is_empty() {
                log::debug!("Unit {} has no measure", id);
                return None;
            }
            Measure::Simple(measures)
        }
    };

    Some(UnitDecl { id, measure })
}

fn collect_namespaces(html: &Html) -> Namespaces {
    let mut ns = Namespaces::new();
    for el in html.root_element().descendants().filter_map(ElementRef::wrap) {
        for (name, value) in el.value().attrs() {
            let lower = name.to_ascii_lowercase();
            if let Some(prefix) = lower.strip_prefix("xmlns:") {
                ns.declare(prefix, value);
            }
        }
    }
    ns
}

/// Element name without its prefix. The HTML parser keeps `ix:nonFraction`
/// as a single lowercased local name.
pub(crate) fn local_tag<'a>(el: &ElementRef<'a>) -> &'a str {
    let name = el.value().name();
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

pub(crate) fn attr<'a>(el: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value()
        .attrs()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn find_descendant<'a>(el: &ElementRef<'a>, local: &str) -> Option<ElementRef<'a>> {
    el.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|d| local_tag(d).eq_ignore_ascii_case(local))
}

pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(*el, true, &mut out);
    clean_text(&out)
}

/// Gather descendant text, leaving out `ix:exclude` content.
fn collect_text(el: ElementRef<'_>, separate_blocks: bool, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if local_tag(&child_el).eq_ignore_ascii_case("exclude") {
                continue;
            }
            collect_text(child_el, separate_blocks, out);
            if separate_blocks {
                out.push(' ');
            }
        }
    }
}

pub(crate) fn clean_text(raw: &str) -> String {
    let normalized = raw.nfkc().collect::<String>();
    WHITESPACE.replace_all(normalized.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::parsing::tests::read_test_file;

    fn wrap(body: &str) -> String {
        format!(
            r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL"
                xmlns:xbrli="http://www.xbrl.org/2003/instance" xmlns:iso4217="http://www.xbrl.org/2003/iso4217"
                xmlns:us-gaap="http://fasb.org/us-gaap/2024" xmlns:gaap="http://fasb.org/us-gaap/2024"
                xmlns:xbrldi="http://xbrl.org/2006/xbrldi">
            <body>
            <div style="display:none"><ix:header><ix:resources>
              <xbrli:context id="c1">
                <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000001</xbrli:identifier></xbrli:entity>
                <xbrli:period><xbrli:instant>2025-06-30</xbrli:instant></xbrli:period>
              </xbrli:context>
              <xbrli:context id="c2">
                <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000001</xbrli:identifier>
                  <xbrli:segment><xbrldi:explicitMember dimension="us-gaap:StatementEquityComponentsAxis">gaap:RetainedEarningsMember</xbrldi:explicitMember></xbrli:segment>
                </xbrli:entity>
                <xbrli:period><xbrli:startDate>2024-07-01</xbrli:startDate><xbrli:endDate>2025-06-30</xbrli:endDate></xbrli:period>
              </xbrli:context>
              <xbrli:unit id="usd"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
              <xbrli:unit id="usdPerShare"><xbrli:divide>
                <xbrli:unitNumerator><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unitNumerator>
                <xbrli:unitDenominator><xbrli:measure>xbrli:shares</xbrli:measure></xbrli:unitDenominator>
              </xbrli:divide></xbrli:unit>
            </ix:resources></ix:header></div>
            {}
            </body></html>"#,
            body
        )
    }

    #[test]
    fn test_extracts_numeric_fact_attributes() {
        let doc = wrap(
            r#"<table><tr><td>Total assets</td><td>$<ix:nonFraction name="us-gaap:Assets" contextRef="c1" unitRef="usd" decimals="-3" scale="3" format="ixt:num-dot-decimal">1,000</ix:nonFraction></td></tr></table>"#,
        );
        let extraction = extract_facts(&doc).unwrap();
        assert_eq!(extraction.facts.len(), 1);
        let fact = &extraction.facts[0];
        assert_eq!(fact.concept, "us-gaap:Assets");
        assert_eq!(fact.context_ref, "c1");
        assert_eq!(fact.unit_ref.as_deref(), Some("usd"));
        assert_eq!(fact.raw_text, "1,000");
        assert_eq!(fact.scale, 3);
        assert_eq!(fact.precision, Precision::Decimals(-3));
        assert_eq!(fact.format_hint.as_deref(), Some("ixt:num-dot-decimal"));
        assert!(!fact.sign_negative);
        assert_eq!(fact.kind, FactKind::Numeric);
    }

    #[test]
    fn test_contexts_and_units_are_declared() {
        let doc = wrap(
            r#"<p><ix:nonFraction name="us-gaap:NetIncomeLoss" contextRef="c2" unitRef="usd" decimals="0">5</ix:nonFraction></p>"#,
        );
        let extraction = extract_facts(&doc).unwrap();
        assert_eq!(extraction.contexts.len(), 2);
        let c2 = extraction.contexts.iter().find(|c| c.id == "c2").unwrap();
        assert_eq!(c2.entity.identifier, "0000001");
        assert!(matches!(c2.period, Period::Duration { .. }));
        assert_eq!(
            c2.dimensions,
            vec![Dimension {
                axis: "us-gaap:StatementEquityComponentsAxis".to_string(),
                member: "us-gaap:RetainedEarningsMember".to_string(),
            }]
        );

        let per_share = extraction.units.iter().find(|u| u.id == "usdPerShare").unwrap();
        assert_eq!(
            per_share.measure,
            Measure::Divide {
                numerator: vec!["iso4217:USD".to_string()],
                denominator: vec!["xbrli:shares".to_string()],
            }
        );
    }

    #[test]
    fn test_aliased_prefix_maps_to_same_concept() {
        let doc = wrap(
            r#"<p><ix:nonFraction name="gaap:Assets" contextRef="c1" unitRef="usd" decimals="0">1</ix:nonFraction>
               <ix:nonFraction name="us-gaap:Assets" contextRef="c1" unitRef="usd" decimals="0">1</ix:nonFraction></p>"#,
        );
        let extraction = extract_facts(&doc).unwrap();
        assert_eq!(extraction.facts.len(), 2);
        assert!(extraction.facts.iter().all(|f| f.concept == "us-gaap:Assets"));
    }

    #[test]
    fn test_recovers_from_malformed_markup() {
        let doc = wrap(
            r#"<table><tr><td><b>Revenue<td><ix:nonFraction name="us-gaap:Revenues" contextRef="c2" unitRef="usd" decimals="0">12</ix:nonFraction>
               <tr><td>Bad<td><ix:nonFraction contextRef="c2" unitRef="usd">99</ix:nonFraction>
               <p>footnote <span><ix:nonFraction name="us-gaap:CostOfRevenue" contextRef="c2" unitRef="usd" decimals="0" sign="-">7</ix:nonFraction></span>"#,
        );
        let extraction = extract_facts(&doc).unwrap();
        let names: Vec<&str> = extraction.facts.iter().map(|f| f.concept.as_str()).collect();
        assert_eq!(names, vec!["us-gaap:Revenues", "us-gaap:CostOfRevenue"]);
        assert!(extraction.facts[1].sign_negative);
    }

    #[test]
    fn test_excluded_text_is_dropped() {
        let doc = wrap(
            r#"<ix:nonNumeric name="us-gaap:NatureOfOperations" contextRef="c2">Makes <ix:exclude>page 4</ix:exclude>widgets.</ix:nonNumeric>"#,
        );
        let extraction = extract_facts(&doc).unwrap();
        assert_eq!(extraction.facts[0].raw_text, "Makes widgets.");
        assert_eq!(extraction.facts[0].kind, FactKind::NonNumeric);
    }

    #[test]
    fn test_no_facts_is_malformed() {
        let err = extract_facts("<html><body><p>Just a letter.</p></body></html>").unwrap_err();
        assert!(matches!(err, EngineError::MalformedDocument(_)));
    }

    #[test]
    fn test_parse_xbrl_date_with_time() {
        assert_eq!(
            parse_xbrl_date("2025-06-30T00:00:00"),
            NaiveDate::from_ymd_opt(2025, 6, 30)
        );
        assert_eq!(parse_xbrl_date("June 30"), None);
    }

    #[test]
    fn test_extract_fixture_filing() {
        let content = read_test_file("acme-20250630.htm");
        let extraction = extract_facts(&content).unwrap();

        assert!(!extraction.facts.is_empty(), "Should extract some facts");
        assert_eq!(extraction.schema_refs, vec!["acme-20250630.xsd".to_string()]);
        assert!(extraction.facts.iter().any(|f| f.concept == "acme:WidgetRevenue"));
        assert!(!extraction.layout_roles.is_empty());
    }
}
