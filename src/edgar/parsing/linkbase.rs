//! Companion taxonomy files: extension schema, presentation and label
//! linkbases. These are plain XML, so they go through `roxmltree`.

use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};

use super::namespaces::Namespaces;
use super::types::{PresentationNode, PresentationRole};
use crate::core::{EngineError, Result};
use crate::statements::taxonomy::{BalanceType, Concept, DataType, PeriodType};

const XLINK: &str = "http://www.w3.org/1999/xlink";
pub const STANDARD_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/label";
pub const PERIOD_START_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/periodStartLabel";
pub const PERIOD_END_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/periodEndLabel";

static ROLE_DEFINITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*-\s*[A-Za-z ]+\s*-\s*(.+)$").unwrap());

/// Concepts and role titles declared by an extension schema.
#[derive(Debug, Default)]
pub struct SchemaInfo {
    pub concepts: Vec<Concept>,
    pub role_definitions: HashMap<String, String>,
}

/// Concept labels keyed by (concept, label role).
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: HashMap<(String, String), String>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, concept: &str, role: &str, text: &str) {
        self.labels
            .entry((concept.to_string(), role.to_string()))
            .or_insert_with(|| text.trim().to_string());
    }

    /// Label for `role`, falling back to the standard label.
    pub fn get(&self, concept: &str, role: Option<&str>) -> Option<&str> {
        role.and_then(|r| self.labels.get(&(concept.to_string(), r.to_string())))
            .or_else(|| {
                self.labels
                    .get(&(concept.to_string(), STANDARD_LABEL_ROLE.to_string()))
            })
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn parse_xml<'a>(content: &'a str, what: &str) -> Result<Document<'a>> {
    Document::parse(content)
        .map_err(|e| EngineError::MalformedDocument(format!("invalid {}: {}", what, e)))
}

fn xlink<'a>(node: &Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((XLINK, name))
}

/// `...us-gaap-2024.xsd#us-gaap_Assets` -> `us-gaap:Assets`.
fn concept_from_href(href: &str, ns: &Namespaces) -> Option<String> {
    let fragment = href.rsplit_once('#')?.1;
    let (prefix, local) = fragment.split_once('_')?;
    Some(ns.canonicalize(&format!("{}:{}", prefix, local)))
}

pub fn parse_schema(content: &str, ns: &Namespaces) -> Result<SchemaInfo> {
    let doc = parse_xml(content, "schema")?;
    let root = doc.root_element();

    let prefix = root
        .attribute("targetNamespace")
        .and_then(|uri| ns.canonical_prefix_for_uri(uri))
        .or_else(|| {
            let uri = root.attribute("targetNamespace")?;
            root.namespaces()
                .find(|n| n.uri() == uri && n.name().is_some())
                .and_then(|n| n.name().map(str::to_string))
        })
        .unwrap_or_default();

    let mut info = SchemaInfo::default();

    for element in root.children().filter(|n| n.has_tag_name("element")) {
        let Some(name) = element.attribute("name") else {
            continue;
        };
        let qname = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", prefix, name)
        };
        let balance = element
            .attributes()
            .find(|a| a.name() == "balance")
            .map(|a| BalanceType::from_xbrl(a.value()))
            .unwrap_or(BalanceType::None);
        let period_type = element
            .attributes()
            .find(|a| a.name() == "periodType")
            .map(|a| PeriodType::from_xbrl(a.value()))
            .unwrap_or(PeriodType::Duration);
        let data_type = DataType::from_xbrl_type(element.attribute("type").unwrap_or(""));

        info.concepts.push(Concept {
            qname,
            data_type,
            balance,
            period_type,
            abstract_item: element.attribute("abstract") == Some("true"),
        });
    }

    for role_type in root.descendants().filter(|n| n.has_tag_name("roleType")) {
        let Some(uri) = role_type.attribute("roleURI") else {
            continue;
        };
        if let Some(definition) = role_type
            .children()
            .find(|n| n.has_tag_name("definition"))
            .and_then(|n| n.text())
        {
            info.role_definitions
                .insert(uri.to_string(), definition.trim().to_string());
        }
    }

    log::info!(
        "Schema declares {} concepts and {} roles",
        info.concepts.len(),
        info.role_definitions.len()
    );
    Ok(info)
}

pub fn parse_labels(content: &str, ns: &Namespaces) -> Result<LabelTable> {
    let doc = parse_xml(content, "label linkbase")?;
    let mut table = LabelTable::new();

    for link in doc.descendants().filter(|n| n.has_tag_name("labelLink")) {
        let mut locs: HashMap<&str, String> = HashMap::new();
        let mut resources: HashMap<&str, Vec<(&str, String)>> = HashMap::new();

        for child in link.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "loc" => {
                    if let (Some(label), Some(concept)) = (
                        xlink(&child, "label"),
                        xlink(&child, "href").and_then(|h| concept_from_href(h, ns)),
                    ) {
                        locs.insert(label, concept);
                    }
                }
                "label" => {
                    if let Some(label) = xlink(&child, "label") {
                        let role = xlink(&child, "role").unwrap_or(STANDARD_LABEL_ROLE);
                        let text: String = child
                            .descendants()
                            .filter(|n| n.is_text())
                            .filter_map(|n| n.text())
                            .collect();
                        resources.entry(label).or_default().push((role, text));
                    }
                }
                _ => {}
            }
        }

        for arc in link.children().filter(|n| n.has_tag_name("labelArc")) {
            let (Some(from), Some(to)) = (xlink(&arc, "from"), xlink(&arc, "to")) else {
                continue;
            };
            let (Some(concept), Some(labels)) = (locs.get(from), resources.get(to)) else {
                continue;
            };
            for (role, text) in labels {
                table.insert(concept, role, text);
            }
        }
    }

    log::info!("Loaded {} labels", table.len());
    Ok(table)
}

struct PresentationArc<'a> {
    to: &'a str,
    order: f64,
    preferred_label: Option<&'a str>,
}

/// Build ordered presentation roles from a presentation linkbase.
///
/// Arcs are walked depth first from the roots; siblings follow their `order`
/// attribute and keep document order on ties.
pub fn parse_presentation(
    content: &str,
    ns: &Namespaces,
    role_definitions: &HashMap<String, String>,
) -> Result<Vec<PresentationRole>> {
    let doc = parse_xml(content, "presentation linkbase")?;

    // Role URI -> (loc label -> concept, parent label -> arcs), merged across links.
    let mut role_order: Vec<&str> = Vec::new();
    let mut locs: HashMap<&str, HashMap<&str, String>> = HashMap::new();
    let mut arcs: HashMap<&str, HashMap<&str, Vec<PresentationArc>>> = HashMap::new();
    let mut targets: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut sources: HashMap<&str, Vec<&str>> = HashMap::new();

    for link in doc.descendants().filter(|n| n.has_tag_name("presentationLink")) {
        let Some(role) = xlink(&link, "role") else {
            continue;
        };
        if !role_order.contains(&role) {
            role_order.push(role);
        }

        for child in link.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "loc" => {
                    if let (Some(label), Some(concept)) = (
                        xlink(&child, "label"),
                        xlink(&child, "href").and_then(|h| concept_from_href(h, ns)),
                    ) {
                        locs.entry(role).or_default().insert(label, concept);
                    }
                }
                "presentationArc" => {
                    let (Some(from), Some(to)) = (xlink(&child, "from"), xlink(&child, "to"))
                    else {
                        continue;
                    };
                    let order = child
                        .attribute("order")
                        .and_then(|o| o.trim().parse::<f64>().ok())
                        .unwrap_or(1.0);
                    arcs.entry(role).or_default().entry(from).or_default().push(PresentationArc {
                        to,
                        order,
                        preferred_label: child.attribute("preferredLabel"),
                    });
                    targets.entry(role).or_default().insert(to);
                    let role_sources = sources.entry(role).or_default();
                    if !role_sources.contains(&from) {
                        role_sources.push(from);
                    }
                }
                _ => {}
            }
        }
    }

    let mut roles = Vec::new();
    for (index, role) in role_order.iter().enumerate() {
        let empty_locs = HashMap::new();
        let role_locs = locs.get(role).unwrap_or(&empty_locs);
        let Some(role_arcs) = arcs.get_mut(role) else {
            continue;
        };
        for children in role_arcs.values_mut() {
            children.sort_by(|a, b| a.order.total_cmp(&b.order));
        }

        let role_targets = targets.remove(role).unwrap_or_default();
        let roots: Vec<&str> = sources
            .get(role)
            .map(|s| {
                s.iter()
                    .copied()
                    .filter(|from| !role_targets.contains(from))
                    .collect()
            })
            .unwrap_or_default();

        let mut nodes = Vec::new();
        for root in roots {
            let mut path = HashSet::new();
            walk(root, 0, None, role_arcs, role_locs, &mut path, &mut nodes);
        }
        if nodes.is_empty() {
            continue;
        }

        let definition = role_definitions.get(*role).cloned();
        let (title, sort_key) = match definition.as_deref() {
            Some(def) => match ROLE_DEFINITION.captures(def) {
                Some(cap) => (def.to_string(), role_sort_key(&cap[1])),
                None => (def.to_string(), format!("{:010}", index)),
            },
            None => (humanize_role_uri(role), format!("{:010}", index)),
        };

        log::debug!("Presentation role '{}' with {} nodes", title, nodes.len());
        roles.push(PresentationRole {
            uri: role.to_string(),
            title,
            sort_key,
            nodes,
        });
    }

    Ok(roles)
}

/// Role numbers and positional indexes share one fixed width so they compare
/// correctly as strings.
fn role_sort_key(number: &str) -> String {
    format!("{:0>10}", number.trim_start_matches('0'))
}

fn walk<'a>(
    label: &'a str,
    depth: usize,
    preferred_label: Option<&'a str>,
    arcs: &HashMap<&'a str, Vec<PresentationArc<'a>>>,
    locs: &HashMap<&'a str, String>,
    path: &mut HashSet<&'a str>,
    out: &mut Vec<PresentationNode>,
) {
    if !path.insert(label) {
        log::debug!("Cycle in presentation arcs at {}", label);
        return;
    }
    if let Some(concept) = locs.get(label) {
        out.push(PresentationNode {
            concept: concept.clone(),
            depth,
            order: out.len() as f64,
            preferred_label: preferred_label.map(str::to_string),
            label: None,
            contexts: Vec::new(),
        });
    }
    if let Some(children) = arcs.get(label) {
        for arc in children {
            walk(arc.to, depth + 1, arc.preferred_label, arcs, locs, path, out);
        }
    }
    path.remove(label);
}

/// Title for the sheet: drop the `0000002 - Statement - ` prefix SEC roles carry.
pub fn display_title(title: &str) -> String {
    ROLE_DEFINITION
        .captures(title)
        .map(|cap| cap[2].trim().to_string())
        .unwrap_or_else(|| title.trim().to_string())
}

/// `http://acme.example/role/ConsolidatedBalanceSheets` -> `Consolidated Balance Sheets`.
pub fn humanize_role_uri(uri: &str) -> String {
    let last = uri.rsplit(['/', '#']).next().unwrap_or(uri);
    humanize(last)
}

/// Split a CamelCase name into words.
pub fn humanize(name: &str) -> String {
    let local = name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name);
    let mut out = String::with_capacity(local.len() + 8);
    let chars: Vec<char> = local.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push(' ');
            }
        }
        out.push(*c);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::parsing::tests::read_test_file;

    fn ns() -> Namespaces {
        let mut ns = Namespaces::new();
        ns.declare("us-gaap", "http://fasb.org/us-gaap/2024");
        ns.declare("acme", "http://acme.example/20250630");
        ns
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("us-gaap:NetIncomeLoss"), "Net Income Loss");
        assert_eq!(humanize("EPSBasic"), "EPS Basic");
        assert_eq!(
            humanize_role_uri("http://acme.example/role/ConsolidatedBalanceSheets"),
            "Consolidated Balance Sheets"
        );
    }

    #[test]
    fn test_display_title_strips_sec_prefix() {
        assert_eq!(
            display_title("0000002 - Statement - CONSOLIDATED BALANCE SHEETS"),
            "CONSOLIDATED BALANCE SHEETS"
        );
        assert_eq!(display_title("Balance Sheet"), "Balance Sheet");
    }

    #[test]
    fn test_role_sort_keys_share_width() {
        assert_eq!(role_sort_key("0000020"), role_sort_key("20"));
        assert!(role_sort_key("0000020") > format!("{:010}", 3));
        assert!(role_sort_key("0000003") < role_sort_key("0000010"));
    }

    #[test]
    fn test_presentation_order_and_depth() {
        let xml = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
          <link:presentationLink xlink:type="extended" xlink:role="http://acme.example/role/BalanceSheet">
            <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_AssetsAbstract" xlink:label="abs"/>
            <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_Assets" xlink:label="assets"/>
            <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_Cash" xlink:label="cash"/>
            <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_Inventory" xlink:label="inv"/>
            <link:presentationArc xlink:type="arc" xlink:from="abs" xlink:to="assets" order="3"
                preferredLabel="http://www.xbrl.org/2003/role/totalLabel"/>
            <link:presentationArc xlink:type="arc" xlink:from="abs" xlink:to="inv" order="2"/>
            <link:presentationArc xlink:type="arc" xlink:from="abs" xlink:to="cash" order="2"/>
          </link:presentationLink>
        </link:linkbase>"#;
        let roles = parse_presentation(xml, &ns(), &HashMap::new()).unwrap();
        assert_eq!(roles.len(), 1);
        let concepts: Vec<(&str, usize)> = roles[0]
            .nodes
            .iter()
            .map(|n| (n.concept.as_str(), n.depth))
            .collect();
        assert_eq!(
            concepts,
            vec![
                ("us-gaap:AssetsAbstract", 0),
                ("us-gaap:Inventory", 1),
                ("us-gaap:Cash", 1),
                ("us-gaap:Assets", 1),
            ]
        );
        assert_eq!(
            roles[0].nodes[3].preferred_label.as_deref(),
            Some("http://www.xbrl.org/2003/role/totalLabel")
        );
        assert_eq!(roles[0].title, "Balance Sheet");
    }

    #[test]
    fn test_fixture_schema_and_labels() {
        let ns = ns();
        let schema = parse_schema(&read_test_file("acme-20250630.xsd"), &ns).unwrap();
        let widget = schema
            .concepts
            .iter()
            .find(|c| c.qname == "acme:WidgetRevenue")
            .unwrap();
        assert_eq!(widget.balance, BalanceType::Credit);
        assert_eq!(widget.data_type, DataType::Monetary);
        assert!(schema
            .role_definitions
            .values()
            .any(|d| d.contains("BALANCE SHEETS")));

        let labels = parse_labels(&read_test_file("acme-20250630_lab.xml"), &ns).unwrap();
        assert_eq!(
            labels.get("us-gaap:Assets", Some("http://www.xbrl.org/2003/role/totalLabel")),
            Some("Total assets")
        );
        assert_eq!(labels.get("us-gaap:Assets", None), Some("Assets"));
    }
}
