use std::collections::HashMap;

/// Namespace URI prefixes whose conventional prefix wins over whatever the
/// filer declared.
const WELL_KNOWN: &[(&str, &str)] = &[
    ("http://fasb.org/us-gaap/", "us-gaap"),
    ("http://fasb.org/srt/", "srt"),
    ("http://xbrl.sec.gov/dei/", "dei"),
    ("http://xbrl.sec.gov/country/", "country"),
    ("http://xbrl.sec.gov/currency/", "currency"),
    ("http://xbrl.sec.gov/ecd/", "ecd"),
    ("https://xbrl.ifrs.org/taxonomy/", "ifrs-full"),
    ("http://xbrl.ifrs.org/taxonomy/", "ifrs-full"),
    ("http://www.xbrl.org/2003/iso4217", "iso4217"),
    ("http://www.xbrl.org/2003/instance", "xbrli"),
];

/// Prefix bindings collected from `xmlns:*` declarations.
///
/// Several prefixes may point at the same taxonomy; every QName is rewritten
/// to one canonical prefix per namespace URI.
#[derive(Clone, Debug, Default)]
pub struct Namespaces {
    prefix_to_uri: HashMap<String, String>,
    uri_to_canonical: HashMap<String, String>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, prefix: &str, uri: &str) {
        let prefix = prefix.to_lowercase();
        let uri = uri.trim().to_string();
        if uri.is_empty() {
            return;
        }
        let canonical = WELL_KNOWN
            .iter()
            .find(|(base, _)| uri.starts_with(base))
            .map(|(_, p)| p.to_string())
            .unwrap_or_else(|| prefix.clone());
        self.uri_to_canonical.entry(uri.clone()).or_insert(canonical);
        self.prefix_to_uri.insert(prefix, uri);
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.prefix_to_uri
            .get(&prefix.to_lowercase())
            .map(String::as_str)
    }

    pub fn canonical_prefix_for_uri(&self, uri: &str) -> Option<String> {
        if let Some(p) = self.uri_to_canonical.get(uri) {
            return Some(p.clone());
        }
        WELL_KNOWN
            .iter()
            .find(|(base, _)| uri.starts_with(base))
            .map(|(_, p)| p.to_string())
    }

    /// Rewrite `prefix:Local` to its canonical prefix. Unknown prefixes are
    /// kept as written.
    pub fn canonicalize(&self, qname: &str) -> String {
        let qname = qname.trim();
        match qname.split_once(':') {
            Some((prefix, local)) => {
                let canonical = self
                    .uri(prefix)
                    .and_then(|uri| self.canonical_prefix_for_uri(uri))
                    .unwrap_or_else(|| prefix.to_string());
                format!("{}:{}", canonical, local)
            }
            None => qname.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliased_prefixes_share_canonical_name() {
        let mut ns = Namespaces::new();
        ns.declare("us-gaap", "http://fasb.org/us-gaap/2024");
        ns.declare("gaap", "http://fasb.org/us-gaap/2024");
        assert_eq!(ns.canonicalize("gaap:Assets"), "us-gaap:Assets");
        assert_eq!(ns.canonicalize("us-gaap:Assets"), "us-gaap:Assets");
    }

    #[test]
    fn test_extension_prefix_uses_first_declaration() {
        let mut ns = Namespaces::new();
        ns.declare("acme", "http://acme.example/20250630");
        ns.declare("ac", "http://acme.example/20250630");
        assert_eq!(ns.canonicalize("ac:WidgetRevenue"), "acme:WidgetRevenue");
        assert_eq!(ns.canonicalize("zz:Unknown"), "zz:Unknown");
    }
}
