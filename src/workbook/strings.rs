use quick_xml::escape::escape;
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use crate::core::Result;

/// Shared strings table (`xl/sharedStrings.xml`).
///
/// Every text cell points at an entry here by index.
#[derive(Debug, Default)]
pub struct SharedStrings {
    strings: Vec<String>,
    index: HashMap<String, usize>,
    references: usize,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `s`, adding it on first use.
    pub fn add(&mut self, s: &str) -> usize {
        self.references += 1;
        let s = xml_safe(s);
        if let Some(&index) = self.index.get(&s) {
            return index;
        }
        let index = self.strings.len();
        self.index.insert(s.clone(), index);
        self.strings.push(s);
        index
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut xml = String::with_capacity(4096);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        write!(
            xml,
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
            self.references,
            self.strings.len()
        )?;
        for s in &self.strings {
            if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
                write!(xml, r#"<si><t xml:space="preserve">{}</t></si>"#, escape(s.as_str()))?;
            } else {
                write!(xml, "<si><t>{}</t></si>", escape(s.as_str()))?;
            }
        }
        xml.push_str("</sst>");
        Ok(xml)
    }
}

/// Drop characters XML 1.0 cannot carry.
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_are_deduplicated() {
        let mut strings = SharedStrings::new();
        assert_eq!(strings.add("Total assets"), 0);
        assert_eq!(strings.add("Cash"), 1);
        assert_eq!(strings.add("Total assets"), 0);
        assert_eq!(strings.len(), 2);

        let xml = strings.to_xml().unwrap();
        assert!(xml.contains(r#"count="3" uniqueCount="2""#));
        assert!(xml.contains("<si><t>Cash</t></si>"));
    }

    #[test]
    fn test_strings_are_escaped() {
        let mut strings = SharedStrings::new();
        strings.add("Property, plant & equipment <net>\u{0}");
        let xml = strings.to_xml().unwrap();
        assert!(xml.contains("Property, plant &amp; equipment &lt;net&gt;</t>"));
    }
}
