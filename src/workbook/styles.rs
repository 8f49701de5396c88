use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use crate::core::Result;
use crate::statements::taxonomy::DataType;

/// Built-in `#,##0`.
pub const FMT_INTEGER: u32 = 3;
/// Built-in `#,##0.00`.
pub const FMT_TWO_DECIMALS: u32 = 4;
/// Built-in `0.00%`.
pub const FMT_PERCENT: u32 = 10;
pub const FMT_GENERAL: u32 = 0;
/// First id available for custom formats.
pub const FMT_ISO_DATE: u32 = 164;

const MAX_INDENT: usize = 15;

pub fn number_format(data_type: DataType) -> u32 {
    match data_type {
        DataType::Monetary | DataType::Shares => FMT_INTEGER,
        DataType::PerShare => FMT_TWO_DECIMALS,
        DataType::Percent => FMT_PERCENT,
        DataType::Date => FMT_ISO_DATE,
        _ => FMT_GENERAL,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellStyle {
    pub num_fmt: u32,
    pub indent: usize,
    pub bold: bool,
}

impl CellStyle {
    pub fn new(num_fmt: u32, indent: usize, bold: bool) -> Self {
        Self {
            num_fmt,
            indent: indent.min(MAX_INDENT),
            bold,
        }
    }
}

/// Cell formats (`cellXfs`) in first-use order; index 0 is the default.
#[derive(Debug)]
pub struct StyleTable {
    styles: Vec<CellStyle>,
    index: HashMap<CellStyle, usize>,
}

impl Default for StyleTable {
    fn default() -> Self {
        let default = CellStyle::new(FMT_GENERAL, 0, false);
        Self {
            styles: vec![default],
            index: HashMap::from([(default, 0)]),
        }
    }
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&mut self, style: CellStyle) -> usize {
        if let Some(&id) = self.index.get(&style) {
            return id;
        }
        let id = self.styles.len();
        self.styles.push(style);
        self.index.insert(style, id);
        id
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut xml = String::with_capacity(2048);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
        write!(
            xml,
            r#"<numFmts count="1"><numFmt numFmtId="{}" formatCode="yyyy-mm-dd"/></numFmts>"#,
            FMT_ISO_DATE
        )?;
        xml.push_str(r#"<fonts count="2">"#);
        xml.push_str(r#"<font><sz val="11"/><name val="Calibri"/><family val="2"/></font>"#);
        xml.push_str(r#"<font><b/><sz val="11"/><name val="Calibri"/><family val="2"/></font>"#);
        xml.push_str("</fonts>");
        xml.push_str(r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#);
        xml.push_str(r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#);
        xml.push_str(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);

        write!(xml, r#"<cellXfs count="{}">"#, self.styles.len())?;
        for style in &self.styles {
            write!(
                xml,
                r#"<xf numFmtId="{}" fontId="{}" fillId="0" borderId="0" xfId="0""#,
                style.num_fmt,
                u8::from(style.bold)
            )?;
            if style.num_fmt != FMT_GENERAL {
                xml.push_str(r#" applyNumberFormat="1""#);
            }
            if style.bold {
                xml.push_str(r#" applyFont="1""#);
            }
            if style.indent > 0 {
                write!(
                    xml,
                    r#" applyAlignment="1"><alignment horizontal="left" indent="{}"/></xf>"#,
                    style.indent
                )?;
            } else {
                xml.push_str("/>");
            }
        }
        xml.push_str("</cellXfs>");

        xml.push_str(r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
        xml.push_str("</styleSheet>");
        Ok(xml)
    }
}
