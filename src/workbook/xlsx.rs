//! Serialize a [`Workbook`] as an `.xlsx` (SpreadsheetML) package.

use chrono::NaiveDate;
use quick_xml::escape::escape;
use std::fmt::Write as FmtWrite;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::{SimpleFileOptions, ZipWriter};

use super::format::{CellValue, Sheet, Workbook, LINE_ITEM_HEADER};
use super::strings::SharedStrings;
use super::styles::{number_format, CellStyle, StyleTable, FMT_GENERAL, FMT_ISO_DATE};
use crate::core::{EngineError, Result};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const LABEL_WIDTH: u32 = 50;
const VALUE_WIDTH: u32 = 20;
/// First data row; row 1 holds the title, row 2 the column headers.
const FIRST_DATA_ROW: usize = 3;

pub fn to_bytes(workbook: &Workbook) -> Result<Vec<u8>> {
    if workbook.sheets.is_empty() {
        return Err(EngineError::Workbook("workbook has no sheets".to_string()));
    }

    let mut strings = SharedStrings::new();
    let mut styles = StyleTable::new();
    let sheets = workbook
        .sheets
        .iter()
        .map(|sheet| sheet_xml(sheet, &mut strings, &mut styles))
        .collect::<Result<Vec<String>>>()?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut write_part = |path: &str, content: &str| -> Result<()> {
        zip.start_file(path, options)?;
        zip.write_all(content.as_bytes())?;
        Ok(())
    };

    write_part("[Content_Types].xml", &content_types_xml(sheets.len())?)?;
    write_part("_rels/.rels", &root_rels_xml())?;
    write_part("xl/workbook.xml", &workbook_xml(workbook)?)?;
    write_part("xl/_rels/workbook.xml.rels", &workbook_rels_xml(sheets.len())?)?;
    write_part("xl/styles.xml", &styles.to_xml()?)?;
    write_part("xl/sharedStrings.xml", &strings.to_xml()?)?;
    for (i, xml) in sheets.iter().enumerate() {
        write_part(&format!("xl/worksheets/sheet{}.xml", i + 1), xml)?;
    }

    let cursor = zip.finish()?;
    let bytes = cursor.into_inner();
    log::info!(
        "Workbook: {} sheets, {} strings, {} bytes",
        workbook.sheets.len(),
        strings.len(),
        bytes.len()
    );
    Ok(bytes)
}

pub fn save(workbook: &Workbook, path: &Path) -> Result<()> {
    let bytes = to_bytes(workbook)?;
    std::fs::write(path, bytes)?;
    log::info!("Saved workbook to {}", path.display());
    Ok(())
}

/// Zero-based column index to its letter name: 0 -> A, 26 -> AA.
pub fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Days since 1899-12-30, the spreadsheet date epoch.
fn date_serial(date: &NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN);
    (*date - epoch).num_days()
}

fn sheet_xml(sheet: &Sheet, strings: &mut SharedStrings, styles: &mut StyleTable) -> Result<String> {
    let mut xml = String::with_capacity(8192);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    write!(xml, r#"<worksheet xmlns="{}" xmlns:r="{}">"#, MAIN_NS, REL_NS)?;

    xml.push_str(r#"<sheetViews><sheetView workbookViewId="0">"#);
    write!(
        xml,
        r#"<pane ySplit="{}" topLeftCell="A{}" activePane="bottomLeft" state="frozen"/>"#,
        FIRST_DATA_ROW - 1,
        FIRST_DATA_ROW
    )?;
    xml.push_str("</sheetView></sheetViews>");

    write!(
        xml,
        r#"<cols><col min="1" max="1" width="{}" customWidth="1"/>"#,
        LABEL_WIDTH
    )?;
    if !sheet.headers.is_empty() {
        write!(
            xml,
            r#"<col min="2" max="{}" width="{}" customWidth="1"/>"#,
            sheet.headers.len() + 1,
            VALUE_WIDTH
        )?;
    }
    xml.push_str("</cols>");

    xml.push_str("<sheetData>");

    let bold = styles.id(CellStyle::new(FMT_GENERAL, 0, true));

    xml.push_str(r#"<row r="1">"#);
    string_cell(&mut xml, "A1", strings.add(&sheet.title), bold)?;
    xml.push_str("</row>");

    xml.push_str(r#"<row r="2">"#);
    string_cell(&mut xml, "A2", strings.add(LINE_ITEM_HEADER), bold)?;
    for (i, header) in sheet.headers.iter().enumerate() {
        let reference = format!("{}2", column_name(i + 1));
        string_cell(&mut xml, &reference, strings.add(header), bold)?;
    }
    xml.push_str("</row>");

    for (offset, row) in sheet.rows.iter().enumerate() {
        let r = FIRST_DATA_ROW + offset;
        write!(xml, r#"<row r="{}">"#, r)?;

        let label_style = styles.id(CellStyle::new(FMT_GENERAL, row.depth, row.bold));
        string_cell(&mut xml, &format!("A{}", r), strings.add(&row.label), label_style)?;

        for (i, cell) in row.cells.iter().enumerate() {
            let reference = format!("{}{}", column_name(i + 1), r);
            match cell {
                CellValue::Number { value, data_type } => {
                    let style = styles.id(CellStyle::new(number_format(*data_type), 0, row.bold));
                    write!(
                        xml,
                        r#"<c r="{}" s="{}"><v>{}</v></c>"#,
                        reference,
                        style,
                        value.normalize()
                    )?;
                }
                CellValue::Date(date) => {
                    let style = styles.id(CellStyle::new(FMT_ISO_DATE, 0, row.bold));
                    write!(
                        xml,
                        r#"<c r="{}" s="{}"><v>{}</v></c>"#,
                        reference,
                        style,
                        date_serial(date)
                    )?;
                }
                CellValue::Text(text) => {
                    string_cell(&mut xml, &reference, strings.add(text), 0)?;
                }
                CellValue::Blank => {}
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    Ok(xml)
}

fn string_cell(xml: &mut String, reference: &str, index: usize, style: usize) -> Result<()> {
    if style == 0 {
        write!(xml, r#"<c r="{}" t="s"><v>{}</v></c>"#, reference, index)?;
    } else {
        write!(xml, r#"<c r="{}" s="{}" t="s"><v>{}</v></c>"#, reference, style, index)?;
    }
    Ok(())
}

fn content_types_xml(sheet_count: usize) -> Result<String> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
    for i in 1..=sheet_count {
        write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i
        )?;
    }
    xml.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    xml.push_str("</Types>");
    Ok(xml)
}

fn root_rels_xml() -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    xml.push_str(r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#);
    xml.push_str("</Relationships>");
    xml
}

fn workbook_xml(workbook: &Workbook) -> Result<String> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    write!(xml, r#"<workbook xmlns="{}" xmlns:r="{}">"#, MAIN_NS, REL_NS)?;
    xml.push_str("<sheets>");
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        write!(
            xml,
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(sheet.name.as_str()),
            i + 1,
            i + 1
        )?;
    }
    xml.push_str("</sheets></workbook>");
    Ok(xml)
}

fn workbook_rels_xml(sheet_count: usize) -> Result<String> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for i in 1..=sheet_count {
        write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i, REL_NS, i
        )?;
    }
    write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
        sheet_count + 1,
        REL_NS
    )?;
    write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{}/sharedStrings" Target="sharedStrings.xml"/>"#,
        sheet_count + 2,
        REL_NS
    )?;
    xml.push_str("</Relationships>");
    Ok(xml)
}
