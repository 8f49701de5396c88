//! Statement sections to sheets, sheets to an `.xlsx` package.

pub mod format;
pub mod strings;
pub mod styles;
pub mod xlsx;

pub use format::{
    all_facts_sheet, display_value, safe_sheet_name, sections_to_workbook, CellValue, Sheet,
    SheetRow, Workbook,
};
