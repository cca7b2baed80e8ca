//! Keeps embedded workbooks and the charts drawn from them in step after
//! rendering.
//!
//! Only the shared string table of a workbook is rendered. Values rendered
//! through `toNumberCell` come out as `[[NUMBER:v]]` entries; those entries
//! are taken out of the table, the cells that pointed at them become numeric
//! cells, and the numbers, in cell order, become the preview values of every
//! chart bound to the workbook.

mod chart;
mod shared_strings;
mod sheet;

pub use chart::ChartBindings;
pub use shared_strings::SharedStringsRemap;
pub use sheet::ChartValue;

pub(crate) use chart::patch_chart_cache;

use crate::errors::DocxTemplateError;
use crate::package::Package;
use crate::render::TemplateEngine;
use serde_json::Value;
use std::collections::HashMap;

pub(crate) static PART_SHARED_STRINGS: &str = "xl/sharedStrings.xml";

pub(crate) fn worksheet_part(n: usize) -> String {
    format!("xl/worksheets/sheet{}.xml", n)
}

/// A workbook after synchronization.
#[derive(Debug)]
pub(crate) struct SyncedWorkbook {
    pub bytes: Vec<u8>,
    /// Preview series of the charts bound to this workbook.
    pub series: Vec<ChartValue>,
}

/// Renders the shared strings of the workbook stored in `part` and moves the
/// numbers it produced into the worksheets.
pub(crate) fn sync_workbook(
    part: &str,
    bytes: Vec<u8>,
    engine: &TemplateEngine,
    data: &Value,
) -> Result<SyncedWorkbook, DocxTemplateError> {
    let mut workbook = Package::from_bytes(bytes.clone())?;
    if !workbook.contains(PART_SHARED_STRINGS) {
        log::debug!("'{}' has no shared strings, copying it as is", part);
        return Ok(SyncedWorkbook {
            bytes,
            series: Vec::new(),
        });
    }

    let source = workbook.read_text(PART_SHARED_STRINGS)?;
    let rendered = engine.render(
        &format!("{}:{}", part, PART_SHARED_STRINGS),
        &source,
        data,
    )?;
    let (shared_strings, remap) = shared_strings::extract_numbers(&rendered);

    let mut rewritten: HashMap<String, Vec<u8>> = HashMap::new();
    let mut series: Vec<ChartValue> = Vec::new();
    let mut shared_cells: usize = 0;

    for n in 1.. {
        let sheet_part = worksheet_part(n);
        if !workbook.contains(&sheet_part) {
            break;
        }
        let sheet = sheet::rewrite_sheet(&workbook.read_text(&sheet_part)?, &remap);
        shared_cells += sheet.shared_cells;
        series.extend(sheet.values);
        rewritten.insert(sheet_part, sheet.xml.into_bytes());
    }

    let shared_strings =
        shared_strings::set_counts(&shared_strings, shared_cells, remap.unique_count());
    rewritten.insert(PART_SHARED_STRINGS.to_string(), shared_strings.into_bytes());

    log::debug!(
        "'{}' synchronized: {} numeric value(s), {} string cell(s)",
        part,
        series.len(),
        shared_cells
    );

    Ok(SyncedWorkbook {
        bytes: workbook.rebuild(rewritten, Vec::new())?,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::tests::zip_of;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use zip::CompressionMethod;

    const SHARED_STRINGS: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="6" uniqueCount="6">"#,
        r#"<si><t>{{Header}}</t></si><si><t>Q1</t></si><si><t>{{toNumberCell Q1}}</t></si>"#,
        r#"<si><t>Q2</t></si><si><t>{{toNumberCell Q2}}</t></si><si><t>Total</t></si></sst>"#
    );

    const SHEET1: &str = concat!(
        r#"<worksheet><sheetData>"#,
        r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#,
        r#"<row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" t="s"><v>2</v></c></row>"#,
        r#"<row r="3"><c r="A3" t="s"><v>3</v></c><c r="B3" t="s"><v>4</v></c></row>"#,
        r#"</sheetData></worksheet>"#
    );

    const SHEET2: &str =
        r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>5</v></c></row></sheetData></worksheet>"#;

    fn workbook(parts: &[(&str, &str)]) -> Vec<u8> {
        let parts: Vec<(&str, &[u8], CompressionMethod)> = parts
            .iter()
            .map(|(name, xml)| (*name, xml.as_bytes(), CompressionMethod::Deflated))
            .collect();
        zip_of(&parts)
    }

    #[test]
    fn numbers_move_from_the_table_into_cells() {
        let source = workbook(&[
            ("[Content_Types].xml", "<Types/>"),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ]);
        let engine = TemplateEngine::for_workbook(&[]);
        let data = json!({"Header": "Revenue", "Q1": 12.5, "Q2": 40});

        let synced = sync_workbook(
            "word/embeddings/Microsoft_Excel_Worksheet.xlsx",
            source,
            &engine,
            &data,
        )
        .unwrap();

        let values: Vec<(&str, &str)> = synced
            .series
            .iter()
            .map(|v| (v.cell.as_str(), v.value.as_str()))
            .collect();
        assert_eq!(values, vec![("B2", "12.5"), ("B3", "40")]);

        let mut result = Package::from_bytes(synced.bytes).unwrap();
        let table = result.read_text("xl/sharedStrings.xml").unwrap();
        assert!(table.contains(r#"count="4" uniqueCount="4""#));
        assert!(table.contains("<si><t>Revenue</t></si><si><t>Q1</t></si><si><t>Q2</t></si><si><t>Total</t></si>"));

        let sheet1 = result.read_text("xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet1.contains(r#"<c r="A2" t="s"><v>1</v></c><c r="B2"><v>12.5</v></c>"#));
        assert!(sheet1.contains(r#"<c r="A3" t="s"><v>2</v></c><c r="B3"><v>40</v></c>"#));
        let sheet2 = result.read_text("xl/worksheets/sheet2.xml").unwrap();
        assert!(sheet2.contains(r#"<c r="A1" t="s"><v>3</v></c>"#));
        assert_eq!(result.read_text("[Content_Types].xml").unwrap(), "<Types/>");
    }

    #[test]
    fn workbooks_without_shared_strings_pass_through() {
        let source = workbook(&[("xl/worksheets/sheet1.xml", SHEET2)]);
        let engine = TemplateEngine::for_workbook(&[]);
        let synced = sync_workbook("w.xlsx", source.clone(), &engine, &json!({})).unwrap();
        assert_eq!(synced.bytes, source);
        assert!(synced.series.is_empty());
    }

    #[test]
    fn non_numeric_cells_fail_with_the_part_name() {
        let source = workbook(&[("xl/sharedStrings.xml", SHARED_STRINGS)]);
        let engine = TemplateEngine::for_workbook(&[]);
        let data = json!({"Header": "Revenue", "Q1": "many", "Q2": 40});
        let err = sync_workbook("w.xlsx", source, &engine, &data).unwrap_err();
        match err {
            DocxTemplateError::Render { part, .. } => assert_eq!(part, "w.xlsx:xl/sharedStrings.xml"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
