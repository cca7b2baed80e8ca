mod common;

use common::*;
use docxkit::DocxTemplate;
use pretty_assertions::assert_eq;
use serde_json::json;

const WORKBOOK: &str = "word/embeddings/Microsoft_Excel_Worksheet.xlsx";
const SECOND_WORKBOOK: &str = "word/embeddings/Microsoft_Excel_Worksheet1.xlsx";

fn sst(entries: &[&str]) -> String {
    let items: String = entries
        .iter()
        .map(|entry| format!("<si><t>{}</t></si>", entry))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{n}" uniqueCount="{n}">{}</sst>"#,
        items,
        n = entries.len()
    )
}

fn chart_rels(workbook: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/package" Target="../embeddings/{}"/></Relationships>"#,
        workbook
    )
}

fn chart(title: &str, points: usize) -> String {
    let cache: String = (0..points)
        .map(|i| format!(r#"<c:pt idx="{}"><c:v>0</c:v></c:pt>"#, i))
        .collect();
    format!(
        concat!(
            r#"<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart">"#,
            r#"<c:chart><c:title><c:tx><c:v>{}</c:v></c:tx></c:title><c:plotArea><c:barChart><c:ser>"#,
            r#"<c:val><c:numRef><c:numCache><c:ptCount val="{}"/>{}</c:numCache></c:numRef></c:val>"#,
            r#"</c:ser></c:barChart></c:plotArea></c:chart></c:chartSpace>"#
        ),
        title, points, cache
    )
}

/// Entry texts of a string table, in order.
fn entries(sst: &str) -> Vec<String> {
    sst.split("<si>")
        .skip(1)
        .map(|entry| {
            let start = entry.find("<t>").map(|i| i + 3).unwrap_or(0);
            let end = entry.find("</t>").unwrap_or(start);
            entry[start..end].to_string()
        })
        .collect()
}

/// `(reference, type, value)` of every cell of a sheet.
fn cells(sheet: &str) -> Vec<(String, Option<String>, String)> {
    sheet
        .split("<c ")
        .skip(1)
        .map(|cell| {
            let head = &cell[..cell.find('>').unwrap()];
            let reference = attribute_values(&format!("<c {}>", head), "c", "r").remove(0);
            let kind = attribute_values(&format!("<c {}>", head), "c", "t").pop();
            let value = cell
                .find("<v>")
                .map(|i| cell[i + 3..i + 3 + cell[i + 3..].find("</v>").unwrap()].to_string())
                .unwrap_or_default();
            (reference, kind, value)
        })
        .collect()
}

fn skeleton() -> Vec<u8> {
    let first = workbook(
        &sst(&["Region", "{{toNumberCell Sales}}", "{{Label}}"]),
        &[concat!(
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>"#,
            r#"<row r="2"><c r="A2" t="s"><v>2</v></c></row></sheetData></worksheet>"#
        )],
    );
    let second = workbook(
        &sst(&["{{toNumberCell North}}", "Total", "{{toNumberCell South}}"]),
        &[
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>1</v></c><c r="B1" t="s"><v>0</v></c></row></sheetData></worksheet>"#,
            r#"<worksheet><sheetData><row r="1"><c r="B1" t="s"><v>2</v></c><c r="C1" t="s"><v>1</v></c></row></sheetData></worksheet>"#,
        ],
    );

    Skeleton::new(r#"<w:p><w:r><w:t>{{Label}}</w:t></w:r></w:p>"#)
        .with_stored_part(WORKBOOK, &first)
        .with_stored_part(SECOND_WORKBOOK, &second)
        .with_part("word/charts/chart1.xml", &chart("{{Label}}", 1))
        .with_part("word/charts/_rels/chart1.xml.rels", &chart_rels("Microsoft_Excel_Worksheet.xlsx"))
        .with_part("word/charts/chart2.xml", &chart("Split", 3))
        .with_part("word/charts/_rels/chart2.xml.rels", &chart_rels("Microsoft_Excel_Worksheet1.xlsx"))
        .build()
}

fn data() -> serde_json::Value {
    json!({"Sales": 1250.5, "Label": "EMEA", "North": 7, "South": 12})
}

#[test]
fn number_entries_leave_the_string_table() {
    let mut template = DocxTemplate::from_bytes(&skeleton()).unwrap();
    template.apply(&data()).unwrap();
    let output = template.bytes().unwrap().to_vec();

    let workbook = read_bytes(&output, WORKBOOK);
    let table = read_part(&workbook, "xl/sharedStrings.xml");
    assert_eq!(entries(&table), vec!["Region", "EMEA"]);
    assert!(table.contains(r#"count="2" uniqueCount="2""#));

    let sheet = read_part(&workbook, "xl/worksheets/sheet1.xml");
    assert_eq!(
        cells(&sheet),
        vec![
            ("A1".to_string(), Some("s".to_string()), "0".to_string()),
            ("B1".to_string(), None, "1250.5".to_string()),
            ("A2".to_string(), Some("s".to_string()), "1".to_string()),
        ]
    );
    assert_eq!(read_part(&workbook, "[Content_Types].xml"), "<Types/>");
}

#[test]
fn string_cells_still_point_at_their_text() {
    let mut template = DocxTemplate::from_bytes(&skeleton()).unwrap();
    template.apply(&data()).unwrap();
    let output = template.bytes().unwrap().to_vec();

    // Rendered table before renumbering: North, Total, South
    let before = ["[[NUMBER:7]]", "Total", "[[NUMBER:12]]"];
    let originals = [vec![("A1", 1), ("B1", 0)], vec![("B1", 2), ("C1", 1)]];

    let workbook = read_bytes(&output, SECOND_WORKBOOK);
    let after = entries(&read_part(&workbook, "xl/sharedStrings.xml"));
    assert_eq!(after, vec!["Total"]);

    for (n, original) in originals.iter().enumerate() {
        let sheet = read_part(&workbook, &format!("xl/worksheets/sheet{}.xml", n + 1));
        for (reference, kind, value) in cells(&sheet) {
            let old_index = original.iter().find(|(r, _)| *r == reference).unwrap().1;
            match kind.as_deref() {
                Some("s") => assert_eq!(after[value.parse::<usize>().unwrap()], before[old_index]),
                _ => assert_eq!(format!("[[NUMBER:{}]]", value), before[old_index]),
            }
        }
    }
}

#[test]
fn charts_show_their_own_workbook_values() {
    let mut template = DocxTemplate::from_bytes(&skeleton()).unwrap();
    template.apply(&data()).unwrap();
    let output = template.bytes().unwrap().to_vec();

    let first = read_part(&output, "word/charts/chart1.xml");
    assert!(first.contains("<c:title><c:tx><c:v>EMEA</c:v></c:tx></c:title>"));
    assert!(first.contains(r#"<c:pt idx="0"><c:v>1250.5</c:v></c:pt>"#));

    // sheet order: B1 of sheet 1, then B1 of sheet 2
    let second = read_part(&output, "word/charts/chart2.xml");
    assert!(second.contains(concat!(
        r#"<c:pt idx="0"><c:v>7</c:v></c:pt><c:pt idx="1"><c:v>12</c:v></c:pt>"#,
        r#"<c:pt idx="2"><c:v>0</c:v></c:pt>"#
    )));
}

#[test]
fn workbooks_keep_their_storage_method() {
    let source = skeleton();
    let mut template = DocxTemplate::from_bytes(&source).unwrap();
    template.apply(&data()).unwrap();
    let output = template.bytes().unwrap().to_vec();

    assert_eq!(raw_part(&output, WORKBOOK).1, raw_part(&source, WORKBOOK).1);
    assert_eq!(
        raw_part(&output, "word/charts/_rels/chart1.xml.rels"),
        raw_part(&source, "word/charts/_rels/chart1.xml.rels")
    );
}

#[test]
fn variables_include_workbook_fields() {
    let template = DocxTemplate::from_bytes(&skeleton()).unwrap();
    let variables: Vec<String> = template.variables().unwrap().into_iter().collect();
    assert_eq!(variables, vec!["Label", "North", "Sales", "South"]);
}

#[test]
fn text_in_number_cells_fails_the_assembly() {
    let mut template = DocxTemplate::from_bytes(&skeleton()).unwrap();
    let mut data = data();
    data["North"] = json!("plenty");
    let err = template.apply(&data).unwrap_err();
    assert!(err.to_string().contains(SECOND_WORKBOOK));
    assert!(template.bytes().is_err());
}

#[test]
fn numbers_written_as_text_fail_the_assembly() {
    let mut template = DocxTemplate::from_bytes(&skeleton()).unwrap();
    let mut data = data();
    data["South"] = json!("12");
    let err = template.apply(&data).unwrap_err();
    assert!(err.to_string().contains(SECOND_WORKBOOK));
    assert!(template.bytes().is_err());
}
