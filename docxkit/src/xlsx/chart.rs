use super::sheet::ChartValue;
use crate::errors::DocxTemplateError;
use crate::package::relationships::relationship_types;
use crate::package::{Package, Relationships};
use crate::parse::markup::{element_ranges, escape_xml};
use std::collections::BTreeMap;

const ZERO_PLACEHOLDER: &str = "<c:v>0</c:v>";

/// Which embedded workbook feeds each chart, by chart short name (`chartN`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartBindings {
    workbooks: BTreeMap<String, String>,
}

impl ChartBindings {
    /// Reads `word/charts/_rels/chartN.xml.rels` for N = 1, 2, ... until one
    /// is absent.
    pub(crate) fn learn(package: &mut Package) -> Result<Self, DocxTemplateError> {
        let mut bindings = ChartBindings::default();

        for n in 1.. {
            let rels_part = format!("word/charts/_rels/chart{}.xml.rels", n);
            if !package.contains(&rels_part) {
                break;
            }
            let rels = Relationships::parse(&rels_part, &package.read_text(&rels_part)?)?;
            let target = rels
                .target_of_type(relationship_types::PACKAGE)
                .filter(|target| target.ends_with(".xlsx"));
            if let Some(target) = target {
                let workbook = resolve_target("word/charts/", target);
                log::debug!("chart{} is bound to '{}'", n, workbook);
                bindings.workbooks.insert(format!("chart{}", n), workbook);
            }
        }

        Ok(bindings)
    }

    pub fn workbook_of(&self, chart: &str) -> Option<&str> {
        self.workbooks.get(chart).map(String::as_str)
    }
}

/// Package path of a relationship target, relative to `base_dir`.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => (),
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Fills the zero placeholders of a chart's numeric caches with `series`,
/// in order of appearance.
pub(crate) fn patch_chart_cache(part: &str, xml: &str, series: &[ChartValue]) -> String {
    let mut values = series.iter();
    let mut result = String::with_capacity(xml.len());
    let mut bookmark: usize = 0;

    'caches: for range in element_ranges(xml, "c:numCache") {
        let cache = &xml[range.clone()];
        let mut offset: usize = 0;
        while let Some(found) = cache[offset..].find(ZERO_PLACEHOLDER) {
            let value = match values.next() {
                Some(value) => value,
                None => break 'caches,
            };
            let start = range.start + offset + found;
            result.push_str(&xml[bookmark..start]);
            result.push_str(&format!("<c:v>{}</c:v>", escape_xml(&value.value)));
            bookmark = start + ZERO_PLACEHOLDER.len();
            offset += found + ZERO_PLACEHOLDER.len();
        }
    }
    result.push_str(&xml[bookmark..]);

    let surplus = values.count();
    if surplus > 0 {
        log::warn!(
            "'{}' has no placeholder left for {} workbook value(s)",
            part,
            surplus
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::tests::zip_of;
    use pretty_assertions::assert_eq;
    use zip::CompressionMethod;

    fn series(values: &[&str]) -> Vec<ChartValue> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ChartValue {
                cell: format!("B{}", i + 2),
                value: v.to_string(),
            })
            .collect()
    }

    const CHART: &str = concat!(
        r#"<c:chartSpace><c:chart><c:plotArea><c:barChart><c:ser>"#,
        r#"<c:cat><c:strRef><c:strCache><c:pt idx="0"><c:v>0</c:v></c:pt></c:strCache></c:strRef></c:cat>"#,
        r#"<c:val><c:numRef><c:f>Sheet1!$B$2:$B$4</c:f><c:numCache><c:formatCode>General</c:formatCode><c:ptCount val="3"/>"#,
        r#"<c:pt idx="0"><c:v>0</c:v></c:pt><c:pt idx="1"><c:v>0</c:v></c:pt><c:pt idx="2"><c:v>0</c:v></c:pt>"#,
        r#"</c:numCache></c:numRef></c:val></c:ser></c:barChart></c:plotArea></c:chart></c:chartSpace>"#
    );

    #[test]
    fn placeholders_are_filled_in_order() {
        let result = patch_chart_cache("word/charts/chart1.xml", CHART, &series(&["4", "8.5", "15"]));
        assert!(result.contains(
            r#"<c:pt idx="0"><c:v>4</c:v></c:pt><c:pt idx="1"><c:v>8.5</c:v></c:pt><c:pt idx="2"><c:v>15</c:v></c:pt>"#
        ));
        // category caches are not numeric
        assert!(result.contains(r#"<c:strCache><c:pt idx="0"><c:v>0</c:v></c:pt></c:strCache>"#));
    }

    #[test]
    fn surplus_values_and_placeholders_are_tolerated() {
        let short = patch_chart_cache("word/charts/chart1.xml", CHART, &series(&["4"]));
        assert!(short.contains(r#"<c:pt idx="0"><c:v>4</c:v></c:pt><c:pt idx="1"><c:v>0</c:v></c:pt>"#));

        let long = patch_chart_cache(
            "word/charts/chart1.xml",
            CHART,
            &series(&["1", "2", "3", "4", "5"]),
        );
        assert!(long.contains(r#"<c:pt idx="2"><c:v>3</c:v></c:pt></c:numCache>"#));
        assert!(!long.contains("<c:v>4</c:v>"));
    }

    #[test]
    fn relative_targets_resolve_against_the_chart_folder() {
        assert_eq!(
            resolve_target("word/charts/", "../embeddings/Microsoft_Excel_Worksheet1.xlsx"),
            "word/embeddings/Microsoft_Excel_Worksheet1.xlsx"
        );
        assert_eq!(
            resolve_target("word/charts/", "/word/embeddings/Microsoft_Excel_Worksheet.xlsx"),
            "word/embeddings/Microsoft_Excel_Worksheet.xlsx"
        );
    }

    #[test]
    fn bindings_come_from_chart_relationships() {
        let rels = |target: &str| {
            format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/package" Target="{}"/></Relationships>"#,
                target
            )
        };
        let first = rels("../embeddings/Microsoft_Excel_Worksheet.xlsx");
        let second = rels("../embeddings/Microsoft_Excel_Worksheet1.xlsx");
        let archive = zip_of(&[
            ("word/charts/_rels/chart1.xml.rels", first.as_bytes(), CompressionMethod::Deflated),
            ("word/charts/_rels/chart2.xml.rels", second.as_bytes(), CompressionMethod::Deflated),
            ("word/charts/_rels/chart4.xml.rels", first.as_bytes(), CompressionMethod::Deflated),
        ]);
        let mut package = Package::from_bytes(archive).unwrap();

        let bindings = ChartBindings::learn(&mut package).unwrap();

        assert_eq!(
            bindings.workbook_of("chart1"),
            Some("word/embeddings/Microsoft_Excel_Worksheet.xlsx")
        );
        assert_eq!(
            bindings.workbook_of("chart2"),
            Some("word/embeddings/Microsoft_Excel_Worksheet1.xlsx")
        );
        assert_eq!(bindings.workbook_of("chart4"), None);
    }
}
